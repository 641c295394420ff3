//! Hex map: coordinates, terrain and the battlefield layout

pub mod hex;
pub mod map;
pub mod terrain;

pub use hex::{HexCoord, DIRECTIONS};
pub use map::{HexGrid, Tile};
pub use terrain::{Terrain, TerrainEffect, TileKind};
