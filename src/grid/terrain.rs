//! Tile kinds, terrain types and their effects

use serde::{Deserialize, Serialize};

/// Base terrain of a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Terrain {
    #[default]
    Plain,
    SkyRiver, // Halves movement speed
    CloudSea, // Reduces vision
    Wall,     // Impassable
}

impl Terrain {
    /// Movement speed multiplier (1.0 = normal, 0.0 = impassable)
    pub fn speed_multiplier(&self) -> f64 {
        match self {
            Terrain::Plain => 1.0,
            Terrain::SkyRiver => 0.5,
            Terrain::CloudSea => 1.0,
            Terrain::Wall => 0.0,
        }
    }

    /// Vision range change in hexes
    pub fn vision_modifier(&self) -> i32 {
        match self {
            Terrain::CloudSea => -2,
            _ => 0,
        }
    }

    pub fn is_passable(&self) -> bool {
        !matches!(self, Terrain::Wall)
    }
}

/// Effects a tile's terrain applies to anyone standing on or crossing it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainEffect {
    pub terrain: Terrain,
    pub speed_multiplier: f64,
    pub vision_modifier: i32,
    pub passable: bool,
    /// Defense bonus granted by the tile kind (0.0 - 0.5)
    pub defense_bonus: f64,
}

/// What a tile is worth and how it behaves under capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileKind {
    Core,
    GoldVein,
    SilverVein,
    CopperVein,
    Fortress,
    Spawn,
}

impl TileKind {
    /// Score per minute of ownership
    pub fn point_value(&self) -> u32 {
        match self {
            TileKind::Core => 100,
            TileKind::GoldVein => 60,
            TileKind::SilverVein => 30,
            TileKind::Fortress => 20,
            TileKind::CopperVein => 10,
            TileKind::Spawn => 5,
        }
    }

    /// Additive defense bonus for the holder of the tile
    pub fn defense_bonus(&self) -> f64 {
        match self {
            TileKind::Core => 0.2,
            TileKind::Fortress => 0.3,
            TileKind::Spawn => 0.5,
            _ => 0.0,
        }
    }

    pub fn is_spawn(&self) -> bool {
        matches!(self, TileKind::Spawn)
    }
}
