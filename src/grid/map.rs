//! The battlefield hex map: tile layout, adjacency and terrain lookups
//!
//! The map is immutable once built and shared between components behind an
//! `Arc`. Ownership lives in the control-point engine, not here.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::config::MapConfig;
use crate::core::error::{Result, WarError};
use crate::grid::hex::HexCoord;
use crate::grid::terrain::{Terrain, TerrainEffect, TileKind};

/// A single tile on the map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tile {
    pub coord: HexCoord,
    pub kind: TileKind,
    pub terrain: Terrain,
    /// Index into the battlefield's team list for spawn tiles
    pub spawn_slot: Option<usize>,
}

impl Tile {
    pub fn new(coord: HexCoord, kind: TileKind) -> Self {
        Self {
            coord,
            kind,
            terrain: Terrain::Plain,
            spawn_slot: None,
        }
    }

    pub fn point_value(&self) -> u32 {
        self.kind.point_value()
    }

    pub fn defense_bonus(&self) -> f64 {
        self.kind.defense_bonus()
    }

    pub fn effect(&self) -> TerrainEffect {
        TerrainEffect {
            terrain: self.terrain,
            speed_multiplier: self.terrain.speed_multiplier(),
            vision_modifier: self.terrain.vision_modifier(),
            passable: self.terrain.is_passable(),
            defense_bonus: self.kind.defense_bonus(),
        }
    }
}

/// Hexagon-shaped map centred on the origin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HexGrid {
    radius: u32,
    tiles: AHashMap<HexCoord, Tile>,
}

impl HexGrid {
    /// A hexagon of plain copper tiles, with no special layout
    pub fn hexagon(radius: u32) -> Self {
        let tiles = HexCoord::ORIGIN
            .hexes_in_range(radius)
            .into_iter()
            .map(|c| (c, Tile::new(c, TileKind::CopperVein)))
            .collect();
        Self { radius, tiles }
    }

    /// The standard sect-war layout.
    ///
    /// Core at the origin, fortresses guarding it on ring 1, gold veins on
    /// the ring 2 corners, walls and a sky river on ring 3, silver veins on
    /// every other ring 4 tile, cloud sea patches on ring 5 and spawn tiles
    /// spread evenly over the outer ring. Everything else is copper.
    pub fn standard(config: &MapConfig) -> Self {
        let mut grid = Self::hexagon(config.radius);
        let origin = HexCoord::ORIGIN;

        grid.set_kind(origin, TileKind::Core);
        for c in origin.ring(1) {
            grid.set_kind(c, TileKind::Fortress);
        }
        for (i, c) in origin.ring(2).into_iter().enumerate() {
            if i % 2 == 0 {
                grid.set_kind(c, TileKind::GoldVein);
            }
        }
        for (i, c) in origin.ring(3).into_iter().enumerate() {
            if i % 3 == 0 {
                grid.set_terrain(c, Terrain::Wall);
            } else if i % 6 == 2 {
                grid.set_terrain(c, Terrain::SkyRiver);
            }
        }
        for (i, c) in origin.ring(4).into_iter().enumerate() {
            if i % 2 == 0 {
                grid.set_kind(c, TileKind::SilverVein);
            }
        }
        for (i, c) in origin.ring(5).into_iter().enumerate() {
            if i % 5 == 0 {
                grid.set_terrain(c, Terrain::CloudSea);
            }
        }

        let outer = origin.ring(config.radius);
        for slot in 0..config.spawn_count {
            let c = outer[slot * outer.len() / config.spawn_count];
            if let Some(tile) = grid.tiles.get_mut(&c) {
                tile.kind = TileKind::Spawn;
                tile.spawn_slot = Some(slot);
            }
        }

        grid
    }

    fn set_kind(&mut self, coord: HexCoord, kind: TileKind) {
        if let Some(tile) = self.tiles.get_mut(&coord) {
            tile.kind = kind;
        }
    }

    /// Set terrain at a coordinate
    pub fn set_terrain(&mut self, coord: HexCoord, terrain: Terrain) {
        if let Some(tile) = self.tiles.get_mut(&coord) {
            tile.terrain = terrain;
        }
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn contains(&self, coord: HexCoord) -> bool {
        self.tiles.contains_key(&coord)
    }

    pub fn get(&self, coord: HexCoord) -> Option<&Tile> {
        self.tiles.get(&coord)
    }

    pub fn tile(&self, coord: HexCoord) -> Result<&Tile> {
        self.tiles.get(&coord).ok_or(WarError::UnknownTile(coord))
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    /// On-map neighbours; border tiles have fewer than six
    pub fn neighbors(&self, coord: HexCoord) -> Result<Vec<HexCoord>> {
        self.tile(coord)?;
        Ok(coord
            .neighbors()
            .into_iter()
            .filter(|n| self.contains(*n))
            .collect())
    }

    pub fn distance(&self, a: HexCoord, b: HexCoord) -> u32 {
        a.distance(&b)
    }

    pub fn is_adjacent(&self, a: HexCoord, b: HexCoord) -> bool {
        a.distance(&b) == 1
    }

    pub fn terrain_effect(&self, coord: HexCoord) -> Result<TerrainEffect> {
        Ok(self.tile(coord)?.effect())
    }

    /// Straight path between two tiles, both ends included
    pub fn line_between(&self, a: HexCoord, b: HexCoord) -> Vec<HexCoord> {
        a.line_to(&b)
    }

    /// On-map tiles within `range` of `center`
    pub fn tiles_in_range(&self, center: HexCoord, range: u32) -> Vec<HexCoord> {
        center
            .hexes_in_range(range)
            .into_iter()
            .filter(|c| self.contains(*c))
            .collect()
    }

    /// Spawn tiles ordered by slot
    pub fn spawn_tiles(&self) -> Vec<HexCoord> {
        let mut spawns: Vec<(usize, HexCoord)> = self
            .tiles
            .values()
            .filter_map(|t| t.spawn_slot.map(|slot| (slot, t.coord)))
            .collect();
        spawns.sort_unstable();
        spawns.into_iter().map(|(_, c)| c).collect()
    }

    pub fn count_kind(&self, kind: TileKind) -> usize {
        self.tiles.values().filter(|t| t.kind == kind).count()
    }

    /// Check the layout against the map rules, returning every problem found
    pub fn validate_integrity(&self, config: &MapConfig) -> Vec<String> {
        let mut errors = Vec::new();

        let expected = 1 + 3 * config.radius as usize * (config.radius as usize + 1);
        if self.tiles.len() != expected {
            errors.push(format!(
                "expected {} tiles for radius {}, found {}",
                expected,
                config.radius,
                self.tiles.len()
            ));
        }

        for (coord, tile) in &self.tiles {
            if tile.coord != *coord {
                errors.push(format!("tile keyed at {:?} reports {:?}", coord, tile.coord));
            }
            if coord.ring_index() > self.radius {
                errors.push(format!("tile {:?} lies outside radius {}", coord, self.radius));
            }
            if tile.kind.is_spawn() != tile.spawn_slot.is_some() {
                errors.push(format!("tile {:?} has inconsistent spawn slot", coord));
            }
            if !tile.terrain.is_passable() && tile.kind != TileKind::CopperVein {
                errors.push(format!("{:?} tile {:?} is impassable", tile.kind, coord));
            }
        }

        let cores = self.count_kind(TileKind::Core);
        if cores != 1 {
            errors.push(format!("expected exactly 1 core, found {}", cores));
        }
        let gold = self.count_kind(TileKind::GoldVein);
        if !(3..=7).contains(&gold) {
            errors.push(format!("gold vein count {} outside 3-7", gold));
        }
        let silver = self.count_kind(TileKind::SilverVein);
        if !(8..=15).contains(&silver) {
            errors.push(format!("silver vein count {} outside 8-15", silver));
        }
        let copper = self.count_kind(TileKind::CopperVein);
        if copper <= 50 {
            errors.push(format!("copper vein count {} should exceed 50", copper));
        }
        let spawns = self.spawn_tiles();
        if spawns.len() != config.spawn_count {
            errors.push(format!(
                "expected {} spawn tiles, found {}",
                config.spawn_count,
                spawns.len()
            ));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard() -> HexGrid {
        HexGrid::standard(&MapConfig::default())
    }

    #[test]
    fn test_standard_map_has_127_tiles() {
        let grid = standard();
        assert_eq!(grid.len(), 127);
        assert!(grid.validate_integrity(&MapConfig::default()).is_empty());
    }

    #[test]
    fn test_standard_tile_counts() {
        let grid = standard();
        assert_eq!(grid.count_kind(TileKind::Core), 1);
        assert_eq!(grid.count_kind(TileKind::Fortress), 6);
        assert_eq!(grid.count_kind(TileKind::GoldVein), 6);
        assert_eq!(grid.count_kind(TileKind::SilverVein), 12);
        assert_eq!(grid.count_kind(TileKind::Spawn), 20);
        assert!(grid.count_kind(TileKind::CopperVein) > 50);
        assert_eq!(grid.tile(HexCoord::ORIGIN).unwrap().kind, TileKind::Core);
    }

    #[test]
    fn test_spawn_slots_unique_and_on_outer_ring() {
        let grid = standard();
        let spawns = grid.spawn_tiles();
        assert_eq!(spawns.len(), 20);
        let mut dedup = spawns.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), 20);
        assert!(spawns.iter().all(|c| c.ring_index() == 6));
    }

    #[test]
    fn test_interior_and_border_neighbors() {
        let grid = standard();
        assert_eq!(grid.neighbors(HexCoord::ORIGIN).unwrap().len(), 6);
        // Corner of the hexagon touches only three on-map tiles
        assert_eq!(grid.neighbors(HexCoord::new(6, 0)).unwrap().len(), 3);
        // Edge tile touches four
        assert_eq!(grid.neighbors(HexCoord::new(6, -3)).unwrap().len(), 4);
    }

    #[test]
    fn test_neighbors_off_map_is_error() {
        let grid = standard();
        assert!(matches!(
            grid.neighbors(HexCoord::new(20, 0)),
            Err(WarError::UnknownTile(_))
        ));
    }

    #[test]
    fn test_terrain_effects() {
        let grid = standard();
        let walls: Vec<_> = grid
            .tiles()
            .filter(|t| t.terrain == Terrain::Wall)
            .collect();
        assert_eq!(walls.len(), 6);
        assert!(!walls[0].effect().passable);

        let river = grid
            .tiles()
            .find(|t| t.terrain == Terrain::SkyRiver)
            .unwrap();
        assert_eq!(
            grid.terrain_effect(river.coord).unwrap().speed_multiplier,
            0.5
        );

        let fortress = HexCoord::ORIGIN.ring(1)[0];
        let effect = grid.terrain_effect(fortress).unwrap();
        assert_eq!(effect.defense_bonus, 0.3);
    }

    #[test]
    fn test_adjacency() {
        let grid = standard();
        assert!(grid.is_adjacent(HexCoord::new(0, 0), HexCoord::new(1, -1)));
        assert!(!grid.is_adjacent(HexCoord::new(0, 0), HexCoord::new(2, -1)));
        assert!(!grid.is_adjacent(HexCoord::new(0, 0), HexCoord::new(0, 0)));
    }

    #[test]
    fn test_integrity_detects_missing_core() {
        let grid = HexGrid::hexagon(6);
        let errors = grid.validate_integrity(&MapConfig::default());
        assert!(errors.iter().any(|e| e.contains("core")));
    }
}
