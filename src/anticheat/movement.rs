//! Movement plausibility
//!
//! A move is checked against the map (bounds, walls along the path) and
//! against the fastest legitimate pace over the terrain it crosses.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::anticheat::verdict::{Severity, Verdict, ViolationKind};
use crate::core::config::AntiCheatConfig;
use crate::grid::{HexCoord, HexGrid};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementReport {
    pub from: HexCoord,
    pub to: HexCoord,
    /// Time since the player arrived at `from`
    pub elapsed_ms: i64,
    pub teleport: bool,
    /// Charges the server believes the player holds
    pub teleport_charges: u32,
    /// Active speed buff, 1.0 when none
    pub speed_buff: f64,
}

/// Fastest legitimate time for the straight path, before latency tolerance
pub fn required_travel_ms(
    grid: &HexGrid,
    config: &AntiCheatConfig,
    path: &[HexCoord],
    speed_buff: f64,
) -> f64 {
    let buff = speed_buff.clamp(1.0, config.max_speed_buff);
    path.iter()
        .skip(1)
        .map(|c| {
            let speed = grid
                .get(*c)
                .map(|t| t.terrain.speed_multiplier())
                .unwrap_or(1.0);
            config.min_ms_per_tile as f64 / speed.max(f64::EPSILON) / buff
        })
        .sum()
}

pub fn validate_movement(
    grid: &HexGrid,
    config: &AntiCheatConfig,
    report: &MovementReport,
) -> Verdict {
    if !grid.contains(report.from) || !grid.contains(report.to) {
        return Verdict::reject(
            ViolationKind::OutOfBounds,
            Severity::High,
            json!({ "from": report.from, "to": report.to, "radius": grid.radius() }),
        );
    }

    // A teleport only needs a passable landing tile
    let path = if report.teleport {
        vec![report.from, report.to]
    } else {
        grid.line_between(report.from, report.to)
    };
    if let Some(wall) = path
        .iter()
        .skip(1)
        .find(|c| grid.get(**c).is_some_and(|t| !t.terrain.is_passable()))
    {
        return Verdict::reject(
            ViolationKind::WallClipping,
            Severity::High,
            json!({ "from": report.from, "to": report.to, "wall": wall }),
        );
    }

    if report.teleport {
        if report.teleport_charges == 0 {
            return Verdict::reject(
                ViolationKind::NoTeleportCharges,
                Severity::Medium,
                json!({ "to": report.to }),
            );
        }
        return Verdict::pass();
    }

    let required = required_travel_ms(grid, config, &path, report.speed_buff);
    let allowed = required * (1.0 - config.movement_tolerance);
    if (report.elapsed_ms.max(0) as f64) < allowed {
        return Verdict::reject(
            ViolationKind::ExcessiveMovementSpeed,
            Severity::High,
            json!({
                "distance": report.from.distance(&report.to),
                "elapsed_ms": report.elapsed_ms,
                "required_ms": required,
            }),
        );
    }

    Verdict::pass()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::MapConfig;
    use crate::grid::Terrain;

    fn report(from: HexCoord, to: HexCoord, elapsed_ms: i64) -> MovementReport {
        MovementReport {
            from,
            to,
            elapsed_ms,
            teleport: false,
            teleport_charges: 0,
            speed_buff: 1.0,
        }
    }

    #[test]
    fn test_one_tile_at_normal_pace() {
        let grid = HexGrid::hexagon(10);
        let config = AntiCheatConfig::default();
        let v = validate_movement(&grid, &config, &report(HexCoord::new(0, 0), HexCoord::new(1, 0), 6_000));
        assert!(v.valid);
    }

    #[test]
    fn test_fifty_tiles_in_100ms() {
        let grid = HexGrid::hexagon(60);
        let config = AntiCheatConfig::default();
        let v = validate_movement(&grid, &config, &report(HexCoord::new(0, 0), HexCoord::new(50, 0), 100));
        assert_eq!(v.reason, Some(ViolationKind::ExcessiveMovementSpeed));
        assert_eq!(v.severity, Some(Severity::High));
    }

    #[test]
    fn test_sky_river_slows_legal_pace() {
        let mut grid = HexGrid::hexagon(10);
        grid.set_terrain(HexCoord::new(1, 0), Terrain::SkyRiver);
        let config = AntiCheatConfig::default();
        let v = validate_movement(&grid, &config, &report(HexCoord::new(0, 0), HexCoord::new(1, 0), 6_000));
        assert_eq!(v.reason, Some(ViolationKind::ExcessiveMovementSpeed));
        let v = validate_movement(&grid, &config, &report(HexCoord::new(0, 0), HexCoord::new(1, 0), 12_000));
        assert!(v.valid);
    }

    #[test]
    fn test_out_of_bounds() {
        let grid = HexGrid::standard(&MapConfig::default());
        let config = AntiCheatConfig::default();
        let v = validate_movement(&grid, &config, &report(HexCoord::new(6, 0), HexCoord::new(7, 0), 60_000));
        assert_eq!(v.reason, Some(ViolationKind::OutOfBounds));
    }

    #[test]
    fn test_wall_clipping() {
        let mut grid = HexGrid::hexagon(10);
        grid.set_terrain(HexCoord::new(1, 0), Terrain::Wall);
        let config = AntiCheatConfig::default();
        let v = validate_movement(&grid, &config, &report(HexCoord::new(0, 0), HexCoord::new(2, 0), 60_000));
        assert_eq!(v.reason, Some(ViolationKind::WallClipping));
        assert_eq!(v.severity, Some(Severity::High));
    }

    #[test]
    fn test_teleport_requires_charge() {
        let grid = HexGrid::hexagon(10);
        let config = AntiCheatConfig::default();
        let mut r = report(HexCoord::new(0, 0), HexCoord::new(8, 0), 10);
        r.teleport = true;
        assert_eq!(
            validate_movement(&grid, &config, &r).reason,
            Some(ViolationKind::NoTeleportCharges)
        );
        r.teleport_charges = 2;
        assert!(validate_movement(&grid, &config, &r).valid);
    }

    #[test]
    fn test_speed_buff_capped() {
        let grid = HexGrid::hexagon(10);
        let config = AntiCheatConfig::default();
        let mut r = report(HexCoord::new(0, 0), HexCoord::new(4, 0), 12_000);
        r.speed_buff = 2.0;
        assert!(validate_movement(&grid, &config, &r).valid);
        r.speed_buff = 100.0;
        r.elapsed_ms = 1_000;
        assert!(!validate_movement(&grid, &config, &r).valid);
    }
}
