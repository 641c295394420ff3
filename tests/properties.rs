//! Property tests for the pure rules

use std::sync::Arc;

use proptest::prelude::*;

use sect_war::combat::{BattleRecord, DecayCalculator, Element, ElementAdvantageTable};
use sect_war::core::config::{ControlConfig, DecayConfig, MapConfig};
use sect_war::core::error::WarError;
use sect_war::core::types::{PlayerId, TeamId, Timestamp, MS_PER_MINUTE};
use sect_war::grid::{HexCoord, HexGrid};
use sect_war::territory::{CaptureAttempt, ControlPointEngine};

const NOW: Timestamp = 1_717_243_200_000;

fn element() -> impl Strategy<Value = Element> {
    prop::sample::select(Element::ALL.to_vec())
}

fn coord(range: i32) -> impl Strategy<Value = HexCoord> {
    (-range..=range, -range..=range).prop_map(|(q, r)| HexCoord::new(q, r))
}

proptest! {
    #[test]
    fn resource_coefficient_matches_formula(r in 0.0f64..=100.0) {
        let decay = DecayCalculator::new(DecayConfig::default());
        let expected = if r == 0.0 {
            0.5
        } else {
            0.95f64.powf(((100.0 - r) / 10.0).floor()).max(0.5)
        };
        let got = decay.resource_coefficient(r).unwrap();
        prop_assert!((got - expected).abs() < 1e-12);
        prop_assert!((0.5..=1.0).contains(&got));
    }

    #[test]
    fn resource_coefficient_rejects_out_of_range(r in prop_oneof![-1e6f64..-1e-9, 100.0001f64..1e6]) {
        let decay = DecayCalculator::new(DecayConfig::default());
        prop_assert!(matches!(
            decay.resource_coefficient(r),
            Err(WarError::InvalidResourceValue(_))
        ));
    }

    #[test]
    fn element_relation_is_antisymmetric(a in element(), b in element()) {
        let table = ElementAdvantageTable::default();
        let forward = table.multiplier(a, b);
        let backward = table.multiplier(b, a);
        prop_assert!([1.3, 0.85, 1.2, 1.0].contains(&forward));
        if forward == 1.3 {
            prop_assert_eq!(backward, 0.85);
        }
        if forward == 0.85 {
            prop_assert_eq!(backward, 1.3);
        }
        if a == b {
            prop_assert_eq!(forward, 1.2);
        }
    }

    #[test]
    fn hex_distance_is_a_metric(a in coord(20), b in coord(20), c in coord(20)) {
        prop_assert_eq!(a.distance(&b), b.distance(&a));
        prop_assert_eq!(a.distance(&a), 0);
        prop_assert!(a.distance(&c) <= a.distance(&b) + b.distance(&c));
    }

    #[test]
    fn neighbors_are_adjacent_and_on_map(c in coord(6)) {
        let grid = HexGrid::standard(&MapConfig::default());
        prop_assume!(grid.contains(c));
        let neighbors = grid.neighbors(c).unwrap();
        prop_assert!(neighbors.len() <= 6);
        prop_assert!(neighbors.len() >= 3);
        for n in neighbors {
            prop_assert!(grid.contains(n));
            prop_assert!(grid.is_adjacent(c, n));
            prop_assert_eq!(grid.distance(c, n), 1);
        }
    }

    #[test]
    fn decay_stays_within_floors(
        battles in prop::collection::vec(0i64..120, 0..40),
        from in coord(6),
        to in coord(6),
    ) {
        let config = DecayConfig::default();
        let decay = DecayCalculator::new(config.clone());
        let history: Vec<BattleRecord> = battles
            .into_iter()
            .map(|m| BattleRecord::new(NOW - m * MS_PER_MINUTE))
            .collect();
        let energy = decay.energy_decay(&history, NOW);
        let distance = decay.distance_decay(from, to);
        prop_assert!((config.energy_floor..=1.0).contains(&energy));
        prop_assert!((config.distance_floor..=1.0).contains(&distance));
    }

    #[test]
    fn at_most_one_capture_per_instant(
        powers in prop::collection::vec(1.0f64..1e6, 1..12),
        ring in 0u32..5,
    ) {
        let grid = Arc::new(HexGrid::standard(&MapConfig::default()));
        let control = ControlPointEngine::new(grid.clone(), ControlConfig::default(), &[], NOW);
        let tile = HexCoord::ORIGIN
            .ring(ring)
            .into_iter()
            .find(|c| grid.tile(*c).is_ok_and(|t| t.terrain.is_passable()))
            .unwrap_or(HexCoord::ORIGIN);
        let attempts: Vec<CaptureAttempt> = powers
            .iter()
            .enumerate()
            .map(|(i, power)| CaptureAttempt {
                tile,
                team: TeamId::new(i as u32 + 1),
                player: PlayerId::new(i as u64 + 1),
                actor_position: tile,
                combat_power: *power,
                sequence: i as u64,
                at: NOW + 1_000,
            })
            .collect();

        let results = control.resolve_contest(&attempts);
        let wins = results.iter().filter(|r| r.is_ok()).count();
        prop_assert_eq!(wins, 1);
        for r in &results {
            if let Err(e) = r {
                prop_assert!(matches!(e, WarError::CaptureLost(_)));
            }
        }
    }
}
