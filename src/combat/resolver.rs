//! Combat exchange resolution
//!
//! Damage starts from the power difference between the two sides, then goes
//! through a fixed multiplier chain:
//!
//! element advantage × tile defense × decay × random factor
//!
//! The compounded chain is capped so no combination of buffs can run away.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::combat::decay::{BattleRecord, DecayCalculator};
use crate::combat::element::{Element, ElementAdvantageTable};
use crate::core::config::{CombatConfig, DecayConfig};
use crate::core::error::{Result, WarError};
use crate::core::types::{PlayerId, TeamId, Timestamp};
use crate::grid::{HexCoord, HexGrid, Tile};

/// A player's contribution to one side of an exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatActor {
    pub player: PlayerId,
    pub team: TeamId,
    pub power: f64,
    pub element: Element,
    pub position: HexCoord,
    pub history: Vec<BattleRecord>,
}

impl CombatActor {
    pub fn new(player: PlayerId, team: TeamId, power: f64, element: Element) -> Self {
        Self {
            player,
            team,
            power,
            element,
            position: HexCoord::ORIGIN,
            history: Vec::new(),
        }
    }

    pub fn at(mut self, position: HexCoord) -> Self {
        self.position = position;
        self
    }

    pub fn with_history(mut self, history: Vec<BattleRecord>) -> Self {
        self.history = history;
        self
    }
}

/// One side of an exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatSquad {
    pub team: TeamId,
    pub actors: Vec<CombatActor>,
}

impl CombatSquad {
    pub fn new(team: TeamId, actors: Vec<CombatActor>) -> Self {
        Self { team, actors }
    }

    pub fn total_power(&self) -> f64 {
        self.actors.iter().map(|a| a.power).sum()
    }

    /// Strongest actor; its element is the one the other side fights against
    pub fn lead(&self) -> Option<&CombatActor> {
        self.actors
            .iter()
            .max_by(|a, b| a.power.total_cmp(&b.power))
    }

    fn check(&self, side: &str) -> Result<()> {
        if self.actors.is_empty() {
            return Err(WarError::InvalidTeamComposition(format!("{side} side is empty")));
        }
        if self
            .actors
            .iter()
            .any(|a| !a.power.is_finite() || a.power < 0.0)
        {
            return Err(WarError::InvalidTeamComposition(format!(
                "{side} side has an invalid power value"
            )));
        }
        Ok(())
    }

    /// Power-weighted average of a per-actor factor
    fn weighted<F: Fn(&CombatActor) -> f64>(&self, factor: F) -> f64 {
        let total = self.total_power();
        if total <= 0.0 {
            let sum: f64 = self.actors.iter().map(&factor).sum();
            return sum / self.actors.len() as f64;
        }
        self.actors.iter().map(|a| factor(a) * a.power).sum::<f64>() / total
    }
}

/// The multiplier chain as applied, in order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Multipliers {
    pub advantage: f64,
    pub defense: f64,
    pub decay: f64,
    pub random: f64,
    /// Product of the above after capping
    pub compound: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatOutcome {
    pub damage_dealt: f64,
    pub victory: bool,
    pub experience: f64,
    pub points_awarded: u32,
    pub attacker_final_power: f64,
    pub defender_final_power: f64,
    pub multipliers: Multipliers,
}

/// A queued exchange for batch resolution
#[derive(Debug, Clone)]
pub struct Exchange {
    pub attacker: CombatSquad,
    pub defender: CombatSquad,
    pub tile: HexCoord,
}

#[derive(Debug, Clone, Default)]
pub struct CombatResolver {
    config: CombatConfig,
    table: ElementAdvantageTable,
    decay: DecayCalculator,
}

impl CombatResolver {
    pub fn new(config: CombatConfig, decay: DecayConfig) -> Self {
        Self {
            table: ElementAdvantageTable::from_config(&config),
            decay: DecayCalculator::new(decay),
            config,
        }
    }

    pub fn table(&self) -> &ElementAdvantageTable {
        &self.table
    }

    pub fn decay(&self) -> &DecayCalculator {
        &self.decay
    }

    /// Resolve one exchange over `tile`.
    ///
    /// The defending side holds the tile and gets its defense bonus; the
    /// attacking side's decay includes its distance to the tile.
    pub fn resolve<R: Rng + ?Sized>(
        &self,
        attacker: &CombatSquad,
        defender: &CombatSquad,
        tile: &Tile,
        now: Timestamp,
        rng: &mut R,
    ) -> Result<CombatOutcome> {
        attacker.check("attacking")?;
        defender.check("defending")?;
        if attacker.team == defender.team {
            return Err(WarError::InvalidTeamComposition(format!(
                "{} cannot fight itself",
                attacker.team
            )));
        }

        let defending_element = defender
            .lead()
            .map(|a| a.element)
            .ok_or_else(|| WarError::InvalidTeamComposition("defending side is empty".into()))?;

        let attacker_base = attacker.total_power();
        let defender_base = defender.total_power();

        let advantage = attacker.weighted(|a| self.table.multiplier(a.element, defending_element));
        let defense = 1.0 - tile.defense_bonus();
        let decay = attacker.weighted(|a| {
            self.decay
                .factors(&a.history, now, a.position, tile.coord)
                .combined()
        });
        let spread = self.config.random_spread;
        let random = if spread > 0.0 {
            rng.gen_range((1.0 - spread)..=(1.0 + spread))
        } else {
            1.0
        };
        let compound =
            (advantage * defense * decay * random).min(self.config.max_compound_multiplier);

        let base_damage = (attacker_base - defender_base).max(self.config.min_damage);
        let damage_dealt = (base_damage * compound).max(self.config.min_damage);

        let defender_decay = defender.weighted(|a| self.decay.energy_decay(&a.history, now));
        let attacker_final_power = attacker_base * compound;
        let defender_final_power = defender_base * defender_decay * (1.0 + tile.defense_bonus());
        let victory = attacker_final_power > defender_final_power;

        let outcome_multiplier = if victory {
            self.config.victory_experience_multiplier
        } else {
            self.config.defeat_experience_multiplier
        };
        let experience =
            (tile.point_value() as f64 * self.config.experience_ratio * outcome_multiplier).max(1.0);

        tracing::debug!(
            attacker = %attacker.team,
            defender = %defender.team,
            tile = ?tile.coord,
            damage_dealt,
            victory,
            compound,
            "exchange resolved"
        );

        Ok(CombatOutcome {
            damage_dealt,
            victory,
            experience,
            points_awarded: if victory { tile.point_value() } else { 0 },
            attacker_final_power,
            defender_final_power,
            multipliers: Multipliers {
                advantage,
                defense,
                decay,
                random,
                compound,
            },
        })
    }

    /// Resolve independent exchanges, in parallel above the configured
    /// threshold. Exchange `i` draws from its own stream seeded by
    /// `(seed, i)`, so results do not depend on scheduling.
    pub fn resolve_batch(
        &self,
        grid: &HexGrid,
        exchanges: &[Exchange],
        now: Timestamp,
        seed: u64,
    ) -> Vec<Result<CombatOutcome>> {
        let run = |(i, exchange): (usize, &Exchange)| {
            let tile = grid.tile(exchange.tile)?;
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            rng.set_stream(i as u64);
            self.resolve(&exchange.attacker, &exchange.defender, tile, now, &mut rng)
        };

        if exchanges.len() >= self.config.parallel_threshold {
            exchanges.par_iter().enumerate().map(run).collect()
        } else {
            exchanges.iter().enumerate().map(run).collect()
        }
    }

    /// Reward scaling for a kill streak, capped
    pub fn kill_streak_bonus(&self, base: f64, streak: u32) -> f64 {
        let factor = (1.0 + self.config.kill_streak_step * streak as f64)
            .min(self.config.kill_streak_cap);
        base * factor
    }

    /// Score for the `streak`-th consecutive kill; repeated kills are worth less
    pub fn kill_score(&self, streak: u32) -> f64 {
        let exponent = streak.saturating_sub(1) as i32;
        self.config.kill_score_base * self.config.kill_score_falloff.powi(exponent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::TileKind;

    const NOW: Timestamp = 1_700_000_000_000;

    fn squad(team: u32, powers: &[f64], element: Element) -> CombatSquad {
        CombatSquad::new(
            TeamId::new(team),
            powers
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    CombatActor::new(PlayerId::new(team as u64 * 100 + i as u64), TeamId::new(team), *p, element)
                })
                .collect(),
        )
    }

    fn tile(kind: TileKind) -> Tile {
        Tile::new(HexCoord::ORIGIN, kind)
    }

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn test_empty_side_rejected() {
        let resolver = CombatResolver::default();
        let empty = CombatSquad::new(TeamId::new(1), vec![]);
        let other = squad(2, &[100.0], Element::Fire);
        let t = tile(TileKind::CopperVein);
        assert!(matches!(
            resolver.resolve(&empty, &other, &t, NOW, &mut rng()),
            Err(WarError::InvalidTeamComposition(_))
        ));
        assert!(matches!(
            resolver.resolve(&other, &empty, &t, NOW, &mut rng()),
            Err(WarError::InvalidTeamComposition(_))
        ));
    }

    #[test]
    fn test_stronger_attacker_wins_gold_vein() {
        let resolver = CombatResolver::default();
        let attacker = squad(1, &[1000.0, 800.0], Element::Metal);
        let defender = squad(2, &[500.0], Element::Wood);
        let t = tile(TileKind::GoldVein);
        let outcome = resolver
            .resolve(&attacker, &defender, &t, NOW, &mut rng())
            .unwrap();
        assert!(outcome.victory);
        assert!(outcome.damage_dealt > 0.0);
        assert_eq!(outcome.points_awarded, t.point_value());
        assert!(outcome.experience > t.point_value() as f64 * 0.1);
        assert_eq!(outcome.multipliers.advantage, 1.3);
    }

    #[test]
    fn test_damage_floor_when_outmatched() {
        let resolver = CombatResolver::default();
        let attacker = squad(1, &[10.0], Element::Wood);
        let defender = squad(2, &[10_000.0], Element::Metal);
        let outcome = resolver
            .resolve(&attacker, &defender, &tile(TileKind::CopperVein), NOW, &mut rng())
            .unwrap();
        assert!(!outcome.victory);
        assert!(outcome.damage_dealt >= 1.0);
        assert_eq!(outcome.points_awarded, 0);
    }

    #[test]
    fn test_fortress_strengthens_defender() {
        let resolver = CombatResolver::default();
        let attacker = squad(1, &[1000.0], Element::Earth);
        let defender = squad(2, &[900.0], Element::Earth);
        let plain = resolver
            .resolve(&attacker, &defender, &tile(TileKind::CopperVein), NOW, &mut rng())
            .unwrap();
        let fortress = resolver
            .resolve(&attacker, &defender, &tile(TileKind::Fortress), NOW, &mut rng())
            .unwrap();
        assert!(fortress.defender_final_power > plain.defender_final_power);
        assert!(fortress.multipliers.defense < plain.multipliers.defense);
    }

    #[test]
    fn test_compound_multiplier_capped() {
        let config = CombatConfig {
            counter_multiplier: 9.0,
            random_spread: 0.5,
            max_compound_multiplier: 10.0,
            ..CombatConfig::default()
        };
        let resolver = CombatResolver::new(config, DecayConfig::default());
        let attacker = squad(1, &[1000.0], Element::Metal);
        let defender = squad(2, &[1.0], Element::Wood);
        for seed in 0..20 {
            let mut r = ChaCha8Rng::seed_from_u64(seed);
            let outcome = resolver
                .resolve(&attacker, &defender, &tile(TileKind::CopperVein), NOW, &mut r)
                .unwrap();
            assert!(outcome.multipliers.compound <= 10.0);
        }
    }

    #[test]
    fn test_same_seed_same_outcome() {
        let resolver = CombatResolver::default();
        let attacker = squad(1, &[1000.0], Element::Fire);
        let defender = squad(2, &[950.0], Element::Water);
        let t = tile(TileKind::SilverVein);
        let a = resolver.resolve(&attacker, &defender, &t, NOW, &mut rng()).unwrap();
        let b = resolver.resolve(&attacker, &defender, &t, NOW, &mut rng()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_batch_matches_regardless_of_threshold() {
        let grid = HexGrid::standard(&Default::default());
        let exchanges: Vec<_> = (0..8)
            .map(|i| Exchange {
                attacker: squad(1, &[1000.0 + i as f64], Element::Metal),
                defender: squad(2, &[900.0], Element::Earth),
                tile: HexCoord::ORIGIN,
            })
            .collect();
        let serial = CombatResolver::default();
        let parallel = CombatResolver::new(
            CombatConfig {
                parallel_threshold: 1,
                ..CombatConfig::default()
            },
            DecayConfig::default(),
        );
        let a: Vec<_> = serial
            .resolve_batch(&grid, &exchanges, NOW, 7)
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        let b: Vec<_> = parallel
            .resolve_batch(&grid, &exchanges, NOW, 7)
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_kill_streak_and_score() {
        let resolver = CombatResolver::default();
        assert!(resolver.kill_streak_bonus(100.0, 5) > 150.0);
        assert_eq!(resolver.kill_streak_bonus(100.0, 50), 200.0);
        assert_eq!(resolver.kill_score(1), 5.0);
        assert!((resolver.kill_score(3) - 3.2).abs() < 1e-9);
    }
}
