//! Decay multipliers applied to combat power
//!
//! Three independent axes, each clamped to its configured floor:
//! - energy: recent battles inside a rolling window drain power
//! - distance: fighting far from where a player stands costs power
//! - resource pool: a depleted pool scales power down in steps

use serde::{Deserialize, Serialize};

use crate::core::config::DecayConfig;
use crate::core::error::{Result, WarError};
use crate::core::types::Timestamp;
use crate::grid::HexCoord;

/// One past battle in a player's history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleRecord {
    pub at: Timestamp,
}

impl BattleRecord {
    pub fn new(at: Timestamp) -> Self {
        Self { at }
    }
}

/// Per-axis breakdown of a composite power calculation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayFactors {
    pub energy: f64,
    pub distance: f64,
}

impl DecayFactors {
    pub fn combined(&self) -> f64 {
        self.energy * self.distance
    }
}

#[derive(Debug, Clone, Default)]
pub struct DecayCalculator {
    config: DecayConfig,
}

impl DecayCalculator {
    pub fn new(config: DecayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecayConfig {
        &self.config
    }

    fn in_window(&self, history: &[BattleRecord], now: Timestamp) -> Vec<Timestamp> {
        let mut recent: Vec<Timestamp> = history
            .iter()
            .map(|b| b.at)
            .filter(|at| *at <= now && now - *at < self.config.energy_window_ms)
            .collect();
        recent.sort_unstable();
        recent
    }

    /// Energy lost to recent battles; newer battles weigh more
    pub fn recency_penalty(&self, history: &[BattleRecord], now: Timestamp) -> f64 {
        let window = self.config.energy_window_ms as f64;
        self.in_window(history, now)
            .into_iter()
            .map(|at| {
                let freshness = 1.0 - (now - at) as f64 / window;
                self.config.per_battle_penalty * (0.5 + 0.5 * freshness)
            })
            .sum()
    }

    /// Energy lost to back-to-back battles
    pub fn fatigue_penalty(&self, history: &[BattleRecord], now: Timestamp) -> f64 {
        let recent = self.in_window(history, now);
        let consecutive = recent
            .windows(2)
            .filter(|w| w[1] - w[0] < self.config.consecutive_gap_ms)
            .count();
        consecutive as f64 * self.config.consecutive_penalty
    }

    /// Combined energy/fatigue multiplier in `[energy_floor, 1.0]`
    pub fn energy_decay(&self, history: &[BattleRecord], now: Timestamp) -> f64 {
        let penalty = self.recency_penalty(history, now) + self.fatigue_penalty(history, now);
        (1.0 - penalty).clamp(self.config.energy_floor, 1.0)
    }

    /// Multiplier in `[distance_floor, 1.0]`; 1.0 within the free range
    pub fn distance_decay(&self, from: HexCoord, to: HexCoord) -> f64 {
        let distance = from.distance(&to);
        if distance <= self.config.distance_free_range {
            return 1.0;
        }
        let excess = (distance - self.config.distance_free_range) as f64;
        (1.0 - self.config.distance_falloff * excess).max(self.config.distance_floor)
    }

    /// Resource-pool coefficient for a pool level in `[0, 100]`.
    ///
    /// An empty pool is pinned to the floor; otherwise
    /// `max(floor, base^floor((100 - r) / step))`.
    pub fn resource_coefficient(&self, resource: f64) -> Result<f64> {
        if !resource.is_finite() {
            return Err(WarError::InvalidResourceValue(format!(
                "{resource} is not a finite number"
            )));
        }
        if !(0.0..=100.0).contains(&resource) {
            return Err(WarError::InvalidResourceValue(format!(
                "{resource} outside 0-100"
            )));
        }
        if resource == 0.0 {
            return Ok(self.config.resource_floor);
        }
        let steps = ((100.0 - resource) / self.config.resource_step).floor();
        Ok(self
            .config
            .resource_base
            .powf(steps)
            .max(self.config.resource_floor))
    }

    pub fn factors(
        &self,
        history: &[BattleRecord],
        now: Timestamp,
        from: HexCoord,
        to: HexCoord,
    ) -> DecayFactors {
        DecayFactors {
            energy: self.energy_decay(history, now),
            distance: self.distance_decay(from, to),
        }
    }

    /// Base power scaled by energy and distance decay
    pub fn composite_power(
        &self,
        base: f64,
        history: &[BattleRecord],
        now: Timestamp,
        from: HexCoord,
        to: HexCoord,
    ) -> f64 {
        base * self.factors(history, now, from, to).combined()
    }
}
