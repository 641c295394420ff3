//! Team rating bands
//!
//! Teams are bucketed on three axes: combat power (1-5), monthly spending
//! (1-3) and activity (1-3). The overall rating is the mean of the bands.

use serde::{Deserialize, Serialize};

use crate::core::config::MatchmakingConfig;
use crate::core::types::TeamId;

/// What matchmaking knows about a team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamProfile {
    pub id: TeamId,
    pub name: String,
    pub member_count: u32,
    pub level: u32,
    /// Summed combat power of all members
    pub power: u64,
    pub monthly_spending: f64,
    /// Share of members active in the last week, as a percentage
    pub activity: f64,
    /// Participation fee the team has put up
    pub fee_paid: u64,
    #[serde(default)]
    pub battles_fought: u32,
}

impl TeamProfile {
    pub fn new(id: TeamId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            member_count: 0,
            level: 1,
            power: 0,
            monthly_spending: 0.0,
            activity: 0.0,
            fee_paid: 0,
            battles_fought: 0,
        }
    }

    /// A sect in its first battle gets the newbie main-hall shield
    pub fn is_newcomer(&self) -> bool {
        self.battles_fought == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamRating {
    pub team: TeamId,
    pub power_band: u8,
    pub spending_band: u8,
    pub activity_band: u8,
    pub overall: f64,
}

pub trait TeamRater: Send + Sync {
    fn rate(&self, team: &TeamProfile) -> TeamRating;
}

/// Rates teams by the configured band thresholds
#[derive(Debug, Clone, Default)]
pub struct BandRater {
    config: MatchmakingConfig,
}

impl BandRater {
    pub fn new(config: MatchmakingConfig) -> Self {
        Self { config }
    }

    pub fn power_band(&self, power: u64) -> u8 {
        let below = self
            .config
            .power_bands
            .iter()
            .take_while(|bound| power >= **bound)
            .count();
        below as u8 + 1
    }

    pub fn spending_band(&self, spending: f64) -> u8 {
        let [low, high] = self.config.spending_bands;
        if spending < low {
            1
        } else if spending <= high {
            2
        } else {
            3
        }
    }

    pub fn activity_band(&self, activity: f64) -> u8 {
        let [low, high] = self.config.activity_bands;
        if activity < low {
            1
        } else if activity <= high {
            2
        } else {
            3
        }
    }
}

impl TeamRater for BandRater {
    fn rate(&self, team: &TeamProfile) -> TeamRating {
        let power_band = self.power_band(team.power);
        let spending_band = self.spending_band(team.monthly_spending);
        let activity_band = self.activity_band(team.activity);
        TeamRating {
            team: team.id,
            power_band,
            spending_band,
            activity_band,
            overall: (power_band + spending_band + activity_band) as f64 / 3.0,
        }
    }
}
