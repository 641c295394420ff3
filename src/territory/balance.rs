//! Comeback and anti-snowball rules
//!
//! Trailing teams earn a bonus on tick points and move faster by the same
//! fraction (the catch-up aura); the leader regenerates more slowly, and a
//! dominant leader also earns less experience.

use serde::{Deserialize, Serialize};

use crate::core::config::ScoringConfig;
use crate::core::types::TeamId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CatchUpEffect {
    pub team: TeamId,
    /// Shortfall relative to the leader, 0.0 - 1.0
    pub deficit: f64,
    /// Extra fraction applied to tick points
    pub bonus: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeaderPenalty {
    pub team: TeamId,
    /// Multiplier on mana and resource regeneration
    pub regen_multiplier: f64,
    pub experience_multiplier: f64,
    /// Leader score is at least `dominant_lead_ratio` times the average opponent
    pub dominant: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BalanceRules {
    config: ScoringConfig,
}

impl BalanceRules {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Bonus for a team at `score` when the leader has `leader_score`
    pub fn catch_up_bonus(&self, leader_score: f64, score: f64) -> f64 {
        if leader_score <= 0.0 {
            return 0.0;
        }
        let deficit = ((leader_score - score) / leader_score).clamp(0.0, 1.0);
        let bonus = if deficit >= self.config.catch_up_major_deficit {
            self.config.catch_up_major_bonus
        } else if deficit >= self.config.catch_up_minor_deficit {
            self.config.catch_up_minor_bonus
        } else {
            0.0
        };
        bonus.min(self.config.catch_up_cap)
    }

    pub fn catch_up_effects(&self, totals: &[(TeamId, f64)]) -> Vec<CatchUpEffect> {
        let leader = totals.iter().map(|(_, s)| *s).fold(0.0, f64::max);
        totals
            .iter()
            .map(|(team, score)| CatchUpEffect {
                team: *team,
                deficit: if leader > 0.0 {
                    ((leader - score) / leader).clamp(0.0, 1.0)
                } else {
                    0.0
                },
                bonus: self.catch_up_bonus(leader, *score),
            })
            .collect()
    }

    /// Movement speed multiplier from the catch-up aura
    pub fn speed_multiplier(&self, team: TeamId, totals: &[(TeamId, f64)]) -> f64 {
        let leader = totals.iter().map(|(_, s)| *s).fold(0.0, f64::max);
        totals
            .iter()
            .find(|(t, _)| *t == team)
            .map_or(1.0, |(_, score)| 1.0 + self.catch_up_bonus(leader, *score))
    }

    /// Penalty for the sole leader, if there is one with a positive score
    pub fn leader_penalty(&self, totals: &[(TeamId, f64)]) -> Option<LeaderPenalty> {
        let (leader, top) = totals
            .iter()
            .copied()
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))?;
        if top <= 0.0 || totals.iter().filter(|(_, s)| *s == top).count() > 1 {
            return None;
        }

        let opponents: Vec<f64> = totals
            .iter()
            .filter(|(t, _)| *t != leader)
            .map(|(_, s)| *s)
            .collect();
        let average = if opponents.is_empty() {
            0.0
        } else {
            opponents.iter().sum::<f64>() / opponents.len() as f64
        };
        let dominant = average <= 0.0 || top / average >= self.config.dominant_lead_ratio;

        Some(if dominant {
            LeaderPenalty {
                team: leader,
                regen_multiplier: 1.0 - self.config.dominant_regen_penalty,
                experience_multiplier: self.config.dominant_experience_multiplier,
                dominant,
            }
        } else {
            LeaderPenalty {
                team: leader,
                regen_multiplier: 1.0 - self.config.leader_regen_penalty,
                experience_multiplier: 1.0,
                dominant,
            }
        })
    }

    /// Regeneration multiplier for any team: only the leader is penalized
    pub fn regen_multiplier(&self, team: TeamId, totals: &[(TeamId, f64)]) -> f64 {
        match self.leader_penalty(totals) {
            Some(p) if p.team == team => p.regen_multiplier,
            _ => 1.0,
        }
    }
}
