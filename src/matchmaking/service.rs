//! Matchmaking pool: enrolment, qualification and battlefield assembly
//!
//! The pool sits behind one mutex held for the whole of each selection, so
//! a team can never be placed on two battlefields.

use std::sync::Mutex;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::core::config::MatchmakingConfig;
use crate::core::error::{recover, Result, WarError};
use crate::core::types::{TeamId, Timestamp};
use crate::matchmaking::rating::{BandRater, TeamProfile, TeamRater, TeamRating};

#[derive(Debug, Clone)]
struct Enrollment {
    profile: TeamProfile,
    rating: TeamRating,
    enrolled_at: Timestamp,
}

/// Result of partitioning the whole pool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchFormation {
    pub battlefields: Vec<Vec<TeamId>>,
    /// Teams left in the pool for the next round
    pub unmatched: Vec<TeamId>,
}

pub struct MatchmakingService<R: TeamRater = BandRater> {
    config: MatchmakingConfig,
    rater: R,
    pool: Mutex<Vec<Enrollment>>,
}

impl MatchmakingService<BandRater> {
    pub fn with_bands(config: MatchmakingConfig) -> Self {
        Self::new(config.clone(), BandRater::new(config))
    }
}

impl<R: TeamRater> MatchmakingService<R> {
    pub fn new(config: MatchmakingConfig, rater: R) -> Self {
        Self {
            config,
            rater,
            pool: Mutex::new(Vec::new()),
        }
    }

    pub fn rate_team(&self, team: &TeamProfile) -> TeamRating {
        self.rater.rate(team)
    }

    /// Every unmet entry requirement, empty when the team qualifies
    pub fn qualification_failures(&self, team: &TeamProfile) -> Vec<String> {
        let c = &self.config;
        let mut reasons = Vec::new();
        if team.member_count < c.min_members {
            reasons.push(format!(
                "needs {} members, has {}",
                c.min_members, team.member_count
            ));
        }
        if team.level < c.min_level {
            reasons.push(format!("needs level {}, is {}", c.min_level, team.level));
        }
        if team.activity < c.min_activity {
            reasons.push(format!(
                "needs {}% activity, has {}%",
                c.min_activity, team.activity
            ));
        }
        if team.fee_paid < c.participation_fee {
            reasons.push(format!(
                "needs a {} fee, paid {}",
                c.participation_fee, team.fee_paid
            ));
        }
        reasons
    }

    pub fn check_qualification(&self, team: &TeamProfile) -> Result<()> {
        let reasons = self.qualification_failures(team);
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(WarError::NotQualified {
                team: team.id,
                reasons,
            })
        }
    }

    /// True when every pair of teams is within the band and size tolerances
    pub fn validate_match_balance(&self, teams: &[TeamProfile]) -> bool {
        let rated: Vec<(&TeamProfile, TeamRating)> =
            teams.iter().map(|t| (t, self.rater.rate(t))).collect();
        rated.iter().enumerate().all(|(i, a)| {
            rated
                .iter()
                .skip(i + 1)
                .all(|b| self.within_tolerance((a.0, &a.1), (b.0, &b.1)))
        })
    }

    fn within_tolerance(&self, a: (&TeamProfile, &TeamRating), b: (&TeamProfile, &TeamRating)) -> bool {
        let c = &self.config;
        a.1.power_band.abs_diff(b.1.power_band) <= c.max_power_gap
            && a.1.spending_band.abs_diff(b.1.spending_band) <= c.max_spending_gap
            && a.0.member_count.abs_diff(b.0.member_count) <= c.max_member_gap
    }

    /// Grow a group from `seed`, taking candidates in order as long as each
    /// stays within tolerance of everyone already in. Stops at `size`.
    fn assemble<'a>(
        &self,
        seed: &'a Enrollment,
        candidates: impl IntoIterator<Item = &'a Enrollment>,
        size: usize,
    ) -> Vec<&'a Enrollment> {
        let mut group = vec![seed];
        for candidate in candidates {
            if group.len() == size {
                break;
            }
            let fits = group.iter().all(|member| {
                self.within_tolerance(
                    (&member.profile, &member.rating),
                    (&candidate.profile, &candidate.rating),
                )
            });
            if fits {
                group.push(candidate);
            }
        }
        group
    }

    fn expire(&self, pool: &mut Vec<Enrollment>, now: Timestamp) {
        let before = pool.len();
        pool.retain(|e| now - e.enrolled_at <= self.config.window_ms);
        let dropped = before - pool.len();
        if dropped > 0 {
            tracing::debug!(dropped, "expired matchmaking enrolments");
        }
    }

    pub fn enroll(&self, team: TeamProfile, now: Timestamp) -> Result<TeamRating> {
        self.check_qualification(&team)?;
        let mut pool = recover(self.pool.lock());
        self.expire(&mut pool, now);
        if pool.iter().any(|e| e.profile.id == team.id) {
            return Err(WarError::DuplicateTeam(team.id));
        }
        let rating = self.rater.rate(&team);
        tracing::info!(team = %team.id, overall = rating.overall, "team enrolled");
        pool.push(Enrollment {
            profile: team,
            rating,
            enrolled_at: now,
        });
        Ok(rating)
    }

    pub fn withdraw(&self, team: TeamId) -> Result<()> {
        let mut pool = recover(self.pool.lock());
        let before = pool.len();
        pool.retain(|e| e.profile.id != team);
        if pool.len() == before {
            return Err(WarError::UnknownTeam(team));
        }
        Ok(())
    }

    pub fn pool_size(&self, now: Timestamp) -> usize {
        let mut pool = recover(self.pool.lock());
        self.expire(&mut pool, now);
        pool.len()
    }

    /// Pick a full battlefield around `team`: the requester plus the teams
    /// nearest to it in rating (then raw power, then id) that keep every
    /// pair within the balance tolerances. The chosen teams leave the pool;
    /// on failure the pool is untouched.
    pub fn find_balanced_match(&self, team: TeamId, now: Timestamp) -> Result<Vec<TeamId>> {
        let mut pool = recover(self.pool.lock());
        self.expire(&mut pool, now);

        let requester = pool
            .iter()
            .find(|e| e.profile.id == team)
            .ok_or(WarError::UnknownTeam(team))?;
        let required = self.config.battlefield_size;

        let mut candidates: Vec<&Enrollment> =
            pool.iter().filter(|e| e.profile.id != team).collect();
        candidates.sort_by_key(|e| {
            (
                OrderedFloat((e.rating.overall - requester.rating.overall).abs()),
                e.profile.power.abs_diff(requester.profile.power),
                e.profile.id,
            )
        });

        let selected: Vec<TeamId> = self
            .assemble(requester, candidates, required)
            .into_iter()
            .map(|e| e.profile.id)
            .collect();
        if selected.len() < required {
            tracing::info!(
                team = %team,
                found = selected.len(),
                pool = pool.len(),
                required,
                "not enough balanced teams"
            );
            return Err(WarError::InsufficientParticipants {
                found: selected.len(),
                required,
            });
        }
        pool.retain(|e| !selected.contains(&e.profile.id));

        tracing::info!(team = %team, size = selected.len(), "battlefield matched");
        Ok(selected)
    }

    /// Split the whole pool into full, balanced battlefields of similar
    /// rating. Teams that fit no battlefield stay enrolled.
    pub fn form_battlefields(&self, now: Timestamp) -> MatchFormation {
        let mut pool = recover(self.pool.lock());
        self.expire(&mut pool, now);

        pool.sort_by_key(|e| {
            (
                std::cmp::Reverse(OrderedFloat(e.rating.overall)),
                std::cmp::Reverse(e.profile.power),
                e.profile.id,
            )
        });

        let size = self.config.battlefield_size;
        let mut remaining: Vec<Enrollment> = pool.drain(..).collect();
        let mut battlefields = Vec::new();
        while let Some((seed, rest)) = remaining.split_first() {
            let group: Vec<TeamId> = self
                .assemble(seed, rest, size)
                .into_iter()
                .map(|e| e.profile.id)
                .collect();
            if group.len() == size {
                remaining.retain(|e| !group.contains(&e.profile.id));
                battlefields.push(group);
            } else {
                pool.push(remaining.remove(0));
            }
        }
        let unmatched = pool.iter().map(|e| e.profile.id).collect();

        tracing::info!(
            battlefields = battlefields.len(),
            leftover = pool.len(),
            "pool partitioned"
        );
        MatchFormation {
            battlefields,
            unmatched,
        }
    }
}
