//! Time-weighted team scores
//!
//! Scores accrue on a fixed tick grid anchored at battle start. Tick `k`
//! credits the owners of every tile as of boundary `start + k * interval`,
//! and each boundary is processed exactly once however often or late
//! `tick_scores` is called.

use std::sync::Mutex;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::config::ScoringConfig;
use crate::core::error::{recover, Result, WarError};
use crate::core::types::{PlayerId, TeamId, Timestamp, MS_PER_MINUTE};
use crate::territory::balance::BalanceRules;
use crate::territory::control::ControlPointEngine;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamScore {
    pub team: TeamId,
    pub total: f64,
    pub tiles_held: usize,
    pub contributions: AHashMap<PlayerId, f64>,
}

/// Points credited to one team by one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickAward {
    pub team: TeamId,
    pub base: f64,
    pub catch_up_bonus: f64,
    pub points: f64,
}

/// One processed tick boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreTick {
    pub index: i64,
    pub at: Timestamp,
    pub end_game: bool,
    pub awards: Vec<TickAward>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub rank: usize,
    pub team: TeamId,
    pub score: f64,
    pub tiles_held: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingPage {
    pub entries: Vec<RankingEntry>,
    /// 1-based
    pub page: usize,
    pub total_pages: usize,
    pub total_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberContribution {
    pub rank: usize,
    pub player: PlayerId,
    pub points: f64,
}

pub struct ScoreLedger {
    config: ScoringConfig,
    balance: BalanceRules,
    start: Timestamp,
    end: Timestamp,
    teams: AHashMap<TeamId, Mutex<TeamScore>>,
    /// Index of the last processed tick; also serializes whole ticks
    last_tick: Mutex<i64>,
}

impl ScoreLedger {
    pub fn new(config: ScoringConfig, teams: &[TeamId], start: Timestamp, end: Timestamp) -> Self {
        let teams = teams
            .iter()
            .map(|team| {
                let score = TeamScore {
                    team: *team,
                    ..Default::default()
                };
                (*team, Mutex::new(score))
            })
            .collect();
        Self {
            balance: BalanceRules::new(config.clone()),
            config,
            start,
            end,
            teams,
            last_tick: Mutex::new(0),
        }
    }

    pub fn balance(&self) -> &BalanceRules {
        &self.balance
    }

    fn team(&self, team: TeamId) -> Result<&Mutex<TeamScore>> {
        self.teams.get(&team).ok_or(WarError::UnknownTeam(team))
    }

    /// Move the tick grid; used when a battlefield starts later than planned
    pub fn reschedule(&mut self, start: Timestamp, end: Timestamp) {
        self.start = start;
        self.end = end;
    }

    fn is_end_game(&self, boundary: Timestamp) -> bool {
        boundary - self.config.tick_interval_ms >= self.end - self.config.end_game_window_ms
    }

    /// Process every tick boundary up to `now` that has not been processed.
    ///
    /// Returns the ticks applied by this call; an empty list means `now`
    /// was already covered.
    pub fn tick_scores(&self, control: &ControlPointEngine, now: Timestamp) -> Vec<ScoreTick> {
        let mut last = recover(self.last_tick.lock());
        let interval = self.config.tick_interval_ms;
        let horizon = now.min(self.end);
        if horizon < self.start {
            return Vec::new();
        }
        let due = (horizon - self.start) / interval;

        let mut processed = Vec::new();
        for index in (*last + 1)..=due {
            let at = self.start + index * interval;
            processed.push(self.apply_tick(control, index, at));
            control.prune_history(at);
            *last = index;
        }
        processed
    }

    fn apply_tick(&self, control: &ControlPointEngine, index: i64, at: Timestamp) -> ScoreTick {
        let minute_fraction = self.config.tick_interval_ms as f64 / MS_PER_MINUTE as f64;
        let end_game = self.is_end_game(at);
        let multiplier = if end_game {
            self.config.end_game_multiplier
        } else {
            1.0
        };

        let mut base: AHashMap<TeamId, (f64, usize)> = AHashMap::new();
        for (_, team, value) in control.holdings_at(at) {
            let entry = base.entry(team).or_insert((0.0, 0));
            entry.0 += value as f64;
            entry.1 += 1;
        }

        let totals = self.totals();
        let leader = totals.iter().map(|(_, s)| *s).fold(0.0, f64::max);

        let mut awards = Vec::new();
        for (team, slot) in &self.teams {
            let (value, held) = base.get(team).copied().unwrap_or((0.0, 0));
            let mut score = recover(slot.lock());
            score.tiles_held = held;
            if value <= 0.0 {
                continue;
            }
            let bonus = self.balance.catch_up_bonus(leader, score.total);
            let tick_base = value * minute_fraction * multiplier;
            let points = tick_base * (1.0 + bonus);
            score.total += points;
            awards.push(TickAward {
                team: *team,
                base: tick_base,
                catch_up_bonus: bonus,
                points,
            });
        }
        awards.sort_by_key(|a| a.team);

        for team in base.keys().filter(|t| !self.teams.contains_key(t)) {
            tracing::warn!(team = %team, "tile held by a team outside this ledger");
        }
        tracing::debug!(index, at, end_game, awarded = awards.len(), "score tick");

        ScoreTick {
            index,
            at,
            end_game,
            awards,
        }
    }

    /// Credit one-off points (captures, kills) to a team and optionally a member
    pub fn add_points(&self, team: TeamId, points: f64, player: Option<PlayerId>) -> Result<f64> {
        let mut score = recover(self.team(team)?.lock());
        score.total += points;
        if let Some(player) = player {
            *score.contributions.entry(player).or_insert(0.0) += points;
        }
        Ok(score.total)
    }

    pub fn total(&self, team: TeamId) -> Result<f64> {
        Ok(recover(self.team(team)?.lock()).total)
    }

    /// Current totals, ordered by team id
    pub fn totals(&self) -> Vec<(TeamId, f64)> {
        let mut totals: Vec<(TeamId, f64)> = self
            .teams
            .iter()
            .map(|(team, slot)| (*team, recover(slot.lock()).total))
            .collect();
        totals.sort_by_key(|(team, _)| *team);
        totals
    }

    pub fn scores(&self) -> Vec<TeamScore> {
        let mut scores: Vec<TeamScore> = self
            .teams
            .values()
            .map(|slot| recover(slot.lock()).clone())
            .collect();
        scores.sort_by_key(|s| s.team);
        scores
    }

    /// Teams by score (ties by team id), one page at a time
    pub fn rankings(&self, page: usize, page_size: usize) -> RankingPage {
        let page_size = page_size.max(1);
        let page = page.max(1);
        let mut scores = self.scores();
        scores.sort_by(|a, b| b.total.total_cmp(&a.total).then(a.team.cmp(&b.team)));

        let total_entries = scores.len();
        let total_pages = total_entries.div_ceil(page_size).max(1);
        let entries = scores
            .into_iter()
            .enumerate()
            .skip((page - 1) * page_size)
            .take(page_size)
            .map(|(i, s)| RankingEntry {
                rank: i + 1,
                team: s.team,
                score: s.total,
                tiles_held: s.tiles_held,
            })
            .collect();

        RankingPage {
            entries,
            page,
            total_pages,
            total_entries,
        }
    }

    pub fn member_contributions(&self, team: TeamId) -> Result<Vec<MemberContribution>> {
        let score = recover(self.team(team)?.lock());
        let mut members: Vec<(PlayerId, f64)> =
            score.contributions.iter().map(|(p, v)| (*p, *v)).collect();
        members.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(members
            .into_iter()
            .enumerate()
            .map(|(i, (player, points))| MemberContribution {
                rank: i + 1,
                player,
                points,
            })
            .collect())
    }

    /// Zero every score and restart the tick grid
    pub fn reset(&self) {
        let mut last = recover(self.last_tick.lock());
        for slot in self.teams.values() {
            let mut score = recover(slot.lock());
            score.total = 0.0;
            score.tiles_held = 0;
            score.contributions.clear();
        }
        *last = 0;
    }
}
