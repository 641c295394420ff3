//! Violation history, threat scoring, sanctions and appeals
//!
//! Every rejected verdict is recorded with its evidence. The weighted sum of
//! a player's violations inside the rolling window is the threat score;
//! crossing a threshold imposes a timed sanction, which an approved appeal
//! lifts.

use std::sync::Mutex;

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::anticheat::verdict::{Severity, Verdict, ViolationKind};
use crate::core::config::ThreatConfig;
use crate::core::error::{recover, Result, WarError};
use crate::core::types::{PlayerId, Timestamp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub id: Uuid,
    pub player: PlayerId,
    pub kind: ViolationKind,
    pub severity: Severity,
    pub evidence: serde_json::Value,
    pub at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThreatLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SanctionKind {
    Suspension,
    Ban,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sanction {
    pub player: PlayerId,
    pub kind: SanctionKind,
    pub imposed_at: Timestamp,
    pub until: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatAssessment {
    pub player: PlayerId,
    pub score: u32,
    pub level: ThreatLevel,
    pub sanction: Option<Sanction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppealStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appeal {
    pub id: Uuid,
    pub player: PlayerId,
    pub reason: String,
    pub submitted_at: Timestamp,
    pub status: AppealStatus,
    pub resolved_at: Option<Timestamp>,
    pub note: Option<String>,
}

#[derive(Debug, Default)]
struct TrackerState {
    violations: AHashMap<PlayerId, Vec<ViolationRecord>>,
    sanctions: AHashMap<PlayerId, Sanction>,
    appeals: AHashMap<Uuid, Appeal>,
}

pub struct ThreatTracker {
    config: ThreatConfig,
    state: Mutex<TrackerState>,
}

impl ThreatTracker {
    pub fn new(config: ThreatConfig) -> Self {
        Self {
            config,
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn weight(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Low => self.config.low_weight,
            Severity::Medium => self.config.medium_weight,
            Severity::High => self.config.high_weight,
            Severity::Critical => self.config.critical_weight,
        }
    }

    fn score_of(&self, records: &[ViolationRecord], now: Timestamp) -> u32 {
        records
            .iter()
            .filter(|r| r.at <= now && now - r.at < self.config.window_ms)
            .map(|r| self.weight(r.severity))
            .sum()
    }

    fn level_for(&self, score: u32) -> ThreatLevel {
        if score >= self.config.suspension_threshold {
            ThreatLevel::Critical
        } else if score >= self.config.high_weight {
            ThreatLevel::High
        } else if score >= self.config.medium_weight {
            ThreatLevel::Medium
        } else if score > 0 {
            ThreatLevel::Low
        } else {
            ThreatLevel::None
        }
    }

    /// Record a rejected verdict. Passing verdicts are ignored.
    pub fn record(&self, player: PlayerId, verdict: &Verdict, now: Timestamp) -> ThreatAssessment {
        let mut state = recover(self.state.lock());
        if let (false, Some(kind), Some(severity)) = (verdict.valid, verdict.reason, verdict.severity)
        {
            state
                .violations
                .entry(player)
                .or_default()
                .push(ViolationRecord {
                    id: Uuid::new_v4(),
                    player,
                    kind,
                    severity,
                    evidence: verdict.evidence.clone(),
                    at: now,
                });
        }

        let score = state
            .violations
            .get(&player)
            .map_or(0, |records| self.score_of(records, now));
        let level = self.level_for(score);

        let wanted = if score >= self.config.ban_threshold {
            Some((SanctionKind::Ban, now + self.config.ban_ms))
        } else if score >= self.config.suspension_threshold {
            Some((SanctionKind::Suspension, now + self.config.suspension_ms))
        } else {
            None
        };
        if let Some((kind, until)) = wanted {
            let current = state.sanctions.get(&player).copied();
            let extend = current.map_or(true, |s| s.until < until || s.until <= now);
            if extend {
                let sanction = Sanction {
                    player,
                    kind,
                    imposed_at: now,
                    until: current.map_or(until, |s| s.until.max(until)),
                };
                tracing::warn!(
                    player = %player,
                    score,
                    kind = ?sanction.kind,
                    until = sanction.until,
                    "sanction imposed"
                );
                state.sanctions.insert(player, sanction);
            }
        }

        let sanction = state
            .sanctions
            .get(&player)
            .filter(|s| s.until > now)
            .copied();
        ThreatAssessment {
            player,
            score,
            level,
            sanction,
        }
    }

    pub fn assess(&self, player: PlayerId, now: Timestamp) -> ThreatAssessment {
        self.record(player, &Verdict::pass(), now)
    }

    /// Active sanction, if any
    pub fn sanction(&self, player: PlayerId, now: Timestamp) -> Option<Sanction> {
        recover(self.state.lock())
            .sanctions
            .get(&player)
            .filter(|s| s.until > now)
            .copied()
    }

    pub fn history(&self, player: PlayerId) -> Vec<ViolationRecord> {
        recover(self.state.lock())
            .violations
            .get(&player)
            .cloned()
            .unwrap_or_default()
    }

    /// Players with a non-zero threat score, highest first
    pub fn watch_list(&self, now: Timestamp) -> Vec<(PlayerId, u32, ThreatLevel)> {
        let state = recover(self.state.lock());
        let mut list: Vec<_> = state
            .violations
            .iter()
            .map(|(player, records)| {
                let score = self.score_of(records, now);
                (*player, score, self.level_for(score))
            })
            .filter(|(_, score, _)| *score > 0)
            .collect();
        list.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        list
    }

    pub fn submit_appeal(
        &self,
        player: PlayerId,
        reason: impl Into<String>,
        now: Timestamp,
    ) -> Result<Uuid> {
        let mut state = recover(self.state.lock());
        if !state.sanctions.get(&player).is_some_and(|s| s.until > now) {
            return Err(WarError::InvalidAction(format!(
                "{player} has no active sanction to appeal"
            )));
        }
        if state
            .appeals
            .values()
            .any(|a| a.player == player && a.status == AppealStatus::Pending)
        {
            return Err(WarError::InvalidAction(format!(
                "{player} already has a pending appeal"
            )));
        }
        let appeal = Appeal {
            id: Uuid::new_v4(),
            player,
            reason: reason.into(),
            submitted_at: now,
            status: AppealStatus::Pending,
            resolved_at: None,
            note: None,
        };
        let id = appeal.id;
        state.appeals.insert(id, appeal);
        tracing::info!(player = %player, appeal = %id, "appeal submitted");
        Ok(id)
    }

    /// Drop what nobody can still need: violations outside the scoring
    /// window, expired sanctions and appeals resolved longer ago than the
    /// window. A player under sanction or with a pending appeal keeps every
    /// record as evidence. Returns the number of violations dropped.
    pub fn compact(&self, now: Timestamp) -> usize {
        let window = self.config.window_ms;
        let mut state = recover(self.state.lock());
        let TrackerState {
            violations,
            sanctions,
            appeals,
        } = &mut *state;

        sanctions.retain(|_, s| s.until > now);
        let held: AHashSet<PlayerId> = sanctions
            .keys()
            .copied()
            .chain(
                appeals
                    .values()
                    .filter(|a| a.status == AppealStatus::Pending)
                    .map(|a| a.player),
            )
            .collect();
        appeals.retain(|_, a| {
            a.status == AppealStatus::Pending || a.resolved_at.is_some_and(|t| now - t < window)
        });

        let mut dropped = 0;
        violations.retain(|player, records| {
            if held.contains(player) {
                return true;
            }
            let before = records.len();
            records.retain(|r| now - r.at < window);
            dropped += before - records.len();
            !records.is_empty()
        });
        if dropped > 0 {
            tracing::debug!(dropped, "stale violations dropped");
        }
        dropped
    }

    pub fn appeal(&self, id: Uuid) -> Option<Appeal> {
        recover(self.state.lock()).appeals.get(&id).cloned()
    }

    /// Decide a pending appeal. Approval lifts the sanction and clears the
    /// player's violation history.
    pub fn resolve_appeal(
        &self,
        id: Uuid,
        approved: bool,
        note: Option<String>,
        now: Timestamp,
    ) -> Result<Appeal> {
        let mut state = recover(self.state.lock());
        let appeal = state
            .appeals
            .get_mut(&id)
            .ok_or(WarError::UnknownAppeal(id))?;
        if appeal.status != AppealStatus::Pending {
            return Err(WarError::InvalidAction(format!("appeal {id} already resolved")));
        }
        appeal.status = if approved {
            AppealStatus::Approved
        } else {
            AppealStatus::Rejected
        };
        appeal.resolved_at = Some(now);
        appeal.note = note;
        let resolved = appeal.clone();

        if approved {
            state.sanctions.remove(&resolved.player);
            state.violations.remove(&resolved.player);
        }
        tracing::info!(player = %resolved.player, appeal = %id, approved, "appeal resolved");
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    const NOW: Timestamp = 1_700_000_000_000;

    fn high() -> Verdict {
        Verdict::reject(ViolationKind::ExcessiveMovementSpeed, Severity::High, Value::Null)
    }

    #[test]
    fn test_three_high_violations_suspend() {
        let tracker = ThreatTracker::new(ThreatConfig::default());
        let player = PlayerId::new(7);
        tracker.record(player, &high(), NOW);
        let second = tracker.record(player, &high(), NOW + 1_000);
        assert!(second.sanction.is_none());
        assert_eq!(second.level, ThreatLevel::High);

        let third = tracker.record(player, &high(), NOW + 2_000);
        assert_eq!(third.level, ThreatLevel::Critical);
        let sanction = third.sanction.unwrap();
        assert_eq!(sanction.kind, SanctionKind::Suspension);
        assert!(sanction.until > NOW + 2_000);
        assert!(tracker.sanction(player, NOW + 3_000).is_some());
    }

    #[test]
    fn test_sanction_expires() {
        let tracker = ThreatTracker::new(ThreatConfig::default());
        let player = PlayerId::new(7);
        for i in 0..3 {
            tracker.record(player, &high(), NOW + i);
        }
        let after = NOW + ThreatConfig::default().suspension_ms + 10;
        assert!(tracker.sanction(player, after).is_none());
    }

    #[test]
    fn test_critical_flood_bans() {
        let tracker = ThreatTracker::new(ThreatConfig::default());
        let player = PlayerId::new(7);
        let critical = Verdict::reject(ViolationKind::ResourceIntegrityViolation, Severity::Critical, Value::Null);
        let mut last = tracker.assess(player, NOW);
        for i in 0..4 {
            last = tracker.record(player, &critical, NOW + i);
        }
        assert_eq!(last.sanction.unwrap().kind, SanctionKind::Ban);
    }

    #[test]
    fn test_history_keeps_evidence() {
        let tracker = ThreatTracker::new(ThreatConfig::default());
        let player = PlayerId::new(7);
        let v = Verdict::reject(ViolationKind::WallClipping, Severity::High, serde_json::json!({"wall": 1}));
        tracker.record(player, &v, NOW);
        tracker.record(player, &Verdict::pass(), NOW + 1);
        let history = tracker.history(player);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].evidence["wall"], 1);
        assert_eq!(history[0].at, NOW);
    }

    #[test]
    fn test_appeal_lifts_sanction() {
        let tracker = ThreatTracker::new(ThreatConfig::default());
        let player = PlayerId::new(7);
        assert!(tracker.submit_appeal(player, "lag", NOW).is_err());
        for i in 0..3 {
            tracker.record(player, &high(), NOW + i);
        }
        let id = tracker.submit_appeal(player, "lag spike", NOW + 10).unwrap();
        assert!(tracker.submit_appeal(player, "again", NOW + 11).is_err());

        let appeal = tracker.resolve_appeal(id, true, None, NOW + 20).unwrap();
        assert_eq!(appeal.status, AppealStatus::Approved);
        assert!(tracker.sanction(player, NOW + 30).is_none());
        assert_eq!(tracker.assess(player, NOW + 30).score, 0);
        assert!(tracker.resolve_appeal(id, true, None, NOW + 40).is_err());
    }

    #[test]
    fn test_rejected_appeal_keeps_sanction() {
        let tracker = ThreatTracker::new(ThreatConfig::default());
        let player = PlayerId::new(7);
        for i in 0..3 {
            tracker.record(player, &high(), NOW + i);
        }
        let id = tracker.submit_appeal(player, "innocent", NOW + 10).unwrap();
        tracker
            .resolve_appeal(id, false, Some("evidence stands".into()), NOW + 20)
            .unwrap();
        assert!(tracker.sanction(player, NOW + 30).is_some());
    }

    #[test]
    fn test_unknown_appeal() {
        let tracker = ThreatTracker::new(ThreatConfig::default());
        assert!(matches!(
            tracker.resolve_appeal(Uuid::new_v4(), true, None, NOW),
            Err(WarError::UnknownAppeal(_))
        ));
    }

    #[test]
    fn test_compact_drops_stale_records_but_keeps_evidence() {
        let config = ThreatConfig::default();
        let tracker = ThreatTracker::new(config.clone());
        let medium = Verdict::reject(ViolationKind::ActionTooFrequent, Severity::Medium, Value::Null);
        let (casual, sanctioned) = (PlayerId::new(1), PlayerId::new(2));
        tracker.record(casual, &medium, NOW);
        tracker.record(casual, &medium, NOW + config.window_ms);
        for i in 0..3 {
            tracker.record(sanctioned, &high(), NOW + i);
        }
        let appeal = tracker.submit_appeal(sanctioned, "lag", NOW + 10).unwrap();

        // the sanctioned player still has an appeal pending
        let later = NOW + config.window_ms + 1;
        assert_eq!(tracker.compact(later), 1);
        assert_eq!(tracker.history(casual).len(), 1);
        assert_eq!(tracker.history(sanctioned).len(), 3);

        tracker.resolve_appeal(appeal, false, None, later).unwrap();
        let much_later = later + config.window_ms;
        assert_eq!(tracker.compact(much_later), 4);
        assert!(tracker.history(casual).is_empty());
        assert!(tracker.history(sanctioned).is_empty());
        assert!(tracker.appeal(appeal).is_none());
        assert!(tracker.watch_list(much_later).is_empty());
    }

    #[test]
    fn test_watch_list_ordering() {
        let tracker = ThreatTracker::new(ThreatConfig::default());
        let low = Verdict::reject(ViolationKind::ActionTooFrequent, Severity::Medium, Value::Null);
        tracker.record(PlayerId::new(1), &low, NOW);
        tracker.record(PlayerId::new(2), &high(), NOW);
        let list = tracker.watch_list(NOW + 1);
        assert_eq!(list[0].0, PlayerId::new(2));
        assert_eq!(list[1].2, ThreatLevel::Medium);
    }
}
