//! Client timestamp sanity and per-action pacing

use serde_json::json;

use crate::anticheat::verdict::{Severity, Verdict, ViolationKind};
use crate::core::config::AntiCheatConfig;
use crate::core::types::Timestamp;
use crate::protocol::ActionKind;

/// What the validator remembers about a player's previous actions
#[derive(Debug, Clone, Default)]
pub struct TimingHistory {
    pub last_any: Option<Timestamp>,
    pub last_by_kind: ahash::AHashMap<ActionKind, Timestamp>,
    /// Server time of the last accepted resource sync
    pub last_sync: Option<Timestamp>,
}

impl TimingHistory {
    pub fn record(&mut self, kind: ActionKind, at: Timestamp) {
        self.last_any = Some(self.last_any.map_or(at, |t| t.max(at)));
        self.last_by_kind.insert(kind, at);
    }

    /// Server time elapsed since the previous sync, or since `fallback`
    /// for a player's first one
    pub fn since_sync(&self, fallback: Timestamp, now: Timestamp) -> i64 {
        (now - self.last_sync.unwrap_or(fallback)).max(0)
    }
}

pub fn min_interval_ms(config: &AntiCheatConfig, kind: ActionKind) -> i64 {
    let i = &config.intervals;
    match kind {
        ActionKind::Move => i.movement_ms,
        ActionKind::Attack => i.attack_ms,
        ActionKind::Capture => i.capture_ms,
        ActionKind::UseItem => i.item_ms,
        ActionKind::ResourceSync | ActionKind::LobbyVisit | ActionKind::Reconnect => 0,
    }
}

pub fn validate_timing(
    config: &AntiCheatConfig,
    kind: ActionKind,
    client_ts: Timestamp,
    server_now: Timestamp,
    history: &TimingHistory,
) -> Verdict {
    if client_ts <= 0 {
        return Verdict::reject(
            ViolationKind::InvalidTimestamp,
            Severity::Medium,
            json!({ "client_ts": client_ts }),
        );
    }

    let drift = client_ts - server_now;
    if drift > config.clock_drift_tolerance_ms {
        return Verdict::reject(
            ViolationKind::ClientTimeDrift,
            Severity::Medium,
            json!({ "client_ts": client_ts, "server_now": server_now, "drift_ms": drift }),
        );
    }

    if let Some(last) = history.last_any {
        if client_ts < last {
            return Verdict::reject(
                ViolationKind::TimeRollback,
                Severity::High,
                json!({ "client_ts": client_ts, "last_action": last }),
            );
        }
    }
    if -drift > config.max_client_lag_ms {
        return Verdict::reject(
            ViolationKind::TimeRollback,
            Severity::High,
            json!({ "client_ts": client_ts, "server_now": server_now, "lag_ms": -drift }),
        );
    }

    if let Some(last) = history.last_by_kind.get(&kind) {
        let interval = client_ts - last;
        let min = min_interval_ms(config, kind);
        if interval < min {
            return Verdict::reject(
                ViolationKind::ActionTooFrequent,
                Severity::Medium,
                json!({ "action": kind, "interval_ms": interval, "min_interval_ms": min }),
            );
        }
    }

    Verdict::pass()
}
