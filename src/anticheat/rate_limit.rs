//! Sliding-window rate limiting per (player, operation)

use std::collections::VecDeque;
use std::sync::Mutex;

use ahash::AHashMap;
use serde_json::json;

use crate::anticheat::verdict::{Severity, Verdict, ViolationKind};
use crate::core::config::RateLimits;
use crate::core::error::recover;
use crate::core::types::{PlayerId, Timestamp};
use crate::protocol::ActionKind;

#[derive(Debug, Default)]
struct Window {
    accepted: VecDeque<Timestamp>,
    rejected: VecDeque<Timestamp>,
}

impl Window {
    fn evict(&mut self, cutoff: Timestamp) {
        while self.accepted.front().is_some_and(|t| *t <= cutoff) {
            self.accepted.pop_front();
        }
        while self.rejected.front().is_some_and(|t| *t <= cutoff) {
            self.rejected.pop_front();
        }
    }
}

pub struct RateLimiter {
    config: RateLimits,
    windows: Mutex<AHashMap<(PlayerId, ActionKind), Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimits) -> Self {
        Self {
            config,
            windows: Mutex::new(AHashMap::new()),
        }
    }

    pub fn limit(&self, kind: ActionKind) -> usize {
        match kind {
            ActionKind::Attack => self.config.attack,
            ActionKind::LobbyVisit => self.config.lobby_visit,
            ActionKind::Capture => self.config.capture,
            ActionKind::Move => self.config.movement,
            _ => self.config.default,
        }
    }

    /// Count an attempt and decide whether it fits the window. Rejected
    /// attempts do not consume quota; a flood of them escalates severity.
    pub fn check(&self, player: PlayerId, kind: ActionKind, now: Timestamp) -> Verdict {
        let limit = self.limit(kind);
        let mut windows = recover(self.windows.lock());
        let window = windows.entry((player, kind)).or_default();
        window.evict(now - self.config.window_ms);

        if window.accepted.len() < limit {
            window.accepted.push_back(now);
            return Verdict::pass();
        }

        window.rejected.push_back(now);
        let severity = if window.rejected.len() >= limit {
            Severity::Critical
        } else {
            Severity::High
        };
        Verdict::reject(
            ViolationKind::RateLimitExceeded,
            severity,
            json!({
                "action": kind,
                "limit": limit,
                "window_ms": self.config.window_ms,
                "rejected_in_window": window.rejected.len(),
            }),
        )
    }

    /// Attempts still available in the current window
    pub fn remaining(&self, player: PlayerId, kind: ActionKind, now: Timestamp) -> usize {
        let mut windows = recover(self.windows.lock());
        match windows.get_mut(&(player, kind)) {
            Some(window) => {
                window.evict(now - self.config.window_ms);
                self.limit(kind).saturating_sub(window.accepted.len())
            }
            None => self.limit(kind),
        }
    }

    /// Drop empty windows; call periodically to bound memory
    pub fn compact(&self, now: Timestamp) {
        let cutoff = now - self.config.window_ms;
        let mut windows = recover(self.windows.lock());
        windows.retain(|_, w| {
            w.evict(cutoff);
            !w.accepted.is_empty() || !w.rejected.is_empty()
        });
    }
}
