//! The anti-cheat front door
//!
//! Every inbound action passes through [`AntiCheatValidator::validate`]
//! before it can touch battlefield state. Checks run in a fixed order and
//! the first failure wins:
//!
//! 1. active suspension or ban
//! 2. rate limit for the (player, operation) pair
//! 3. client timestamp sanity and pacing
//! 4. payload checks (movement, power report, resource report)
//! 5. latency budget; an over-budget validation fails closed
//!
//! Rejections are logged with their evidence and fed to the threat tracker.
//! A player's timing history stays locked from the pacing check until the
//! verdict is recorded, so concurrent requests from one player are judged
//! one after another.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ahash::AHashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::anticheat::behavior::{analyze_actions, analyze_battles, BattleSummary, ObservedAction};
use crate::anticheat::movement::{validate_movement, MovementReport};
use crate::anticheat::rate_limit::RateLimiter;
use crate::anticheat::resources::{
    validate_power_report, validate_resources, ResourceBaseline, ResourceKind,
};
use crate::anticheat::threat::{ThreatAssessment, ThreatTracker};
use crate::anticheat::timing::{validate_timing, TimingHistory};
use crate::anticheat::verdict::{Severity, Verdict, ViolationKind};
use crate::core::config::AntiCheatConfig;
use crate::core::error::{recover, Result, WarError};
use crate::core::types::{PlayerId, Timestamp};
use crate::grid::{HexCoord, HexGrid};
use crate::protocol::{ActionKind, ActionPayload, ActionRequest};

/// Server-side facts about the acting player, supplied by the caller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerContext {
    pub position: HexCoord,
    /// Server time the player arrived at `position`
    pub position_since: Timestamp,
    pub teleport_charges: u32,
    pub speed_buff: f64,
    pub server_power: f64,
    pub max_health: f64,
    /// Server time the player's session began; the first resource sync is
    /// measured from here
    pub session_start: Timestamp,
    // Server-side resource values, where the caller tracks them
    pub mana: Option<f64>,
    pub health: Option<f64>,
    pub experience: Option<f64>,
}

impl PlayerContext {
    pub fn at(position: HexCoord, since: Timestamp) -> Self {
        Self {
            position,
            position_since: since,
            teleport_charges: 0,
            speed_buff: 1.0,
            server_power: 0.0,
            max_health: 0.0,
            session_start: since,
            mana: None,
            health: None,
            experience: None,
        }
    }

    fn resource(&self, kind: ResourceKind) -> Option<f64> {
        match kind {
            ResourceKind::Mana => self.mana,
            ResourceKind::Health => self.health,
            ResourceKind::Experience => self.experience,
            ResourceKind::Currency | ResourceKind::Item => None,
        }
    }
}

pub trait ActionValidator: Send + Sync {
    fn validate(&self, request: &ActionRequest, context: &PlayerContext, now: Timestamp) -> Verdict;

    /// End of the player's current suspension or ban, if any
    fn sanctioned_until(&self, _player: PlayerId, _now: Timestamp) -> Option<Timestamp> {
        None
    }

    /// Drop per-player state that has gone stale
    fn compact(&self, _now: Timestamp) {}
}

pub struct AntiCheatValidator {
    grid: Arc<HexGrid>,
    config: AntiCheatConfig,
    limiter: RateLimiter,
    threats: ThreatTracker,
    histories: Mutex<AHashMap<PlayerId, Arc<Mutex<TimingHistory>>>>,
}

impl AntiCheatValidator {
    pub fn new(grid: Arc<HexGrid>, config: AntiCheatConfig) -> Self {
        Self {
            limiter: RateLimiter::new(config.rate_limits.clone()),
            threats: ThreatTracker::new(config.threat.clone()),
            histories: Mutex::new(AHashMap::new()),
            grid,
            config,
        }
    }

    pub fn config(&self) -> &AntiCheatConfig {
        &self.config
    }

    pub fn threats(&self) -> &ThreatTracker {
        &self.threats
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    fn history_of(&self, player: PlayerId) -> Arc<Mutex<TimingHistory>> {
        recover(self.histories.lock())
            .entry(player)
            .or_default()
            .clone()
    }

    fn payload_verdict(
        &self,
        request: &ActionRequest,
        context: &PlayerContext,
        history: &TimingHistory,
        now: Timestamp,
    ) -> Verdict {
        match &request.payload {
            ActionPayload::Move { to, teleport } => validate_movement(
                &self.grid,
                &self.config,
                &MovementReport {
                    from: context.position,
                    to: *to,
                    elapsed_ms: now - context.position_since,
                    teleport: *teleport,
                    teleport_charges: context.teleport_charges,
                    speed_buff: context.speed_buff,
                },
            ),
            ActionPayload::Attack {
                reported_power: Some(reported),
                ..
            } => validate_power_report(
                self.config.power_report_tolerance,
                *reported,
                context.server_power,
            ),
            ActionPayload::Capture { tile } if !self.grid.contains(*tile) => Verdict::reject(
                ViolationKind::OutOfBounds,
                Severity::Medium,
                json!({ "tile": tile, "radius": self.grid.radius() }),
            ),
            ActionPayload::ResourceSync { report } => {
                let baseline = ResourceBaseline {
                    elapsed_ms: history.since_sync(context.session_start, now),
                    current: context.resource(report.kind),
                    capacity: Some(context.max_health)
                        .filter(|c| report.kind == ResourceKind::Health && *c > 0.0),
                };
                validate_resources(&self.config.resources, report, &baseline)
            }
            _ => Verdict::pass(),
        }
    }

    fn run_checks(
        &self,
        request: &ActionRequest,
        context: &PlayerContext,
        history: &TimingHistory,
        now: Timestamp,
    ) -> Verdict {
        let player = request.player;
        let kind = request.kind();

        if let Some(sanction) = self.threats.sanction(player, now) {
            return Verdict::reject(
                ViolationKind::PlayerSuspended,
                Severity::High,
                json!({ "sanction": sanction.kind, "until": sanction.until }),
            );
        }

        let rate = self.limiter.check(player, kind, now);
        if !rate.valid {
            return rate;
        }

        let timing = validate_timing(&self.config, kind, request.timestamp, now, history);
        if !timing.valid {
            return timing;
        }

        self.payload_verdict(request, context, history, now)
    }

    /// Feed a rejection to the threat tracker. Suspension and timeout
    /// verdicts are not the player's new offence and are not counted.
    fn escalate(&self, player: PlayerId, verdict: &Verdict, now: Timestamp) -> Option<ThreatAssessment> {
        match verdict.reason {
            Some(ViolationKind::PlayerSuspended) | Some(ViolationKind::ValidationTimeout) => None,
            _ => Some(self.threats.record(player, verdict, now)),
        }
    }

    /// Validate many requests at once. Requests of one player are checked in
    /// order; different players run in parallel above the configured
    /// threshold. Results line up with the input.
    pub fn validate_batch(
        &self,
        requests: &[(ActionRequest, PlayerContext)],
        now: Timestamp,
    ) -> Vec<Verdict> {
        let mut groups: AHashMap<PlayerId, Vec<usize>> = AHashMap::new();
        for (i, (request, _)) in requests.iter().enumerate() {
            groups.entry(request.player).or_default().push(i);
        }
        let groups: Vec<Vec<usize>> = groups.into_values().collect();

        let run = |group: &Vec<usize>| {
            group
                .iter()
                .map(|&i| (i, self.validate(&requests[i].0, &requests[i].1, now)))
                .collect::<Vec<_>>()
        };
        let checked: Vec<Vec<(usize, Verdict)>> =
            if requests.len() >= self.config.parallel_threshold {
                groups.par_iter().map(run).collect()
            } else {
                groups.iter().map(run).collect()
            };

        let mut verdicts = vec![Verdict::pass(); requests.len()];
        for (i, verdict) in checked.into_iter().flatten() {
            verdicts[i] = verdict;
        }
        verdicts
    }

    /// Run the statistical behaviour checks over a player's recent record
    /// and escalate anything found.
    pub fn review_behavior(
        &self,
        player: PlayerId,
        actions: &[ObservedAction],
        battles: &[BattleSummary],
        now: Timestamp,
    ) -> Result<Vec<Verdict>> {
        let mut verdicts = Vec::new();
        if !actions.is_empty() {
            verdicts.push(analyze_actions(&self.config.behavior, actions)?);
        }
        if !battles.is_empty() {
            verdicts.push(analyze_battles(&self.config.behavior, battles)?);
        }
        if verdicts.is_empty() {
            return Err(WarError::NoBehaviorData);
        }
        for verdict in verdicts.iter().filter(|v| !v.valid) {
            tracing::warn!(
                player = %player,
                reason = ?verdict.reason,
                severity = ?verdict.severity,
                evidence = %verdict.evidence,
                "suspicious behaviour"
            );
            self.threats.record(player, verdict, now);
        }
        Ok(verdicts)
    }

    pub fn tracked_players(&self) -> usize {
        recover(self.histories.lock()).len()
    }
}

impl ActionValidator for AntiCheatValidator {
    fn validate(&self, request: &ActionRequest, context: &PlayerContext, now: Timestamp) -> Verdict {
        let started = Instant::now();
        let budget = Duration::from_millis(self.config.validation_budget_ms);

        let entry = self.history_of(request.player);
        let mut history = recover(entry.lock());
        let mut verdict = self.run_checks(request, context, &history, now);
        let elapsed = started.elapsed();
        if verdict.valid && elapsed >= budget {
            verdict = Verdict::reject(
                ViolationKind::ValidationTimeout,
                Severity::Low,
                json!({
                    "budget_ms": self.config.validation_budget_ms,
                    "elapsed_us": elapsed.as_micros() as u64,
                }),
            );
        }

        if verdict.valid {
            history.record(request.kind(), request.timestamp);
            if request.kind() == ActionKind::ResourceSync {
                history.last_sync = Some(now);
            }
        }
        drop(history);

        if !verdict.valid {
            tracing::warn!(
                player = %request.player,
                action = ?request.kind(),
                reason = ?verdict.reason,
                severity = ?verdict.severity,
                evidence = %verdict.evidence,
                "action rejected"
            );
            self.escalate(request.player, &verdict, now);
        }
        verdict
    }

    fn sanctioned_until(&self, player: PlayerId, now: Timestamp) -> Option<Timestamp> {
        self.threats.sanction(player, now).map(|s| s.until)
    }

    /// Drop rate-limit windows, timing state nobody has touched lately and
    /// threat records past their window. A history holding a resource sync
    /// anchor is kept, since the next sync is measured from it.
    fn compact(&self, now: Timestamp) {
        self.limiter.compact(now);
        let horizon = now - self.config.max_client_lag_ms.max(self.config.rate_limits.window_ms);
        recover(self.histories.lock()).retain(|_, h| {
            if Arc::strong_count(h) > 1 {
                return true;
            }
            let history = recover(h.lock());
            history.last_sync.is_some() || history.last_any.is_some_and(|t| t >= horizon)
        });
        self.threats.compact(now);
    }
}
