//! Resource integrity checks
//!
//! Client-reported resource changes are compared with what the source of
//! the change could legitimately produce. Elapsed time, starting values,
//! capacities and costs all come from the server; the client only says
//! what it thinks changed.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::anticheat::verdict::{Severity, Verdict, ViolationKind};
use crate::core::config::ResourceLimits;
use crate::core::types::MS_PER_MINUTE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Health,
    Mana,
    Experience,
    Currency,
    Item,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceSource {
    BattleVictory,
    Regeneration,
    ItemUse,
    Purchase,
    Skill,
    Unknown,
}

/// A change to one resource as the client reports it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceReport {
    pub kind: ResourceKind,
    pub source: ResourceSource,
    pub before: f64,
    pub after: f64,
}

impl ResourceReport {
    pub fn gain(kind: ResourceKind, source: ResourceSource, before: f64, after: f64) -> Self {
        Self {
            kind,
            source,
            before,
            after,
        }
    }
}

/// Server-side facts a resource report is judged against
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceBaseline {
    /// Server time since the player's previous accepted sync
    pub elapsed_ms: i64,
    /// The server's value of the resource, where it tracks one
    pub current: Option<f64>,
    /// Capacity the server knows for this player (e.g. max health)
    pub capacity: Option<f64>,
}

impl ResourceBaseline {
    pub fn after(elapsed_ms: i64) -> Self {
        Self {
            elapsed_ms,
            ..Self::default()
        }
    }
}

fn capacity(limits: &ResourceLimits, kind: ResourceKind, baseline: &ResourceBaseline) -> f64 {
    match kind {
        ResourceKind::Mana => limits.max_mana,
        ResourceKind::Health => baseline
            .capacity
            .map_or(limits.max_health, |c| c.min(limits.max_health)),
        _ => limits.absolute_cap,
    }
}

/// What a spend of this kind from this source must cost
pub fn expected_cost(limits: &ResourceLimits, kind: ResourceKind, source: ResourceSource) -> Option<f64> {
    match (kind, source) {
        (ResourceKind::Mana, ResourceSource::Skill) => Some(limits.skill_mana_cost),
        _ => None,
    }
}

/// Largest gain the source could produce for this resource
fn allowed_gain(limits: &ResourceLimits, report: &ResourceReport, baseline: &ResourceBaseline) -> f64 {
    let minutes = baseline.elapsed_ms.max(0) as f64 / MS_PER_MINUTE as f64;
    let per_award = minutes.max(1.0);
    use ResourceKind::*;
    use ResourceSource::*;
    match (report.kind, report.source) {
        (_, Unknown) => 0.0,
        (Mana, Regeneration) => limits.mana_regen_per_minute * minutes,
        (Mana, ItemUse) => limits.spirit_dew_restore,
        (Health, Regeneration) => limits.health_regen_per_minute * minutes,
        (Health, ItemUse) | (Health, Skill) => capacity(limits, Health, baseline),
        (Experience, BattleVictory) | (Experience, Skill) => {
            limits.max_experience_per_minute * per_award
        }
        (Currency, BattleVictory) => limits.max_currency_per_minute * per_award,
        (Currency, Purchase) => limits.absolute_cap,
        (Item, BattleVictory) | (Item, Purchase) => limits.max_items_per_battle,
        _ => 0.0,
    }
}

fn excess_severity(gain: f64, allowed: f64, source: ResourceSource) -> Severity {
    if source == ResourceSource::Unknown {
        return Severity::Critical;
    }
    let ratio = if allowed > 0.0 {
        gain / allowed
    } else {
        f64::INFINITY
    };
    if ratio <= 2.0 {
        Severity::Medium
    } else if ratio <= 10.0 {
        Severity::High
    } else {
        Severity::Critical
    }
}

pub fn validate_resources(
    limits: &ResourceLimits,
    report: &ResourceReport,
    baseline: &ResourceBaseline,
) -> Verdict {
    let tampered = [report.before, report.after]
        .iter()
        .any(|v| !v.is_finite() || *v < 0.0 || *v > limits.absolute_cap);
    if tampered {
        return Verdict::reject(
            ViolationKind::ResourceIntegrityViolation,
            Severity::Critical,
            json!({ "kind": report.kind, "before": report.before, "after": report.after,
                    "detail": "value out of range" }),
        );
    }

    if let Some(current) = baseline.current {
        if (report.before - current).abs() > limits.baseline_tolerance {
            return Verdict::reject(
                ViolationKind::ResourceIntegrityViolation,
                Severity::High,
                json!({ "kind": report.kind, "before": report.before, "server": current,
                        "detail": "baseline mismatch" }),
            );
        }
    }
    let before = baseline.current.unwrap_or(report.before);

    let cap = capacity(limits, report.kind, baseline);
    if report.after > cap {
        return Verdict::reject(
            ViolationKind::ResourceIntegrityViolation,
            Severity::High,
            json!({ "kind": report.kind, "after": report.after, "capacity": cap,
                    "detail": "exceeds capacity" }),
        );
    }

    let delta = report.after - before;
    if delta < 0.0 {
        if let Some(cost) = expected_cost(limits, report.kind, report.source) {
            if -delta + 1e-6 < cost {
                return Verdict::reject(
                    ViolationKind::ResourceIntegrityViolation,
                    Severity::Medium,
                    json!({ "kind": report.kind, "spent": -delta, "expected_cost": cost,
                            "detail": "consumption mismatch" }),
                );
            }
        }
        return Verdict::pass();
    }

    let allowed = allowed_gain(limits, report, baseline);
    if delta > allowed {
        return Verdict::reject(
            ViolationKind::ResourceIntegrityViolation,
            excess_severity(delta, allowed, report.source),
            json!({ "kind": report.kind, "source": report.source, "gain": delta,
                    "allowed": allowed, "detail": "gain exceeds source" }),
        );
    }

    Verdict::pass()
}

/// Compare a client-reported combat power with the server's value
pub fn validate_power_report(tolerance: f64, reported: f64, server: f64) -> Verdict {
    let deviation = if server > 0.0 {
        (reported - server).abs() / server
    } else {
        f64::INFINITY
    };
    if !reported.is_finite() || deviation > tolerance {
        return Verdict::reject(
            ViolationKind::CombatPowerMismatch,
            Severity::High,
            json!({ "reported": reported, "server": server, "deviation": deviation }),
        );
    }
    Verdict::pass()
}
