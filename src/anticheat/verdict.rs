//! Verdicts returned by every anti-cheat check

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Default response for a single violation of this severity
    pub fn recommended_action(&self) -> RecommendedAction {
        match self {
            Severity::Low => RecommendedAction::Warn,
            Severity::Medium => RecommendedAction::Limit,
            Severity::High => RecommendedAction::Suspend,
            Severity::Critical => RecommendedAction::Ban,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecommendedAction {
    Warn,
    Limit,
    Suspend,
    Ban,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    // Movement
    ExcessiveMovementSpeed,
    OutOfBounds,
    WallClipping,
    NoTeleportCharges,
    // Resources
    ResourceIntegrityViolation,
    CombatPowerMismatch,
    // Timing
    ClientTimeDrift,
    TimeRollback,
    InvalidTimestamp,
    ActionTooFrequent,
    // Rate
    RateLimitExceeded,
    // Behaviour
    BotBehavior,
    SuspiciousBattlePattern,
    // Enforcement
    PlayerSuspended,
    ValidationTimeout,
}

/// Outcome of a check: valid, or a reason with severity, recommended action
/// and the evidence that led to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub valid: bool,
    pub reason: Option<ViolationKind>,
    pub severity: Option<Severity>,
    pub recommended_action: Option<RecommendedAction>,
    pub evidence: Value,
}

impl Verdict {
    pub fn pass() -> Self {
        Self {
            valid: true,
            reason: None,
            severity: None,
            recommended_action: None,
            evidence: Value::Null,
        }
    }

    pub fn reject(reason: ViolationKind, severity: Severity, evidence: Value) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            severity: Some(severity),
            recommended_action: Some(severity.recommended_action()),
            evidence,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// First failing verdict in order, or a pass
    pub fn first_failure(verdicts: impl IntoIterator<Item = Verdict>) -> Verdict {
        verdicts
            .into_iter()
            .find(|v| !v.valid)
            .unwrap_or_else(Verdict::pass)
    }
}
