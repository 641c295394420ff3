//! Anti-cheat: per-action validation, behaviour analysis and enforcement
//!
//! Individual checks are pure functions returning a [`Verdict`]; the
//! [`AntiCheatValidator`] composes them and keeps the per-player state
//! (timing history, rate windows, threat records).

pub mod behavior;
pub mod movement;
pub mod rate_limit;
pub mod resources;
pub mod threat;
pub mod timing;
pub mod validator;
pub mod verdict;

pub use behavior::{analyze_actions, analyze_battles, BattleSummary, ObservedAction, Pattern};
pub use movement::{validate_movement, MovementReport};
pub use rate_limit::RateLimiter;
pub use resources::{
    expected_cost, validate_power_report, validate_resources, ResourceBaseline, ResourceKind,
    ResourceReport, ResourceSource,
};
pub use threat::{
    Appeal, AppealStatus, Sanction, SanctionKind, ThreatAssessment, ThreatLevel, ThreatTracker,
    ViolationRecord,
};
pub use timing::{validate_timing, TimingHistory};
pub use validator::{ActionValidator, AntiCheatValidator, PlayerContext};
pub use verdict::{RecommendedAction, Severity, Verdict, ViolationKind};
