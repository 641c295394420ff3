//! Territory: tile ownership, time-weighted scoring and balance rules

pub mod balance;
pub mod control;
pub mod scoring;

pub use balance::{BalanceRules, CatchUpEffect, LeaderPenalty};
pub use control::{
    tie_break_hash, CaptureAttempt, CaptureOutcome, ControlPointEngine, DisplacedCapture, TileControl,
};
pub use scoring::{
    MemberContribution, RankingEntry, RankingPage, ScoreLedger, ScoreTick, TeamScore, TickAward,
};
