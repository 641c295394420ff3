//! Core type definitions used throughout the codebase

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server time in milliseconds since the Unix epoch.
///
/// Every time-sensitive operation takes this explicitly; nothing in the
/// engine reads the wall clock.
pub type Timestamp = i64;

pub const MS_PER_SECOND: i64 = 1_000;
pub const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
pub const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;

/// Unique identifier for teams (sects)
#[derive(
    Debug,
    Display,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[display(fmt = "sect-{:03}", _0)]
pub struct TeamId(pub u32);

impl TeamId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

/// Unique identifier for players
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display(fmt = "player-{}", _0)]
pub struct PlayerId(pub u64);

impl PlayerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Unique identifier for a battlefield instance
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[display(fmt = "{}", _0)]
pub struct BattlefieldId(pub Uuid);

impl BattlefieldId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BattlefieldId {
    fn default() -> Self {
        Self::new()
    }
}
