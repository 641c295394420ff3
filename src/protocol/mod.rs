//! Inbound action requests and outbound state deltas
//!
//! These are the only shapes that cross the engine boundary. Transport and
//! encoding are left to the caller; everything here is serde.

pub mod action;
pub mod delta;

pub use action::{ActionKind, ActionPayload, ActionRequest, ItemKind};
pub use delta::{PlayerUpdate, ScoreUpdate, StateDelta};
