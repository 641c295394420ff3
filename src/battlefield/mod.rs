//! Battlefield: lifecycle, player state, schedule and collaborator boundary

pub mod orchestrator;
pub mod schedule;
pub mod snapshot;
pub mod state;

pub use orchestrator::{
    ActionResult, BattlefieldOrchestrator, Broadcaster, LogBroadcaster, MemoryStore, SnapshotStore,
};
pub use schedule::{BattleSchedule, BattleWindow, WindowKind};
pub use snapshot::BattlefieldSnapshot;
pub use state::{BattlePhase, PlayerBattleState};
