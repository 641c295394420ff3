pub mod config;
pub mod error;
pub mod types;

pub use config::WarConfig;
pub use error::{ErrorCategory, Result, WarError};
pub use types::{BattlefieldId, PlayerId, TeamId, Timestamp};
