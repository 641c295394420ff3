use thiserror::Error;

use crate::core::types::{PlayerId, TeamId, Timestamp};
use crate::grid::HexCoord;

/// Coarse classification of failures, used by callers to decide whether to
/// retry, surface to the player, or escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed or out-of-range input. Not retried.
    RejectedInput,
    /// Anti-cheat policy blocked the request.
    PolicyViolation,
    /// Lost a race for a contended resource. The caller may re-read state.
    ContentionLoss,
    NotFound,
    Configuration,
    /// A storage or broadcast collaborator failed after retries.
    Collaborator,
}

#[derive(Error, Debug)]
pub enum WarError {
    // === REJECTED INPUT ===
    #[error("Tile {tile:?} is {distance} hexes away, capture range is {range}")]
    OutOfRange {
        tile: HexCoord,
        distance: u32,
        range: u32,
    },

    #[error("Tile {0:?} is not on the map")]
    UnknownTile(HexCoord),

    #[error("Tile {0:?} is impassable")]
    ImpassableTile(HexCoord),

    #[error("Spawn tile {tile:?} belongs to {owner}")]
    SpawnProtected { tile: HexCoord, owner: TeamId },

    #[error("Invalid resource value: {0}")]
    InvalidResourceValue(String),

    #[error("Invalid element: {0:?}")]
    InvalidElement(String),

    #[error("Invalid team composition: {0}")]
    InvalidTeamComposition(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Battlefield is not active")]
    BattleNotActive,

    #[error("Main hall of {team} is shielded until {until}")]
    MainHallShielded { team: TeamId, until: Timestamp },

    #[error("Revival limit of {0} reached")]
    RevivalLimitReached(u32),

    #[error("Revival on cooldown until {0}")]
    RevivalCooldown(Timestamp),

    #[error("No behavior data to analyze")]
    NoBehaviorData,

    #[error("Team {team} does not qualify: {reasons:?}")]
    NotQualified { team: TeamId, reasons: Vec<String> },

    #[error("Team {0} is already enrolled")]
    DuplicateTeam(TeamId),

    // === POLICY ===
    #[error("Player {player} is suspended until {until}")]
    PlayerSuspended { player: PlayerId, until: Timestamp },

    // === CONTENTION ===
    #[error("Tile {tile:?} is protected until {until}")]
    UnderProtection { tile: HexCoord, until: Timestamp },

    #[error("Capture of {0:?} lost to a concurrent attempt")]
    CaptureLost(HexCoord),

    // === NOT FOUND ===
    #[error("Unknown team: {0}")]
    UnknownTeam(TeamId),

    #[error("Unknown player: {0}")]
    UnknownPlayer(PlayerId),

    #[error("Unknown appeal: {0}")]
    UnknownAppeal(uuid::Uuid),

    #[error("Insufficient participants: found {found}, required {required}")]
    InsufficientParticipants { found: usize, required: usize },

    // === CONFIGURATION ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    // === COLLABORATORS ===
    #[error("Collaborator {name} failed after {attempts} attempts: {message}")]
    Collaborator {
        name: &'static str,
        attempts: u32,
        message: String,
    },
}

impl WarError {
    pub fn category(&self) -> ErrorCategory {
        use WarError::*;
        match self {
            OutOfRange { .. }
            | UnknownTile(_)
            | ImpassableTile(_)
            | SpawnProtected { .. }
            | InvalidResourceValue(_)
            | InvalidElement(_)
            | InvalidTeamComposition(_)
            | InvalidAction(_)
            | BattleNotActive
            | MainHallShielded { .. }
            | RevivalLimitReached(_)
            | RevivalCooldown(_)
            | NoBehaviorData
            | NotQualified { .. }
            | DuplicateTeam(_) => ErrorCategory::RejectedInput,
            PlayerSuspended { .. } => ErrorCategory::PolicyViolation,
            UnderProtection { .. } | CaptureLost(_) => ErrorCategory::ContentionLoss,
            UnknownTeam(_) | UnknownPlayer(_) | UnknownAppeal(_) | InsufficientParticipants { .. } => {
                ErrorCategory::NotFound
            }
            Config(_) | Toml(_) | IoError(_) | SerdeError(_) => ErrorCategory::Configuration,
            Collaborator { .. } => ErrorCategory::Collaborator,
        }
    }
}

pub type Result<T> = std::result::Result<T, WarError>;

/// Recover the guard from a poisoned lock. A panic in another holder leaves
/// the data structurally valid for every type guarded in this crate.
pub(crate) fn recover<T>(result: std::sync::LockResult<T>) -> T {
    result.unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            WarError::CaptureLost(HexCoord::new(0, 0)).category(),
            ErrorCategory::ContentionLoss
        );
        assert_eq!(
            WarError::InsufficientParticipants {
                found: 15,
                required: 20
            }
            .category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            WarError::InvalidElement(String::new()).category(),
            ErrorCategory::RejectedInput
        );
    }

    #[test]
    fn test_display_mentions_counts() {
        let err = WarError::InsufficientParticipants {
            found: 15,
            required: 20,
        };
        let text = err.to_string();
        assert!(text.contains("15"));
        assert!(text.contains("20"));
    }
}
