use serde::{Deserialize, Serialize};

use crate::anticheat::resources::ResourceReport;
use crate::core::types::{PlayerId, Timestamp};
use crate::grid::HexCoord;

/// Operation type, the key for pacing and rate limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionKind {
    Move,
    Attack,
    Capture,
    UseItem,
    ResourceSync,
    LobbyVisit,
    Reconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    /// Restores mana
    SpiritDew,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ActionPayload {
    Move {
        to: HexCoord,
        #[serde(default)]
        teleport: bool,
    },
    Attack {
        target: PlayerId,
        /// Combat power the client believes it has; checked, never trusted
        #[serde(default)]
        reported_power: Option<f64>,
    },
    Capture {
        tile: HexCoord,
    },
    UseItem {
        item: ItemKind,
    },
    ResourceSync {
        report: ResourceReport,
    },
    LobbyVisit,
    Reconnect,
}

impl ActionPayload {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionPayload::Move { .. } => ActionKind::Move,
            ActionPayload::Attack { .. } => ActionKind::Attack,
            ActionPayload::Capture { .. } => ActionKind::Capture,
            ActionPayload::UseItem { .. } => ActionKind::UseItem,
            ActionPayload::ResourceSync { .. } => ActionKind::ResourceSync,
            ActionPayload::LobbyVisit => ActionKind::LobbyVisit,
            ActionPayload::Reconnect => ActionKind::Reconnect,
        }
    }
}

/// One client request. `timestamp` is the client's clock; the server's own
/// `now` is passed separately wherever the request is handled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub player: PlayerId,
    pub timestamp: Timestamp,
    pub payload: ActionPayload,
}

impl ActionRequest {
    pub fn new(player: PlayerId, timestamp: Timestamp, payload: ActionPayload) -> Self {
        Self {
            player,
            timestamp,
            payload,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_wire_format() {
        let request = ActionRequest::new(
            PlayerId::new(9),
            1_000,
            ActionPayload::Capture {
                tile: HexCoord::new(1, -1),
            },
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["payload"]["type"], "Capture");
        assert_eq!(json["payload"]["tile"]["q"], 1);
        assert_eq!(request.kind(), ActionKind::Capture);
    }

    #[test]
    fn test_move_defaults_to_walking() {
        let payload: ActionPayload =
            serde_json::from_str(r#"{"type":"Move","to":{"q":0,"r":1}}"#).unwrap();
        assert_eq!(
            payload,
            ActionPayload::Move {
                to: HexCoord::new(0, 1),
                teleport: false
            }
        );
    }

    #[test]
    fn test_unknown_action_rejected() {
        assert!(serde_json::from_str::<ActionPayload>(r#"{"type":"Fly"}"#).is_err());
    }
}
