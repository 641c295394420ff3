use serde::{Deserialize, Serialize};

use crate::core::types::{BattlefieldId, PlayerId, TeamId, Timestamp};
use crate::grid::HexCoord;
use crate::territory::TileControl;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreUpdate {
    pub team: TeamId,
    pub total: f64,
    /// Points gained by this update
    pub delta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerUpdate {
    pub player: PlayerId,
    pub team: TeamId,
    pub position: HexCoord,
    pub health: f64,
    pub mana: f64,
    pub alive: bool,
}

/// What observers of a battlefield need to apply after one state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    pub battlefield: BattlefieldId,
    pub timestamp: Timestamp,
    pub tile_updates: Vec<TileControl>,
    pub score_updates: Vec<ScoreUpdate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub player_updates: Vec<PlayerUpdate>,
}

impl StateDelta {
    pub fn new(battlefield: BattlefieldId, timestamp: Timestamp) -> Self {
        Self {
            battlefield,
            timestamp,
            tile_updates: Vec::new(),
            score_updates: Vec::new(),
            player_updates: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tile_updates.is_empty()
            && self.score_updates.is_empty()
            && self.player_updates.is_empty()
    }
}
