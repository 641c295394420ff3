//! Authoritative battlefield snapshot
//!
//! Handed to the storage collaborator at battle end and replayed to
//! reconnecting clients. The checksum covers the canonical JSON body so a
//! stored snapshot can be checked before it is trusted again.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::battlefield::state::BattlePhase;
use crate::core::error::Result;
use crate::core::types::{BattlefieldId, Timestamp};
use crate::protocol::PlayerUpdate;
use crate::territory::{RankingEntry, TileControl};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattlefieldSnapshot {
    pub battlefield: BattlefieldId,
    pub phase: BattlePhase,
    pub taken_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub ends_at: Option<Timestamp>,
    pub tiles: Vec<TileControl>,
    pub scores: Vec<RankingEntry>,
    pub players: Vec<PlayerUpdate>,
    /// Hex SHA-256 of the snapshot serialized with this field empty
    #[serde(default)]
    pub checksum: String,
}

impl BattlefieldSnapshot {
    fn digest(&self) -> Result<String> {
        let mut body = self.clone();
        body.checksum.clear();
        let bytes = serde_json::to_vec(&body)?;
        Ok(Sha256::digest(&bytes)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect())
    }

    /// Compute and store the checksum
    pub fn seal(mut self) -> Result<Self> {
        self.checksum = self.digest()?;
        Ok(self)
    }

    /// True when the checksum matches the body
    pub fn verify(&self) -> Result<bool> {
        Ok(!self.checksum.is_empty() && self.digest()? == self.checksum)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
