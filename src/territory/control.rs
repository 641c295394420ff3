//! Control-point ownership and capture contests
//!
//! Each tile sits behind its own mutex, so captures of different tiles never
//! contend and a single tile has exactly one writer at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::config::ControlConfig;
use crate::core::error::{recover, Result, WarError};
use crate::core::types::{PlayerId, TeamId, Timestamp};
use crate::grid::{HexCoord, HexGrid};

/// Ownership state of one tile as seen from outside the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileControl {
    pub coord: HexCoord,
    pub owner: Option<TeamId>,
    pub captured_at: Option<Timestamp>,
    /// Other teams cannot capture before this instant
    pub protected_until: Timestamp,
    /// Instant from which the tile is a star altar
    #[serde(default)]
    pub altar_from: Option<Timestamp>,
}

/// A request to take a tile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureAttempt {
    pub tile: HexCoord,
    pub team: TeamId,
    pub player: PlayerId,
    pub actor_position: HexCoord,
    pub combat_power: f64,
    /// Arrival order, assigned by the engine or the orchestrator
    pub sequence: u64,
    pub at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureOutcome {
    pub tile: HexCoord,
    pub team: TeamId,
    pub player: PlayerId,
    pub previous_owner: Option<TeamId>,
    pub points_awarded: u32,
    pub protected_until: Timestamp,
    /// Same-instant capture this one overturned; its points must be taken back
    pub displaced: Option<DisplacedCapture>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplacedCapture {
    pub team: TeamId,
    pub player: PlayerId,
    pub points: u32,
}

/// The capture currently holding a tile at its instant, with the state it
/// replaced
#[derive(Debug, Clone, Copy)]
struct Contest {
    winner: CaptureAttempt,
    points: u32,
    prior: TileControl,
}

#[derive(Debug)]
struct TileSlot {
    control: TileControl,
    spawn_owner: Option<TeamId>,
    /// Ownership changes in time order; the first entry is the state at
    /// battle start.
    history: Vec<(Timestamp, Option<TeamId>)>,
    contest: Option<Contest>,
}

impl TileSlot {
    fn altar_active(&self, at: Timestamp) -> bool {
        self.control.altar_from.is_some_and(|from| from <= at)
    }

    fn owner_at(&self, at: Timestamp) -> Option<TeamId> {
        self.history
            .iter()
            .rev()
            .find(|(changed, _)| *changed <= at)
            .and_then(|(_, owner)| *owner)
    }

    /// Drop history entries that can no longer be queried. Keeps the last
    /// entry at or before `before` so `owner_at` stays correct.
    fn prune(&mut self, before: Timestamp) {
        let keep_from = self
            .history
            .iter()
            .rposition(|(changed, _)| *changed <= before)
            .unwrap_or(0);
        self.history.drain(..keep_from);
    }
}

/// Reproducible tie-break value derived from a player id
pub fn tie_break_hash(player: PlayerId) -> u64 {
    let digest = Sha256::digest(player.0.to_le_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Ordering of same-instant attempts on one tile: strongest first, then
/// earliest submission, then the id hash.
fn contest_order(a: &CaptureAttempt, b: &CaptureAttempt) -> std::cmp::Ordering {
    b.combat_power
        .total_cmp(&a.combat_power)
        .then(a.sequence.cmp(&b.sequence))
        .then(tie_break_hash(a.player).cmp(&tie_break_hash(b.player)))
}

/// Star altar sites: edge tiles of ring 2, spread evenly around the core
fn altar_sites(grid: &HexGrid, count: usize) -> Vec<HexCoord> {
    let edges: Vec<HexCoord> = HexCoord::ORIGIN
        .ring(2)
        .into_iter()
        .skip(1)
        .step_by(2)
        .filter(|c| {
            grid.get(*c)
                .is_some_and(|t| t.terrain.is_passable() && !t.kind.is_spawn())
        })
        .collect();
    let count = count.min(edges.len());
    (0..count).map(|i| edges[i * edges.len() / count]).collect()
}

pub struct ControlPointEngine {
    grid: Arc<HexGrid>,
    config: ControlConfig,
    tiles: AHashMap<HexCoord, Mutex<TileSlot>>,
    altars: Vec<HexCoord>,
    sequence: AtomicU64,
}

impl ControlPointEngine {
    /// Build the engine with spawn slot `i` owned by `spawn_teams[i]` from
    /// `start` onwards. Spawn slots without a team stay neutral.
    pub fn new(
        grid: Arc<HexGrid>,
        config: ControlConfig,
        spawn_teams: &[TeamId],
        start: Timestamp,
    ) -> Self {
        let tiles = grid
            .tiles()
            .map(|tile| {
                let spawn_owner = tile.spawn_slot.and_then(|slot| spawn_teams.get(slot).copied());
                let slot = TileSlot {
                    control: TileControl {
                        coord: tile.coord,
                        owner: spawn_owner,
                        captured_at: None,
                        protected_until: start,
                        altar_from: None,
                    },
                    spawn_owner,
                    history: vec![(start, spawn_owner)],
                    contest: None,
                };
                (tile.coord, Mutex::new(slot))
            })
            .collect();

        Self {
            altars: altar_sites(&grid, config.altar_count),
            grid,
            config,
            tiles,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn grid(&self) -> &HexGrid {
        &self.grid
    }

    /// Next arrival number for a capture attempt
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    fn slot(&self, coord: HexCoord) -> Result<&Mutex<TileSlot>> {
        self.tiles.get(&coord).ok_or(WarError::UnknownTile(coord))
    }

    /// Try to take a tile for the attempt's team.
    ///
    /// Attempts before the tile's latest capture lose with `CaptureLost`.
    /// An attempt at the same instant as the latest capture is judged
    /// against the state that capture replaced: if it orders ahead of the
    /// current winner (power, then sequence, then id hash) it takes the
    /// tile and reports the capture it overturned, otherwise it loses. The
    /// final owner for an instant therefore does not depend on arrival
    /// order.
    pub fn attempt_capture(&self, attempt: &CaptureAttempt) -> Result<CaptureOutcome> {
        let tile = self.grid.tile(attempt.tile)?;
        if !tile.terrain.is_passable() {
            return Err(WarError::ImpassableTile(attempt.tile));
        }
        let distance = attempt.actor_position.distance(&attempt.tile);
        if distance > self.config.capture_range {
            return Err(WarError::OutOfRange {
                tile: attempt.tile,
                distance,
                range: self.config.capture_range,
            });
        }

        let mut slot = recover(self.slot(attempt.tile)?.lock());

        if let Some(owner) = slot.spawn_owner {
            if owner != attempt.team {
                return Err(WarError::SpawnProtected {
                    tile: attempt.tile,
                    owner,
                });
            }
        }

        let mut displaced = None;
        let mut base = slot.control;
        if let Some(last) = slot.control.captured_at {
            if attempt.at < last {
                return Err(WarError::CaptureLost(attempt.tile));
            }
            if attempt.at == last {
                let contest = slot
                    .contest
                    .filter(|c| c.winner.at == attempt.at)
                    .filter(|c| contest_order(attempt, &c.winner).is_lt())
                    .ok_or(WarError::CaptureLost(attempt.tile))?;
                base = contest.prior;
                displaced = Some(contest);
            }
        }
        if base.owner == Some(attempt.team) {
            return Err(WarError::InvalidAction(format!(
                "{} already holds {:?}",
                attempt.team, attempt.tile
            )));
        }
        if attempt.at < base.protected_until {
            return Err(WarError::UnderProtection {
                tile: attempt.tile,
                until: base.protected_until,
            });
        }

        let points = if slot.altar_active(attempt.at) {
            self.config.altar_capture_points
        } else {
            tile.point_value()
        };
        let protected_until = base
            .protected_until
            .max(attempt.at + self.config.protection_ms);
        slot.control = TileControl {
            owner: Some(attempt.team),
            captured_at: Some(attempt.at),
            protected_until,
            ..base
        };
        match (displaced, slot.history.last_mut()) {
            // the overturned capture is the newest entry at this same instant
            (Some(_), Some(entry)) => *entry = (attempt.at, Some(attempt.team)),
            _ => slot.history.push((attempt.at, Some(attempt.team))),
        }
        slot.contest = Some(Contest {
            winner: *attempt,
            points,
            prior: base,
        });

        tracing::debug!(
            tile = ?attempt.tile,
            team = %attempt.team,
            previous = ?base.owner,
            overturned = ?displaced.map(|c| c.winner.team),
            "tile captured"
        );

        Ok(CaptureOutcome {
            tile: attempt.tile,
            team: attempt.team,
            player: attempt.player,
            previous_owner: base.owner,
            points_awarded: points,
            protected_until,
            displaced: displaced.map(|c| DisplacedCapture {
                team: c.winner.team,
                player: c.winner.player,
                points: c.points,
            }),
        })
    }

    /// Resolve a batch of attempts, applying same-instant contests in
    /// tie-break order. Results line up with the input order; on each
    /// contested tile the best eligible attempt wins and the rest get
    /// `CaptureLost`.
    pub fn resolve_contest(&self, attempts: &[CaptureAttempt]) -> Vec<Result<CaptureOutcome>> {
        let mut order: Vec<usize> = (0..attempts.len()).collect();
        order.sort_by(|&a, &b| {
            let (x, y) = (&attempts[a], &attempts[b]);
            x.at.cmp(&y.at)
                .then(x.tile.cmp(&y.tile))
                .then_with(|| contest_order(x, y))
        });

        let mut results: Vec<Option<Result<CaptureOutcome>>> =
            (0..attempts.len()).map(|_| None).collect();
        for index in order {
            results[index] = Some(self.attempt_capture(&attempts[index]));
        }
        results
            .into_iter()
            .zip(attempts)
            .map(|(r, a)| r.unwrap_or(Err(WarError::CaptureLost(a.tile))))
            .collect()
    }

    pub fn control(&self, coord: HexCoord) -> Result<TileControl> {
        Ok(recover(self.slot(coord)?.lock()).control)
    }

    pub fn owner(&self, coord: HexCoord) -> Result<Option<TeamId>> {
        Ok(self.control(coord)?.owner)
    }

    /// Owner of a tile as of an instant, from the retained history
    pub fn owner_at(&self, coord: HexCoord, at: Timestamp) -> Result<Option<TeamId>> {
        Ok(recover(self.slot(coord)?.lock()).owner_at(at))
    }

    /// Every owned tile as of `at`, with its per-minute value
    pub fn holdings_at(&self, at: Timestamp) -> Vec<(HexCoord, TeamId, u32)> {
        self.tiles
            .iter()
            .filter_map(|(coord, slot)| {
                let slot = recover(slot.lock());
                let owner = slot.owner_at(at)?;
                let value = if slot.altar_active(at) {
                    self.config.altar_points_per_minute
                } else {
                    self.grid.get(*coord)?.point_value()
                };
                Some((*coord, owner, value))
            })
            .collect()
    }

    /// Where star altars appear on this map
    pub fn altar_sites(&self) -> &[HexCoord] {
        &self.altars
    }

    /// Make every altar site a star altar from `at` on. Returns the
    /// updated tiles.
    pub fn schedule_altars(&self, at: Timestamp) -> Vec<TileControl> {
        let scheduled: Vec<TileControl> = self
            .altars
            .iter()
            .filter_map(|coord| self.tiles.get(coord))
            .map(|slot| {
                let mut slot = recover(slot.lock());
                slot.control.altar_from = Some(at);
                slot.control
            })
            .collect();
        tracing::debug!(altars = scheduled.len(), at, "star altars scheduled");
        scheduled
    }

    pub fn tiles_held(&self, team: TeamId) -> usize {
        self.tiles
            .values()
            .filter(|slot| recover(slot.lock()).control.owner == Some(team))
            .count()
    }

    /// Current ownership of every tile, sorted by coordinate
    pub fn snapshot(&self) -> Vec<TileControl> {
        let mut all: Vec<TileControl> = self
            .tiles
            .values()
            .map(|slot| recover(slot.lock()).control)
            .collect();
        all.sort_by_key(|c| c.coord);
        all
    }

    pub fn prune_history(&self, before: Timestamp) {
        for slot in self.tiles.values() {
            recover(slot.lock()).prune(before);
        }
    }

    /// Return every non-spawn tile to neutral; spawn tiles keep their team
    pub fn reset(&self, at: Timestamp) {
        for slot in self.tiles.values() {
            let mut slot = recover(slot.lock());
            let owner = slot.spawn_owner;
            slot.control.owner = owner;
            slot.control.captured_at = None;
            slot.control.protected_until = at;
            slot.control.altar_from = None;
            slot.history = vec![(at, owner)];
            slot.contest = None;
        }
    }
}
