//! Battlefield orchestration
//!
//! Owns one battlefield's engines and player states and is the only place
//! that talks to external collaborators. Every inbound action is validated
//! before it can mutate anything; every mutation yields a [`StateDelta`]
//! which is handed to the broadcaster with retry and backoff.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ahash::{AHashMap, AHashSet};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::anticheat::{ActionValidator, AntiCheatValidator, Verdict};
use crate::battlefield::schedule::BattleSchedule;
use crate::battlefield::snapshot::BattlefieldSnapshot;
use crate::battlefield::state::{BattlePhase, PlayerBattleState};
use crate::combat::{CombatOutcome, CombatResolver, CombatSquad, Element};
use crate::core::config::WarConfig;
use crate::core::error::{recover, Result, WarError};
use crate::core::types::{BattlefieldId, PlayerId, TeamId, Timestamp, MS_PER_MINUTE};
use crate::grid::{HexCoord, HexGrid};
use crate::protocol::{ActionPayload, ActionRequest, ItemKind, PlayerUpdate, ScoreUpdate, StateDelta};
use crate::territory::{
    CaptureAttempt, CaptureOutcome, ControlPointEngine, MemberContribution, RankingPage,
    ScoreLedger, ScoreTick,
};

/// Real-time fan-out to everyone watching a battlefield
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, delta: &StateDelta) -> impl Future<Output = Result<()>> + Send;
}

/// Durable storage for finished or checkpointed battlefields
pub trait SnapshotStore: Send + Sync {
    fn save(&self, snapshot: &BattlefieldSnapshot) -> impl Future<Output = Result<()>> + Send;
}

/// Broadcaster that only logs; for headless runs
#[derive(Debug, Default)]
pub struct LogBroadcaster;

impl Broadcaster for LogBroadcaster {
    async fn broadcast(&self, delta: &StateDelta) -> Result<()> {
        tracing::debug!(
            battlefield = %delta.battlefield,
            tiles = delta.tile_updates.len(),
            scores = delta.score_updates.len(),
            players = delta.player_updates.len(),
            "delta"
        );
        Ok(())
    }
}

/// Keeps saved snapshots in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Vec<BattlefieldSnapshot>>,
}

impl MemoryStore {
    pub fn latest(&self) -> Option<BattlefieldSnapshot> {
        recover(self.saved.lock()).last().cloned()
    }

    pub fn len(&self) -> usize {
        recover(self.saved.lock()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotStore for MemoryStore {
    async fn save(&self, snapshot: &BattlefieldSnapshot) -> Result<()> {
        recover(self.saved.lock()).push(snapshot.clone());
        Ok(())
    }
}

/// What happened to one inbound action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionResult {
    /// Refused by anti-cheat; nothing changed
    Rejected(Verdict),
    Moved(StateDelta),
    Captured {
        outcome: CaptureOutcome,
        delta: StateDelta,
    },
    Fought {
        outcome: CombatOutcome,
        killed: bool,
        delta: StateDelta,
    },
    ItemUsed {
        restored: f64,
        delta: StateDelta,
    },
    /// Valid, with no battlefield change to publish
    Accepted,
    Resync(Box<BattlefieldSnapshot>),
}

impl ActionResult {
    pub fn delta(&self) -> Option<&StateDelta> {
        match self {
            ActionResult::Moved(delta)
            | ActionResult::Captured { delta, .. }
            | ActionResult::Fought { delta, .. }
            | ActionResult::ItemUsed { delta, .. } => Some(delta),
            _ => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ActionResult::Rejected(_))
    }
}

struct Skirmish {
    outcome: CombatOutcome,
    killed: bool,
    gains: Vec<(TeamId, f64)>,
    updates: Vec<PlayerUpdate>,
}

#[derive(Debug, Clone, Copy)]
struct Clock {
    phase: BattlePhase,
    started_at: Option<Timestamp>,
    ends_at: Option<Timestamp>,
}

pub struct BattlefieldOrchestrator<B, S, V = AntiCheatValidator>
where
    B: Broadcaster,
    S: SnapshotStore,
    V: ActionValidator,
{
    id: BattlefieldId,
    config: WarConfig,
    grid: Arc<HexGrid>,
    teams: Vec<TeamId>,
    control: ControlPointEngine,
    ledger: ScoreLedger,
    resolver: CombatResolver,
    schedule: BattleSchedule,
    validator: V,
    broadcaster: B,
    store: S,
    players: Mutex<AHashMap<PlayerId, PlayerBattleState>>,
    /// Sects in their first battle
    newcomers: Mutex<AHashSet<TeamId>>,
    clock: Mutex<Clock>,
    rng: Mutex<ChaCha8Rng>,
}

impl<B: Broadcaster, S: SnapshotStore> BattlefieldOrchestrator<B, S> {
    /// Battlefield on the standard map with the stock anti-cheat validator
    pub fn new(
        config: WarConfig,
        teams: Vec<TeamId>,
        broadcaster: B,
        store: S,
        now: Timestamp,
    ) -> Result<Self> {
        let grid = Arc::new(HexGrid::standard(&config.map));
        let validator = AntiCheatValidator::new(grid.clone(), config.anticheat.clone());
        Self::with_validator(config, grid, teams, validator, broadcaster, store, now)
    }
}

impl<B, S, V> BattlefieldOrchestrator<B, S, V>
where
    B: Broadcaster,
    S: SnapshotStore,
    V: ActionValidator,
{
    pub fn with_validator(
        config: WarConfig,
        grid: Arc<HexGrid>,
        teams: Vec<TeamId>,
        validator: V,
        broadcaster: B,
        store: S,
        now: Timestamp,
    ) -> Result<Self> {
        config.validate()?;
        if teams.is_empty() || teams.len() > grid.spawn_tiles().len() {
            return Err(WarError::InvalidTeamComposition(format!(
                "{} teams for {} spawn tiles",
                teams.len(),
                grid.spawn_tiles().len()
            )));
        }
        let mut seen = teams.clone();
        seen.sort();
        if let Some(pair) = seen.windows(2).find(|w| w[0] == w[1]) {
            return Err(WarError::DuplicateTeam(pair[0]));
        }

        let id = BattlefieldId::new();
        let control = ControlPointEngine::new(grid.clone(), config.control.clone(), &teams, now);
        let ledger = ScoreLedger::new(
            config.scoring.clone(),
            &teams,
            now,
            now + config.battle.duration_ms,
        );
        tracing::info!(battlefield = %id, teams = teams.len(), tiles = grid.len(), "battlefield created");

        Ok(Self {
            id,
            control,
            ledger,
            resolver: CombatResolver::new(config.combat.clone(), config.decay.clone()),
            schedule: BattleSchedule::new(config.schedule.clone())?,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(config.battle.seed)),
            validator,
            broadcaster,
            store,
            players: Mutex::new(AHashMap::new()),
            newcomers: Mutex::new(AHashSet::new()),
            clock: Mutex::new(Clock {
                phase: BattlePhase::Preparing,
                started_at: None,
                ends_at: None,
            }),
            grid,
            teams,
            config,
        })
    }

    pub fn id(&self) -> BattlefieldId {
        self.id
    }

    pub fn grid(&self) -> &HexGrid {
        &self.grid
    }

    pub fn teams(&self) -> &[TeamId] {
        &self.teams
    }

    pub fn control(&self) -> &ControlPointEngine {
        &self.control
    }

    pub fn ledger(&self) -> &ScoreLedger {
        &self.ledger
    }

    pub fn validator(&self) -> &V {
        &self.validator
    }

    pub fn broadcaster(&self) -> &B {
        &self.broadcaster
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn phase(&self) -> BattlePhase {
        recover(self.clock.lock()).phase
    }

    pub fn player(&self, player: PlayerId) -> Option<PlayerBattleState> {
        recover(self.players.lock()).get(&player).cloned()
    }

    /// Every player on the battlefield, ordered by id
    pub fn players(&self) -> Vec<PlayerBattleState> {
        let mut all: Vec<PlayerBattleState> =
            recover(self.players.lock()).values().cloned().collect();
        all.sort_by_key(|p| p.player);
        all
    }

    /// The clock, if the battle is running at `now`. Past `ends_at` the
    /// battle is over even before the closing tick has run.
    fn ensure_active(&self, now: Timestamp) -> Result<Clock> {
        let clock = *recover(self.clock.lock());
        match clock.phase {
            BattlePhase::Active if clock.ends_at.map_or(true, |end| now < end) => Ok(clock),
            _ => Err(WarError::BattleNotActive),
        }
    }

    /// Give a sect in its first battle the newbie main-hall shield
    pub fn mark_newcomer(&self, team: TeamId) -> Result<()> {
        if !self.teams.contains(&team) {
            return Err(WarError::UnknownTeam(team));
        }
        recover(self.newcomers.lock()).insert(team);
        Ok(())
    }

    /// End of the team's main-hall shield; `None` before the start or for
    /// a veteran sect
    pub fn shield_until(&self, team: TeamId) -> Option<Timestamp> {
        let started_at = recover(self.clock.lock()).started_at;
        self.shield_from(started_at, team)
    }

    fn shield_from(&self, started_at: Option<Timestamp>, team: TeamId) -> Option<Timestamp> {
        let start = started_at?;
        recover(self.newcomers.lock())
            .contains(&team)
            .then_some(start + self.config.battle.newbie_shield_ms)
    }

    /// Put a player on the battlefield at their team's spawn tile
    pub fn join_player(
        &self,
        player: PlayerId,
        team: TeamId,
        element: Element,
        power: f64,
        now: Timestamp,
    ) -> Result<PlayerUpdate> {
        if self.phase() == BattlePhase::Ended {
            return Err(WarError::BattleNotActive);
        }
        if let Some(until) = self.validator.sanctioned_until(player, now) {
            return Err(WarError::PlayerSuspended { player, until });
        }
        let slot = self
            .teams
            .iter()
            .position(|t| *t == team)
            .ok_or(WarError::UnknownTeam(team))?;
        let spawn = self
            .grid
            .spawn_tiles()
            .get(slot)
            .copied()
            .ok_or_else(|| WarError::InvalidTeamComposition(format!("no spawn for {team}")))?;
        if !power.is_finite() || power < 0.0 {
            return Err(WarError::InvalidTeamComposition(format!(
                "{player} has invalid power {power}"
            )));
        }

        let mut players = recover(self.players.lock());
        if players.contains_key(&player) {
            return Err(WarError::InvalidAction(format!("{player} already joined")));
        }
        let state =
            PlayerBattleState::new(player, team, element, power, spawn, &self.config.battle, now);
        let update = state.update();
        players.insert(player, state);
        tracing::debug!(player = %player, team = %team, spawn = ?spawn, "player joined");
        Ok(update)
    }

    /// Open the battle. With `enforce_schedule` the start must fall inside a
    /// scheduled window.
    pub async fn start(&mut self, now: Timestamp) -> Result<StateDelta> {
        {
            let mut clock = recover(self.clock.lock());
            if clock.phase != BattlePhase::Preparing {
                return Err(WarError::InvalidAction(format!(
                    "battlefield is {:?}, not preparing",
                    clock.phase
                )));
            }
            if self.config.battle.enforce_schedule && !self.schedule.is_active_window(now) {
                return Err(WarError::InvalidAction("outside a scheduled battle window".into()));
            }
            let ends_at = now + self.config.battle.duration_ms;
            clock.phase = BattlePhase::Active;
            clock.started_at = Some(now);
            clock.ends_at = Some(ends_at);
            self.control.reset(now);
            self.control
                .schedule_altars(now + self.config.control.altar_spawn_after_ms);
            self.ledger.reschedule(now, ends_at);
        }
        tracing::info!(battlefield = %self.id, at = now, "battle started");

        let mut delta = StateDelta::new(self.id, now);
        delta.tile_updates = self.control.snapshot();
        delta.score_updates = self.score_updates(&[]);
        delta.player_updates = self.player_updates();
        self.publish(&delta).await?;
        Ok(delta)
    }

    fn score_updates(&self, gains: &[(TeamId, f64)]) -> Vec<ScoreUpdate> {
        self.ledger
            .totals()
            .into_iter()
            .map(|(team, total)| ScoreUpdate {
                team,
                total,
                delta: gains
                    .iter()
                    .filter(|(t, _)| *t == team)
                    .map(|(_, g)| *g)
                    .sum(),
            })
            .collect()
    }

    fn player_updates(&self) -> Vec<PlayerUpdate> {
        let mut updates: Vec<PlayerUpdate> = recover(self.players.lock())
            .values()
            .map(|p| p.update())
            .collect();
        updates.sort_by_key(|u| u.player);
        updates
    }

    /// Validate and apply one action without publishing
    pub fn apply_action(&self, request: &ActionRequest, now: Timestamp) -> Result<ActionResult> {
        let (mut context, team) = recover(self.players.lock())
            .get(&request.player)
            .map(|p| (p.context(), p.team))
            .ok_or(WarError::UnknownPlayer(request.player))?;
        context.speed_buff = self
            .ledger
            .balance()
            .speed_multiplier(team, &self.ledger.totals());

        let verdict = self.validator.validate(request, &context, now);
        if !verdict.valid {
            return Ok(ActionResult::Rejected(verdict));
        }

        let mut delta = StateDelta::new(self.id, now);
        match &request.payload {
            ActionPayload::Reconnect => Ok(ActionResult::Resync(Box::new(self.snapshot(now)?))),
            ActionPayload::LobbyVisit | ActionPayload::ResourceSync { .. } => {
                Ok(ActionResult::Accepted)
            }
            ActionPayload::Move { to, teleport } => {
                self.ensure_active(now)?;
                let mut players = recover(self.players.lock());
                let state = players
                    .get_mut(&request.player)
                    .ok_or(WarError::UnknownPlayer(request.player))?;
                state.move_to(*to, *teleport, now)?;
                delta.player_updates.push(state.update());
                Ok(ActionResult::Moved(delta))
            }
            ActionPayload::Capture { tile } => {
                self.ensure_active(now)?;
                let outcome = self.capture(request.player, *tile, now)?;
                delta.tile_updates.push(self.control.control(*tile)?);
                let mut gains = vec![(outcome.team, outcome.points_awarded as f64)];
                if let Some(lost) = outcome.displaced {
                    gains.push((lost.team, -(lost.points as f64)));
                }
                delta.score_updates = self.score_updates(&gains);
                Ok(ActionResult::Captured { outcome, delta })
            }
            ActionPayload::Attack { target, .. } => {
                let clock = self.ensure_active(now)?;
                let skirmish = self.attack(request.player, *target, now, clock.started_at)?;
                delta.player_updates = skirmish.updates;
                delta.score_updates = self.score_updates(&skirmish.gains);
                Ok(ActionResult::Fought {
                    outcome: skirmish.outcome,
                    killed: skirmish.killed,
                    delta,
                })
            }
            ActionPayload::UseItem {
                item: ItemKind::SpiritDew,
            } => {
                self.ensure_active(now)?;
                let mut players = recover(self.players.lock());
                let state = players
                    .get_mut(&request.player)
                    .ok_or(WarError::UnknownPlayer(request.player))?;
                let restored = state.use_spirit_dew(
                    self.config.anticheat.resources.spirit_dew_restore,
                    self.config.anticheat.resources.max_mana,
                )?;
                delta.player_updates.push(state.update());
                Ok(ActionResult::ItemUsed { restored, delta })
            }
        }
    }

    fn capture(&self, player: PlayerId, tile: HexCoord, now: Timestamp) -> Result<CaptureOutcome> {
        let attempt = {
            let players = recover(self.players.lock());
            let state = players.get(&player).ok_or(WarError::UnknownPlayer(player))?;
            if !state.alive {
                return Err(WarError::InvalidAction(format!("{player} is down")));
            }
            CaptureAttempt {
                tile,
                team: state.team,
                player,
                actor_position: state.position,
                combat_power: state.power,
                sequence: self.control.next_sequence(),
                at: now,
            }
        };
        let outcome = self.control.attempt_capture(&attempt)?;
        if let Some(lost) = outcome.displaced {
            self.ledger
                .add_points(lost.team, -(lost.points as f64), Some(lost.player))?;
            tracing::info!(
                player = %lost.player,
                team = %lost.team,
                tile = ?tile,
                points = lost.points,
                "same-instant capture overturned"
            );
        }
        self.ledger
            .add_points(outcome.team, outcome.points_awarded as f64, Some(player))?;
        tracing::info!(
            player = %player,
            team = %outcome.team,
            tile = ?tile,
            previous = ?outcome.previous_owner,
            points = outcome.points_awarded,
            "tile captured"
        );
        Ok(outcome)
    }

    fn attack(
        &self,
        attacker: PlayerId,
        target: PlayerId,
        now: Timestamp,
        started_at: Option<Timestamp>,
    ) -> Result<Skirmish> {
        let in_hall = recover(self.players.lock())
            .get(&target)
            .filter(|d| d.in_main_hall())
            .map(|d| d.team);
        if let Some(team) = in_hall {
            if let Some(until) = self.shield_from(started_at, team).filter(|u| now < *u) {
                return Err(WarError::MainHallShielded { team, until });
            }
        }

        let mut players = recover(self.players.lock());
        let a = players.get(&attacker).ok_or(WarError::UnknownPlayer(attacker))?;
        let d = players.get(&target).ok_or(WarError::UnknownPlayer(target))?;
        if !a.alive || !d.alive {
            return Err(WarError::InvalidAction("both sides must be standing".into()));
        }
        if a.team == d.team {
            return Err(WarError::InvalidAction(format!("{attacker} and {target} are allies")));
        }
        if d.is_invulnerable(now) {
            return Err(WarError::InvalidAction(format!("{target} is invulnerable")));
        }

        let tile = self.grid.tile(d.position)?;
        let attacking = CombatSquad::new(a.team, vec![a.actor()]);
        let defending = CombatSquad::new(d.team, vec![d.actor()]);
        let (attacker_team, defender_team) = (a.team, d.team);
        let outcome = {
            let mut rng = recover(self.rng.lock());
            self.resolver
                .resolve(&attacking, &defending, tile, now, &mut *rng)?
        };

        let totals = self.ledger.totals();
        let penalty = self
            .ledger
            .balance()
            .leader_penalty(&totals)
            .filter(|p| p.team == attacker_team);
        let experience_multiplier = penalty.map_or(1.0, |p| p.experience_multiplier);

        let mut gains = Vec::new();
        let killed = {
            let defender = players
                .get_mut(&target)
                .ok_or(WarError::UnknownPlayer(target))?;
            defender.record_battle(now);
            defender.take_damage(outcome.damage_dealt, now)
        };
        let attacker_state = players
            .get_mut(&attacker)
            .ok_or(WarError::UnknownPlayer(attacker))?;
        attacker_state.record_battle(now);
        let mut experience = outcome.experience * experience_multiplier;
        if outcome.victory && outcome.points_awarded > 0 {
            gains.push((attacker_team, outcome.points_awarded as f64));
        }
        if killed {
            let streak = attacker_state.record_kill();
            experience = self.resolver.kill_streak_bonus(experience, streak);
            gains.push((attacker_team, self.resolver.kill_score(streak)));
        }
        attacker_state.experience += experience;
        let updates = vec![
            attacker_state.update(),
            players
                .get(&target)
                .map(|p| p.update())
                .ok_or(WarError::UnknownPlayer(target))?,
        ];
        drop(players);

        for (team, points) in &gains {
            self.ledger.add_points(*team, *points, Some(attacker))?;
        }
        tracing::debug!(
            attacker = %attacker,
            target = %target,
            defender_team = %defender_team,
            damage = outcome.damage_dealt,
            victory = outcome.victory,
            killed,
            "attack resolved"
        );
        Ok(Skirmish {
            outcome,
            killed,
            gains,
            updates,
        })
    }

    /// Validate, apply and publish one action
    pub async fn handle_action(&self, request: &ActionRequest, now: Timestamp) -> Result<ActionResult> {
        let result = self.apply_action(request, now)?;
        if let Some(delta) = result.delta() {
            self.publish(delta).await?;
        }
        Ok(result)
    }

    /// Bring a downed player back at their spawn
    pub async fn revive(&self, player: PlayerId, now: Timestamp) -> Result<PlayerUpdate> {
        self.ensure_active(now)?;
        let update = {
            let mut players = recover(self.players.lock());
            let state = players
                .get_mut(&player)
                .ok_or(WarError::UnknownPlayer(player))?;
            state.revive(&self.config.battle, now)?;
            state.update()
        };
        let mut delta = StateDelta::new(self.id, now);
        delta.player_updates.push(update);
        self.publish(&delta).await?;
        Ok(update)
    }

    /// Run every score tick due by `now` and regenerate mana. Idempotent:
    /// a retry for an already processed instant changes nothing and
    /// returns `None`. The first tick at or past `ends_at` closes the
    /// battle: it scores up to `ends_at`, publishes the final delta and
    /// persists the snapshot.
    pub async fn tick(&self, now: Timestamp) -> Result<Option<StateDelta>> {
        let clock = *recover(self.clock.lock());
        if clock.phase != BattlePhase::Active {
            return Err(WarError::BattleNotActive);
        }
        if clock.ends_at.is_some_and(|end| now >= end) {
            let ticks = self.close(now)?;
            let delta = self.tick_delta(&ticks, now);
            self.publish(&delta).await?;
            self.seal_and_persist(now).await?;
            return Ok(Some(delta));
        }

        let ticks = self.ledger.tick_scores(&self.control, now);
        if ticks.is_empty() {
            return Ok(None);
        }
        self.regenerate(&ticks);
        let delta = self.tick_delta(&ticks, now);

        let window = self.config.decay.energy_window_ms;
        for state in recover(self.players.lock()).values_mut() {
            state.prune_history(now - window);
        }
        self.validator.compact(now);

        self.publish(&delta).await?;
        Ok(Some(delta))
    }

    fn tick_delta(&self, ticks: &[ScoreTick], now: Timestamp) -> StateDelta {
        let gains: Vec<(TeamId, f64)> = ticks
            .iter()
            .flat_map(|t| &t.awards)
            .map(|award| (award.team, award.points))
            .collect();
        let mut delta = StateDelta::new(self.id, now);
        delta.score_updates = self.score_updates(&gains);
        delta.player_updates = self.player_updates();
        delta
    }

    fn regenerate(&self, ticks: &[ScoreTick]) {
        let resources = &self.config.anticheat.resources;
        let minutes = ticks.len() as f64 * self.config.scoring.tick_interval_ms as f64
            / MS_PER_MINUTE as f64;
        let totals = self.ledger.totals();
        let balance = self.ledger.balance();
        for state in recover(self.players.lock()).values_mut() {
            let multiplier = balance.regen_multiplier(state.team, &totals);
            state.regenerate_mana(
                resources.mana_regen_per_minute * minutes * multiplier,
                resources.max_mana,
            );
        }
    }

    /// Run the final ticks up to `ends_at` (or `now`, if earlier) and move
    /// to `Ended`
    fn close(&self, now: Timestamp) -> Result<Vec<ScoreTick>> {
        let mut clock = recover(self.clock.lock());
        if clock.phase != BattlePhase::Active {
            return Err(WarError::BattleNotActive);
        }
        let end = clock.ends_at.map_or(now, |e| e.min(now));
        let ticks = self.ledger.tick_scores(&self.control, end);
        self.regenerate(&ticks);
        clock.phase = BattlePhase::Ended;
        Ok(ticks)
    }

    async fn seal_and_persist(&self, now: Timestamp) -> Result<BattlefieldSnapshot> {
        let snapshot = self.snapshot(now)?;
        tracing::info!(
            battlefield = %self.id,
            leader = ?snapshot.scores.first().map(|e| e.team),
            "battle ended"
        );
        self.persist(&snapshot).await?;
        Ok(snapshot)
    }

    /// Close the battle, run the final ticks and persist the snapshot
    pub async fn end(&self, now: Timestamp) -> Result<BattlefieldSnapshot> {
        self.close(now)?;
        self.seal_and_persist(now).await
    }

    /// Clear scores and non-spawn ownership for a new season
    pub fn reset_season(&mut self, now: Timestamp) {
        self.ledger.reset();
        self.control.reset(now);
        recover(self.players.lock()).clear();
        recover(self.newcomers.lock()).clear();
        *recover(self.clock.lock()) = Clock {
            phase: BattlePhase::Preparing,
            started_at: None,
            ends_at: None,
        };
        tracing::info!(battlefield = %self.id, "season reset");
    }

    /// The authoritative state, sealed with its checksum
    pub fn snapshot(&self, now: Timestamp) -> Result<BattlefieldSnapshot> {
        let clock = *recover(self.clock.lock());
        BattlefieldSnapshot {
            battlefield: self.id,
            phase: clock.phase,
            taken_at: now,
            started_at: clock.started_at,
            ends_at: clock.ends_at,
            tiles: self.control.snapshot(),
            scores: self.ledger.rankings(1, self.teams.len()).entries,
            players: self.player_updates(),
            checksum: String::new(),
        }
        .seal()
    }

    pub fn rankings(&self, page: usize, page_size: usize) -> RankingPage {
        self.ledger.rankings(page, page_size)
    }

    pub fn member_contributions(&self, team: TeamId) -> Result<Vec<MemberContribution>> {
        self.ledger.member_contributions(team)
    }

    async fn publish(&self, delta: &StateDelta) -> Result<()> {
        self.with_retry("broadcast", || self.broadcaster.broadcast(delta))
            .await
    }

    async fn persist(&self, snapshot: &BattlefieldSnapshot) -> Result<()> {
        self.with_retry("snapshot store", || self.store.save(snapshot))
            .await
    }

    async fn with_retry<F, Fut>(&self, name: &'static str, mut op: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let attempts = self.config.battle.collaborator_attempts.max(1);
        let mut delay = self.config.battle.backoff_base_ms;
        for attempt in 1..=attempts {
            match op().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt == attempts => {
                    tracing::error!(collaborator = name, attempts, error = %e, "giving up");
                    return Err(WarError::Collaborator {
                        name,
                        attempts,
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    tracing::warn!(collaborator = name, attempt, delay_ms = delay, error = %e, "retrying");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    delay = delay.saturating_mul(2);
                }
            }
        }
        Ok(())
    }
}
