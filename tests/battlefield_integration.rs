//! Battlefield lifecycle integration tests

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use sect_war::anticheat::movement::required_travel_ms;
use sect_war::anticheat::ViolationKind;
use sect_war::battlefield::*;
use sect_war::combat::Element;
use sect_war::core::error::{ErrorCategory, Result, WarError};
use sect_war::core::types::{PlayerId, TeamId, Timestamp, MS_PER_MINUTE, MS_PER_SECOND};
use sect_war::core::WarConfig;
use sect_war::grid::HexCoord;
use sect_war::protocol::{ActionPayload, ActionRequest, StateDelta};

const START: Timestamp = 1_717_243_200_000;

/// Fails the first `failures` broadcasts, records the rest
#[derive(Default)]
struct FlakyBroadcaster {
    failures: AtomicU32,
    delivered: Mutex<Vec<StateDelta>>,
}

impl FlakyBroadcaster {
    fn failing(n: u32) -> Self {
        Self {
            failures: AtomicU32::new(n),
            delivered: Mutex::new(Vec::new()),
        }
    }

    fn delivered(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

impl Broadcaster for FlakyBroadcaster {
    async fn broadcast(&self, delta: &StateDelta) -> Result<()> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(WarError::Config("broadcast channel closed".into()));
        }
        self.delivered.lock().unwrap().push(delta.clone());
        Ok(())
    }
}

type Field = BattlefieldOrchestrator<FlakyBroadcaster, MemoryStore>;

fn config() -> WarConfig {
    let mut config = WarConfig::default();
    config.battle.backoff_base_ms = 1;
    config
}

fn field_with(config: WarConfig, broadcaster: FlakyBroadcaster) -> Field {
    let teams = vec![TeamId::new(1), TeamId::new(2)];
    BattlefieldOrchestrator::new(config, teams, broadcaster, MemoryStore::default(), START).unwrap()
}

async fn started(config: WarConfig) -> Field {
    let mut field = field_with(config, FlakyBroadcaster::default());
    field
        .join_player(PlayerId::new(1), TeamId::new(1), Element::Fire, 5_000.0, START)
        .unwrap();
    field
        .join_player(PlayerId::new(2), TeamId::new(2), Element::Fire, 100.0, START)
        .unwrap();
    field.start(START).await.unwrap();
    field
}

fn request(player: u64, at: Timestamp, payload: ActionPayload) -> ActionRequest {
    ActionRequest::new(PlayerId::new(player), at, payload)
}

/// A neutral, capturable tile next to the player
fn free_neighbor(field: &Field, player: u64) -> HexCoord {
    let position = field.player(PlayerId::new(player)).unwrap().position;
    field
        .grid()
        .tiles_in_range(position, 1)
        .into_iter()
        .find(|c| {
            let tile = field.grid().get(*c).unwrap();
            tile.terrain.is_passable()
                && !tile.kind.is_spawn()
                && field.control().owner(*c).unwrap().is_none()
        })
        .unwrap()
}

#[tokio::test]
async fn test_capture_then_tick_scores() {
    let field = started(config()).await;
    let tile = free_neighbor(&field, 1);
    let value = field.grid().tile(tile).unwrap().point_value() as f64;

    let result = field
        .handle_action(&request(1, START + 1_000, ActionPayload::Capture { tile }), START + 1_000)
        .await
        .unwrap();
    let ActionResult::Captured { outcome, delta } = result else {
        panic!("expected a capture, got {result:?}");
    };
    assert_eq!(outcome.points_awarded as f64, value);
    assert_eq!(delta.tile_updates[0].owner, Some(TeamId::new(1)));
    assert_eq!(field.ledger().total(TeamId::new(1)).unwrap(), value);

    // one minute: the captured tile plus the spawn tile
    let tick = field.tick(START + MS_PER_MINUTE).await.unwrap().unwrap();
    let total = field.ledger().total(TeamId::new(1)).unwrap();
    assert!((total - (2.0 * value + 5.0)).abs() < 1e-9);
    assert_eq!(tick.score_updates.len(), 2);

    // retrying the same instant changes nothing
    assert!(field.tick(START + MS_PER_MINUTE).await.unwrap().is_none());
    assert_eq!(field.ledger().total(TeamId::new(1)).unwrap(), total);
}

#[tokio::test]
async fn test_recapture_by_owner_is_rejected_input() {
    let field = started(config()).await;
    let tile = free_neighbor(&field, 1);
    let capture = ActionPayload::Capture { tile };
    field
        .handle_action(&request(1, START + 1_000, capture.clone()), START + 1_000)
        .await
        .unwrap();
    let err = field
        .handle_action(&request(1, START + 3_000, capture), START + 3_000)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::RejectedInput);
}

#[tokio::test]
async fn test_speed_hack_changes_nothing() {
    let field = started(config()).await;
    let before = field.player(PlayerId::new(1)).unwrap().position;
    let far = HexCoord::new(-before.q, -before.r);
    let result = field
        .handle_action(
            &request(1, START + 100, ActionPayload::Move { to: far, teleport: false }),
            START + 100,
        )
        .await
        .unwrap();
    assert!(result.is_rejected());
    assert_eq!(field.player(PlayerId::new(1)).unwrap().position, before);
    assert_eq!(field.validator().threats().history(PlayerId::new(1)).len(), 1);
    assert_eq!(field.broadcaster().delivered(), 1);
}

#[tokio::test]
async fn test_teleport_and_kill() {
    let field = started(config()).await;
    let t = START + 20 * MS_PER_SECOND;
    for (player, to) in [(1, HexCoord::new(1, 0)), (2, HexCoord::new(2, 0))] {
        let result = field
            .handle_action(&request(player, t, ActionPayload::Move { to, teleport: true }), t)
            .await
            .unwrap();
        assert!(matches!(result, ActionResult::Moved(_)), "{result:?}");
    }
    assert_eq!(field.player(PlayerId::new(1)).unwrap().teleport_charges, 2);

    let t = t + 2 * MS_PER_SECOND;
    let attack = ActionPayload::Attack {
        target: PlayerId::new(2),
        reported_power: Some(5_000.0),
    };
    let result = field.handle_action(&request(1, t, attack), t).await.unwrap();
    let ActionResult::Fought { outcome, killed, delta } = result else {
        panic!("expected a fight, got {result:?}");
    };
    assert!(outcome.victory);
    assert!(killed);

    let victim = field.player(PlayerId::new(2)).unwrap();
    assert!(!victim.alive);
    assert_eq!(victim.deaths, 1);
    // tile points plus the kill score, nothing else has been scored yet
    let gained: f64 = delta
        .score_updates
        .iter()
        .filter(|u| u.team == TeamId::new(1))
        .map(|u| u.delta)
        .sum();
    assert!(gained > outcome.points_awarded as f64);
    assert!((field.ledger().total(TeamId::new(1)).unwrap() - gained).abs() < 1e-9);

    let err = field.revive(PlayerId::new(2), t + 1_000).await.unwrap_err();
    assert!(matches!(err, WarError::RevivalCooldown(_)));
    let update = field
        .revive(PlayerId::new(2), t + 2 * MS_PER_MINUTE)
        .await
        .unwrap();
    assert!(update.alive);
    assert_eq!(update.position, victim.spawn);
}

#[tokio::test]
async fn test_reconnect_gets_verified_snapshot() {
    let field = started(config()).await;
    let result = field
        .handle_action(&request(2, START + 500, ActionPayload::Reconnect), START + 500)
        .await
        .unwrap();
    let ActionResult::Resync(snapshot) = result else {
        panic!("expected a snapshot");
    };
    assert_eq!(snapshot.phase, BattlePhase::Active);
    assert_eq!(snapshot.tiles.len(), field.grid().len());
    assert_eq!(snapshot.players.len(), 2);
    assert!(snapshot.verify().unwrap());
}

#[tokio::test]
async fn test_actions_before_start() {
    let field = field_with(config(), FlakyBroadcaster::default());
    field
        .join_player(PlayerId::new(1), TeamId::new(1), Element::Wood, 1_000.0, START)
        .unwrap();
    let position = field.player(PlayerId::new(1)).unwrap().position;
    let err = field
        .apply_action(
            &request(1, START + 10_000, ActionPayload::Capture { tile: position }),
            START + 10_000,
        )
        .unwrap_err();
    assert!(matches!(err, WarError::BattleNotActive));
    let lobby = field
        .apply_action(&request(1, START + 11_000, ActionPayload::LobbyVisit), START + 11_000)
        .unwrap();
    assert_eq!(lobby, ActionResult::Accepted);
    assert!(matches!(field.tick(START + MS_PER_MINUTE).await, Err(WarError::BattleNotActive)));
}

#[tokio::test]
async fn test_unknown_player_and_team() {
    let field = started(config()).await;
    let err = field
        .apply_action(&request(99, START, ActionPayload::LobbyVisit), START)
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotFound);
    let err = field
        .join_player(PlayerId::new(5), TeamId::new(7), Element::Water, 10.0, START)
        .unwrap_err();
    assert!(matches!(err, WarError::UnknownTeam(_)));
}

#[tokio::test]
async fn test_broadcast_retried_with_backoff() {
    let mut field = field_with(config(), FlakyBroadcaster::failing(2));
    field.start(START).await.unwrap();
    assert_eq!(field.broadcaster().delivered(), 1);
}

#[tokio::test]
async fn test_broadcast_exhaustion_surfaces_collaborator_error() {
    let mut field = field_with(config(), FlakyBroadcaster::failing(10));
    let err = field.start(START).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Collaborator);
    // the state change stands
    assert_eq!(field.phase(), BattlePhase::Active);
}

#[tokio::test]
async fn test_end_persists_sealed_snapshot() {
    let field = started(config()).await;
    let end = START + 30 * MS_PER_MINUTE;
    let snapshot = field.end(end).await.unwrap();
    assert_eq!(snapshot.phase, BattlePhase::Ended);
    assert_eq!(field.store().len(), 1);
    assert!(field.store().latest().unwrap().verify().unwrap());
    // both spawn tiles scored for 30 minutes
    for entry in &snapshot.scores {
        assert!(entry.score >= 150.0);
    }
    assert!(matches!(field.end(end).await, Err(WarError::BattleNotActive)));
}

#[tokio::test]
async fn test_schedule_enforced_start() {
    let mut config = config();
    config.battle.enforce_schedule = true;
    let mut field = field_with(config.clone(), FlakyBroadcaster::default());
    // a Saturday morning, outside the evening window
    assert!(field.start(START - 6 * 60 * MS_PER_MINUTE).await.is_err());
    assert_eq!(field.phase(), BattlePhase::Preparing);

    let mut field = field_with(config, FlakyBroadcaster::default());
    assert!(field.start(START + 5 * MS_PER_MINUTE).await.is_ok());
}

#[tokio::test]
async fn test_season_reset() {
    let mut field = started(config()).await;
    let tile = free_neighbor(&field, 1);
    field
        .handle_action(&request(1, START + 1_000, ActionPayload::Capture { tile }), START + 1_000)
        .await
        .unwrap();
    let spawn = field.grid().spawn_tiles()[0];

    field.reset_season(START + MS_PER_MINUTE);
    assert_eq!(field.phase(), BattlePhase::Preparing);
    assert_eq!(field.control().owner(tile).unwrap(), None);
    assert_eq!(field.control().owner(spawn).unwrap(), Some(TeamId::new(1)));
    assert!(field.ledger().totals().iter().all(|(_, total)| *total == 0.0));
    assert!(field.players().is_empty());
}

#[test]
fn test_duplicate_or_oversized_team_list() {
    let err = BattlefieldOrchestrator::new(
        config(),
        vec![TeamId::new(1), TeamId::new(1)],
        LogBroadcaster,
        MemoryStore::default(),
        START,
    )
    .err()
    .unwrap();
    assert!(matches!(err, WarError::DuplicateTeam(_)));

    let teams = (0..25).map(TeamId::new).collect();
    let err = BattlefieldOrchestrator::new(config(), teams, LogBroadcaster, MemoryStore::default(), START)
        .err()
        .unwrap();
    assert!(matches!(err, WarError::InvalidTeamComposition(_)));
}

#[tokio::test]
async fn test_suspended_player_is_locked_out() {
    let field = started(config()).await;
    let position = field.player(PlayerId::new(2)).unwrap().position;
    let far = HexCoord::new(-position.q, -position.r);
    for i in 0..3 {
        let t = START + 1_000 * (i + 1);
        let payload = ActionPayload::Move { to: far, teleport: false };
        assert!(field.handle_action(&request(2, t, payload), t).await.unwrap().is_rejected());
    }
    let t = START + 10_000;
    let ActionResult::Rejected(verdict) = field
        .handle_action(&request(2, t, ActionPayload::LobbyVisit), t)
        .await
        .unwrap()
    else {
        panic!("suspended player got through");
    };
    assert_eq!(verdict.reason, Some(ViolationKind::PlayerSuspended));

    // and cannot rejoin while the suspension lasts
    let err = field
        .join_player(PlayerId::new(2), TeamId::new(2), Element::Fire, 100.0, t)
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::PolicyViolation);
}

#[tokio::test]
async fn test_stronger_capture_at_the_same_instant_wins_either_order() {
    let field = started(config()).await;
    let t = START + 20 * MS_PER_SECOND;
    for (player, to) in [(1, HexCoord::new(1, 0)), (2, HexCoord::new(2, 0))] {
        field
            .handle_action(&request(player, t, ActionPayload::Move { to, teleport: true }), t)
            .await
            .unwrap();
    }

    // the weaker side reaches the server first
    let tile = HexCoord::new(1, 0);
    let value = field.grid().tile(tile).unwrap().point_value() as f64;
    let t = t + 2 * MS_PER_SECOND;
    let first = field
        .handle_action(&request(2, t, ActionPayload::Capture { tile }), t)
        .await
        .unwrap();
    assert!(matches!(first, ActionResult::Captured { .. }), "{first:?}");
    assert_eq!(field.ledger().total(TeamId::new(2)).unwrap(), value);

    let second = field
        .handle_action(&request(1, t, ActionPayload::Capture { tile }), t)
        .await
        .unwrap();
    let ActionResult::Captured { outcome, delta } = second else {
        panic!("expected the stronger capture to stand, got {second:?}");
    };
    assert_eq!(outcome.team, TeamId::new(1));
    let lost = outcome.displaced.unwrap();
    assert_eq!((lost.team, lost.player), (TeamId::new(2), PlayerId::new(2)));
    assert!(delta
        .score_updates
        .iter()
        .any(|u| u.team == TeamId::new(2) && u.delta == -value));

    assert_eq!(field.control().owner(tile).unwrap(), Some(TeamId::new(1)));
    assert_eq!(field.control().owner_at(tile, t).unwrap(), Some(TeamId::new(1)));
    assert_eq!(field.ledger().total(TeamId::new(1)).unwrap(), value);
    assert_eq!(field.ledger().total(TeamId::new(2)).unwrap(), 0.0);
    let contributions = field.member_contributions(TeamId::new(2)).unwrap();
    assert!(contributions.iter().all(|c| c.points == 0.0));
}

#[tokio::test]
async fn test_battle_closes_once_its_time_is_up() {
    let field = started(config()).await;
    let tile = free_neighbor(&field, 1);
    let late = START + 2 * 60 * MS_PER_MINUTE;

    let err = field
        .apply_action(&request(1, late, ActionPayload::Capture { tile }), late)
        .unwrap_err();
    assert!(matches!(err, WarError::BattleNotActive));
    assert_eq!(field.control().owner(tile).unwrap(), None);
    assert_eq!(field.ledger().total(TeamId::new(1)).unwrap(), 0.0);
    assert!(matches!(
        field.revive(PlayerId::new(2), late).await,
        Err(WarError::BattleNotActive)
    ));
    // nothing closes the battle until the next tick
    assert_eq!(field.phase(), BattlePhase::Active);

    let last = field.tick(late).await.unwrap().unwrap();
    assert!(!last.score_updates.is_empty());
    assert_eq!(field.phase(), BattlePhase::Ended);
    assert_eq!(field.store().len(), 1);
    let sealed = field.store().latest().unwrap();
    assert!(sealed.verify().unwrap());
    assert_eq!(sealed.phase, BattlePhase::Ended);
    // scoring stops at the scheduled end, not at the late tick
    let hour_of_spawn = field.ledger().total(TeamId::new(1)).unwrap();
    assert!(hour_of_spawn >= 300.0 && hour_of_spawn < 600.0, "{hour_of_spawn}");

    assert!(matches!(field.tick(late + MS_PER_MINUTE).await, Err(WarError::BattleNotActive)));
    assert!(matches!(field.end(late).await, Err(WarError::BattleNotActive)));
    assert_eq!(field.store().len(), 1);
}

#[tokio::test]
async fn test_newcomer_main_hall_is_shielded() {
    let mut field = field_with(config(), FlakyBroadcaster::default());
    field.mark_newcomer(TeamId::new(2)).unwrap();
    assert!(matches!(
        field.mark_newcomer(TeamId::new(9)),
        Err(WarError::UnknownTeam(_))
    ));
    field
        .join_player(PlayerId::new(1), TeamId::new(1), Element::Fire, 5_000.0, START)
        .unwrap();
    field
        .join_player(PlayerId::new(2), TeamId::new(2), Element::Fire, 100.0, START)
        .unwrap();
    assert_eq!(field.shield_until(TeamId::new(2)), None);
    field.start(START).await.unwrap();

    let until = START + 15 * MS_PER_MINUTE;
    assert_eq!(field.shield_until(TeamId::new(2)), Some(until));
    assert_eq!(field.shield_until(TeamId::new(1)), None);

    let attack = ActionPayload::Attack {
        target: PlayerId::new(2),
        reported_power: Some(5_000.0),
    };
    let t = START + 5 * MS_PER_SECOND;
    let err = field
        .handle_action(&request(1, t, attack.clone()), t)
        .await
        .unwrap_err();
    assert!(matches!(err, WarError::MainHallShielded { team, until: u } if team == TeamId::new(2) && u == until));
    assert_eq!(err.category(), ErrorCategory::RejectedInput);
    assert!(field.player(PlayerId::new(2)).unwrap().alive);

    let t = until + MS_PER_SECOND;
    let result = field.handle_action(&request(1, t, attack), t).await.unwrap();
    assert!(matches!(result, ActionResult::Fought { .. }), "{result:?}");
}

#[tokio::test]
async fn test_star_altars_rise_half_an_hour_in() {
    let field = started(config()).await;
    let due = START + 30 * MS_PER_MINUTE;
    let sites = field.control().altar_sites().to_vec();
    assert_eq!(sites.len(), 2);
    for site in &sites {
        assert_eq!(field.control().control(*site).unwrap().altar_from, Some(due));
    }

    let site = sites[0];
    field
        .handle_action(&request(1, due, ActionPayload::Move { to: site, teleport: true }), due)
        .await
        .unwrap();
    let t = due + 2 * MS_PER_SECOND;
    let result = field
        .handle_action(&request(1, t, ActionPayload::Capture { tile: site }), t)
        .await
        .unwrap();
    let ActionResult::Captured { outcome, .. } = result else {
        panic!("expected a capture, got {result:?}");
    };
    assert_eq!(outcome.points_awarded, 500);
}

#[tokio::test]
async fn test_trailing_team_moves_faster() {
    let field = started(config()).await;
    field.ledger().add_points(TeamId::new(1), 1_000.0, None).unwrap();
    let buff = field
        .ledger()
        .balance()
        .speed_multiplier(TeamId::new(2), &field.ledger().totals());
    assert!(buff > 1.0);

    let from = field.player(PlayerId::new(2)).unwrap().position;
    let to = field
        .grid()
        .neighbors(from)
        .unwrap()
        .into_iter()
        .find(|c| field.grid().get(*c).is_some_and(|t| t.terrain.is_passable()))
        .unwrap();
    let rules = config();
    let anticheat = &rules.anticheat;
    let required = required_travel_ms(field.grid(), anticheat, &[from, to], 1.0);
    let elapsed = (required / buff).ceil() as i64 + 1;
    // too quick for anyone without the aura
    assert!((elapsed as f64) < required * (1.0 - anticheat.movement_tolerance));

    let t = START + elapsed;
    let result = field
        .handle_action(&request(2, t, ActionPayload::Move { to, teleport: false }), t)
        .await
        .unwrap();
    assert!(matches!(result, ActionResult::Moved(_)), "{result:?}");
    assert_eq!(field.player(PlayerId::new(2)).unwrap().position, to);
}
