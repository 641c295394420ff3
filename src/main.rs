//! Sect War - headless battle simulation
//!
//! Enrolls a set of generated sects, matches them into one battlefield,
//! plays a seeded battle with scripted players and prints the final
//! rankings as JSON.

use std::path::PathBuf;

use clap::Parser;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::runtime::Runtime;

use sect_war::battlefield::{
    ActionResult, BattlefieldOrchestrator, LogBroadcaster, MemoryStore,
};
use sect_war::combat::Element;
use sect_war::core::error::Result;
use sect_war::core::types::{PlayerId, TeamId, Timestamp, MS_PER_MINUTE, MS_PER_SECOND};
use sect_war::core::WarConfig;
use sect_war::grid::HexCoord;
use sect_war::matchmaking::{MatchmakingService, TeamProfile};
use sect_war::protocol::{ActionPayload, ActionRequest};

/// Saturday 2024-06-01 20:00 at UTC+8, inside the default weekly window
const DEFAULT_START: Timestamp = 1_717_243_200_000;

#[derive(Parser, Debug)]
#[command(name = "sect-war", about = "Run a seeded headless sect battle")]
struct Args {
    /// TOML config file; defaults apply to anything it leaves out
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sects on the battlefield
    #[arg(short, long, default_value_t = 8)]
    teams: usize,

    /// Players per sect
    #[arg(short, long, default_value_t = 5)]
    players: u64,

    /// Battle length in minutes
    #[arg(short, long, default_value_t = 60)]
    minutes: i64,

    /// Seed for both the battlefield and the scripted players
    #[arg(short, long)]
    seed: Option<u64>,

    /// Battle start, ms since the Unix epoch
    #[arg(long, default_value_t = DEFAULT_START)]
    start: Timestamp,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sect_war=info".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => WarConfig::load(path)?,
        None => WarConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.battle.seed = seed;
    }
    config.battle.duration_ms = args.minutes.max(1) * MS_PER_MINUTE;
    config.matchmaking.battlefield_size = args.teams.clamp(1, config.map.spawn_count);
    config.validate()?;

    let rt = Runtime::new()?;
    rt.block_on(run(config, &args))
}

fn sect_profiles(count: usize, rng: &mut ChaCha8Rng) -> Vec<TeamProfile> {
    (1..=count as u32)
        .map(|id| TeamProfile {
            member_count: rng.gen_range(20..=40),
            level: rng.gen_range(3..=10),
            power: rng.gen_range(2_000_000..=6_000_000),
            monthly_spending: rng.gen_range(50.0..=200.0),
            activity: rng.gen_range(55.0..=95.0),
            fee_paid: 10_000,
            battles_fought: rng.gen_range(0..=3),
            ..TeamProfile::new(TeamId::new(id), format!("Sect {id}"))
        })
        .collect()
}

async fn run(config: WarConfig, args: &Args) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.battle.seed ^ 0x5ec7);
    let start = args.start;

    let matchmaking = MatchmakingService::with_bands(config.matchmaking.clone());
    let profiles = sect_profiles(config.matchmaking.battlefield_size, &mut rng);
    for profile in &profiles {
        matchmaking.enroll(profile.clone(), start)?;
    }
    let teams = matchmaking.find_balanced_match(TeamId::new(1), start)?;

    let mut battlefield =
        BattlefieldOrchestrator::new(config.clone(), teams.clone(), LogBroadcaster, MemoryStore::default(), start)?;

    for profile in profiles.iter().filter(|p| teams.contains(&p.id) && p.is_newcomer()) {
        battlefield.mark_newcomer(profile.id)?;
    }

    let mut roster = Vec::new();
    for team in &teams {
        for n in 0..args.players {
            let player = PlayerId::new(team.0 as u64 * 1_000 + n);
            let element = *Element::ALL.choose(&mut rng).unwrap_or(&Element::Metal);
            let power = rng.gen_range(800.0..=1_500.0);
            battlefield.join_player(player, *team, element, power, start)?;
            roster.push(player);
        }
    }

    battlefield.start(start).await?;

    // slow enough to cross a sky river legally
    let step = 15 * MS_PER_SECOND;
    let end = start + config.battle.duration_ms;
    let mut now = start;
    let mut captures = 0usize;
    let mut kills = 0usize;
    let mut rejected = 0usize;
    // the closing tick is left to `end`
    while now + step < end {
        now += step;
        roster.shuffle(&mut rng);
        for player in &roster {
            let Some(request) = scripted_action(&battlefield, *player, now, &mut rng).await else {
                continue;
            };
            match battlefield.handle_action(&request, now).await {
                Ok(ActionResult::Captured { .. }) => captures += 1,
                Ok(ActionResult::Fought { killed: true, .. }) => kills += 1,
                Ok(ActionResult::Rejected(_)) => rejected += 1,
                Ok(_) => {}
                Err(e) => tracing::debug!(player = %player, error = %e, "action failed"),
            }
        }
        battlefield.tick(now).await?;
    }

    let snapshot = battlefield.end(end).await?;
    tracing::info!(captures, kills, rejected, checksum = %snapshot.checksum, "simulation finished");

    let rankings = battlefield.rankings(1, teams.len());
    println!("{}", serde_json::to_string_pretty(&rankings)?);
    Ok(())
}

/// Pick something sensible for a scripted player: revive when down, take a
/// neighbouring tile, hit an adjacent enemy, otherwise walk towards the core.
async fn scripted_action(
    battlefield: &BattlefieldOrchestrator<LogBroadcaster, MemoryStore>,
    player: PlayerId,
    now: Timestamp,
    rng: &mut ChaCha8Rng,
) -> Option<ActionRequest> {
    let state = battlefield.player(player)?;
    if !state.alive {
        if let Err(e) = battlefield.revive(player, now).await {
            tracing::trace!(player = %player, error = %e, "still down");
        }
        return None;
    }

    let grid = battlefield.grid();
    let control = battlefield.control();
    let around = grid.tiles_in_range(state.position, 1);

    let target_tile = around.iter().copied().find(|c| {
        grid.get(*c)
            .is_some_and(|t| t.terrain.is_passable() && !t.kind.is_spawn())
            && control.owner(*c).ok().flatten() != Some(state.team)
    });
    if let Some(tile) = target_tile.filter(|_| rng.gen_bool(0.6)) {
        return Some(ActionRequest::new(player, now, ActionPayload::Capture { tile }));
    }

    let enemy = battlefield.players().into_iter().find(|p| {
        p.team != state.team && p.alive && p.position.distance(&state.position) <= 1
    });
    if let Some(enemy) = enemy {
        return Some(ActionRequest::new(
            player,
            now,
            ActionPayload::Attack {
                target: enemy.player,
                reported_power: Some(state.power),
            },
        ));
    }

    let mut steps: Vec<HexCoord> = grid
        .neighbors(state.position)
        .ok()?
        .into_iter()
        .filter(|c| grid.get(*c).is_some_and(|t| t.terrain.is_passable()))
        .collect();
    steps.shuffle(rng);
    steps.sort_by_key(|c| c.distance(&HexCoord::ORIGIN));
    let to = *steps.first()?;
    Some(ActionRequest::new(
        player,
        now,
        ActionPayload::Move {
            to,
            teleport: false,
        },
    ))
}
