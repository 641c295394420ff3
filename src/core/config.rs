//! Battle configuration with documented constants
//!
//! All thresholds used by the engine are collected here. Each component
//! receives the section it needs at construction; nothing reads a global.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, WarError};
use crate::core::types::{MS_PER_HOUR, MS_PER_MINUTE, MS_PER_SECOND};

/// Top-level configuration, loadable from TOML.
///
/// Every section falls back to its defaults, so a partial file only needs
/// the values it overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WarConfig {
    pub map: MapConfig,
    pub control: ControlConfig,
    pub scoring: ScoringConfig,
    pub decay: DecayConfig,
    pub combat: CombatConfig,
    pub matchmaking: MatchmakingConfig,
    pub anticheat: AntiCheatConfig,
    pub battle: BattleConfig,
    pub schedule: ScheduleConfig,
}

impl WarConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: WarConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "loading config");
        Self::from_toml_str(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        self.map.validate()?;
        self.scoring.validate()?;
        self.decay.validate()?;
        self.combat.validate()?;
        self.matchmaking.validate()?;
        self.anticheat.validate()?;
        self.battle.validate()?;
        self.schedule.validate()?;
        if self.control.protection_ms <= 0 {
            return Err(WarError::Config("protection_ms must be positive".into()));
        }
        if self.control.altar_spawn_after_ms < 0 {
            return Err(WarError::Config("altar_spawn_after_ms must not be negative".into()));
        }
        if self.battle.duration_ms < self.scoring.end_game_window_ms {
            return Err(WarError::Config(format!(
                "battle duration ({}) is shorter than the end-game window ({})",
                self.battle.duration_ms, self.scoring.end_game_window_ms
            )));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(WarError::Config(format!("{name} ({value}) must be in (0, 1]")));
    }
    Ok(())
}

// === MAP ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Hexagon radius. Radius 6 yields the standard 127-tile map.
    pub radius: u32,
    /// Spawn tiles placed on the outer ring, one per participating team
    pub spawn_count: usize,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            radius: 6,
            spawn_count: 20,
        }
    }
}

impl MapConfig {
    fn validate(&self) -> Result<()> {
        let ring = 6 * self.radius as usize;
        if self.radius < 4 || self.spawn_count > ring {
            return Err(WarError::Config(format!(
                "radius {} cannot hold {} spawn tiles on its outer ring",
                self.radius, self.spawn_count
            )));
        }
        Ok(())
    }
}

// === CONTROL POINTS ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Maximum hex distance between the actor and the tile it captures
    pub capture_range: u32,
    /// Protection window after a capture during which other teams cannot take it
    pub protection_ms: i64,

    // Star altars: strong neutral points raised partway into the battle
    /// Delay after the battle start before the altars appear
    pub altar_spawn_after_ms: i64,
    pub altar_count: usize,
    /// Points for taking a raised altar
    pub altar_capture_points: u32,
    /// Holding value of a raised altar, per minute like tile values
    pub altar_points_per_minute: u32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            capture_range: 1,
            protection_ms: 30 * MS_PER_SECOND,
            altar_spawn_after_ms: 30 * MS_PER_MINUTE,
            altar_count: 2,
            altar_capture_points: 500,
            altar_points_per_minute: 300,
        }
    }
}

// === SCORING ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Period of the score tick. Tile values are per minute and are scaled
    /// by `tick_interval_ms / 60_000`.
    pub tick_interval_ms: i64,

    /// Final stretch of the battle in which tick points are multiplied
    pub end_game_window_ms: i64,
    pub end_game_multiplier: f64,

    // Catch-up: deficit is measured against the leader's score
    /// Deficit at which the minor catch-up bonus applies
    pub catch_up_minor_deficit: f64,
    pub catch_up_minor_bonus: f64,
    /// Deficit at which the major catch-up bonus applies
    pub catch_up_major_deficit: f64,
    pub catch_up_major_bonus: f64,
    /// Hard cap on any catch-up bonus
    pub catch_up_cap: f64,

    // Leader penalties
    /// Regeneration reduction applied to the leading team
    pub leader_regen_penalty: f64,
    /// Leader score / average opponent score at which the lead is dominant
    pub dominant_lead_ratio: f64,
    pub dominant_regen_penalty: f64,
    pub dominant_experience_multiplier: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: MS_PER_MINUTE,
            end_game_window_ms: 10 * MS_PER_MINUTE,
            end_game_multiplier: 1.5,
            catch_up_minor_deficit: 0.15,
            catch_up_minor_bonus: 0.10,
            catch_up_major_deficit: 0.50,
            catch_up_major_bonus: 0.20,
            catch_up_cap: 0.20,
            leader_regen_penalty: 0.20,
            dominant_lead_ratio: 1.75,
            dominant_regen_penalty: 0.40,
            dominant_experience_multiplier: 0.8,
        }
    }
}

impl ScoringConfig {
    fn validate(&self) -> Result<()> {
        if self.tick_interval_ms <= 0 {
            return Err(WarError::Config("tick_interval_ms must be positive".into()));
        }
        if self.catch_up_minor_deficit >= self.catch_up_major_deficit {
            return Err(WarError::Config(format!(
                "catch_up_minor_deficit ({}) should be < catch_up_major_deficit ({})",
                self.catch_up_minor_deficit, self.catch_up_major_deficit
            )));
        }
        if self.catch_up_major_bonus > self.catch_up_cap {
            return Err(WarError::Config("catch-up bonus exceeds its cap".into()));
        }
        if self.end_game_multiplier < 1.0 {
            return Err(WarError::Config("end_game_multiplier must be >= 1".into()));
        }
        check_unit("leader_regen_penalty", self.leader_regen_penalty)?;
        check_unit("dominant_regen_penalty", self.dominant_regen_penalty)?;
        check_unit(
            "dominant_experience_multiplier",
            self.dominant_experience_multiplier,
        )
    }
}

// === DECAY ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    /// Rolling window over which past battles drain energy
    pub energy_window_ms: i64,
    /// Energy lost per battle in the window, scaled by recency
    pub per_battle_penalty: f64,
    /// Battles closer together than this count as consecutive
    pub consecutive_gap_ms: i64,
    pub consecutive_penalty: f64,
    pub energy_floor: f64,

    /// Hex distance with no travel penalty
    pub distance_free_range: u32,
    /// Penalty per hex beyond the free range
    pub distance_falloff: f64,
    pub distance_floor: f64,

    /// Resource-pool decay: `max(floor, base^floor((100 - r) / step))`
    pub resource_base: f64,
    pub resource_step: f64,
    pub resource_floor: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            energy_window_ms: MS_PER_HOUR,
            per_battle_penalty: 0.08,
            consecutive_gap_ms: 5 * MS_PER_MINUTE,
            consecutive_penalty: 0.08,
            energy_floor: 0.3,
            distance_free_range: 1,
            distance_falloff: 0.05,
            distance_floor: 0.5,
            resource_base: 0.95,
            resource_step: 10.0,
            resource_floor: 0.5,
        }
    }
}

impl DecayConfig {
    fn validate(&self) -> Result<()> {
        check_unit("energy_floor", self.energy_floor)?;
        check_unit("distance_floor", self.distance_floor)?;
        check_unit("resource_floor", self.resource_floor)?;
        check_unit("resource_base", self.resource_base)?;
        if self.energy_window_ms <= 0 || self.resource_step <= 0.0 {
            return Err(WarError::Config("decay windows must be positive".into()));
        }
        Ok(())
    }
}

// === COMBAT ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Damage never drops below this, however strong the defender
    pub min_damage: f64,

    // Element advantage table
    pub counter_multiplier: f64,
    pub countered_multiplier: f64,
    pub same_element_multiplier: f64,
    pub neutral_multiplier: f64,

    /// Random factor is drawn from `[1 - spread, 1 + spread]`
    pub random_spread: f64,
    /// Upper bound on the compounded multiplier chain
    pub max_compound_multiplier: f64,

    /// Experience per tile point before the outcome multiplier
    pub experience_ratio: f64,
    pub victory_experience_multiplier: f64,
    pub defeat_experience_multiplier: f64,

    /// Kill streak: each streak kill adds this fraction, up to the cap
    pub kill_streak_step: f64,
    pub kill_streak_cap: f64,
    /// Kill score: `base * falloff^(streak - 1)`
    pub kill_score_base: f64,
    pub kill_score_falloff: f64,

    /// Minimum batch size before resolving exchanges in parallel
    pub parallel_threshold: usize,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            min_damage: 1.0,
            counter_multiplier: 1.3,
            countered_multiplier: 0.85,
            same_element_multiplier: 1.2,
            neutral_multiplier: 1.0,
            random_spread: 0.1,
            max_compound_multiplier: 10.0,
            experience_ratio: 0.2,
            victory_experience_multiplier: 1.5,
            defeat_experience_multiplier: 0.5,
            kill_streak_step: 0.15,
            kill_streak_cap: 2.0,
            kill_score_base: 5.0,
            kill_score_falloff: 0.8,
            parallel_threshold: 64,
        }
    }
}

impl CombatConfig {
    fn validate(&self) -> Result<()> {
        if self.min_damage <= 0.0 {
            return Err(WarError::Config("min_damage must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.random_spread) {
            return Err(WarError::Config(format!(
                "random_spread ({}) must be in [0, 1)",
                self.random_spread
            )));
        }
        if self.max_compound_multiplier < 1.0 || self.max_compound_multiplier > 10.0 {
            return Err(WarError::Config(
                "max_compound_multiplier must be in [1, 10]".into(),
            ));
        }
        if self.countered_multiplier >= self.neutral_multiplier
            || self.neutral_multiplier >= self.counter_multiplier
        {
            return Err(WarError::Config(
                "element multipliers must satisfy countered < neutral < counter".into(),
            ));
        }
        Ok(())
    }
}

// === MATCHMAKING ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingConfig {
    /// Teams per battlefield
    pub battlefield_size: usize,

    /// Upper bounds (exclusive) of power bands 1-4; anything above is band 5
    pub power_bands: [u64; 4],
    /// Spending: below the first bound is band 1, up to the second is band 2
    pub spending_bands: [f64; 2],
    /// Activity percentage: below the first bound is band 1, up to the second is band 2
    pub activity_bands: [f64; 2],

    pub max_power_gap: u8,
    pub max_spending_gap: u8,
    /// Largest tolerated member-count difference between two teams
    pub max_member_gap: u32,

    // Qualification
    pub min_members: u32,
    pub min_level: u32,
    pub min_activity: f64,
    pub participation_fee: u64,

    /// Enrolments older than this are dropped from the pool
    pub window_ms: i64,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            battlefield_size: 20,
            power_bands: [1_000_000, 3_000_000, 8_000_000, 20_000_000],
            spending_bands: [50.0, 200.0],
            activity_bands: [50.0, 70.0],
            max_power_gap: 1,
            max_spending_gap: 1,
            max_member_gap: 20,
            min_members: 10,
            min_level: 3,
            min_activity: 50.0,
            participation_fee: 10_000,
            window_ms: 5 * MS_PER_MINUTE,
        }
    }
}

impl MatchmakingConfig {
    fn validate(&self) -> Result<()> {
        if self.battlefield_size < 2 {
            return Err(WarError::Config("battlefield_size must be at least 2".into()));
        }
        if self.power_bands.windows(2).any(|w| w[0] >= w[1]) {
            return Err(WarError::Config("power_bands must be increasing".into()));
        }
        if self.spending_bands[0] >= self.spending_bands[1]
            || self.activity_bands[0] >= self.activity_bands[1]
        {
            return Err(WarError::Config("band thresholds must be increasing".into()));
        }
        Ok(())
    }
}

// === ANTI-CHEAT ===

/// Minimum interval between two actions of the same kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionIntervals {
    pub movement_ms: i64,
    pub attack_ms: i64,
    pub capture_ms: i64,
    pub item_ms: i64,
}

impl Default for ActionIntervals {
    fn default() -> Self {
        Self {
            movement_ms: 100,
            attack_ms: 500,
            capture_ms: 1_000,
            item_ms: 500,
        }
    }
}

/// Sliding-window ceilings per operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub window_ms: i64,
    pub attack: usize,
    pub lobby_visit: usize,
    pub capture: usize,
    pub movement: usize,
    pub default: usize,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            window_ms: MS_PER_MINUTE,
            attack: 10,
            lobby_visit: 20,
            capture: 10,
            movement: 120,
            default: 60,
        }
    }
}

/// Plausibility bounds for resource deltas
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub max_mana: f64,
    pub mana_regen_per_minute: f64,
    /// Mana restored by one spirit dew
    pub spirit_dew_restore: f64,
    /// Mana a skill cast costs
    pub skill_mana_cost: f64,
    /// Largest gap between a reported starting value and the server's
    pub baseline_tolerance: f64,
    pub max_health: f64,
    pub health_regen_per_minute: f64,
    pub max_experience_per_minute: f64,
    pub max_currency_per_minute: f64,
    pub max_items_per_battle: f64,
    /// Any reported value beyond this is treated as tampering
    pub absolute_cap: f64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_mana: 100.0,
            mana_regen_per_minute: 1.0,
            spirit_dew_restore: 50.0,
            skill_mana_cost: 20.0,
            baseline_tolerance: 1.0,
            max_health: 10_000.0,
            health_regen_per_minute: 100.0,
            max_experience_per_minute: 1_000.0,
            max_currency_per_minute: 1_000.0,
            max_items_per_battle: 10.0,
            absolute_cap: 1.0e12,
        }
    }
}

/// Threat scoring and sanctions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatConfig {
    pub low_weight: u32,
    pub medium_weight: u32,
    pub high_weight: u32,
    pub critical_weight: u32,
    /// Violations older than this no longer count
    pub window_ms: i64,
    /// Score at which a temporary suspension starts (three High violations)
    pub suspension_threshold: u32,
    pub ban_threshold: u32,
    pub suspension_ms: i64,
    pub ban_ms: i64,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            low_weight: 1,
            medium_weight: 3,
            high_weight: 10,
            critical_weight: 25,
            window_ms: 24 * MS_PER_HOUR,
            suspension_threshold: 30,
            ban_threshold: 100,
            suspension_ms: 24 * MS_PER_HOUR,
            ban_ms: 30 * 24 * MS_PER_HOUR,
        }
    }
}

/// Thresholds for automated behaviour analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Minimum action samples before timing analysis is meaningful
    pub min_samples: usize,
    /// Interval standard deviation below which timing is machine-regular
    pub regular_timing_stddev_ms: f64,
    /// Share of actions at an identical position that indicates scripting
    pub identical_position_ratio: f64,
    pub superhuman_reaction_ms: i64,
    /// Battles shorter than this are suspicious
    pub min_battle_ms: i64,
    pub rapid_win_count: usize,
    pub rapid_win_window_ms: i64,
    pub min_battles_for_win_rate: usize,
    pub impossible_win_rate: f64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            regular_timing_stddev_ms: 5.0,
            identical_position_ratio: 0.9,
            superhuman_reaction_ms: 80,
            min_battle_ms: MS_PER_MINUTE,
            rapid_win_count: 10,
            rapid_win_window_ms: 10 * MS_PER_MINUTE,
            min_battles_for_win_rate: 20,
            impossible_win_rate: 0.95,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiCheatConfig {
    // === MOVEMENT ===
    /// Fastest legitimate pace on plain terrain, before buffs
    pub min_ms_per_tile: i64,
    /// Largest speed buff a player can legitimately carry
    pub max_speed_buff: f64,
    /// Fraction of the required time forgiven for latency
    pub movement_tolerance: f64,
    pub max_teleport_charges: u32,

    // === TIMING ===
    /// How far ahead of the server a client clock may run
    pub clock_drift_tolerance_ms: i64,
    /// How far behind the server a client timestamp may lag
    pub max_client_lag_ms: i64,
    pub intervals: ActionIntervals,

    pub rate_limits: RateLimits,
    pub resources: ResourceLimits,

    /// Tolerated relative error between reported and server combat power
    pub power_report_tolerance: f64,

    pub threat: ThreatConfig,
    pub behavior: BehaviorConfig,

    /// Latency budget for one validation; over-budget checks fail closed
    pub validation_budget_ms: u64,
    /// Minimum batch size before validating in parallel
    pub parallel_threshold: usize,
}

impl Default for AntiCheatConfig {
    fn default() -> Self {
        Self {
            min_ms_per_tile: 6_000,
            max_speed_buff: 2.0,
            movement_tolerance: 0.1,
            max_teleport_charges: 3,
            clock_drift_tolerance_ms: 200,
            max_client_lag_ms: 10 * MS_PER_SECOND,
            intervals: ActionIntervals::default(),
            rate_limits: RateLimits::default(),
            resources: ResourceLimits::default(),
            power_report_tolerance: 0.05,
            threat: ThreatConfig::default(),
            behavior: BehaviorConfig::default(),
            validation_budget_ms: 50,
            parallel_threshold: 64,
        }
    }
}

impl AntiCheatConfig {
    fn validate(&self) -> Result<()> {
        if self.min_ms_per_tile <= 0 || self.max_speed_buff < 1.0 {
            return Err(WarError::Config(
                "movement pacing must be positive and buffs >= 1".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.movement_tolerance) {
            return Err(WarError::Config("movement_tolerance must be in [0, 1)".into()));
        }
        if self.rate_limits.window_ms <= 0 {
            return Err(WarError::Config("rate limit window must be positive".into()));
        }
        let t = &self.threat;
        if !(t.low_weight <= t.medium_weight
            && t.medium_weight <= t.high_weight
            && t.high_weight <= t.critical_weight)
        {
            return Err(WarError::Config("threat weights must rise with severity".into()));
        }
        if t.suspension_threshold >= t.ban_threshold {
            return Err(WarError::Config(format!(
                "suspension_threshold ({}) should be < ban_threshold ({})",
                t.suspension_threshold, t.ban_threshold
            )));
        }
        Ok(())
    }
}

// === BATTLE ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    pub duration_ms: i64,
    pub starting_health: f64,
    pub starting_mana: f64,
    /// Cloud charms carried into battle
    pub teleport_charges: u32,
    /// Spirit dew carried into battle
    pub spirit_dew: u32,

    pub max_revivals: u32,
    pub revive_cooldown_ms: i64,
    pub invulnerability_ms: i64,
    /// Main-hall shield for sects in their first battle, from the start
    pub newbie_shield_ms: i64,

    /// Attempts for each broadcast or snapshot write before giving up
    pub collaborator_attempts: u32,
    /// First retry delay; doubles on each attempt
    pub backoff_base_ms: u64,

    /// Refuse to start outside a scheduled battle window
    pub enforce_schedule: bool,
    /// Seed for the battlefield's combat random stream
    pub seed: u64,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            duration_ms: MS_PER_HOUR,
            starting_health: 1_000.0,
            starting_mana: 100.0,
            teleport_charges: 3,
            spirit_dew: 10,
            max_revivals: 3,
            revive_cooldown_ms: 2 * MS_PER_MINUTE,
            invulnerability_ms: 10 * MS_PER_SECOND,
            newbie_shield_ms: 15 * MS_PER_MINUTE,
            collaborator_attempts: 3,
            backoff_base_ms: 50,
            enforce_schedule: false,
            seed: 42,
        }
    }
}

impl BattleConfig {
    fn validate(&self) -> Result<()> {
        if self.duration_ms <= 0 || self.starting_health <= 0.0 {
            return Err(WarError::Config(
                "duration and starting health must be positive".into(),
            ));
        }
        if self.newbie_shield_ms < 0 {
            return Err(WarError::Config("newbie_shield_ms must not be negative".into()));
        }
        if self.collaborator_attempts == 0 {
            return Err(WarError::Config("collaborator_attempts must be >= 1".into()));
        }
        Ok(())
    }
}

// === SCHEDULE ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Fixed offset of the server's battle calendar from UTC
    pub utc_offset_hours: i32,
    /// Weekly battle day, 0 = Monday ... 6 = Sunday
    pub weekly_weekday: u32,
    pub weekly_start_hour: u32,
    pub weekly_duration_minutes: u32,
    /// Monthly battle runs on the last Sunday of each month
    pub monthly_start_hour: u32,
    pub monthly_duration_minutes: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 8,
            weekly_weekday: 5,
            weekly_start_hour: 20,
            weekly_duration_minutes: 60,
            monthly_start_hour: 20,
            monthly_duration_minutes: 120,
        }
    }
}

impl ScheduleConfig {
    fn validate(&self) -> Result<()> {
        if self.weekly_weekday > 6
            || self.weekly_start_hour > 23
            || self.monthly_start_hour > 23
            || self.utc_offset_hours.abs() > 14
        {
            return Err(WarError::Config("schedule fields out of range".into()));
        }
        Ok(())
    }
}
