//! Per-player battle state: position, vitals, loadout and revival

use serde::{Deserialize, Serialize};

use crate::anticheat::PlayerContext;
use crate::combat::{BattleRecord, CombatActor, Element};
use crate::core::config::BattleConfig;
use crate::core::error::{Result, WarError};
use crate::core::types::{PlayerId, TeamId, Timestamp};
use crate::grid::HexCoord;
use crate::protocol::PlayerUpdate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattlePhase {
    Preparing,
    Active,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerBattleState {
    pub player: PlayerId,
    pub team: TeamId,
    pub element: Element,
    pub power: f64,
    pub position: HexCoord,
    pub position_since: Timestamp,
    pub spawn: HexCoord,
    pub joined_at: Timestamp,

    pub health: f64,
    pub max_health: f64,
    pub mana: f64,
    pub teleport_charges: u32,
    pub spirit_dew: u32,

    pub alive: bool,
    pub died_at: Option<Timestamp>,
    pub revivals_used: u32,
    pub invulnerable_until: Timestamp,

    pub kill_streak: u32,
    pub kills: u32,
    pub deaths: u32,
    pub experience: f64,
    pub history: Vec<BattleRecord>,
}

impl PlayerBattleState {
    pub fn new(
        player: PlayerId,
        team: TeamId,
        element: Element,
        power: f64,
        spawn: HexCoord,
        config: &BattleConfig,
        now: Timestamp,
    ) -> Self {
        Self {
            player,
            team,
            element,
            power,
            position: spawn,
            position_since: now,
            spawn,
            joined_at: now,
            health: config.starting_health,
            max_health: config.starting_health,
            mana: config.starting_mana,
            teleport_charges: config.teleport_charges,
            spirit_dew: config.spirit_dew,
            alive: true,
            died_at: None,
            revivals_used: 0,
            invulnerable_until: now,
            kill_streak: 0,
            kills: 0,
            deaths: 0,
            experience: 0.0,
            history: Vec::new(),
        }
    }

    /// Facts the anti-cheat validator needs about this player. Movement
    /// buffs are the battlefield's to add.
    pub fn context(&self) -> PlayerContext {
        PlayerContext {
            position: self.position,
            position_since: self.position_since,
            teleport_charges: self.teleport_charges,
            speed_buff: 1.0,
            server_power: self.power,
            max_health: self.max_health,
            session_start: self.joined_at,
            mana: Some(self.mana),
            health: Some(self.health),
            experience: Some(self.experience),
        }
    }

    /// Standing on the team's own spawn tile, the sect's main hall
    pub fn in_main_hall(&self) -> bool {
        self.position == self.spawn
    }

    pub fn actor(&self) -> CombatActor {
        CombatActor::new(self.player, self.team, self.power, self.element)
            .at(self.position)
            .with_history(self.history.clone())
    }

    pub fn update(&self) -> PlayerUpdate {
        PlayerUpdate {
            player: self.player,
            team: self.team,
            position: self.position,
            health: self.health,
            mana: self.mana,
            alive: self.alive,
        }
    }

    pub fn is_invulnerable(&self, now: Timestamp) -> bool {
        now < self.invulnerable_until
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.alive {
            Ok(())
        } else {
            Err(WarError::InvalidAction(format!("{} is down", self.player)))
        }
    }

    pub fn move_to(&mut self, to: HexCoord, teleport: bool, now: Timestamp) -> Result<()> {
        self.ensure_alive()?;
        if teleport {
            if self.teleport_charges == 0 {
                return Err(WarError::InvalidAction(format!(
                    "{} has no cloud charms left",
                    self.player
                )));
            }
            self.teleport_charges -= 1;
        }
        self.position = to;
        self.position_since = now;
        Ok(())
    }

    /// Drink one spirit dew; returns the mana restored
    pub fn use_spirit_dew(&mut self, restore: f64, max_mana: f64) -> Result<f64> {
        self.ensure_alive()?;
        if self.spirit_dew == 0 {
            return Err(WarError::InvalidAction(format!(
                "{} has no spirit dew left",
                self.player
            )));
        }
        self.spirit_dew -= 1;
        let before = self.mana;
        self.mana = (self.mana + restore).min(max_mana);
        Ok(self.mana - before)
    }

    pub fn regenerate_mana(&mut self, amount: f64, max_mana: f64) {
        if self.alive {
            self.mana = (self.mana + amount.max(0.0)).min(max_mana);
        }
    }

    /// Apply damage; returns true when this hit knocked the player down
    pub fn take_damage(&mut self, amount: f64, now: Timestamp) -> bool {
        if !self.alive || self.is_invulnerable(now) {
            return false;
        }
        self.health = (self.health - amount.max(0.0)).max(0.0);
        if self.health > 0.0 {
            return false;
        }
        self.alive = false;
        self.died_at = Some(now);
        self.deaths += 1;
        self.kill_streak = 0;
        true
    }

    /// Count a kill; returns the new streak length
    pub fn record_kill(&mut self) -> u32 {
        self.kills += 1;
        self.kill_streak += 1;
        self.kill_streak
    }

    pub fn record_battle(&mut self, now: Timestamp) {
        self.history.push(BattleRecord::new(now));
    }

    /// Drop battle records older than the decay window
    pub fn prune_history(&mut self, before: Timestamp) {
        self.history.retain(|r| r.at >= before);
    }

    pub fn revive_ready_at(&self, config: &BattleConfig) -> Option<Timestamp> {
        self.died_at.map(|t| t + config.revive_cooldown_ms)
    }

    /// Bring the player back at their spawn with full health and a short
    /// invulnerability window.
    pub fn revive(&mut self, config: &BattleConfig, now: Timestamp) -> Result<()> {
        if self.alive {
            return Err(WarError::InvalidAction(format!("{} is not down", self.player)));
        }
        if self.revivals_used >= config.max_revivals {
            return Err(WarError::RevivalLimitReached(config.max_revivals));
        }
        if let Some(ready) = self.revive_ready_at(config) {
            if now < ready {
                return Err(WarError::RevivalCooldown(ready));
            }
        }
        self.revivals_used += 1;
        self.alive = true;
        self.died_at = None;
        self.health = self.max_health;
        self.position = self.spawn;
        self.position_since = now;
        self.invulnerable_until = now + config.invulnerability_ms;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: Timestamp = 1_700_000_000_000;

    fn player() -> PlayerBattleState {
        PlayerBattleState::new(
            PlayerId::new(1),
            TeamId::new(1),
            Element::Fire,
            1_000.0,
            HexCoord::new(6, 0),
            &BattleConfig::default(),
            NOW,
        )
    }

    #[test]
    fn test_loadout_defaults() {
        let p = player();
        assert_eq!(p.teleport_charges, 3);
        assert_eq!(p.spirit_dew, 10);
        assert_eq!(p.mana, 100.0);
        assert!(p.alive);
    }

    #[test]
    fn test_teleport_consumes_charges() {
        let mut p = player();
        for _ in 0..3 {
            p.move_to(HexCoord::new(0, 0), true, NOW).unwrap();
        }
        assert!(p.move_to(HexCoord::new(1, 0), true, NOW).is_err());
        p.move_to(HexCoord::new(1, 0), false, NOW + 6_000).unwrap();
        assert_eq!(p.position_since, NOW + 6_000);
    }

    #[test]
    fn test_spirit_dew_caps_mana() {
        let mut p = player();
        p.mana = 70.0;
        assert_eq!(p.use_spirit_dew(50.0, 100.0).unwrap(), 30.0);
        assert_eq!(p.mana, 100.0);
        assert_eq!(p.spirit_dew, 9);
    }

    #[test]
    fn test_death_and_revival_rules() {
        let config = BattleConfig::default();
        let mut p = player();
        assert!(p.take_damage(5_000.0, NOW));
        assert_eq!(p.kill_streak, 0);
        assert!(matches!(p.revive(&config, NOW + 1_000), Err(WarError::RevivalCooldown(_))));

        let later = NOW + config.revive_cooldown_ms;
        p.revive(&config, later).unwrap();
        assert_eq!(p.health, p.max_health);
        assert_eq!(p.position, p.spawn);
        assert!(p.is_invulnerable(later + 5_000));
        assert!(!p.take_damage(5_000.0, later + 5_000));
        assert!(!p.is_invulnerable(later + config.invulnerability_ms));
    }

    #[test]
    fn test_revival_limit() {
        let config = BattleConfig::default();
        let mut p = player();
        let mut now = NOW;
        for _ in 0..3 {
            now += config.invulnerability_ms;
            assert!(p.take_damage(f64::MAX, now));
            now += config.revive_cooldown_ms;
            p.revive(&config, now).unwrap();
        }
        now += config.invulnerability_ms;
        p.take_damage(f64::MAX, now);
        assert!(matches!(
            p.revive(&config, now + config.revive_cooldown_ms),
            Err(WarError::RevivalLimitReached(3))
        ));
    }

    #[test]
    fn test_dead_player_cannot_act() {
        let mut p = player();
        p.take_damage(f64::MAX, NOW);
        assert!(p.move_to(HexCoord::new(5, 0), false, NOW).is_err());
        assert!(p.use_spirit_dew(50.0, 100.0).is_err());
        p.regenerate_mana(10.0, 100.0);
        assert_eq!(p.mana, 100.0);
    }
}
