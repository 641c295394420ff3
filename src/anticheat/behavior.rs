//! Statistical behaviour analysis over a player's recent activity

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::anticheat::verdict::{Severity, Verdict, ViolationKind};
use crate::core::config::BehaviorConfig;
use crate::core::error::{Result, WarError};
use crate::core::types::Timestamp;
use crate::grid::HexCoord;

/// One observed input
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservedAction {
    pub at: Timestamp,
    pub target: HexCoord,
    /// Time from the stimulus (e.g. an enemy appearing) to this input
    pub reaction_ms: Option<i64>,
}

/// Summary of one finished battle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BattleSummary {
    pub ended_at: Timestamp,
    pub duration_ms: i64,
    pub won: bool,
    pub own_power: f64,
    pub opponent_power: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pattern {
    RegularTiming,
    IdenticalPositions,
    SuperhumanReaction,
    RapidConsecutiveWins,
    UnusuallyShortBattles,
    ImpossibleWinRate,
}

fn verdict_for(kind: ViolationKind, found: Vec<(Pattern, Severity)>, evidence: serde_json::Value) -> Verdict {
    match found.iter().map(|(_, s)| *s).max() {
        Some(severity) => {
            let patterns: Vec<Pattern> = found.into_iter().map(|(p, _)| p).collect();
            Verdict::reject(kind, severity, json!({ "patterns": patterns, "stats": evidence }))
        }
        None => Verdict::pass(),
    }
}

/// Look for scripted input: machine-regular timing, clicks always on the
/// same spot, reactions faster than a person can manage.
pub fn analyze_actions(config: &BehaviorConfig, actions: &[ObservedAction]) -> Result<Verdict> {
    if actions.is_empty() {
        return Err(WarError::NoBehaviorData);
    }
    let mut found = Vec::new();

    let mut times: Vec<Timestamp> = actions.iter().map(|a| a.at).collect();
    times.sort_unstable();
    let intervals: Vec<f64> = times.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    let mut stddev = None;
    if intervals.len() >= config.min_samples {
        let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
        let variance =
            intervals.iter().map(|i| (i - mean).powi(2)).sum::<f64>() / intervals.len() as f64;
        let sd = variance.sqrt();
        stddev = Some(sd);
        if sd < config.regular_timing_stddev_ms {
            found.push((Pattern::RegularTiming, Severity::High));
        }
    }

    let mut identical_ratio = None;
    if actions.len() >= config.min_samples {
        let first = actions[0].target;
        let same = actions.iter().filter(|a| a.target == first).count();
        let ratio = same as f64 / actions.len() as f64;
        identical_ratio = Some(ratio);
        if ratio >= config.identical_position_ratio {
            found.push((Pattern::IdenticalPositions, Severity::Medium));
        }
    }

    let reactions: Vec<i64> = actions.iter().filter_map(|a| a.reaction_ms).collect();
    let mut mean_reaction = None;
    if reactions.len() >= 3 {
        let mean = reactions.iter().sum::<i64>() as f64 / reactions.len() as f64;
        mean_reaction = Some(mean);
        if mean < config.superhuman_reaction_ms as f64 {
            found.push((Pattern::SuperhumanReaction, Severity::High));
        }
    }

    Ok(verdict_for(
        ViolationKind::BotBehavior,
        found,
        json!({
            "samples": actions.len(),
            "interval_stddev_ms": stddev,
            "identical_position_ratio": identical_ratio,
            "mean_reaction_ms": mean_reaction,
        }),
    ))
}

/// Look for farming or collusion in battle results
pub fn analyze_battles(config: &BehaviorConfig, battles: &[BattleSummary]) -> Result<Verdict> {
    if battles.is_empty() {
        return Err(WarError::NoBehaviorData);
    }
    let mut found = Vec::new();

    let mut wins: Vec<Timestamp> = battles.iter().filter(|b| b.won).map(|b| b.ended_at).collect();
    wins.sort_unstable();
    let rapid = config.rapid_win_count;
    let rapid_streak = rapid > 0
        && wins.len() >= rapid
        && wins
            .windows(rapid)
            .any(|w| w[rapid - 1] - w[0] <= config.rapid_win_window_ms);
    if rapid_streak {
        found.push((Pattern::RapidConsecutiveWins, Severity::Medium));
    }

    let short = battles
        .iter()
        .filter(|b| b.duration_ms < config.min_battle_ms)
        .count();
    if short >= 3 && short * 2 >= battles.len() {
        found.push((Pattern::UnusuallyShortBattles, Severity::Medium));
    }

    let win_rate = wins.len() as f64 / battles.len() as f64;
    let outmatched = battles
        .iter()
        .filter(|b| b.opponent_power > b.own_power)
        .count();
    if battles.len() >= config.min_battles_for_win_rate
        && win_rate >= config.impossible_win_rate
        && outmatched * 2 > battles.len()
    {
        found.push((Pattern::ImpossibleWinRate, Severity::High));
    }

    Ok(verdict_for(
        ViolationKind::SuspiciousBattlePattern,
        found,
        json!({
            "battles": battles.len(),
            "win_rate": win_rate,
            "short_battles": short,
            "outmatched": outmatched,
        }),
    ))
}
