//! Five-element advantage table
//!
//! The elements form a single cycle: Metal overcomes Wood, Wood overcomes
//! Earth, Earth overcomes Water, Water overcomes Fire, Fire overcomes Metal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::config::CombatConfig;
use crate::core::error::{Result, WarError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Element {
    Metal,
    Wood,
    Earth,
    Water,
    Fire,
}

impl Element {
    pub const ALL: [Element; 5] = [
        Element::Metal,
        Element::Wood,
        Element::Earth,
        Element::Water,
        Element::Fire,
    ];

    /// The element this one overcomes
    pub fn overcomes(&self) -> Element {
        match self {
            Element::Metal => Element::Wood,
            Element::Wood => Element::Earth,
            Element::Earth => Element::Water,
            Element::Water => Element::Fire,
            Element::Fire => Element::Metal,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Element::Metal => "metal",
            Element::Wood => "wood",
            Element::Earth => "earth",
            Element::Water => "water",
            Element::Fire => "fire",
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Element {
    type Err = WarError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        Element::ALL
            .into_iter()
            .find(|e| e.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| WarError::InvalidElement(s.to_string()))
    }
}

/// How an attacking element relates to a defending one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    Counters,
    CounteredBy,
    SameElement,
    Neutral,
}

impl Relation {
    pub fn between(attacker: Element, defender: Element) -> Relation {
        if attacker == defender {
            Relation::SameElement
        } else if attacker.overcomes() == defender {
            Relation::Counters
        } else if defender.overcomes() == attacker {
            Relation::CounteredBy
        } else {
            Relation::Neutral
        }
    }
}

/// Maps element pairs to damage multipliers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementAdvantageTable {
    pub counters: f64,
    pub countered_by: f64,
    pub same_element: f64,
    pub neutral: f64,
}

impl Default for ElementAdvantageTable {
    fn default() -> Self {
        Self::from_config(&CombatConfig::default())
    }
}

impl ElementAdvantageTable {
    pub fn from_config(config: &CombatConfig) -> Self {
        Self {
            counters: config.counter_multiplier,
            countered_by: config.countered_multiplier,
            same_element: config.same_element_multiplier,
            neutral: config.neutral_multiplier,
        }
    }

    pub fn relation(&self, attacker: Element, defender: Element) -> Relation {
        Relation::between(attacker, defender)
    }

    pub fn multiplier(&self, attacker: Element, defender: Element) -> f64 {
        match Relation::between(attacker, defender) {
            Relation::Counters => self.counters,
            Relation::CounteredBy => self.countered_by,
            Relation::SameElement => self.same_element,
            Relation::Neutral => self.neutral,
        }
    }

    /// Multiplier for element names, rejecting empty or unknown names
    pub fn multiplier_by_name(&self, attacker: &str, defender: &str) -> Result<f64> {
        Ok(self.multiplier(attacker.parse()?, defender.parse()?))
    }
}
