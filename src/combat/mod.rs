//! Combat: element advantage, decay multipliers and exchange resolution

pub mod decay;
pub mod element;
pub mod resolver;

pub use decay::{BattleRecord, DecayCalculator, DecayFactors};
pub use element::{Element, ElementAdvantageTable, Relation};
pub use resolver::{CombatActor, CombatOutcome, CombatResolver, CombatSquad, Exchange, Multipliers};
