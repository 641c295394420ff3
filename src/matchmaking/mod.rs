//! Matchmaking: team rating bands and battlefield assembly

pub mod rating;
pub mod service;

pub use rating::{BandRater, TeamProfile, TeamRater, TeamRating};
pub use service::{MatchFormation, MatchmakingService};
