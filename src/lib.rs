//! Sect War - territory-control battle engine
//!
//! Server-authoritative core for many sects fighting over a shared hex map:
//! tile capture, time-weighted scoring, element-based combat, matchmaking
//! and anti-cheat validation. The core performs no I/O; external
//! collaborators (broadcast, storage) sit behind traits in `battlefield`.

pub mod anticheat;
pub mod battlefield;
pub mod combat;
pub mod core;
pub mod grid;
pub mod matchmaking;
pub mod protocol;
pub mod territory;
