//! Discount eligibility matching and venue ranking.
//!
//! [`catalog`] holds the immutable, atomically swapped program catalog; [`recommend`] evaluates
//! programs against a user and a set of candidate venues and ranks the venues.

pub mod catalog;
pub mod config;
pub mod error;
pub mod recommend;
pub mod telemetry;
