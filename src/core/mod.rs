//! Core deterministic primitives.
//!
//! Nothing in here knows about dice rules or networking.

pub mod rng;

pub use rng::{DeterministicRng, derive_match_seed};
