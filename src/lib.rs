//! # Mexico Duel Server
//!
//! Authoritative server for the two-player dice game Mexico, played as a
//! lives-based duel against another participant or a server bot.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    MEXICO DUEL SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  └── rng.rs      - Xorshift128+ PRNG, match seed derivation  │
//! │                                                              │
//! │  game/           - Duel rules (pure, synchronous)            │
//! │  ├── rank.rs     - Dice ranking and comparison               │
//! │  ├── dice.rs     - Dice streams                              │
//! │  ├── state.rs    - Match state machine                       │
//! │  ├── events.rs   - Events drained after each mutation        │
//! │  ├── bot.rs      - Threshold bot                             │
//! │  ├── side.rs     - Bot / remote acting sides                 │
//! │  └── view.rs     - Per-viewer hidden-information snapshots   │
//! │                                                              │
//! │  network/        - Networking (async)                        │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── auth.rs     - JWT identity                              │
//! │  ├── coordinator.rs - Match authority and registry           │
//! │  ├── matchmaker.rs  - FIFO pairing                           │
//! │  └── rate_limit.rs  - Per-connection token bucket            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! `core/` and `game/` never read the clock or the OS RNG. Given the same
//! dice stream and the same actions a match always plays out the same way;
//! the production stream is seeded per match from fresh entropy.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use crate::core::rng::DeterministicRng;
pub use game::rank::{rank, compare, DicePair, DiceRank, MEXICO_RANK};
pub use game::state::{MatchState, PlayerId, Seat, STARTING_LIVES, MAX_THROWS};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
