//! Game Logic Module
//!
//! The duel itself. Synchronous and transport-agnostic; given the same
//! dice stream it always produces the same match.
//!
//! ## Module Structure
//!
//! - `rank`: Dice ranking and comparison
//! - `dice`: Dice streams (seeded PRNG or scripted)
//! - `state`: Match state, player sides, the throw/keep/reveal machine
//! - `events`: Events emitted by the state machine
//! - `bot`: Threshold bot opponent
//! - `side`: Acting-side capability (bot or remote participant)
//! - `view`: Per-viewer redacted snapshots

pub mod rank;
pub mod dice;
pub mod state;
pub mod events;
pub mod bot;
pub mod side;
pub mod view;

// Re-export key types
pub use rank::{rank, compare, Comparison, DicePair, DiceRank, MEXICO_RANK};
pub use dice::{DiceRoller, ScriptedDice};
pub use state::{
    MatchState, PlayerSide, PlayerId, Seat, MatchPhase, EndReason, IllegalAction,
    InvariantViolation, StateError, KeepOutcome, RoundSummary, ThrowOutcome,
};
pub use events::{GameEvent, GameEventData};
pub use bot::{BotAgent, BotTurn};
pub use side::{ActingSide, RemoteSide, TurnProgress};
pub use view::{project, MatchView, SideView, ThrowView};
