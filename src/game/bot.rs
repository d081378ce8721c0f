//! Bot opponent.
//!
//! Plays a whole turn in one synchronous call: keep throwing until the cap,
//! a Mexico, or a rank of at least [`BOT_STAND_THRESHOLD`], then keep the
//! last throw.

use serde::{Serialize, Deserialize};

use crate::game::dice::DiceRoller;
use crate::game::rank::DiceRank;
use crate::game::state::{KeepOutcome, MatchState, Seat, StateError, ThrowOutcome};

/// Lowest rank the bot is satisfied with.
pub const BOT_STAND_THRESHOLD: u16 = 54;

/// Display name used for bot seats.
pub const BOT_NAME: &str = "Bot";

/// Everything the bot did during one turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotTurn {
    /// Throws in order. Never empty.
    pub throws: Vec<ThrowOutcome>,
    /// Result of the closing keep.
    pub keep: KeepOutcome,
}

/// Threshold policy bot.
#[derive(Clone, Copy, Debug)]
pub struct BotAgent {
    stand_threshold: DiceRank,
}

impl Default for BotAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl BotAgent {
    /// Bot with the standard threshold.
    pub const fn new() -> Self {
        Self {
            stand_threshold: DiceRank(BOT_STAND_THRESHOLD),
        }
    }

    /// Does the bot stop on this rank.
    #[inline]
    pub fn satisfied_with(&self, rank: DiceRank) -> bool {
        rank.is_mexico() || rank >= self.stand_threshold
    }

    /// Play `seat`'s whole turn.
    ///
    /// Opening-round throws are made blind, later ones in the open.
    pub fn play_turn(
        &self,
        state: &mut MatchState,
        seat: Seat,
        dice: &mut dyn DiceRoller,
    ) -> Result<BotTurn, StateError> {
        let blind = state.first_round;
        let mut throws = Vec::with_capacity(state.max_throws as usize);

        loop {
            let outcome = state.throw(seat, blind, dice)?;
            throws.push(outcome);
            if outcome.is_last_throw || self.satisfied_with(outcome.rank) {
                break;
            }
        }

        let keep = state.keep(seat)?;
        Ok(BotTurn { throws, keep })
    }
}
