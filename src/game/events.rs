//! Game Events
//!
//! Everything the state machine decides is logged here as it happens. The
//! coordinator drains the log after each action and fans it out to both
//! seats, redacting what a viewer is not allowed to see.

use serde::{Serialize, Deserialize};

use crate::game::rank::{DicePair, DiceRank};
use crate::game::state::{EndReason, RoundSummary, Seat, ThrowOutcome};

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameEventData {
    /// A side threw the dice
    ThrowMade(ThrowOutcome),

    /// A side stood on its throw
    Kept {
        /// Side that kept
        seat: Seat,
        /// Rank kept; hidden from the opponent while blind
        rank: DiceRank,
        /// Turn holder afterwards (None during the opening or on resolution)
        next_turn: Option<Seat>,
    },

    /// A blind throw was uncovered by its owner
    Revealed {
        /// Owner of the throw
        seat: Seat,
        /// Uncovered faces
        dice: DicePair,
        /// Uncovered rank
        rank: DiceRank,
    },

    /// Both sides kept and the round was decided
    RoundResolved(RoundSummary),

    /// Match ended
    MatchEnded {
        /// Winning seat (None when aborted)
        winner: Option<Seat>,
        /// Why it ended
        reason: EndReason,
        /// Final lives, seat A first
        lives: [u8; 2],
    },
}

impl GameEventData {
    /// Short name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GameEventData::ThrowMade(_) => "throw_made",
            GameEventData::Kept { .. } => "kept",
            GameEventData::Revealed { .. } => "revealed",
            GameEventData::RoundResolved(_) => "round_resolved",
            GameEventData::MatchEnded { .. } => "match_ended",
        }
    }

    /// Seat that caused the event, if a single one did.
    pub fn actor(&self) -> Option<Seat> {
        match self {
            GameEventData::ThrowMade(outcome) => Some(outcome.seat),
            GameEventData::Kept { seat, .. } => Some(*seat),
            GameEventData::Revealed { seat, .. } => Some(*seat),
            GameEventData::RoundResolved(_) | GameEventData::MatchEnded { .. } => None,
        }
    }
}

/// A game event stamped with the state version it produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// State version after the event
    pub version: u64,

    /// Round the event belongs to
    pub round: u32,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(version: u64, round: u32, data: GameEventData) -> Self {
        Self { version, round, data }
    }

    /// Create throw made event.
    pub fn throw_made(version: u64, round: u32, outcome: ThrowOutcome) -> Self {
        Self::new(version, round, GameEventData::ThrowMade(outcome))
    }

    /// Create kept event.
    pub fn kept(
        version: u64,
        round: u32,
        seat: Seat,
        rank: DiceRank,
        next_turn: Option<Seat>,
    ) -> Self {
        Self::new(version, round, GameEventData::Kept { seat, rank, next_turn })
    }

    /// Create revealed event.
    pub fn revealed(version: u64, round: u32, seat: Seat, dice: DicePair, rank: DiceRank) -> Self {
        Self::new(version, round, GameEventData::Revealed { seat, dice, rank })
    }

    /// Create round resolved event.
    pub fn round_resolved(version: u64, summary: RoundSummary) -> Self {
        let round = summary.round;
        Self::new(version, round, GameEventData::RoundResolved(summary))
    }

    /// Create match ended event.
    pub fn match_ended(
        version: u64,
        round: u32,
        winner: Option<Seat>,
        reason: EndReason,
        lives: [u8; 2],
    ) -> Self {
        Self::new(version, round, GameEventData::MatchEnded { winner, reason, lives })
    }
}

impl PartialOrd for GameEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GameEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Sort by: version, then actor seat
        self.version
            .cmp(&other.version)
            .then(self.data.actor().cmp(&other.data.actor()))
    }
}
