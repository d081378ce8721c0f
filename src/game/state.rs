//! Game State Definitions
//!
//! The authoritative duel: two [`PlayerSide`]s, lives, round bookkeeping and
//! the throw / keep / reveal state machine. Pure and synchronous; the
//! network layer owns one of these per match and is the only writer.

use serde::{Serialize, Deserialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::game::dice::DiceRoller;
use crate::game::events::GameEvent;
use crate::game::rank::{compare, Comparison, DicePair, DiceRank};

/// Lives each side starts a match with.
pub const STARTING_LIVES: u8 = 6;

/// Throw cap during the blind opening round.
pub const OPENING_MAX_THROWS: u8 = 1;

/// Throw cap from round 2 onward.
pub const MAX_THROWS: u8 = 3;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Unique player identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub [u8; 16]);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Fresh random identifier (used for bot seats).
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().into_bytes())
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// First four bytes as hex, for log lines.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

// =============================================================================
// SEAT
// =============================================================================

/// One of the two positions at the table.
///
/// Seat A is the first queued participant (or the human in a bot match)
/// and starts round 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    /// First seat.
    A,
    /// Second seat.
    B,
}

impl Seat {
    /// Both seats in table order.
    pub const BOTH: [Seat; 2] = [Seat::A, Seat::B];

    /// Array index of this seat.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Seat::A => 0,
            Seat::B => 1,
        }
    }

    /// The opposing seat.
    #[inline]
    pub const fn other(self) -> Seat {
        match self {
            Seat::A => Seat::B,
            Seat::B => Seat::A,
        }
    }
}

// =============================================================================
// PLAYER SIDE
// =============================================================================

/// One entry of a side's throw history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrowRecord {
    /// Round the throw was made in.
    pub round: u32,
    /// 1-based throw number within the round.
    pub throw_number: u8,
    /// Faces thrown.
    pub dice: DicePair,
    /// Rank of the faces.
    pub rank: DiceRank,
    /// Still concealed.
    pub blind: bool,
}

/// The throw a side currently stands on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentThrow {
    /// Faces thrown.
    pub dice: DicePair,
    /// Rank of the faces.
    pub rank: DiceRank,
    /// Concealed from the owner's display and from the opponent.
    pub blind: bool,
}

/// One combatant's state.
///
/// `lives` and `history` persist for the whole match; everything else is
/// cleared at the start of each round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerSide {
    /// Participant identity.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Lives remaining (match ends when one side reaches 0).
    pub lives: u8,
    /// Throw currently standing, if any.
    pub current: Option<CurrentThrow>,
    /// Throws taken this round.
    pub throw_count: u8,
    /// Has this side kept its throw this round.
    pub kept: bool,
    /// Every throw this match, in order.
    pub history: Vec<ThrowRecord>,
}

impl PlayerSide {
    /// New side with full lives.
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            lives: STARTING_LIVES,
            current: None,
            throw_count: 0,
            kept: false,
            history: Vec::new(),
        }
    }

    /// Clear round-scoped fields. Lives and history survive.
    pub fn reset_round(&mut self) {
        self.current = None;
        self.throw_count = 0;
        self.kept = false;
    }

    /// Has this side thrown at least once this round.
    #[inline]
    pub fn has_thrown(&self) -> bool {
        self.current.is_some()
    }

    /// Is the standing throw concealed.
    #[inline]
    pub fn is_blind(&self) -> bool {
        self.current.is_some_and(|t| t.blind)
    }

    /// Uncover the standing throw and its history entry.
    /// Returns false when there was nothing blind to uncover.
    fn uncover(&mut self) -> bool {
        match self.current.as_mut() {
            Some(current) if current.blind => {
                current.blind = false;
                if let Some(last) = self.history.last_mut() {
                    last.blind = false;
                }
                true
            }
            _ => false,
        }
    }

    /// Uncover every throw made in `round`, superseded ones included.
    fn uncover_round(&mut self, round: u32) {
        if let Some(current) = self.current.as_mut() {
            current.blind = false;
        }
        for record in self.history.iter_mut().filter(|r| r.round == round) {
            record.blind = false;
        }
    }
}

// =============================================================================
// PHASE / OUTCOMES
// =============================================================================

/// Where the round currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// Round 1: both sides owe one blind throw (and a keep).
    AwaitingBlindOpen,
    /// Turn holder has not thrown yet this round.
    AwaitingThrow,
    /// Turn holder has thrown and may throw again or keep.
    AwaitingKeepDecision,
    /// Both sides kept; comparison pending.
    RoundResolving,
    /// Match finished.
    MatchOver,
}

/// Why a match ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// A side ran out of lives.
    LivesExhausted,
    /// A side left or did not come back in time.
    Forfeit,
    /// Terminated after an internal consistency failure.
    Aborted,
}

/// Result of a successful throw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrowOutcome {
    /// Who threw.
    pub seat: Seat,
    /// Faces thrown.
    pub dice: DicePair,
    /// Rank of the faces.
    pub rank: DiceRank,
    /// Thrown blind.
    pub blind: bool,
    /// 1-based throw number within the round.
    pub throw_number: u8,
    /// The cap is reached; only keep is legal now.
    pub is_last_throw: bool,
}

/// A side's throw as revealed at round resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedThrow {
    /// Faces kept.
    pub dice: DicePair,
    /// Rank kept.
    pub rank: DiceRank,
    /// Throws the side took this round.
    pub throws: u8,
}

/// Everything decided when a round resolves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSummary {
    /// Round that resolved.
    pub round: u32,
    /// Starter of that round (won ties).
    pub starter: Seat,
    /// Kept throws, indexed by seat.
    pub throws: [RevealedThrow; 2],
    /// Round winner.
    pub winner: Seat,
    /// Round loser (lost one life).
    pub loser: Seat,
    /// Lives after the exchange, indexed by seat.
    pub lives: [u8; 2],
    /// Starter of the next round, None when the match is over.
    pub next_starter: Option<Seat>,
    /// The round ended the match.
    pub match_over: bool,
}

/// Result of a successful keep.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum KeepOutcome {
    /// The other side still has to play. `to` is None during the
    /// simultaneous opening, where no single side holds the turn.
    TurnPassed {
        /// New turn holder.
        to: Option<Seat>,
    },
    /// Both sides kept and the round resolved.
    RoundResolved(RoundSummary),
}

// =============================================================================
// ERRORS
// =============================================================================

/// A rejected player action. State is left untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IllegalAction {
    /// The match has already ended.
    #[error("match is over")]
    MatchOver,
    /// Caller is not seated in this match.
    #[error("not a participant in this match")]
    NotParticipant,
    /// Another side holds the turn.
    #[error("not your turn")]
    NotYourTurn,
    /// Opening-round throws must be blind.
    #[error("opening round throws must be blind")]
    BlindRequired,
    /// No throws left this round.
    #[error("throw limit reached for this round")]
    ThrowCapReached,
    /// Side already kept this round.
    #[error("already kept this round")]
    AlreadyKept,
    /// Keep requested before any throw.
    #[error("nothing to keep yet")]
    NothingToKeep,
    /// Reveal requested but the standing throw is not blind.
    #[error("no blind throw to reveal")]
    NotBlind,
}

impl IllegalAction {
    /// Stable machine-checkable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            IllegalAction::MatchOver => "match_over",
            IllegalAction::NotParticipant => "not_participant",
            IllegalAction::NotYourTurn => "not_your_turn",
            IllegalAction::BlindRequired => "blind_required",
            IllegalAction::ThrowCapReached => "throw_cap_reached",
            IllegalAction::AlreadyKept => "already_kept",
            IllegalAction::NothingToKeep => "nothing_to_keep",
            IllegalAction::NotBlind => "not_blind",
        }
    }
}

/// Internal consistency failure. Fatal for the match it occurs in.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// A side has no lives while the match is running.
    #[error("seat {0:?} has no lives left but the match is running")]
    LivesExhausted(Seat),
    /// The throw cap disagrees with the opening flag.
    #[error("max throws {max} inconsistent with first_round={first_round}")]
    ThrowCapMismatch {
        /// Stored cap.
        max: u8,
        /// Stored opening flag.
        first_round: bool,
    },
    /// A side threw more often than allowed.
    #[error("seat {0:?} exceeded the throw cap")]
    ThrowCapExceeded(Seat),
    /// Turn ownership disagrees with the round.
    #[error("turn holder {turn:?} inconsistent with round {round}")]
    TurnMismatch {
        /// Stored turn holder.
        turn: Option<Seat>,
        /// Stored round.
        round: u32,
    },
    /// A side is marked kept without a standing throw.
    #[error("seat {0:?} kept without a throw")]
    KeptWithoutThrow(Seat),
}

/// Failure of a state-machine operation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StateError {
    /// Rule violation by the caller.
    #[error(transparent)]
    Illegal(#[from] IllegalAction),
    /// State is corrupt.
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

// =============================================================================
// MATCH STATE
// =============================================================================

/// Complete state of one duel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchState {
    /// Match identifier
    pub match_id: [u8; 16],

    /// Current round (starts at 1)
    pub round: u32,

    /// True only during round 1
    pub first_round: bool,

    /// Throw cap for the current round
    pub max_throws: u8,

    /// Acts first and wins ties this round
    pub starter: Seat,

    /// Turn holder; None during the simultaneous blind opening
    pub turn: Option<Seat>,

    /// Both sides, indexed by [`Seat::index`]
    pub sides: [PlayerSide; 2],

    /// Match finished
    pub match_over: bool,

    /// Winner once decided (None for an aborted match)
    pub winner: Option<Seat>,

    /// Why the match ended
    pub end_reason: Option<EndReason>,

    /// Bumped on every mutation
    pub version: u64,

    /// Events generated since the last drain
    #[serde(skip)]
    pub pending_events: Vec<GameEvent>,
}

impl MatchState {
    /// Create a new match in the blind opening.
    pub fn new(match_id: [u8; 16], side_a: PlayerSide, side_b: PlayerSide) -> Self {
        Self {
            match_id,
            round: 1,
            first_round: true,
            max_throws: OPENING_MAX_THROWS,
            starter: Seat::A,
            turn: None,
            sides: [side_a, side_b],
            match_over: false,
            winner: None,
            end_reason: None,
            version: 0,
            pending_events: Vec::new(),
        }
    }

    /// Side at a seat.
    #[inline]
    pub fn side(&self, seat: Seat) -> &PlayerSide {
        &self.sides[seat.index()]
    }

    #[inline]
    fn side_mut(&mut self, seat: Seat) -> &mut PlayerSide {
        &mut self.sides[seat.index()]
    }

    /// Seat held by a player.
    pub fn seat_of(&self, id: &PlayerId) -> Option<Seat> {
        Seat::BOTH.into_iter().find(|seat| self.side(*seat).id == *id)
    }

    /// Winner identity once decided.
    pub fn winner_id(&self) -> Option<PlayerId> {
        self.winner.map(|seat| self.side(seat).id)
    }

    /// Current phase of the round.
    pub fn phase(&self) -> MatchPhase {
        if self.match_over {
            return MatchPhase::MatchOver;
        }
        if self.sides.iter().all(|s| s.kept) {
            return MatchPhase::RoundResolving;
        }
        if self.first_round {
            return MatchPhase::AwaitingBlindOpen;
        }
        match self.turn {
            Some(seat) if self.side(seat).has_thrown() => MatchPhase::AwaitingKeepDecision,
            _ => MatchPhase::AwaitingThrow,
        }
    }

    /// May this seat throw or keep right now.
    pub fn can_act(&self, seat: Seat) -> bool {
        !self.match_over
            && !self.side(seat).kept
            && (self.first_round || self.turn == Some(seat))
    }

    /// Throw both dice for `actor`.
    pub fn throw(
        &mut self,
        actor: Seat,
        blind: bool,
        dice: &mut dyn DiceRoller,
    ) -> Result<ThrowOutcome, StateError> {
        if self.match_over {
            return Err(IllegalAction::MatchOver.into());
        }
        if self.first_round {
            if !blind {
                return Err(IllegalAction::BlindRequired.into());
            }
        } else if self.turn != Some(actor) {
            return Err(IllegalAction::NotYourTurn.into());
        }

        let max_throws = self.max_throws;
        let round = self.round;
        let side = self.side(actor);
        if side.throw_count >= max_throws {
            return Err(IllegalAction::ThrowCapReached.into());
        }
        if side.kept {
            return Err(IllegalAction::AlreadyKept.into());
        }

        let pair = dice.roll_pair();
        let rank = pair.rank();

        let side = self.side_mut(actor);
        side.throw_count += 1;
        side.current = Some(CurrentThrow { dice: pair, rank, blind });
        side.history.push(ThrowRecord {
            round,
            throw_number: side.throw_count,
            dice: pair,
            rank,
            blind,
        });

        let outcome = ThrowOutcome {
            seat: actor,
            dice: pair,
            rank,
            blind,
            throw_number: side.throw_count,
            is_last_throw: side.throw_count == max_throws,
        };

        self.version += 1;
        self.push_event(GameEvent::throw_made(self.version, round, outcome));
        Ok(outcome)
    }

    /// Stand on the current throw.
    ///
    /// Passes the turn, or resolves the round when the other side has
    /// already kept.
    pub fn keep(&mut self, actor: Seat) -> Result<KeepOutcome, StateError> {
        if self.match_over {
            return Err(IllegalAction::MatchOver.into());
        }
        if !self.first_round && self.turn != Some(actor) {
            return Err(IllegalAction::NotYourTurn.into());
        }
        let side = self.side(actor);
        if side.kept {
            return Err(IllegalAction::AlreadyKept.into());
        }
        let Some(current) = side.current else {
            return Err(IllegalAction::NothingToKeep.into());
        };

        self.side_mut(actor).kept = true;
        self.version += 1;

        let other = actor.other();
        if self.side(other).kept {
            self.push_event(GameEvent::kept(self.version, self.round, actor, current.rank, None));
            let summary = self.resolve_round()?;
            return Ok(KeepOutcome::RoundResolved(summary));
        }

        if !self.first_round {
            self.turn = Some(other);
        }
        self.push_event(GameEvent::kept(self.version, self.round, actor, current.rank, self.turn));
        Ok(KeepOutcome::TurnPassed { to: self.turn })
    }

    /// Voluntarily uncover a blind throw before the round resolves.
    pub fn reveal(&mut self, actor: Seat) -> Result<ThrowRecord, StateError> {
        if self.match_over {
            return Err(IllegalAction::MatchOver.into());
        }
        if !self.side_mut(actor).uncover() {
            return Err(IllegalAction::NotBlind.into());
        }

        let side = self.side(actor);
        let record = match side.history.last() {
            Some(record) => *record,
            None => return Err(InvariantViolation::KeptWithoutThrow(actor).into()),
        };

        self.version += 1;
        self.push_event(GameEvent::revealed(self.version, self.round, actor, record.dice, record.rank));
        Ok(record)
    }

    /// End the match in favour of the other side.
    pub fn forfeit(&mut self, loser: Seat) -> Result<(), StateError> {
        if self.match_over {
            return Err(IllegalAction::MatchOver.into());
        }
        self.finish(Some(loser.other()), EndReason::Forfeit);
        Ok(())
    }

    /// Terminate after an invariant failure. No winner is recorded.
    pub fn abort(&mut self) {
        if !self.match_over {
            self.finish(None, EndReason::Aborted);
        }
    }

    /// Verify the structural invariants of the match.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.first_round != (self.max_throws == OPENING_MAX_THROWS)
            || (!self.first_round && self.max_throws != MAX_THROWS)
        {
            return Err(InvariantViolation::ThrowCapMismatch {
                max: self.max_throws,
                first_round: self.first_round,
            });
        }

        for seat in Seat::BOTH {
            let side = self.side(seat);
            if side.throw_count > self.max_throws {
                return Err(InvariantViolation::ThrowCapExceeded(seat));
            }
            if side.kept && side.current.is_none() {
                return Err(InvariantViolation::KeptWithoutThrow(seat));
            }
            if !self.match_over && side.lives == 0 {
                return Err(InvariantViolation::LivesExhausted(seat));
            }
        }

        if !self.match_over {
            let turn_ok = self.first_round == (self.round == 1)
                && self.turn.is_none() == self.first_round;
            if !turn_ok {
                return Err(InvariantViolation::TurnMismatch {
                    turn: self.turn,
                    round: self.round,
                });
            }
        }

        Ok(())
    }

    /// SHA-256 over the bincode encoding of the state, pending events
    /// excluded. Two replays of the same dice and actions agree on it.
    pub fn state_hash(&self) -> [u8; 32] {
        let bytes = bincode::serialize(self).unwrap_or_default();
        let digest = Sha256::digest(&bytes);
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&digest);
        hash
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Push a game event.
    pub fn push_event(&mut self, event: GameEvent) {
        self.pending_events.push(event);
    }

    /// Compare kept throws, take a life, and either end the match or set up
    /// the next round.
    fn resolve_round(&mut self) -> Result<RoundSummary, StateError> {
        let mut throws = [RevealedThrow {
            dice: DicePair::new(0, 0),
            rank: DiceRank(0),
            throws: 0,
        }; 2];

        let round = self.round;
        for seat in Seat::BOTH {
            let side = self.side_mut(seat);
            side.uncover_round(round);
            let current = side
                .current
                .ok_or(InvariantViolation::KeptWithoutThrow(seat))?;
            throws[seat.index()] = RevealedThrow {
                dice: current.dice,
                rank: current.rank,
                throws: side.throw_count,
            };
        }

        let starter = self.starter;
        let winner = match compare(throws[0].rank, throws[1].rank, starter == Seat::A) {
            Comparison::AWins => Seat::A,
            Comparison::BWins => Seat::B,
        };
        let loser = winner.other();

        let loser_side = self.side_mut(loser);
        loser_side.lives = loser_side.lives.saturating_sub(1);
        let match_over = loser_side.lives == 0;

        let round = self.round;
        let next_starter = if match_over { None } else { Some(starter.other()) };
        let summary = RoundSummary {
            round,
            starter,
            throws,
            winner,
            loser,
            lives: [self.sides[0].lives, self.sides[1].lives],
            next_starter,
            match_over,
        };

        self.version += 1;
        self.push_event(GameEvent::round_resolved(self.version, summary.clone()));

        if match_over {
            self.finish(Some(winner), EndReason::LivesExhausted);
        } else {
            self.round += 1;
            self.first_round = false;
            self.max_throws = MAX_THROWS;
            self.starter = starter.other();
            self.turn = Some(self.starter);
            for side in &mut self.sides {
                side.reset_round();
            }
        }

        Ok(summary)
    }

    fn finish(&mut self, winner: Option<Seat>, reason: EndReason) {
        self.match_over = true;
        self.winner = winner;
        self.end_reason = Some(reason);
        self.turn = None;
        self.version += 1;
        let lives = [self.sides[0].lives, self.sides[1].lives];
        self.push_event(GameEvent::match_ended(self.version, self.round, winner, reason, lives));
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::dice::ScriptedDice;
    use crate::game::events::GameEventData;

    fn new_match() -> MatchState {
        MatchState::new(
            [7; 16],
            PlayerSide::new(PlayerId::new([1; 16]), "alice"),
            PlayerSide::new(PlayerId::new([2; 16]), "bob"),
        )
    }

    /// Play the blind opening so seat B wins it (B starts round 2 either way).
    fn past_opening(state: &mut MatchState) {
        let mut dice = ScriptedDice::new([(3, 1), (6, 6)]);
        state.throw(Seat::A, true, &mut dice).unwrap();
        state.keep(Seat::A).unwrap();
        state.throw(Seat::B, true, &mut dice).unwrap();
        state.keep(Seat::B).unwrap();
        assert_eq!(state.round, 2);
    }

    #[test]
    fn test_new_match_invariants() {
        let state = new_match();
        assert_eq!(state.round, 1);
        assert!(state.first_round);
        assert_eq!(state.max_throws, 1);
        assert_eq!(state.starter, Seat::A);
        assert_eq!(state.turn, None);
        assert_eq!(state.phase(), MatchPhase::AwaitingBlindOpen);
        assert_eq!(state.side(Seat::A).lives, STARTING_LIVES);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_opening_rejects_open_throw() {
        let mut state = new_match();
        let mut dice = ScriptedDice::new([(4, 4)]);
        let err = state.throw(Seat::A, false, &mut dice).unwrap_err();
        assert_eq!(err, StateError::Illegal(IllegalAction::BlindRequired));
        assert_eq!(state.version, 0);
        assert!(state.side(Seat::A).history.is_empty());
        assert_eq!(dice.remaining(), 1);
    }

    #[test]
    fn test_opening_allows_exactly_one_throw() {
        let mut state = new_match();
        let mut dice = ScriptedDice::new([(4, 4), (5, 5)]);

        let outcome = state.throw(Seat::B, true, &mut dice).unwrap();
        assert!(outcome.is_last_throw);
        assert!(outcome.blind);

        let err = state.throw(Seat::B, true, &mut dice).unwrap_err();
        assert_eq!(err, StateError::Illegal(IllegalAction::ThrowCapReached));
        assert_eq!(state.side(Seat::B).throw_count, 1);
    }

    #[test]
    fn test_opening_is_order_independent() {
        let mut state = new_match();
        let mut dice = ScriptedDice::new([(3, 3), (1, 2)]);

        // B goes first even though A is the starter
        state.throw(Seat::B, true, &mut dice).unwrap();
        state.throw(Seat::A, true, &mut dice).unwrap();
        assert_eq!(state.keep(Seat::B).unwrap(), KeepOutcome::TurnPassed { to: None });
        assert!(matches!(state.keep(Seat::A).unwrap(), KeepOutcome::RoundResolved(_)));
    }

    #[test]
    fn test_keep_without_throw_rejected() {
        let mut state = new_match();
        let err = state.keep(Seat::A).unwrap_err();
        assert_eq!(err, StateError::Illegal(IllegalAction::NothingToKeep));
        assert!(!state.side(Seat::A).kept);
    }

    #[test]
    fn test_blind_opening_scenario() {
        // A: Mexico blind, B: (3,3) blind
        let mut state = new_match();
        let mut dice = ScriptedDice::new([(1, 2), (3, 3)]);

        state.throw(Seat::A, true, &mut dice).unwrap();
        state.keep(Seat::A).unwrap();
        state.throw(Seat::B, true, &mut dice).unwrap();
        let summary = match state.keep(Seat::B).unwrap() {
            KeepOutcome::RoundResolved(summary) => summary,
            other => panic!("expected resolution, got {:?}", other),
        };

        assert_eq!(summary.throws[0].rank, DiceRank(1000));
        assert_eq!(summary.throws[1].rank, DiceRank(300));
        assert_eq!(summary.winner, Seat::A);
        assert_eq!(summary.loser, Seat::B);
        assert_eq!(summary.lives, [6, 5]);
        assert_eq!(summary.next_starter, Some(Seat::B));

        // Blind throws are uncovered in history
        assert!(state.side(Seat::A).history.iter().all(|r| !r.blind));
        assert!(state.side(Seat::B).history.iter().all(|r| !r.blind));

        // Next round set up
        assert_eq!(state.round, 2);
        assert!(!state.first_round);
        assert_eq!(state.max_throws, 3);
        assert_eq!(state.starter, Seat::B);
        assert_eq!(state.turn, Some(Seat::B));
        assert!(state.side(Seat::A).current.is_none());
        assert_eq!(state.side(Seat::A).throw_count, 0);
        assert_eq!(state.phase(), MatchPhase::AwaitingThrow);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_round_two_scenario() {
        let mut state = new_match();
        past_opening(&mut state);
        assert_eq!(state.starter, Seat::B);

        // Round 2 (starter B): in the scenario A throws 42 and B throws 22.
        // Turn order follows the starter, so B goes first here.
        let mut dice = ScriptedDice::new([(2, 2), (4, 2)]);
        state.throw(Seat::B, false, &mut dice).unwrap();
        assert_eq!(state.phase(), MatchPhase::AwaitingKeepDecision);
        assert_eq!(state.keep(Seat::B).unwrap(), KeepOutcome::TurnPassed { to: Some(Seat::A) });

        let lives_before = state.side(Seat::A).lives;
        state.throw(Seat::A, false, &mut dice).unwrap();
        let summary = match state.keep(Seat::A).unwrap() {
            KeepOutcome::RoundResolved(summary) => summary,
            other => panic!("expected resolution, got {:?}", other),
        };

        assert_eq!(summary.throws[Seat::A.index()].rank, DiceRank(42));
        assert_eq!(summary.throws[Seat::B.index()].rank, DiceRank(200));
        assert_eq!(summary.winner, Seat::B);
        assert_eq!(state.side(Seat::A).lives, lives_before - 1);
        assert_eq!(state.starter, Seat::A);
        assert_eq!(state.turn, Some(Seat::A));
    }

    #[test]
    fn test_superseded_blind_throw_uncovered_at_resolution() {
        let mut state = new_match();
        past_opening(&mut state);

        let mut dice = ScriptedDice::new([(6, 5), (4, 1), (5, 5)]);
        state.throw(Seat::B, true, &mut dice).unwrap();
        state.throw(Seat::B, false, &mut dice).unwrap();
        state.keep(Seat::B).unwrap();

        // Superseded blind throw stays hidden while the round is open
        let round_two = |state: &MatchState, seat: Seat| -> Vec<ThrowRecord> {
            state.side(seat).history.iter().filter(|r| r.round == 2).copied().collect()
        };
        assert!(round_two(&state, Seat::B)[0].blind);

        state.throw(Seat::A, false, &mut dice).unwrap();
        assert!(matches!(state.keep(Seat::A).unwrap(), KeepOutcome::RoundResolved(_)));

        let history = round_two(&state, Seat::B);
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| !r.blind));
        assert_eq!(history[0].rank, DiceRank(65));
        assert_eq!(history[1].rank, DiceRank(41));
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_state_hash_tracks_play() {
        let play = |faces: [(u8, u8); 2]| {
            let mut state = new_match();
            let mut dice = ScriptedDice::new(faces);
            state.throw(Seat::A, true, &mut dice).unwrap();
            state.keep(Seat::A).unwrap();
            state.throw(Seat::B, true, &mut dice).unwrap();
            state.keep(Seat::B).unwrap();
            state
        };

        let mut first = play([(3, 1), (6, 6)]);
        let second = play([(3, 1), (6, 6)]);
        assert_eq!(first.state_hash(), second.state_hash());
        assert_ne!(first.state_hash(), play([(3, 2), (6, 6)]).state_hash());

        // Draining events leaves the hash alone
        let before = first.state_hash();
        assert!(!first.take_events().is_empty());
        assert_eq!(first.state_hash(), before);
    }

    #[test]
    fn test_out_of_turn_rejected() {
        let mut state = new_match();
        past_opening(&mut state);
        let mut dice = ScriptedDice::new([(5, 5)]);

        let version = state.version;
        let err = state.throw(Seat::A, false, &mut dice).unwrap_err();
        assert_eq!(err, StateError::Illegal(IllegalAction::NotYourTurn));
        let err = state.keep(Seat::A).unwrap_err();
        assert_eq!(err, StateError::Illegal(IllegalAction::NotYourTurn));
        assert_eq!(state.version, version);
    }

    #[test]
    fn test_throw_cap_after_opening() {
        let mut state = new_match();
        past_opening(&mut state);
        let mut dice = ScriptedDice::new([(3, 1), (4, 1), (5, 1), (6, 6)]);

        let first = state.throw(Seat::B, false, &mut dice).unwrap();
        assert!(!first.is_last_throw);
        let second = state.throw(Seat::B, false, &mut dice).unwrap();
        assert!(!second.is_last_throw);
        let third = state.throw(Seat::B, false, &mut dice).unwrap();
        assert!(third.is_last_throw);
        assert_eq!(third.throw_number, 3);

        let snapshot = state.side(Seat::B).clone();
        let version = state.version;
        let err = state.throw(Seat::B, false, &mut dice).unwrap_err();
        assert_eq!(err, StateError::Illegal(IllegalAction::ThrowCapReached));
        assert_eq!(state.version, version);
        assert_eq!(state.side(Seat::B).throw_count, snapshot.throw_count);
        assert_eq!(state.side(Seat::B).current, snapshot.current);
        assert_eq!(dice.remaining(), 1);

        // Keeping is still legal and keeps the last throw
        state.keep(Seat::B).unwrap();
        assert_eq!(state.side(Seat::B).current.map(|c| c.rank), Some(DiceRank(51)));
    }

    #[test]
    fn test_starter_alternates_regardless_of_winner() {
        let mut state = new_match();
        let mut expected = Seat::A;

        for _ in 0..4 {
            assert_eq!(state.starter, expected);
            let first = state.starter;
            let second = first.other();
            // Starter always wins with a double six
            let mut dice = ScriptedDice::new([(6, 6), (3, 1)]);
            state.throw(first, true, &mut dice).unwrap();
            state.keep(first).unwrap();
            state.throw(second, true, &mut dice).unwrap();
            let summary = match state.keep(second).unwrap() {
                KeepOutcome::RoundResolved(summary) => summary,
                other => panic!("expected resolution, got {:?}", other),
            };
            assert_eq!(summary.winner, first);
            expected = expected.other();
        }
    }

    #[test]
    fn test_equal_ranks_go_to_starter() {
        for starter_seat in Seat::BOTH {
            let mut state = new_match();
            if starter_seat == Seat::B {
                past_opening(&mut state);
            }
            assert_eq!(state.starter, starter_seat);

            let blind = state.first_round;
            let mut dice = ScriptedDice::new([(5, 3), (3, 5)]);
            state.throw(starter_seat, blind, &mut dice).unwrap();
            state.keep(starter_seat).unwrap();
            state.throw(starter_seat.other(), blind, &mut dice).unwrap();
            match state.keep(starter_seat.other()).unwrap() {
                KeepOutcome::RoundResolved(summary) => assert_eq!(summary.winner, starter_seat),
                other => panic!("expected resolution, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_double_mexico_goes_to_starter() {
        let mut state = new_match();
        let mut dice = ScriptedDice::new([(2, 1), (1, 2)]);
        state.throw(Seat::B, true, &mut dice).unwrap();
        state.keep(Seat::B).unwrap();
        state.throw(Seat::A, true, &mut dice).unwrap();
        match state.keep(Seat::A).unwrap() {
            KeepOutcome::RoundResolved(summary) => {
                assert_eq!(summary.winner, Seat::A);
                assert_eq!(summary.lives, [6, 5]);
            }
            other => panic!("expected resolution, got {:?}", other),
        }
    }

    #[test]
    fn test_last_life_ends_match() {
        let mut state = new_match();
        state.sides[Seat::A.index()].lives = 1;

        let mut dice = ScriptedDice::new([(3, 1), (4, 4)]);
        state.throw(Seat::A, true, &mut dice).unwrap();
        state.keep(Seat::A).unwrap();
        state.throw(Seat::B, true, &mut dice).unwrap();
        let summary = match state.keep(Seat::B).unwrap() {
            KeepOutcome::RoundResolved(summary) => summary,
            other => panic!("expected resolution, got {:?}", other),
        };

        assert!(summary.match_over);
        assert_eq!(summary.next_starter, None);
        assert!(state.match_over);
        assert_eq!(state.winner, Some(Seat::B));
        assert_eq!(state.winner_id(), Some(PlayerId::new([2; 16])));
        assert_eq!(state.side(Seat::A).lives, 0);
        assert_eq!(state.end_reason, Some(EndReason::LivesExhausted));
        assert_eq!(state.phase(), MatchPhase::MatchOver);
        assert!(state.check_invariants().is_ok());

        let mut dice = ScriptedDice::new([(1, 1)]);
        assert_eq!(
            state.throw(Seat::A, true, &mut dice).unwrap_err(),
            StateError::Illegal(IllegalAction::MatchOver)
        );
    }

    #[test]
    fn test_lives_never_negative_over_full_match() {
        let mut state = new_match();
        let mut dice = crate::core::rng::DeterministicRng::new(2024);

        while !state.match_over {
            let first = state.starter;
            for seat in [first, first.other()] {
                let blind = state.first_round;
                state.throw(seat, blind, &mut dice).unwrap();
                state.keep(seat).unwrap();
            }
            assert!(state.check_invariants().is_ok());
        }

        let lives = [state.sides[0].lives, state.sides[1].lives];
        assert!(lives.contains(&0));
        let winner = state.winner.unwrap();
        assert!(state.side(winner).lives > 0);
    }

    #[test]
    fn test_reveal() {
        let mut state = new_match();
        let mut dice = ScriptedDice::new([(6, 5)]);

        assert_eq!(
            state.reveal(Seat::A).unwrap_err(),
            StateError::Illegal(IllegalAction::NotBlind)
        );

        state.throw(Seat::A, true, &mut dice).unwrap();
        assert!(state.side(Seat::A).is_blind());

        let record = state.reveal(Seat::A).unwrap();
        assert_eq!(record.rank, DiceRank(65));
        assert!(!record.blind);
        assert!(!state.side(Seat::A).is_blind());
        assert!(!state.side(Seat::A).history[0].blind);

        assert_eq!(
            state.reveal(Seat::A).unwrap_err(),
            StateError::Illegal(IllegalAction::NotBlind)
        );
    }

    #[test]
    fn test_forfeit() {
        let mut state = new_match();
        state.forfeit(Seat::B).unwrap();
        assert!(state.match_over);
        assert_eq!(state.winner, Some(Seat::A));
        assert_eq!(state.end_reason, Some(EndReason::Forfeit));
        assert_eq!(state.forfeit(Seat::A), Err(StateError::Illegal(IllegalAction::MatchOver)));
    }

    #[test]
    fn test_invariant_detection() {
        let mut state = new_match();
        state.max_throws = 3;
        assert!(matches!(
            state.check_invariants(),
            Err(InvariantViolation::ThrowCapMismatch { .. })
        ));

        let mut state = new_match();
        state.turn = Some(Seat::A);
        assert!(matches!(
            state.check_invariants(),
            Err(InvariantViolation::TurnMismatch { .. })
        ));

        let mut state = new_match();
        state.sides[1].kept = true;
        assert_eq!(state.check_invariants(), Err(InvariantViolation::KeptWithoutThrow(Seat::B)));

        state.abort();
        assert!(state.match_over);
        assert_eq!(state.winner, None);
        assert_eq!(state.end_reason, Some(EndReason::Aborted));
    }

    #[test]
    fn test_events_emitted_in_order() {
        let mut state = new_match();
        let mut dice = ScriptedDice::new([(1, 2), (3, 3)]);
        state.throw(Seat::A, true, &mut dice).unwrap();
        state.keep(Seat::A).unwrap();
        state.throw(Seat::B, true, &mut dice).unwrap();
        state.keep(Seat::B).unwrap();

        let events = state.take_events();
        let kinds: Vec<&str> = events.iter().map(|e| e.data.kind()).collect();
        assert_eq!(kinds, ["throw_made", "kept", "throw_made", "kept", "round_resolved"]);
        assert!(events.windows(2).all(|w| w[0].version < w[1].version));
        assert!(state.take_events().is_empty());

        if let GameEventData::RoundResolved(summary) = &events[4].data {
            assert_eq!(summary.winner, Seat::A);
        } else {
            panic!("expected round_resolved");
        }
    }

    #[test]
    fn test_player_id_roundtrip() {
        let id = PlayerId::random();
        let parsed = PlayerId::from_uuid_str(&id.to_uuid_string()).unwrap();
        assert_eq!(id, parsed);
        assert_eq!(id.short_hex().len(), 8);
    }
}
