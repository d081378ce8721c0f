//! Acting sides.
//!
//! A seat is driven either by the server itself ([`BotAgent`]) or by a
//! remote participant ([`RemoteSide`]). The coordinator asks every seat the
//! same question after each action; only self-driving seats ever answer
//! with a completed turn.

use crate::game::bot::{BotAgent, BotTurn};
use crate::game::dice::DiceRoller;
use crate::game::state::{MatchState, Seat, StateError};

/// What happened when a seat was asked to act.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnProgress {
    /// Nothing to do server-side; wait for the participant.
    AwaitingInput,
    /// The seat played its whole turn.
    Completed(BotTurn),
}

/// Capability bound to each seat when a match is created.
pub trait ActingSide: Send + Sync {
    /// Short label for logs.
    fn label(&self) -> &'static str;

    /// Does this side play without external input.
    fn is_self_driving(&self) -> bool;

    /// Act for `seat` if the seat is due.
    fn act(
        &self,
        state: &mut MatchState,
        seat: Seat,
        dice: &mut dyn DiceRoller,
    ) -> Result<TurnProgress, StateError>;
}

/// Is `seat` due to move now.
///
/// During the opening a self-driving seat waits until its opponent has
/// kept, so the remote participant always throws first.
pub fn is_due(state: &MatchState, seat: Seat) -> bool {
    if !state.can_act(seat) {
        return false;
    }
    if state.first_round {
        state.side(seat.other()).kept
    } else {
        true
    }
}

/// Seat played by a connected participant.
#[derive(Clone, Copy, Debug, Default)]
pub struct RemoteSide;

impl ActingSide for RemoteSide {
    fn label(&self) -> &'static str {
        "remote"
    }

    fn is_self_driving(&self) -> bool {
        false
    }

    fn act(
        &self,
        _state: &mut MatchState,
        _seat: Seat,
        _dice: &mut dyn DiceRoller,
    ) -> Result<TurnProgress, StateError> {
        Ok(TurnProgress::AwaitingInput)
    }
}

impl ActingSide for BotAgent {
    fn label(&self) -> &'static str {
        "bot"
    }

    fn is_self_driving(&self) -> bool {
        true
    }

    fn act(
        &self,
        state: &mut MatchState,
        seat: Seat,
        dice: &mut dyn DiceRoller,
    ) -> Result<TurnProgress, StateError> {
        if !is_due(state, seat) {
            return Ok(TurnProgress::AwaitingInput);
        }
        self.play_turn(state, seat, dice).map(TurnProgress::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::dice::ScriptedDice;
    use crate::game::state::{KeepOutcome, PlayerId, PlayerSide};

    fn new_match() -> MatchState {
        MatchState::new(
            [4; 16],
            PlayerSide::new(PlayerId::new([1; 16]), "human"),
            PlayerSide::new(PlayerId::new([2; 16]), "Bot"),
        )
    }

    #[test]
    fn test_bot_waits_for_opening_keep() {
        let mut state = new_match();
        let bot: Box<dyn ActingSide> = Box::new(BotAgent::new());
        let mut dice = ScriptedDice::new([(1, 3), (6, 6)]);

        assert!(!is_due(&state, Seat::B));
        assert_eq!(bot.act(&mut state, Seat::B, &mut dice).unwrap(), TurnProgress::AwaitingInput);
        assert_eq!(dice.remaining(), 2);

        state.throw(Seat::A, true, &mut dice).unwrap();
        assert_eq!(bot.act(&mut state, Seat::B, &mut dice).unwrap(), TurnProgress::AwaitingInput);
        state.keep(Seat::A).unwrap();

        match bot.act(&mut state, Seat::B, &mut dice).unwrap() {
            TurnProgress::Completed(turn) => {
                assert!(matches!(turn.keep, KeepOutcome::RoundResolved(_)));
            }
            other => panic!("expected completed turn, got {:?}", other),
        }
        assert_eq!(state.round, 2);
    }

    #[test]
    fn test_bot_acts_when_it_holds_the_turn() {
        let mut state = new_match();
        let bot = BotAgent::new();
        // A wins the opening, B starts round 2
        let mut dice = ScriptedDice::new([(2, 1), (3, 1), (6, 5)]);
        state.throw(Seat::A, true, &mut dice).unwrap();
        state.keep(Seat::A).unwrap();
        state.throw(Seat::B, true, &mut dice).unwrap();
        state.keep(Seat::B).unwrap();
        assert_eq!(state.turn, Some(Seat::B));

        assert!(is_due(&state, Seat::B));
        assert!(!is_due(&state, Seat::A));
        let progress = bot.act(&mut state, Seat::B, &mut dice).unwrap();
        assert!(matches!(progress, TurnProgress::Completed(_)));
        assert_eq!(state.turn, Some(Seat::A));
    }

    #[test]
    fn test_remote_side_never_acts() {
        let mut state = new_match();
        let mut dice = ScriptedDice::new([(1, 1)]);
        let remote = RemoteSide;
        assert!(!remote.is_self_driving());
        assert_eq!(remote.act(&mut state, Seat::A, &mut dice).unwrap(), TurnProgress::AwaitingInput);
        assert_eq!(state.version, 0);
        assert_eq!(remote.label(), "remote");
    }
}
