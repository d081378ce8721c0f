//! Per-viewer projection.
//!
//! Every snapshot that leaves the server is built by [`project`]. Blind
//! throws are masked here and nowhere else: the owner sees the rank with a
//! `"???"` display value, the opponent sees neither dice nor rank.

use serde::{Serialize, Deserialize};

use crate::game::rank::{DicePair, DiceRank};
use crate::game::state::{EndReason, MatchPhase, MatchState, PlayerSide, Seat, ThrowRecord};

/// Display text for a concealed throw.
pub const HIDDEN_DISPLAY: &str = "???";

/// One throw as a particular viewer may see it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrowView {
    /// Round of the throw.
    pub round: u32,
    /// 1-based throw number within the round.
    pub throw_number: u8,
    /// Faces, withheld from the opponent while blind.
    pub dice: Option<DicePair>,
    /// Rank, withheld from the opponent while blind.
    pub rank: Option<DiceRank>,
    /// Text to render for the throw.
    pub display_value: String,
    /// Still concealed.
    pub blind: bool,
}

impl ThrowView {
    fn from_record(record: &ThrowRecord, owner_is_viewer: bool) -> Self {
        if !record.blind {
            return Self {
                round: record.round,
                throw_number: record.throw_number,
                dice: Some(record.dice),
                rank: Some(record.rank),
                display_value: record.rank.to_string(),
                blind: false,
            };
        }

        let (dice, rank) = if owner_is_viewer {
            (Some(record.dice), Some(record.rank))
        } else {
            (None, None)
        };
        Self {
            round: record.round,
            throw_number: record.throw_number,
            dice,
            rank,
            display_value: HIDDEN_DISPLAY.to_string(),
            blind: true,
        }
    }
}

/// One side as a particular viewer may see it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideView {
    /// Seat of this side.
    pub seat: Seat,
    /// Participant identity.
    pub player_id: [u8; 16],
    /// Display name.
    pub name: String,
    /// Lives remaining.
    pub lives: u8,
    /// Throws taken this round.
    pub throw_count: u8,
    /// Kept this round.
    pub kept: bool,
    /// Standing throw, if any.
    pub current: Option<ThrowView>,
    /// All throws this match.
    pub history: Vec<ThrowView>,
}

impl SideView {
    fn build(side: &PlayerSide, seat: Seat, owner_is_viewer: bool) -> Self {
        let history: Vec<ThrowView> = side
            .history
            .iter()
            .map(|record| ThrowView::from_record(record, owner_is_viewer))
            .collect();

        // The standing throw is always the last history entry
        let current = if side.has_thrown() { history.last().cloned() } else { None };

        Self {
            seat,
            player_id: side.id.0,
            name: side.name.clone(),
            lives: side.lives,
            throw_count: side.throw_count,
            kept: side.kept,
            current,
            history,
        }
    }
}

/// Snapshot of a match filtered for one viewer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchView {
    /// Match identifier.
    pub match_id: [u8; 16],
    /// State version the view was taken at.
    pub version: u64,
    /// Current round.
    pub round: u32,
    /// Opening round.
    pub first_round: bool,
    /// Throw cap this round.
    pub max_throws: u8,
    /// Phase of the round.
    pub phase: MatchPhase,
    /// Starter this round.
    pub starter: Seat,
    /// Turn holder (None during the opening).
    pub turn: Option<Seat>,
    /// Viewer's seat.
    pub your_seat: Seat,
    /// Viewer may throw or keep now.
    pub your_move: bool,
    /// Viewer's side.
    pub you: SideView,
    /// Opponent's side.
    pub opponent: SideView,
    /// Match finished.
    pub match_over: bool,
    /// Winner seat once decided.
    pub winner: Option<Seat>,
    /// Why the match ended.
    pub end_reason: Option<EndReason>,
}

/// Build the view of `state` for the participant at `viewer`.
pub fn project(state: &MatchState, viewer: Seat) -> MatchView {
    let opponent = viewer.other();
    MatchView {
        match_id: state.match_id,
        version: state.version,
        round: state.round,
        first_round: state.first_round,
        max_throws: state.max_throws,
        phase: state.phase(),
        starter: state.starter,
        turn: state.turn,
        your_seat: viewer,
        your_move: state.can_act(viewer),
        you: SideView::build(state.side(viewer), viewer, true),
        opponent: SideView::build(state.side(opponent), opponent, false),
        match_over: state.match_over,
        winner: state.winner,
        end_reason: state.end_reason,
    }
}

/// Throw as the opponent of its owner may see it.
pub fn redact_for_opponent(record: &ThrowRecord) -> ThrowView {
    ThrowView::from_record(record, false)
}

/// Throw as its owner sees it.
pub fn view_for_owner(record: &ThrowRecord) -> ThrowView {
    ThrowView::from_record(record, true)
}
