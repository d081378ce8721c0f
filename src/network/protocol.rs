//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every message is a JSON text frame tagged by `type`.

use serde::{Serialize, Deserialize};

use crate::game::rank::{DicePair, DiceRank};
use crate::game::state::{EndReason, IllegalAction, Seat};
use crate::game::view::{MatchView, ThrowView};

/// Unique match identifier.
pub type MatchId = [u8; 16];

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate with the server.
    Auth(AuthRequest),

    /// Join the queue for a mode (bot mode starts immediately).
    Enqueue {
        /// Bot or versus.
        mode: MatchMode,
    },

    /// Leave the queue.
    CancelQueue,

    /// Throw both dice.
    Throw {
        /// Match the throw is for.
        match_id: MatchId,
        /// Conceal the result.
        blind: bool,
    },

    /// Stand on the current throw.
    Keep {
        /// Match the keep is for.
        match_id: MatchId,
    },

    /// Uncover the current blind throw.
    Reveal {
        /// Match the reveal is for.
        match_id: MatchId,
    },

    /// Request the current filtered state.
    GetState {
        /// Match to snapshot.
        match_id: MatchId,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client clock, echoed back.
        timestamp: u64,
    },

    /// Leave the current match (forfeits an active match).
    Leave,
}

impl ClientMessage {
    /// Short name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Auth(_) => "auth",
            ClientMessage::Enqueue { .. } => "enqueue",
            ClientMessage::CancelQueue => "cancel_queue",
            ClientMessage::Throw { .. } => "throw",
            ClientMessage::Keep { .. } => "keep",
            ClientMessage::Reveal { .. } => "reveal",
            ClientMessage::GetState { .. } => "get_state",
            ClientMessage::Ping { .. } => "ping",
            ClientMessage::Leave => "leave",
        }
    }
}

/// Authentication request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Player's unique identifier (hex string), honoured in development mode only.
    #[serde(default)]
    pub player_id: Option<String>,
    /// Authentication token (JWT), required when the server has a key configured.
    #[serde(default)]
    pub token: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Client version for compatibility check.
    #[serde(default)]
    pub client_version: String,
}

impl AuthRequest {
    /// Parse player_id from hex string to bytes.
    pub fn player_id_bytes(&self) -> Option<[u8; 16]> {
        let bytes = hex::decode(self.player_id.as_ref()?).ok()?;
        if bytes.len() != 16 {
            return None;
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&bytes);
        Some(arr)
    }
}

/// Match modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Against the server bot, no pairing.
    Bot,
    /// Against another queued participant.
    Versus,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// Queue status update.
    Queue(QueueStatusInfo),

    /// Paired, match created.
    MatchFound(MatchFoundInfo),

    /// Own throw, sent to the thrower.
    ThrowResult(ThrowResultInfo),

    /// Opponent's throw, redacted while blind.
    OpponentThrew(OpponentThrowInfo),

    /// A side kept its throw.
    Kept(KeptInfo),

    /// A blind throw was uncovered.
    Revealed(RevealedInfo),

    /// Round resolved.
    RoundResult(RoundResultInfo),

    /// Match finished.
    MatchOver(MatchOverInfo),

    /// Opponent connection changed.
    OpponentStatus(OpponentStatusInfo),

    /// Filtered state snapshot.
    State(MatchView),

    /// An action was refused.
    Rejected(Rejection),

    /// Pong response.
    Pong {
        /// Echo of the ping's timestamp.
        timestamp: u64,
        /// Server clock (Unix millis).
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why the server is going away.
        reason: String,
    },
}

/// Authentication result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether auth succeeded.
    pub success: bool,
    /// Assigned player identifier if successful.
    pub player_id: Option<[u8; 16]>,
    /// Match re-attached after a reconnect.
    pub resumed_match: Option<MatchId>,
    /// Error message if failed.
    pub error: Option<String>,
    /// Stable failure code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    /// Server version.
    pub server_version: String,
}

/// Queue status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting for an opponent.
    Queued,
    /// Removed on request.
    Cancelled,
    /// Waited too long.
    TimedOut,
}

/// Queue status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatusInfo {
    /// Current status.
    pub status: QueueStatus,
    /// Mode queued for.
    pub mode: Option<MatchMode>,
    /// 1-based position in the queue while queued.
    pub position: Option<u32>,
}

/// The other participant as announced at pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpponentInfo {
    /// Opponent identifier.
    pub player_id: [u8; 16],
    /// Display name.
    pub name: String,
    /// Played by the server.
    pub is_bot: bool,
}

/// Information about a created match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchFoundInfo {
    /// Unique match identifier.
    pub match_id: MatchId,
    /// Match mode.
    pub mode: MatchMode,
    /// Recipient's seat.
    pub your_seat: Seat,
    /// Who the recipient plays against.
    pub opponent: OpponentInfo,
    /// Initial filtered state.
    pub state: MatchView,
}

/// Result of the recipient's own throw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrowResultInfo {
    /// Match identifier.
    pub match_id: MatchId,
    /// The throw (display masked while blind).
    pub throw: ThrowView,
    /// Cap reached; only keep remains.
    pub is_last_throw: bool,
    /// Throws remaining this round.
    pub throws_left: u8,
    /// State version after the throw.
    pub version: u64,
}

/// Opponent's throw as the recipient may see it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpponentThrowInfo {
    /// Match identifier.
    pub match_id: MatchId,
    /// Thrower's seat.
    pub seat: Seat,
    /// The throw, without dice or rank while blind.
    pub throw: ThrowView,
    /// Cap reached for the opponent.
    pub is_last_throw: bool,
    /// State version after the throw.
    pub version: u64,
}

/// A side stood on its throw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeptInfo {
    /// Match identifier.
    pub match_id: MatchId,
    /// Seat that kept.
    pub seat: Seat,
    /// New turn holder.
    pub next_turn: Option<Seat>,
    /// State version after the keep.
    pub version: u64,
}

/// A blind throw was uncovered by its owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealedInfo {
    /// Match identifier.
    pub match_id: MatchId,
    /// Owner's seat.
    pub seat: Seat,
    /// Faces.
    pub dice: DicePair,
    /// Rank.
    pub rank: DiceRank,
    /// Display text.
    pub display_value: String,
    /// State version after the reveal.
    pub version: u64,
}

/// One side's kept throw in a round result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundThrowInfo {
    /// Seat.
    pub seat: Seat,
    /// Faces kept.
    pub dice: DicePair,
    /// Rank kept.
    pub rank: DiceRank,
    /// Display text.
    pub display_value: String,
    /// Throws taken.
    pub throws: u8,
    /// Lives after the round.
    pub lives: u8,
    /// Change in lives this round (0 or -1).
    pub lives_delta: i8,
}

/// Round outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResultInfo {
    /// Match identifier.
    pub match_id: MatchId,
    /// Round that resolved.
    pub round: u32,
    /// Starter of that round.
    pub starter: Seat,
    /// Both kept throws, seat A first.
    pub throws: Vec<RoundThrowInfo>,
    /// Round winner.
    pub winner: Seat,
    /// Starter and turn holder of the next round (None when the match ended).
    pub next_starter: Option<Seat>,
    /// State version after resolution.
    pub version: u64,
}

/// Match end information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOverInfo {
    /// Match identifier.
    pub match_id: MatchId,
    /// Winner player ID (None if aborted).
    pub winner_id: Option<[u8; 16]>,
    /// Winner seat.
    pub winner_seat: Option<Seat>,
    /// Why the match ended.
    pub reason: EndReason,
    /// Final lives, seat A first.
    pub final_lives: [u8; 2],
    /// Rounds played.
    pub rounds: u32,
}

/// Opponent connection change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpponentStatusInfo {
    /// Match identifier.
    pub match_id: MatchId,
    /// Opponent currently connected.
    pub connected: bool,
    /// Seconds the opponent has to return before forfeiting.
    pub grace_secs: Option<u64>,
}

/// Refusal of a client action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    /// Error code.
    pub code: ErrorCode,
    /// Rule violated, for `illegal_action`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<IllegalAction>,
    /// Human-readable message.
    pub message: String,
    /// Cooldown before retrying, for `rate_limited`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    /// Caller's current view of the match, when in one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<MatchView>,
}

impl Rejection {
    /// Rejection without a reason or state.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            reason: None,
            message: message.into(),
            retry_after_ms: None,
            state: None,
        }
    }

    /// Attach the caller's current view.
    pub fn with_state(mut self, state: Option<MatchView>) -> Self {
        self.state = state;
        self
    }
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Authentication failed.
    AuthFailed,
    /// Not authenticated.
    NotAuthenticated,
    /// JWT token has expired.
    TokenExpired,
    /// Invalid JWT token (signature, format, claims).
    InvalidToken,
    /// Invalid input.
    InvalidInput,
    /// Turn, phase or cap violation.
    IllegalAction,
    /// Stale or bad match id.
    UnknownMatch,
    /// Action before matchmaking completed.
    NotPaired,
    /// Opponent disconnected, match paused.
    PeerUnavailable,
    /// Match terminated after an internal failure.
    MatchAborted,
    /// Already in match.
    AlreadyInMatch,
    /// Already waiting in the queue.
    AlreadyQueued,
    /// Rate limited.
    RateLimited,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
