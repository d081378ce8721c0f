//! Network Layer
//!
//! WebSocket server, identity, matchmaking and match coordination.
//! This layer is **non-deterministic**; all rules run through `game/`.

pub mod auth;
pub mod protocol;
pub mod rate_limit;
pub mod coordinator;
pub mod matchmaker;
pub mod server;

pub use auth::{authenticate, AuthConfig, AuthError, Identity, TokenClaims};
pub use protocol::{ClientMessage, ServerMessage, ErrorCode, MatchId, MatchMode, Rejection};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use coordinator::{MatchCoordinator, MatchError, MatchRegistry, Participant, SweepPolicy};
pub use matchmaker::{EnqueueOutcome, Matchmaker};
pub use server::{GameServer, ServerConfig, GameServerError};
