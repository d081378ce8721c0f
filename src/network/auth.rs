//! Participant identity.
//!
//! A seat belongs to whoever the identity provider vouches for. With a
//! shared secret configured, `auth` must carry an HS256 token whose `sub`
//! becomes the player id. Without one the server runs in development mode
//! and trusts the declared hex id.

use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::game::state::PlayerId;
use crate::network::protocol::{AuthRequest, ErrorCode};

/// Longest display name kept; longer names are truncated.
pub const MAX_NAME_LEN: usize = 32;

/// Domain prefix hashed in front of the token subject.
const PLAYER_ID_DOMAIN: &[u8] = b"mexico-duel-player:";

/// Identity provider settings.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Shared HS256 secret. None means development mode.
    pub secret: Option<String>,
    /// Required `iss` claim, if any.
    pub issuer: Option<String>,
    /// Seconds of clock skew tolerated on `exp`.
    pub leeway_secs: u64,
}

impl AuthConfig {
    /// Read `MEXICO_AUTH_SECRET`, `MEXICO_AUTH_ISSUER` and
    /// `MEXICO_AUTH_LEEWAY_SECS`. Empty values count as unset.
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            secret: var("MEXICO_AUTH_SECRET"),
            issuer: var("MEXICO_AUTH_ISSUER"),
            leeway_secs: var("MEXICO_AUTH_LEEWAY_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }

    /// Tokens are required.
    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway_secs;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        validation
    }
}

/// Claims a duel token carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Provider's account id.
    pub sub: String,
    /// Expiry (Unix seconds).
    pub exp: u64,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Display name; wins over the name in the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl TokenClaims {
    /// Stable id: the first 16 bytes of SHA-256 over the domain prefix and `sub`.
    pub fn player_id(&self) -> PlayerId {
        let hash = Sha256::new()
            .chain_update(PLAYER_ID_DOMAIN)
            .chain_update(self.sub.as_bytes())
            .finalize();

        let mut id = [0u8; 16];
        id.copy_from_slice(&hash[..16]);
        PlayerId::new(id)
    }
}

/// A participant identity accepted by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable participant id.
    pub player_id: PlayerId,
    /// Display name.
    pub name: String,
}

/// Why an `auth` message was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// A secret is configured but no token was sent.
    #[error("auth token required")]
    MissingToken,
    /// Development mode needs a 32-character hex player id.
    #[error("player_id must be 32 hex characters")]
    MalformedPlayerId,
    /// Token is past its `exp`.
    #[error("token expired")]
    Expired,
    /// Token has an empty subject.
    #[error("token subject is empty")]
    EmptySubject,
    /// Signature, issuer or encoding did not check out.
    #[error("token rejected: {0}")]
    Rejected(String),
}

impl AuthError {
    /// Wire code carried by the failed `auth_result`.
    pub fn code(&self) -> ErrorCode {
        match self {
            AuthError::Expired => ErrorCode::TokenExpired,
            AuthError::EmptySubject | AuthError::Rejected(_) => ErrorCode::InvalidToken,
            AuthError::MissingToken | AuthError::MalformedPlayerId => ErrorCode::AuthFailed,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Rejected(err.to_string()),
        }
    }
}

/// Check a token against the configured secret and issuer.
pub fn validate_token(token: &str, secret: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let claims = decode::<TokenClaims>(token, &key, &config.validation())?.claims;
    if claims.sub.trim().is_empty() {
        return Err(AuthError::EmptySubject);
    }
    Ok(claims)
}

/// Trim a requested display name, falling back to a short id.
fn display_name(requested: Option<&str>, player_id: &PlayerId) -> String {
    let trimmed = requested.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        format!("player-{}", player_id.short_hex())
    } else {
        trimmed.chars().take(MAX_NAME_LEN).collect()
    }
}

/// Resolve an `auth` message to an identity.
///
/// Once a secret is configured the declared id is ignored; the token alone
/// decides who is sitting down.
pub fn authenticate(req: &AuthRequest, config: &AuthConfig) -> Result<Identity, AuthError> {
    let (player_id, requested) = match &config.secret {
        Some(secret) => {
            let token = req.token.as_deref().ok_or(AuthError::MissingToken)?;
            let claims = validate_token(token, secret, config)?;
            (claims.player_id(), claims.name.or_else(|| req.name.clone()))
        }
        None => {
            let bytes = req.player_id_bytes().ok_or(AuthError::MalformedPlayerId)?;
            (PlayerId::new(bytes), req.name.clone())
        }
    };

    Ok(Identity {
        player_id,
        name: display_name(requested.as_deref(), &player_id),
    })
}
