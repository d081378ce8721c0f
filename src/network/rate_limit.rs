//! Per-connection rate limiting.
//!
//! Token bucket checked before a client message is dispatched. A refused
//! message is answered with a `rate_limited` rejection and the time until
//! the next token, independent of game state.

use std::time::Duration;
use tokio::time::Instant;

/// Rate limit settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    /// Messages allowed in a burst.
    pub burst: u32,
    /// Tokens restored per second.
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst: 20,
            refill_per_sec: 10.0,
        }
    }
}

/// Slowest refill accepted from configuration.
pub const MIN_REFILL_PER_SEC: f64 = 0.01;

impl RateLimitConfig {
    /// Burst of at least one; refill finite and no slower than
    /// [`MIN_REFILL_PER_SEC`]. Unusable refills fall back to the default.
    pub fn sanitized(self) -> Self {
        let refill_per_sec = if !self.refill_per_sec.is_finite() || self.refill_per_sec <= 0.0 {
            Self::default().refill_per_sec
        } else {
            self.refill_per_sec.max(MIN_REFILL_PER_SEC)
        };
        Self {
            burst: self.burst.max(1),
            refill_per_sec,
        }
    }
}

/// Token bucket for one connection.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Full bucket.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            tokens: config.burst as f64,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.config.refill_per_sec)
            .min(self.config.burst as f64);
        self.last_refill = now;
    }

    /// Take one token, or report how long until one is available.
    pub fn check(&mut self) -> Result<(), Duration> {
        self.refill(Instant::now());
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }
        if self.config.refill_per_sec.is_nan() || self.config.refill_per_sec <= 0.0 {
            return Err(Duration::MAX);
        }
        let missing = 1.0 - self.tokens;
        Err(Duration::try_from_secs_f64(missing / self.config.refill_per_sec).unwrap_or(Duration::MAX))
    }

    /// Tokens currently available (whole).
    pub fn available(&mut self) -> u32 {
        self.refill(Instant::now());
        self.tokens.floor() as u32
    }
}
