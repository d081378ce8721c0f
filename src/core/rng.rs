//! Deterministic Random Number Generator
//!
//! Xorshift128+ seeded through SplitMix64. Every match owns one of these as
//! its dice stream, so a recorded seed replays the exact same throws.

use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

/// Deterministic PRNG using the Xorshift128+ algorithm.
///
/// # Example
///
/// ```
/// use mexico_duel::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::new(12345);
/// let mut b = DeterministicRng::new(12345);
/// assert_eq!(a.roll_die(), b.roll_die());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, so sequential or
    /// low-entropy seeds still give well-spread streams.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Xorshift must never run from an all-zero state
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Create the dice stream for a match.
    ///
    /// The seed mixes fresh entropy with the match id and both participant
    /// ids; see [`derive_match_seed`].
    pub fn from_match_params(
        entropy: &[u8; 16],
        match_id: &[u8; 16],
        player_ids: &[[u8; 16]],
    ) -> Self {
        Self::new(derive_match_seed(entropy, match_id, player_ids))
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a uniform integer in `[0, max)`.
    ///
    /// Rejects the biased tail of the u64 range so small moduli (a die has
    /// six faces) stay exactly uniform.
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        let max = max as u64;
        let zone = u64::MAX - (u64::MAX % max);
        loop {
            let v = self.next_u64();
            if v < zone {
                return (v % max) as u32;
            }
        }
    }

    /// Roll one six-sided die (1..=6).
    #[inline]
    pub fn roll_die(&mut self) -> u8 {
        self.next_int(6) as u8 + 1
    }

    /// Get current state (for checkpointing/debugging).
    pub fn state(&self) -> [u64; 2] {
        self.state
    }

    /// Restore from saved state.
    pub fn set_state(&mut self, state: [u64; 2]) {
        self.state = state;
    }
}

/// SplitMix64 for seed initialization.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive a match seed.
///
/// - `entropy`: fresh random bytes drawn when the match is created
/// - `match_id`: unique match identifier
/// - `player_ids`: participant ids in seat order
pub fn derive_match_seed(
    entropy: &[u8; 16],
    match_id: &[u8; 16],
    player_ids: &[[u8; 16]],
) -> u64 {
    let mut hasher = Sha256::new();

    hasher.update(b"MEXICO_DUEL_SEED_V1");
    hasher.update(entropy);
    hasher.update(match_id);
    for pid in player_ids {
        hasher.update(pid);
    }

    let hash = hasher.finalize();
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&hash[0..8]);
    u64::from_le_bytes(seed)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_determinism() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(12345);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_rng_different_seeds() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(54321);

        assert_ne!(rng1.next_u64(), rng2.next_u64());
    }

    #[test]
    fn test_next_int_bounds() {
        let mut rng = DeterministicRng::new(1234);

        for _ in 0..1000 {
            assert!(rng.next_int(100) < 100);
        }

        assert_eq!(rng.next_int(0), 0);
        assert_eq!(rng.next_int(1), 0);
    }

    #[test]
    fn test_roll_die_covers_all_faces() {
        let mut rng = DeterministicRng::new(99);
        let mut seen = [0u32; 7];

        for _ in 0..6000 {
            let face = rng.roll_die();
            assert!((1..=6).contains(&face));
            seen[face as usize] += 1;
        }

        // Loose uniformity check: every face within 30% of the mean
        for count in &seen[1..] {
            assert!(*count > 700 && *count < 1300, "face count {}", count);
        }
    }

    #[test]
    fn test_derive_match_seed() {
        let entropy = [0u8; 16];
        let match_id = [1u8; 16];
        let player_ids = [[2u8; 16], [3u8; 16]];

        let seed1 = derive_match_seed(&entropy, &match_id, &player_ids);
        let seed2 = derive_match_seed(&entropy, &match_id, &player_ids);
        assert_eq!(seed1, seed2);

        let seed3 = derive_match_seed(&entropy, &[99u8; 16], &player_ids);
        assert_ne!(seed1, seed3);

        // Seat order matters
        let swapped = [[3u8; 16], [2u8; 16]];
        assert_ne!(seed1, derive_match_seed(&entropy, &match_id, &swapped));
    }

    #[test]
    fn test_state_checkpoint() {
        let mut rng = DeterministicRng::new(5555);

        for _ in 0..50 {
            rng.next_u64();
        }

        let saved_state = rng.state();
        let next_rolls: Vec<u8> = (0..10).map(|_| rng.roll_die()).collect();

        rng.set_state(saved_state);
        for expected in next_rolls {
            assert_eq!(rng.roll_die(), expected);
        }
    }
}
