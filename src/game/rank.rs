//! Rank Engine
//!
//! Converts a pair of die faces into a [`DiceRank`] and decides who wins a
//! comparison. Stateless; every comparison in the server routes through
//! here.
//!
//! ## Ranking
//!
//! | Throw            | Rank                      |
//! |------------------|---------------------------|
//! | {1,2} (Mexico)   | 1000                      |
//! | (n,n) doubles    | n × 100                   |
//! | anything else    | 10 × high + low (21..=65) |

use std::cmp::Ordering;
use std::fmt;

use serde::{Serialize, Deserialize};

/// Rank of the Mexico throw, the unique maximum.
pub const MEXICO_RANK: u16 = 1000;

/// Two die faces as thrown (order preserved for display only).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DicePair {
    /// First die (1-6).
    pub first: u8,
    /// Second die (1-6).
    pub second: u8,
}

impl DicePair {
    /// Create a pair from two faces.
    pub const fn new(first: u8, second: u8) -> Self {
        Self { first, second }
    }

    /// Higher face.
    #[inline]
    pub fn high(&self) -> u8 {
        self.first.max(self.second)
    }

    /// Lower face.
    #[inline]
    pub fn low(&self) -> u8 {
        self.first.min(self.second)
    }

    /// Rank of this pair.
    #[inline]
    pub fn rank(&self) -> DiceRank {
        rank(self.first, self.second)
    }
}

/// Derived total order over the 21 unordered dice pairs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiceRank(pub u16);

impl DiceRank {
    /// Numeric value.
    #[inline]
    pub fn value(self) -> u16 {
        self.0
    }

    /// Is this the Mexico throw?
    #[inline]
    pub fn is_mexico(self) -> bool {
        self.0 == MEXICO_RANK
    }

    /// Is this a double?
    #[inline]
    pub fn is_double(self) -> bool {
        self.0 >= 100 && self.0 <= 600 && self.0 % 100 == 0
    }
}

impl fmt::Display for DiceRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_mexico() {
            write!(f, "Mexico")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Rank two die faces. Order-independent.
pub fn rank(die1: u8, die2: u8) -> DiceRank {
    let high = die1.max(die2) as u16;
    let low = die1.min(die2) as u16;

    if high == 2 && low == 1 {
        DiceRank(MEXICO_RANK)
    } else if high == low {
        DiceRank(high * 100)
    } else {
        DiceRank(high * 10 + low)
    }
}

/// Result of comparing side A's rank with side B's.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Side A wins.
    AWins,
    /// Side B wins.
    BWins,
}

/// Compare two ranks. Never a draw: equal ranks (Mexico against Mexico
/// included) go to whichever side holds the starter role.
pub fn compare(rank_a: DiceRank, rank_b: DiceRank, starter_is_a: bool) -> Comparison {
    match rank_a.cmp(&rank_b) {
        Ordering::Greater => Comparison::AWins,
        Ordering::Less => Comparison::BWins,
        Ordering::Equal if starter_is_a => Comparison::AWins,
        Ordering::Equal => Comparison::BWins,
    }
}
