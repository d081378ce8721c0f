//! Dice streams.
//!
//! The state machine never rolls on its own; it asks a [`DiceRoller`].
//! Production matches use the seeded PRNG, tests and replays feed a
//! scripted sequence.

use std::collections::VecDeque;

use crate::core::rng::DeterministicRng;
use crate::game::rank::DicePair;

/// Source of dice throws.
pub trait DiceRoller: Send + Sync {
    /// Throw two independent dice.
    fn roll_pair(&mut self) -> DicePair;
}

impl DiceRoller for DeterministicRng {
    fn roll_pair(&mut self) -> DicePair {
        let first = self.roll_die();
        let second = self.roll_die();
        DicePair::new(first, second)
    }
}

/// Fixed sequence of throws, replayed in order.
///
/// Falls back to an internal PRNG once the script is exhausted so a
/// long-running bot turn never panics.
#[derive(Clone, Debug, Default)]
pub struct ScriptedDice {
    script: VecDeque<DicePair>,
    fallback: DeterministicRng,
}

impl ScriptedDice {
    /// Script from `(first, second)` face tuples.
    pub fn new<I>(throws: I) -> Self
    where
        I: IntoIterator<Item = (u8, u8)>,
    {
        Self {
            script: throws.into_iter().map(|(a, b)| DicePair::new(a, b)).collect(),
            fallback: DeterministicRng::default(),
        }
    }

    /// Append more throws.
    pub fn push(&mut self, first: u8, second: u8) {
        self.script.push_back(DicePair::new(first, second));
    }

    /// Throws not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl DiceRoller for ScriptedDice {
    fn roll_pair(&mut self) -> DicePair {
        match self.script.pop_front() {
            Some(pair) => pair,
            None => self.fallback.roll_pair(),
        }
    }
}
