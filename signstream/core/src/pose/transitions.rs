//! Transition Table
//!
//! Delay inserted between two consecutive signs, keyed by the
//! `(previous, next)` token pair.

use std::collections::HashMap;

use thiserror::Error;

/// Transition time used for pairs without an explicit entry
pub const DEFAULT_TRANSITION_SECS: f64 = 0.3;

/// Errors raised when adding a transition rule
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransitionError {
    /// Transition times must be finite and not negative
    #[error("transition {from} -> {to} has invalid duration {seconds}")]
    InvalidDuration {
        /// Previous token
        from: String,
        /// Next token
        to: String,
        /// Offending duration
        seconds: f64,
    },
}

/// Two-level `from -> to -> seconds` lookup
#[derive(Clone, Debug)]
pub struct TransitionTable {
    rules: HashMap<String, HashMap<String, f64>>,
    fallback: f64,
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TransitionTable {
    /// Table with no entries; every pair uses the fallback
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
            fallback: DEFAULT_TRANSITION_SECS,
        }
    }

    /// Table with the built-in transition rules
    #[must_use]
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        let rules: [(&str, &[(&str, f64)]); 7] = [
            ("HELLO", &[("HOW", 0.3), ("YOU", 0.2), ("DEFAULT", 0.4)]),
            ("HOW", &[("YOU", 0.2), ("HELLO", 0.3), ("DEFAULT", 0.3)]),
            ("YOU", &[("HELLO", 0.2), ("DEFAULT", 0.3)]),
            ("THANK-YOU", &[("DEFAULT", 0.5)]),
            ("YES", &[("DEFAULT", 0.2)]),
            ("NO", &[("DEFAULT", 0.2)]),
            (
                "DEFAULT",
                &[("HELLO", 0.3), ("HOW", 0.3), ("YOU", 0.2), ("THANK-YOU", 0.4)],
            ),
        ];
        for (from, targets) in rules {
            for &(to, secs) in targets {
                table.set(from, to, secs);
            }
        }
        table
    }

    /// Seconds to transition from `from` into `to`
    ///
    /// Case-insensitive; unknown pairs return the fallback.
    #[must_use]
    pub fn get_transition_duration(&self, from: &str, to: &str) -> f64 {
        self.rules
            .get(&from.to_uppercase())
            .and_then(|targets| targets.get(&to.to_uppercase()))
            .copied()
            .unwrap_or(self.fallback)
    }

    /// Add or replace a transition rule, returning the previous duration
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::InvalidDuration`] and leaves the table
    /// untouched if `seconds` is negative or not finite.
    pub fn insert(&mut self, from: &str, to: &str, seconds: f64) -> Result<Option<f64>, TransitionError> {
        if seconds < 0.0 || !seconds.is_finite() {
            return Err(TransitionError::InvalidDuration {
                from: from.to_uppercase(),
                to: to.to_uppercase(),
                seconds,
            });
        }
        Ok(self.set(from, to, seconds))
    }

    fn set(&mut self, from: &str, to: &str, seconds: f64) -> Option<f64> {
        self.rules
            .entry(from.to_uppercase())
            .or_default()
            .insert(to.to_uppercase(), seconds)
    }

    /// The fallback duration for unknown pairs
    #[must_use]
    pub fn fallback(&self) -> f64 {
        self.fallback
    }
}
