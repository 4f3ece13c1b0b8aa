//! # Exponential Backoff
//!
//! Provides a bounded exponential backoff for retrying reconciliation passes
//! that failed with a transient cluster API error.
//!
//! Sequence with the defaults (500ms initial, 30s max):
//! 500ms, 1s, 2s, 4s, 8s, 16s, 30s (max), 30s, ...

use std::time::Duration;

/// Exponential backoff calculator
///
/// Each backoff is twice the previous one, capped at `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Initial backoff (for reset)
    initial: Duration,
    /// Backoff returned by the next call
    current: Duration,
    /// Maximum backoff
    max: Duration,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff with the given initial and maximum delays
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            current: initial.min(max),
            max,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        result
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.current = self.initial.min(self.max);
    }
}
