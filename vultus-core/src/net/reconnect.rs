//! Bounded fixed-delay reconnection policy.
//!
//! Pure state machine: the transport asks it what to do after each
//! disconnect, so the attempt bound is testable without sockets.

use std::time::Duration;

use crate::config::ReconnectConfig;

/// Tracks consecutive failed connection attempts.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    delay: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            delay: config.delay(),
            max_attempts: config.max_attempts,
            attempts: 0,
        }
    }

    /// A connection opened; the attempt counter starts over.
    pub fn on_connected(&mut self) {
        self.attempts = 0;
    }

    /// Ask for the next retry after a disconnect or failed attempt.
    ///
    /// Returns the fixed delay to wait, or `None` once the attempt budget
    /// is spent — the caller must then stop retrying for good.
    pub fn next_retry(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.delay)
    }

    /// Attempts consumed since the last successful connection.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
