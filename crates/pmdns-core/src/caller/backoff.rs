//! Exponential backoff schedule

use std::time::Duration;

use crate::config::RetryConfig;

/// Doubling delay schedule with an upper bound
///
/// Yields the delay to sleep before each retry: `initial`, `2 * initial`,
/// `4 * initial`, ... until `max`, then `max` forever.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { next: initial, max }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.initial_delay(), config.max_delay())
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.next.min(self.max);
        self.next = delay.saturating_mul(2).min(self.max);
        Some(delay)
    }
}
