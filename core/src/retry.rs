//! Reconnect backoff for the alert stream.

use std::time::Duration;

use backon::BackoffBuilder;
use backon::ExponentialBackoff;
use backon::ExponentialBuilder;
use serde::Deserialize;
use serde::Serialize;

/// Bounded exponential backoff between reconnect attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f32,
    /// Reconnect attempts allowed after a failure before the feed gives up.
    pub max_attempts: usize,
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            max_attempts: 8,
            jitter: true,
        }
    }
}

impl ReconnectPolicy {
    /// A fresh delay sequence. Yields at most `max_attempts` delays; `None`
    /// from the iterator means retries are exhausted.
    pub fn backoff(&self) -> ExponentialBackoff {
        let builder = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.initial_backoff_ms))
            .with_max_delay(Duration::from_millis(
                self.max_backoff_ms.max(self.initial_backoff_ms),
            ))
            .with_factor(self.backoff_multiplier.max(1.0))
            .with_max_times(self.max_attempts);

        if self.jitter {
            builder.with_jitter().build()
        } else {
            builder.build()
        }
    }
}
