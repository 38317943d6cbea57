//! Retry policy for device responses that may arrive late.
//
// The camera's scripting extension only answers once a script has been
// accepted, which can take longer than a single transport read. Reads are
// retried under a bounded, exponentially backed-off policy so a slow script is
// tolerated while a disconnected camera still surfaces as an error.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Defines a policy for retrying a read that timed out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// The maximum number of timed-out reads before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled after every further timeout.
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    /// Upper bound for a single backoff delay.
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    /// Total time budget across all attempts.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            timeout: Duration::from_secs(180),
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately, used by simulations and tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            timeout: Duration::from_secs(60),
        }
    }

    /// Backoff to wait after the given number of failed attempts (1-based).
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let shift = failed_attempts.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }

    /// Whether another attempt is allowed after `failed_attempts` timeouts
    /// and `elapsed` time spent so far.
    pub fn allows_retry(&self, failed_attempts: u32, elapsed: Duration) -> bool {
        failed_attempts < self.max_attempts && elapsed < self.timeout
    }
}
