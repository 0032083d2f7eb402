//! Reconnect backoff policy
//!
//! `delay(n) = min(base × 2^n, cap) + U[0, jitter)`
//!
//! With the defaults (1 s base, 30 s cap, 1 s jitter) the pre-jitter delays
//! run 1, 2, 4, 8, 16, 30, 30, ... seconds.

use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter and an attempt budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub base: Duration,
    /// Upper bound on the exponential part
    pub cap: Duration,
    /// Upper bound (exclusive) of the uniform jitter
    pub jitter: Duration,
    /// Attempts before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            jitter: Duration::from_secs(1),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before `attempt` (0-based), without jitter
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |delay| delay.min(self.cap))
    }

    /// Delay before `attempt` (0-based), with jitter drawn from `rng`
    pub fn delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let jitter_nanos = u64::try_from(self.jitter.as_nanos()).unwrap_or(u64::MAX);
        let jitter = if jitter_nanos == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(rng.gen_range(0..jitter_nanos))
        };
        self.base_delay(attempt) + jitter
    }

    /// Longest delay this policy can produce
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.cap + self.jitter
    }
}
