//! Retry policy with exponential backoff and jitter
//!
//! The policy is a pure decision function: given the number of the attempt
//! that just failed and how it failed, it says whether to try again and how
//! long to wait first. Waiting is left to the caller.

use std::time::Duration;

use rand::Rng;

use crate::traits::ErrorKind;

/// Outcome of consulting the policy after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub should_retry: bool,
    pub delay: Duration,
}

impl RetryDecision {
    pub fn stop() -> Self {
        Self {
            should_retry: false,
            delay: Duration::ZERO,
        }
    }

    pub fn retry_after(delay: Duration) -> Self {
        Self {
            should_retry: true,
            delay,
        }
    }
}

/// Exponential backoff with full jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Decide what to do after attempt `attempt` (1-indexed) failed with `kind`
    pub fn next_decision(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        let mut rng = rand::thread_rng();
        self.next_decision_with_rng(attempt, kind, &mut rng)
    }

    pub fn next_decision_with_rng<R: Rng + ?Sized>(
        &self,
        attempt: u32,
        kind: ErrorKind,
        rng: &mut R,
    ) -> RetryDecision {
        if !kind.is_retryable() || attempt >= self.max_attempts {
            return RetryDecision::stop();
        }

        let ceiling = self.backoff_ceiling(attempt);
        // Uniform in [0, ceiling) so a pool of workers does not retry in lockstep
        let delay = if ceiling.is_zero() {
            Duration::ZERO
        } else {
            ceiling.mul_f64(rng.gen_range(0.0..1.0))
        };
        RetryDecision::retry_after(delay)
    }

    /// Upper bound of the delay after attempt `attempt`: base * 2^(attempt-1), capped
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryBuilder::new().build()
    }
}

/// Retry policy builder for easy customization
#[derive(Debug, Clone)]
pub struct RetryBuilder {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryBuilder {
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }

    /// Total attempts per task, including the first
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: self.base_delay,
            max_delay: self.max_delay,
        }
    }
}

impl Default for RetryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
