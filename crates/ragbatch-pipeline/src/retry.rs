//! Per-batch retry state machine and exponential backoff.
//!
//! `Pending -> Attempting -> {Succeeded, RetryScheduled, Failed}`; a scheduled
//! retry goes back to `Attempting` once its delay has elapsed.

use rand::Rng;
use std::time::Duration;

use ragbatch_core::config::PipelineSettings;
use ragbatch_core::ErrorClass;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per batch, first try included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound of the uniform random jitter added to each delay.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS, base_delay: DEFAULT_BASE_DELAY, max_jitter: DEFAULT_MAX_JITTER }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_jitter: Duration::from_millis(settings.max_jitter_ms),
        }
    }

    /// `base_delay * 2^(attempt-1)` for the attempt that just failed (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }

    pub fn jitter(&self) -> Duration {
        let max = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Attempting { attempt: u32 },
    RetryScheduled { attempt: u32, delay: Duration },
    Succeeded { attempts: u32 },
    Failed { attempts: u32, class: ErrorClass },
}

/// Drives one batch through [`AttemptState`] under a [`RetryPolicy`].
#[derive(Debug)]
pub struct AttemptTracker {
    policy: RetryPolicy,
    state: AttemptState,
    attempts: u32,
    last_delay: Duration,
}

impl AttemptTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, state: AttemptState::Pending, attempts: 0, last_delay: Duration::ZERO }
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Enter `Attempting`; returns the 1-based attempt number.
    pub fn begin(&mut self) -> u32 {
        debug_assert!(matches!(self.state, AttemptState::Pending | AttemptState::RetryScheduled { .. }));
        self.attempts += 1;
        self.state = AttemptState::Attempting { attempt: self.attempts };
        self.attempts
    }

    pub fn succeed(&mut self) {
        self.state = AttemptState::Succeeded { attempts: self.attempts };
    }

    /// Record a failed attempt.
    ///
    /// Returns the delay before the next attempt, or `None` once the batch
    /// has failed for good. Only `Retryable` errors are retried. A provider
    /// `hint` (Retry-After) raises the delay but never lowers it, and delays
    /// never decrease from one retry to the next.
    pub fn fail(&mut self, class: ErrorClass, hint: Option<Duration>) -> Option<Duration> {
        if class != ErrorClass::Retryable || self.attempts >= self.policy.max_attempts {
            self.state = AttemptState::Failed { attempts: self.attempts, class };
            return None;
        }
        let computed = self.policy.backoff(self.attempts) + self.policy.jitter();
        let delay = computed.max(hint.unwrap_or(Duration::ZERO)).max(self.last_delay);
        self.last_delay = delay;
        self.state = AttemptState::RetryScheduled { attempt: self.attempts, delay };
        Some(delay)
    }
}
