/*!
 * Per-batch retry state machine.
 *
 * A batch moves `Pending -> InFlight -> {Succeeded, RetryScheduled, Failed}`
 * and from `RetryScheduled` back to `InFlight`. The machine only decides; the
 * dispatcher performs the calls and the sleeps.
 */

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff with additive jitter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Cap for the un-jittered delay
    pub max_delay: Duration,
    /// Extra random delay, as a fraction of the capped delay (0.0 - 1.0)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay before retry number `retry` (1-based).
    ///
    /// Doubles on every retry and never exceeds `max_delay`.
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(retry - 1).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Largest jitter that may be added to a base delay
    fn jitter_bound(&self, base: Duration) -> Duration {
        base.mul_f64(self.jitter.clamp(0.0, 1.0))
    }

    /// Delay before retry number `retry`, jitter included
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay_for(retry);
        let bound = self.jitter_bound(base).as_millis() as u64;
        if bound == 0 {
            return base;
        }
        let extra = rand::rng().random_range(0..=bound);
        base + Duration::from_millis(extra)
    }

    /// Upper bound on the total time spent sleeping for one batch
    pub fn max_total_backoff(&self) -> Duration {
        (1..=self.max_retries)
            .map(|retry| {
                let base = self.base_delay_for(retry);
                base + self.jitter_bound(base)
            })
            .sum()
    }

    /// Total attempts allowed, first one included
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Lifecycle of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    InFlight { attempt: u32 },
    RetryScheduled { attempt: u32, delay: Duration },
    Succeeded { attempts: u32 },
    Failed { attempts: u32 },
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

/// Result of one backend attempt, as far as retrying is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    /// May succeed if repeated
    Transient,
    /// Will fail the same way if repeated
    Permanent,
}

/// Drives one batch through its retry states
#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: BatchState,
    total_backoff: Duration,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: BatchState::Pending,
            total_backoff: Duration::ZERO,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Backoff scheduled so far
    pub fn total_backoff(&self) -> Duration {
        self.total_backoff
    }

    /// Number of attempts started so far
    pub fn attempts(&self) -> u32 {
        match self.state {
            BatchState::Pending => 0,
            BatchState::InFlight { attempt } | BatchState::RetryScheduled { attempt, .. } => attempt,
            BatchState::Succeeded { attempts } | BatchState::Failed { attempts } => attempts,
        }
    }

    /// Start the next attempt. Returns its 1-based number, or `None` when the
    /// batch is not waiting for one.
    pub fn begin_attempt(&mut self) -> Option<u32> {
        let attempt = match self.state {
            BatchState::Pending => 1,
            BatchState::RetryScheduled { attempt, .. } => attempt + 1,
            _ => return None,
        };
        self.state = BatchState::InFlight { attempt };
        Some(attempt)
    }

    /// Record how the in-flight attempt ended and move to the next state
    pub fn record(&mut self, outcome: AttemptOutcome) -> BatchState {
        let BatchState::InFlight { attempt } = self.state else {
            return self.state;
        };

        self.state = match outcome {
            AttemptOutcome::Success => BatchState::Succeeded { attempts: attempt },
            AttemptOutcome::Permanent => BatchState::Failed { attempts: attempt },
            AttemptOutcome::Transient if attempt <= self.policy.max_retries => {
                let delay = self.policy.delay_for(attempt);
                self.total_backoff += delay;
                BatchState::RetryScheduled { attempt, delay }
            }
            AttemptOutcome::Transient => BatchState::Failed { attempts: attempt },
        };
        self.state
    }
}
