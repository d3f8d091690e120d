//! # Fibonacci backoff for reconnect attempts.
//!
//! [`BackoffPolicy`] holds the knobs, [`Backoff`] is the running state machine
//! owned by the supervisor loop.
//!
//! Each scheduled attempt waits for the sum of the two previous delays,
//! starting from [`BackoffPolicy::initial`] and saturating at
//! [`BackoffPolicy::max`]:
//!
//! ```text
//! initial=1s max=5s  →  1s, 1s, 2s, 3s, 5s, 5s, 5s, ...
//! ```
//!
//! [`Backoff::reset`] returns to the start of the sequence; the supervisor
//! calls it once per `ready`.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use elkvisor::{Backoff, BackoffPolicy, JitterPolicy};
//!
//! let policy = BackoffPolicy {
//!     initial: Duration::from_secs(1),
//!     max: Duration::from_secs(5),
//!     jitter: JitterPolicy::None,
//!     max_attempts: None,
//! };
//! let mut backoff = Backoff::new(policy);
//!
//! let delays: Vec<u64> = (0..7)
//!     .map(|_| backoff.next_step().unwrap().delay.as_secs())
//!     .collect();
//! assert_eq!(delays, vec![1, 1, 2, 3, 5, 5, 5]);
//! ```

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{self, Instant, Sleep};

use crate::error::SupervisorError;
use crate::policies::jitter::JitterPolicy;

/// Reconnect backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry after a reset.
    pub initial: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Jitter applied to each computed delay.
    pub jitter: JitterPolicy,
    /// Attempt ceiling; `None` retries forever at the capped delay.
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    /// Returns a policy with:
    /// - `initial = 1s`;
    /// - `max = 30s`;
    /// - no jitter, no attempt ceiling.
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            jitter: JitterPolicy::None,
            max_attempts: None,
        }
    }
}

/// One scheduled attempt: its 1-based number and the delay before it fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffStep {
    /// Attempt number since the last reset (starting from 1).
    pub attempt: u32,
    /// Delay before the attempt fires.
    pub delay: Duration,
}

/// Running backoff state plus the single pending retry timer.
///
/// ### Rules
/// - At most one timer is armed at a time; [`Backoff::schedule`] while armed is a no-op.
/// - The attempt counter only moves when a timer is armed, never on connect failures.
/// - [`Backoff::cancel`] drops the timer; a cancelled attempt never fires.
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
    /// Delay returned by the previous step (`ZERO` after reset).
    last: Duration,
    /// Uncapped delay the next step starts from.
    upcoming: Duration,
    timer: Option<Armed>,
}

struct Armed {
    sleep: Pin<Box<Sleep>>,
    step: BackoffStep,
}

impl Backoff {
    /// Creates a backoff at the start of its sequence.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            last: Duration::ZERO,
            upcoming: policy.initial,
            timer: None,
        }
    }

    /// Returns the policy this backoff was built from.
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Number of attempts scheduled since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Zeroes the attempt count, returns the delay to `initial` and drops any pending timer.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.last = Duration::ZERO;
        self.upcoming = self.policy.initial;
        self.timer = None;
    }

    /// Computes the next step without arming a timer.
    ///
    /// Fails with [`SupervisorError::BackoffExhausted`] once `max_attempts` steps
    /// have been handed out since the last reset.
    pub fn next_step(&mut self) -> Result<BackoffStep, SupervisorError> {
        if let Some(limit) = self.policy.max_attempts {
            if self.attempt >= limit {
                return Err(SupervisorError::BackoffExhausted {
                    attempts: self.attempt,
                });
            }
        }

        let base = self.upcoming.min(self.policy.max);
        self.upcoming = self.upcoming.saturating_add(self.last);
        self.last = base;
        self.attempt = self.attempt.saturating_add(1);

        Ok(BackoffStep {
            attempt: self.attempt,
            delay: self.policy.jitter.apply(base, self.policy.max),
        })
    }

    /// Arms the retry timer for the next step.
    ///
    /// Returns `Ok(None)` if a timer is already pending.
    pub fn schedule(&mut self) -> Result<Option<BackoffStep>, SupervisorError> {
        if self.timer.is_some() {
            return Ok(None);
        }
        let step = self.next_step()?;
        self.timer = Some(Armed {
            sleep: Box::pin(time::sleep_until(Instant::now() + step.delay)),
            step,
        });
        Ok(Some(step))
    }

    /// True while a retry timer is armed.
    pub fn is_pending(&self) -> bool {
        self.timer.is_some()
    }

    /// Drops the pending timer, if any.
    pub fn cancel(&mut self) {
        self.timer = None;
    }

    /// Resolves when the armed timer fires and disarms it; pends forever when nothing is armed.
    ///
    /// Cancel-safe: dropping the future before it resolves keeps the timer armed.
    pub async fn elapsed(&mut self) -> BackoffStep {
        match self.timer.as_mut() {
            Some(armed) => {
                armed.sleep.as_mut().await;
                let step = armed.step;
                self.timer = None;
                step
            }
            None => pending().await,
        }
    }
}
