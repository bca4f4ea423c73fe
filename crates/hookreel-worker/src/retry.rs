//! Retry utilities with exponential backoff.
//!
//! Uploads go through a small state machine: `Idle -> Attempting(1) ->
//! Attempting(2) -> ... -> Succeeded | Failed`. The delay before attempt
//! `n + 1` is `base_delay * 2^(n - 1)`, capped at `max_delay`.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failure (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay between attempt `attempt` failing and attempt `attempt + 1`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay)
    }
}

/// Where an operation is in its retry lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Attempting(u32),
    Succeeded,
    Failed,
}

/// Drives [`RetryState`] transitions for one operation.
#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: RetryState,
    attempts: u32,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Idle,
            attempts: 0,
        }
    }

    /// `Idle -> Attempting(1)`. Returns the attempt number.
    pub fn begin(&mut self) -> u32 {
        if self.state == RetryState::Idle {
            self.attempts = 1;
            self.state = RetryState::Attempting(1);
        }
        self.attempts
    }

    pub fn on_success(&mut self) {
        self.state = RetryState::Succeeded;
    }

    /// Record a failed attempt.
    ///
    /// Returns the delay before the next attempt, or `None` once the policy
    /// is exhausted (the machine is then `Failed`).
    pub fn on_failure(&mut self) -> Option<Duration> {
        let RetryState::Attempting(n) = self.state else {
            return None;
        };

        if n >= self.policy.max_attempts {
            self.state = RetryState::Failed;
            return None;
        }

        self.attempts = n + 1;
        self.state = RetryState::Attempting(n + 1);
        Some(self.policy.delay_after(n))
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Result of a retry operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success { value: T, attempts: u32 },
    /// Exhausted, or stopped early on a non-retryable error.
    Failed { error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryResult::Success { attempts, .. } | RetryResult::Failed { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Execute an async operation with retry logic, retrying every error.
///
/// # Example
/// ```ignore
/// let result = retry_async(&RetryPolicy::default(), "upload_video", |attempt| async move {
///     store.upload(&request).await
/// }).await;
/// ```
pub async fn retry_async<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    operation: F,
) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_async_if(policy, operation_name, operation, |_| true).await
}

/// Like [`retry_async`], but stops as soon as `should_retry` rejects an error.
///
/// The operation receives the 1-based attempt number.
pub async fn retry_async_if<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
    should_retry: P,
) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut machine = RetryMachine::new(*policy);
    let mut attempt = machine.begin();

    loop {
        match operation(attempt).await {
            Ok(value) => {
                machine.on_success();
                return RetryResult::Success {
                    value,
                    attempts: attempt,
                };
            }
            Err(e) if !should_retry(&e) => {
                warn!(operation = operation_name, attempt, error = %e, "Non-retryable failure");
                return RetryResult::Failed {
                    error: e,
                    attempts: attempt,
                };
            }
            Err(e) => match machine.on_failure() {
                Some(delay) => {
                    warn!(
                        operation = operation_name,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = machine.attempts();
                }
                None => {
                    debug!(operation = operation_name, attempts = attempt, "Retries exhausted");
                    return RetryResult::Failed {
                        error: e,
                        attempts: attempt,
                    };
                }
            },
        }
    }
}
