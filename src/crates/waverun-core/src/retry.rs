//! Retry policy with cancellation-aware backoff
//!
//! Node executions are wrapped in a [`RetryPolicy`]: attempt counting, a
//! delay schedule (constant / linear / exponential with a ceiling), a
//! retryable-error predicate, and an optional per-retry hook the scheduler
//! uses to emit `node.retrying` events.
//!
//! The delay before attempt *k+1* (attempts are 1-indexed):
//!
//! | strategy | delay(k) |
//! |---|---|
//! | constant | `initial_delay` |
//! | linear | `initial_delay × k` |
//! | exponential | `initial_delay × 2^(k-1)` |
//!
//! All delays are clamped to `max_delay`. Cancellation preempts both the
//! backoff wait and the attempt itself; a cancelled or timed-out attempt is
//! terminal and never retried.

use crate::error::{Result, WorkflowError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Hook invoked after a failed attempt that will be retried
pub type RetryHook = Arc<dyn Fn(u32, &WorkflowError) + Send + Sync>;

/// Delay growth strategy between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    Constant,
    Linear,
    Exponential,
}

/// Configuration for retrying failed node executions
#[derive(Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Ceiling applied to every computed delay
    pub max_delay: Duration,

    /// How the delay grows between attempts
    pub backoff: BackoffStrategy,

    /// Substring patterns marking an error retryable; empty means any
    /// retryable-class error matches
    pub retryable_errors: Vec<String>,

    /// Called with `(attempt, error)` before each backoff wait
    pub on_retry: Option<RetryHook>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff", &self.backoff)
            .field("retryable_errors", &self.retryable_errors)
            .field("on_retry", &self.on_retry.as_ref().map(|_| "<hook>"))
            .finish()
    }
}

impl Default for RetryPolicy {
    /// `{max_attempts: 3, initial_delay: 1s, max_delay: 30s, exponential}`
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget and default backoff
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff: BackoffStrategy::Exponential,
            retryable_errors: Vec::new(),
            on_retry: None,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_retryable_errors(mut self, patterns: Vec<String>) -> Self {
        self.retryable_errors = patterns;
        self
    }

    pub fn with_on_retry(mut self, hook: RetryHook) -> Self {
        self.on_retry = Some(hook);
        self
    }

    /// Delay applied after failed attempt `attempt` (1-indexed), clamped to
    /// `max_delay`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base = match self.backoff {
            BackoffStrategy::Constant => self.initial_delay,
            BackoffStrategy::Linear => self.initial_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(31));
                self.initial_delay.saturating_mul(factor)
            }
        };
        base.min(self.max_delay)
    }

    /// Whether the policy considers an error worth retrying
    ///
    /// Cancellation and deadline errors are never retryable. With no
    /// configured patterns, every other error is; otherwise the error
    /// display must contain one of the patterns.
    pub fn is_retryable(&self, error: &WorkflowError) -> bool {
        if error.is_cancellation() {
            return false;
        }
        if self.retryable_errors.is_empty() {
            return true;
        }
        let message = error.to_string();
        self.retryable_errors
            .iter()
            .any(|pattern| message.contains(pattern.as_str()))
    }

    /// Drive an operation through the attempt budget
    ///
    /// The operation receives the 1-indexed attempt number. Backoff waits
    /// race the cancellation token; a cancelled wait returns
    /// [`WorkflowError::Cancelled`] immediately.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled);
            }

            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if error.is_cancellation() {
                        return Err(error);
                    }
                    if !self.is_retryable(&error) || attempt == max_attempts {
                        if attempt == max_attempts && max_attempts > 1 {
                            return Err(WorkflowError::RetryExhausted {
                                attempts: max_attempts,
                                message: error.to_string(),
                            });
                        }
                        return Err(error);
                    }

                    if let Some(hook) = &self.on_retry {
                        hook(attempt, &error);
                    }

                    let delay = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "attempt failed, retrying after delay"
                    );
                    last_error = Some(error);

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(WorkflowError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        // Unreachable with max_attempts >= 1; kept for completeness.
        Err(last_error.unwrap_or(WorkflowError::Execution(
            "retry loop finished without an attempt".to_string(),
        )))
    }
}
