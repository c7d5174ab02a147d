//! Fixed-delay bounded retry for network calls that must not be dropped.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::RetryError;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(20);
pub const DEFAULT_MAX_RETRIES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RETRY_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(delay: Duration, max_retries: u32) -> Self {
        Self { delay, max_retries }
    }

    /// Initial attempt plus every retry.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Progress report handed to the caller after each failed attempt.
#[derive(Debug)]
pub enum RetryEvent<'a, E> {
    /// Another attempt follows after the policy delay. `retry` counts from 1.
    Retrying {
        retry: u32,
        max_retries: u32,
        error: &'a E,
    },
    /// No attempts left.
    Exhausted { attempts: u32, error: &'a E },
}

impl<E: fmt::Display> RetryEvent<'_, E> {
    /// Learner-facing status line, e.g. `"No deployed scenarios found. Retrying...1/5"`.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Retrying {
                retry,
                max_retries,
                error,
            } => format!("{error}. Retrying...{retry}/{max_retries}"),
            Self::Exhausted { error, .. } => format!("{error}. Maximum attempts reached."),
        }
    }
}

/// Runs `operation` until it succeeds or `1 + max_retries` attempts have failed.
///
/// `on_attempt` sees every failure, which is where callers surface status
/// messages. Success ends the loop; there is no other cancellation.
///
/// # Errors
///
/// Returns `RetryError::Exhausted` carrying the last error once the cap is hit.
pub async fn retry_with_policy<T, E, F, Fut, C>(
    policy: RetryPolicy,
    mut on_attempt: C,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: FnMut(RetryEvent<'_, E>),
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 0;
    loop {
        attempt += 1;
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if attempt >= max_attempts {
            warn!(attempts = attempt, error = %error, "giving up after maximum attempts");
            on_attempt(RetryEvent::Exhausted {
                attempts: attempt,
                error: &error,
            });
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: error,
            });
        }

        warn!(
            attempt,
            max_attempts,
            delay_secs = policy.delay.as_secs(),
            error = %error,
            "operation failed, retrying"
        );
        on_attempt(RetryEvent::Retrying {
            retry: attempt,
            max_retries: policy.max_retries,
            error: &error,
        });
        tokio::time::sleep(policy.delay).await;
    }
}
