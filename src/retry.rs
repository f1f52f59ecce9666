//! Bounded retry with exponential backoff.

use std::{fmt::Display, future::Future, time::Duration};

use log::{debug, warn};
use tokio::time::sleep;

/// Retry schedule: `max_retries` attempts in total, sleeping
/// `initial_delay`, `2 * initial_delay`, ... between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay slept after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Final failure returned once every attempt has been used.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub error: E,
}

/// Runs `operation` until it succeeds or the policy is exhausted.
///
/// The last error is handed back to the caller, never swallowed.
pub async fn with_retry<T, E, F, Fut>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, Exhausted<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_retries.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("Operation '{operation_name}' succeeded after {attempt} attempts");
                }
                return Ok(value);
            }
            Err(error) if attempt >= max_attempts => {
                return Err(Exhausted {
                    attempts: attempt,
                    error,
                });
            }
            Err(error) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "Operation '{operation_name}' failed (attempt {attempt}/{max_attempts}): {error}; retrying in {delay:?}"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_backoff() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let started = Instant::now();

        let result = with_retry("flaky", policy, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 { Err(format!("failure {n}")) } else { Ok(n) }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert!(started.elapsed() >= policy.initial_delay * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn surfaces_last_error_when_exhausted() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_retry("broken", RetryPolicy::default(), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Err(format!("failure {n}"))
        })
        .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 3);
        assert_eq!(exhausted.error, "failure 3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_still_attempts_once() {
        let policy = RetryPolicy {
            max_retries: 0,
            initial_delay: Duration::from_millis(10),
        };
        let result: Result<u8, Exhausted<&str>> = with_retry("once", policy, || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
