//! Transaction Retrier
//!
//! Bounded retry with a fixed cool-down between attempts. Every link failure
//! except a configuration fault counts as transient here; the session decides
//! whether the next attempt needs a reconnect.

use std::future::Future;
use std::time::Duration;

use crate::error::LinkError;
use crate::logger::DeviceLogger;

/// Retry budget for one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next
    pub cooldown: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(100);

    /// At least one attempt is always made
    pub fn new(max_attempts: u32, cooldown: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            cooldown,
        }
    }

    /// No delay between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Run `op` until it succeeds or the budget is spent.
    ///
    /// Sleeps the cool-down only between attempts, never after the last one.
    pub async fn run<T, F, Fut>(&self, logger: &DeviceLogger, mut op: F) -> Result<T, Exhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LinkError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts || !e.is_retryable() => {
                    return Err(Exhausted {
                        attempts: attempt,
                        last: e,
                    })
                },
                Err(e) => {
                    logger.log_retry(
                        attempt,
                        self.max_attempts,
                        self.cooldown.as_millis() as u64,
                        &e.to_string(),
                    );
                    if !self.cooldown.is_zero() {
                        tokio::time::sleep(self.cooldown).await;
                    }
                },
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Self::DEFAULT_COOLDOWN)
    }
}

/// Every attempt failed
#[derive(Debug, Clone, PartialEq)]
pub struct Exhausted {
    pub attempts: u32,
    /// Error from the final attempt
    pub last: LinkError,
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn logger() -> DeviceLogger {
        DeviceLogger::new("test", "retry")
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::immediate(3)
            .run(&logger(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, LinkError>(42)
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_failures() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::immediate(3)
            .run(&logger(), || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(LinkError::timeout("no response"))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_makes_exactly_max_attempts() {
        for max in 1..=5 {
            let calls = AtomicU32::new(0);
            let result: Result<(), _> = RetryPolicy::immediate(max)
                .run(&logger(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(LinkError::protocol("bad frame"))
                })
                .await;
            let err = result.unwrap_err();
            assert_eq!(err.attempts, max);
            assert_eq!(err.last, LinkError::protocol("bad frame"));
            assert_eq!(calls.load(Ordering::SeqCst), max);
        }
    }

    #[tokio::test]
    async fn test_config_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::immediate(3)
            .run(&logger(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LinkError::config("unsupported data bits: 9"))
            })
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert!(matches!(err.last, LinkError::Config(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_only_between_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let start = Instant::now();
        let result: Result<(), _> = policy
            .run(&logger(), || async { Err(LinkError::io("reset")) })
            .await;
        assert!(result.is_err());
        // Two pauses for three attempts
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(300));
    }
}
