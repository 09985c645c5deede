use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

use crate::config::TranscriptionSection;

/// Bounded exponential backoff with jitter. Only errors the caller's
/// predicate marks as retryable consume additional attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
    jitter_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter_ms: base_delay.as_millis().min(1000) as u64,
        }
    }

    pub fn from_section(section: &TranscriptionSection) -> Self {
        Self::new(
            section.max_attempts,
            Duration::from_millis(section.backoff_base_ms),
            Duration::from_millis(section.backoff_cap_ms),
        )
    }

    pub fn no_delay(max_attempts: usize) -> Self {
        let mut policy = Self::new(max_attempts, Duration::ZERO, Duration::ZERO);
        policy.jitter_ms = 0;
        policy
    }

    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let factor = 1u32 << (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if self.jitter_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=self.jitter_ms))
    }

    pub async fn run<F, Fut, T, E>(
        &self,
        label: &str,
        retryable: fn(&E) -> bool,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1usize;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= self.max_attempts || !retryable(&error) {
                        return Err(error);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        %error,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "{label} failed, retrying"
                    );
                    attempt += 1;
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct FakeError {
        transient: bool,
    }

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "fake error (transient={})", self.transient)
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let policy = RetryPolicy::no_delay(3);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_run = Arc::clone(&calls);
        let result = policy
            .run("fetch", |e: &FakeError| e.transient, move || {
                let calls = Arc::clone(&calls_for_run);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(FakeError { transient: true })
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let policy = RetryPolicy::no_delay(5);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_run = Arc::clone(&calls);
        let result: Result<(), FakeError> = policy
            .run("fetch", |e: &FakeError| e.transient, move || {
                let calls = Arc::clone(&calls_for_run);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(FakeError { transient: false })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempts_are_capped() {
        let policy = RetryPolicy::no_delay(3);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_run = Arc::clone(&calls);
        let result: Result<(), FakeError> = policy
            .run("fetch", |e: &FakeError| e.transient, move || {
                let calls = Arc::clone(&calls_for_run);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(FakeError { transient: true })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
