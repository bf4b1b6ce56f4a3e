//! Retry Policy
//!
//! Tree operations get a small fixed number of attempts with a linearly
//! growing pause: the n-th retry waits `n * step`.

use crate::client::TreeError;
use backoff::backoff::Backoff;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub step: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, step: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            step,
        }
    }

    pub fn backoff(&self) -> LinearBackoff {
        LinearBackoff {
            step: self.step,
            attempts: self.attempts,
            failed: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

/// Linear schedule with a hard attempt cap
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    step: Duration,
    attempts: u32,
    failed: u32,
}

impl Backoff for LinearBackoff {
    fn reset(&mut self) {
        self.failed = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.failed += 1;
        if self.failed >= self.attempts {
            return None;
        }
        Some(self.step * self.failed)
    }
}

/// Wraps a tree error for the retry loop. Permanent errors stop it early.
pub(crate) fn classify(err: TreeError) -> backoff::Error<TreeError> {
    if err.is_permanent() {
        backoff::Error::permanent(err)
    } else {
        backoff::Error::transient(err)
    }
}

/// Runs `op` under `policy`, logging every failed attempt that will be retried.
pub(crate) async fn retry_op<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &'static str,
    path: &str,
    op: F,
) -> Result<T, TreeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, backoff::Error<TreeError>>>,
{
    backoff::future::retry_notify(policy.backoff(), op, |err: TreeError, delay: Duration| {
        warn!(
            op = op_name,
            path = path,
            error = %err,
            retry_in_ms = delay.as_millis() as u64,
            "Tree operation failed, retrying"
        );
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_linear_schedule() {
        let mut backoff = RetryPolicy::default().backoff();
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(400)));
        assert_eq!(backoff.next_backoff(), None);

        backoff.reset();
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(200)));
    }

    #[test]
    fn test_single_attempt_never_waits() {
        let mut backoff = RetryPolicy::new(0, Duration::from_millis(200)).backoff();
        assert_eq!(backoff.next_backoff(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_last_attempt() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let started = tokio::time::Instant::now();

        let result: Result<(), TreeError> =
            retry_op(&RetryPolicy::default(), "data", "/svc/a", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(classify(TreeError::ConnectionClosed))
            })
            .await;

        assert_eq!(result, Err(TreeError::ConnectionClosed));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), TreeError> =
            retry_op(&RetryPolicy::default(), "children", "/svc", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(classify(TreeError::NoNode("/svc".into())))
            })
            .await;

        assert_eq!(result, Err(TreeError::NoNode("/svc".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_before_last_attempt() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result = retry_op(&RetryPolicy::default(), "data", "/svc/a", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(classify(TreeError::Unknown))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
