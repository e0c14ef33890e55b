//! Generic wait loop used by the managers to block until a resource settles.
//!
//! The first check happens after [`PollOptions::initial_delay`] (one second by
//! default) and every [`PollOptions::interval`] after that. A check that
//! reports [`PollStatus::Failed`] stops the loop with a non-retryable
//! [`Error::Poll`]; running out of time yields a retryable one.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// Timing for a wait loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Give up after this long
    pub timeout: Duration,
    /// Time between two checks
    pub interval: Duration,
    /// Delay before the first check
    pub initial_delay: Duration,
}

impl PollOptions {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            initial_delay: Duration::from_secs(1),
        }
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::new(Duration::from_secs(900), Duration::from_secs(10))
    }
}

/// Outcome of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    /// Desired state reached
    Done(T),
    /// Still converging; carries the observed state for logging
    Pending(String),
    /// A terminal state other than the desired one was observed
    Failed(String),
}

/// Run `check` until it reports [`PollStatus::Done`], a failure, or the timeout expires.
pub async fn poll<T, F, Fut>(description: &str, opts: &PollOptions, mut check: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>>>,
{
    info!(
        "waiting for {} (timeout {:?}, interval {:?})",
        description, opts.timeout, opts.interval
    );

    let start = Instant::now();
    let mut attempts: u64 = 0;

    loop {
        let wait = if attempts == 0 {
            opts.initial_delay
        } else {
            opts.interval
        };

        // the first check always runs, even when the timeout is shorter than the delay
        if attempts > 0 && start.elapsed() + wait > opts.timeout {
            break;
        }
        sleep(wait).await;
        attempts += 1;

        match check().await? {
            PollStatus::Done(value) => {
                info!(
                    "{} reached after {:?} ({} checks)",
                    description,
                    start.elapsed(),
                    attempts
                );
                return Ok(value);
            }
            PollStatus::Pending(state) => {
                debug!(
                    "poll {} (current state {}, elapsed {:?})",
                    description,
                    state,
                    start.elapsed()
                );
            }
            PollStatus::Failed(reason) => {
                return Err(Error::Poll {
                    message: format!("{} failed: {}", description, reason),
                    retryable: false,
                });
            }
        }
    }

    Err(Error::Poll {
        message: format!(
            "timed out after {:?} waiting for {} ({} checks)",
            opts.timeout, description, attempts
        ),
        retryable: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_poll_done_after_pending() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let opts = PollOptions::new(Duration::from_secs(60), Duration::from_secs(5));

        let result = poll("stack CREATE_COMPLETE", &opts, || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Ok(PollStatus::Pending("CREATE_IN_PROGRESS".to_string()))
                } else {
                    Ok(PollStatus::Done(n))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failed_is_not_retryable() {
        let opts = PollOptions::new(Duration::from_secs(60), Duration::from_secs(5));
        let err = poll::<(), _, _>("command Success", &opts, || async {
            Ok(PollStatus::Failed("Failed".to_string()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Poll { retryable: false, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_timeout_is_retryable() {
        let opts = PollOptions::new(Duration::from_secs(30), Duration::from_secs(10));
        let err = poll::<(), _, _>("instance running", &opts, || async {
            Ok(PollStatus::Pending("pending".to_string()))
        })
        .await
        .unwrap_err();

        assert!(err.is_retryable());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_propagates_check_errors() {
        let opts = PollOptions::default();
        let err = poll::<(), _, _>("anything", &opts, || async {
            Err(Error::api("failed describe_stacks", false))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Api { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_checks_once_when_timeout_is_shorter_than_delay() {
        let opts = PollOptions::new(Duration::from_millis(500), Duration::from_secs(5));
        let result = poll("parameter", &opts, || async { Ok(PollStatus::Done(7)) })
            .await
            .unwrap();
        assert_eq!(result, 7);

        let err = poll::<(), _, _>("parameter", &opts, || async {
            Ok(PollStatus::Pending("pending".to_string()))
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("(1 checks)"));
    }
}
