//! Tests for RetryPolicy::execute against the crate error classification

use infra::error::Error;
use infra::retry::RetryPolicy;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_retries_retryable_until_success() {
    let counter = AtomicU32::new(0);
    let calls = &counter;
    let policy = RetryPolicy::constant(3, Duration::from_secs(1));

    let result = policy
        .execute(|| async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(Error::api("throttled", true))
            } else {
                Ok(n)
            }
        })
        .await;

    assert_eq!(result.unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_fails_immediately() {
    let counter = AtomicU32::new(0);
    let calls = &counter;
    let policy = RetryPolicy::constant(5, Duration::from_secs(1));

    let result: infra::error::Result<()> = policy
        .execute(|| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::InvalidInput("bad".into()))
        })
        .await;

    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_retries() {
    let counter = AtomicU32::new(0);
    let calls = &counter;
    let policy = RetryPolicy::constant(2, Duration::from_millis(100));

    let result: infra::error::Result<()> = policy
        .execute(|| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::api("service unavailable", true))
        })
        .await;

    let err = result.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_no_retry_policy_runs_once() {
    let counter = AtomicU32::new(0);
    let calls = &counter;

    let result: infra::error::Result<()> = RetryPolicy::no_retry()
        .execute(|| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::api("throttled", true))
        })
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
