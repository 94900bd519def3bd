//! Contract tests for the retry-timeout executor.
//!
//! These pin the externally observable behavior callers depend on:
//! attempt counts, message preservation, and timeout classification.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tower_invoke::{execute, InvokeError, RetryPolicy};

#[tokio::test(start_paused = true)]
async fn always_rejecting_operation_runs_exactly_four_attempts() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_cl = calls.clone();
    let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(1000));

    let result: Result<(), _> = execute("image-gen", &policy, || {
        let calls = calls_cl.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(InvokeError::external("image-gen", "boom"))
        }
    })
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "boom");
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn fast_operation_returns_after_a_single_attempt() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_cl = calls.clone();
    let policy = RetryPolicy::new(5, Duration::from_millis(10), Duration::from_millis(1000));

    let value = execute("image-gen", &policy, || {
        let calls = calls_cl.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(5)).await;
            Ok::<_, InvokeError>("generated")
        }
    })
    .await
    .unwrap();

    assert_eq!(value, "generated");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn operation_slower_than_timeout_is_classified_as_timeout() {
    let policy = RetryPolicy::new(0, Duration::from_millis(10), Duration::from_millis(20));

    let result: Result<&str, _> = execute("license-check", &policy, || async {
        sleep(Duration::from_millis(80)).await;
        Ok("too late")
    })
    .await;

    let err = result.unwrap_err();
    assert!(matches!(err, InvokeError::ExternalApi { ref service, .. } if service == "license-check"));
    assert!(err.to_string().contains("did not respond within 20ms"));
    assert!(err.retryable());
}

#[tokio::test(start_paused = true)]
async fn timeout_and_rejection_messages_stay_distinguishable() {
    let policy = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(20));

    let timeout_err = execute::<_, _, ()>("masking", &policy, || async {
        sleep(Duration::from_millis(50)).await;
        Ok(())
    })
    .await
    .unwrap_err();

    let reject_err = execute::<_, _, ()>("masking", &policy, || async {
        Err(InvokeError::external("masking", "invalid region"))
    })
    .await
    .unwrap_err();

    assert!(timeout_err.to_string().contains("did not respond within"));
    assert_eq!(reject_err.to_string(), "invalid region");
}

#[tokio::test]
async fn invalid_timeout_is_rejected_before_any_attempt() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_cl = calls.clone();
    let policy = RetryPolicy::new(2, Duration::from_millis(1), Duration::ZERO);

    let result: Result<(), _> = execute("image-gen", &policy, || {
        let calls = calls_cl.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
    .await;

    assert!(matches!(result.unwrap_err(), InvokeError::Config { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn recovery_mid_budget_stops_further_attempts() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_cl = calls.clone();
    let policy = RetryPolicy::new(5, Duration::from_millis(10), Duration::from_millis(1000));

    let value = execute("image-gen", &policy, || {
        let calls = calls_cl.clone();
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 3 {
                Err(InvokeError::external("image-gen", "transient"))
            } else {
                Ok(n)
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(value, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}
