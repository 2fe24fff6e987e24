//! Backoff behaviour around completion calls

use sizectl::error::SizectlError;
use sizectl::retry::{ExponentialBackoffPolicy, NoRetryPolicy, RetryPolicy};
use std::sync::atomic::{AtomicU32, Ordering::SeqCst};
use std::time::Duration;

fn quick(attempts: u32) -> ExponentialBackoffPolicy {
    ExponentialBackoffPolicy::new(attempts)
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
}

#[test]
fn test_policy_has_at_least_one_attempt() {
    assert_eq!(ExponentialBackoffPolicy::new(0).max_attempts(), 1);
    assert_eq!(ExponentialBackoffPolicy::default().max_attempts(), 3);
}

#[test]
fn test_backoff_grows_and_is_capped() {
    let policy = ExponentialBackoffPolicy::new(10);
    let first = policy.calculate_backoff(0);
    let third = policy.calculate_backoff(2);
    assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(110));
    assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(440));
    assert!(policy.calculate_backoff(20) <= Duration::from_secs(33));

    let capped = ExponentialBackoffPolicy::new(10).with_max_delay(Duration::from_millis(250));
    assert!(capped.calculate_backoff(5) <= Duration::from_millis(275));
}

#[tokio::test]
async fn test_first_answer_is_returned_without_retry() {
    let calls = AtomicU32::new(0);

    let answer = quick(3)
        .execute_with_retry(|| async {
            calls.fetch_add(1, SeqCst);
            Ok::<_, SizectlError>("m6i.large".to_string())
        })
        .await
        .unwrap();

    assert_eq!(answer, "m6i.large");
    assert_eq!(calls.load(SeqCst), 1);
}

#[tokio::test]
async fn test_throttling_then_answer() {
    let calls = AtomicU32::new(0);

    let answer = quick(3)
        .execute_with_retry(|| async {
            match calls.fetch_add(1, SeqCst) {
                0 => Err(SizectlError::advisor("429 Too Many Requests")),
                1 => Err(SizectlError::Timeout {
                    operation: "completion".to_string(),
                    secs: 30,
                }),
                _ => Ok("r6i.large".to_string()),
            }
        })
        .await
        .unwrap();

    assert_eq!(answer, "r6i.large");
    assert_eq!(calls.load(SeqCst), 3);
}

#[tokio::test]
async fn test_exhaustion_wraps_last_error() {
    let calls = AtomicU32::new(0);

    let result: Result<(), SizectlError> = quick(3)
        .execute_with_retry(|| async {
            calls.fetch_add(1, SeqCst);
            Err(SizectlError::advisor("model overloaded"))
        })
        .await;

    match result {
        Err(SizectlError::Retryable {
            attempt,
            max_attempts,
            reason,
            source,
        }) => {
            assert_eq!((attempt, max_attempts), (3, 3));
            assert!(reason.contains("model overloaded"));
            assert!(source.is_some());
        }
        other => panic!("expected Retryable, got {:?}", other),
    }
    assert_eq!(calls.load(SeqCst), 3);
}

#[tokio::test]
async fn test_invalid_model_output_is_not_retried() {
    let calls = AtomicU32::new(0);

    let result: Result<(), SizectlError> = quick(5)
        .execute_with_retry(|| async {
            calls.fetch_add(1, SeqCst);
            Err(SizectlError::validation("instance_type", "m6i"))
        })
        .await;

    assert!(matches!(result, Err(SizectlError::Validation { .. })));
    assert_eq!(calls.load(SeqCst), 1);
}

#[tokio::test]
async fn test_no_retry_policy_surfaces_error_unwrapped() {
    let calls = AtomicU32::new(0);

    let result: Result<(), SizectlError> = NoRetryPolicy
        .execute_with_retry(|| async {
            calls.fetch_add(1, SeqCst);
            Err(SizectlError::advisor("connection refused"))
        })
        .await;

    assert!(matches!(result, Err(SizectlError::Advisor { .. })));
    assert_eq!(calls.load(SeqCst), 1);
}
