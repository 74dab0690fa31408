use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use ca_harness::retry::RetryPolicy;
use ca_telemetry::error_log::{LogLevel, MemoryErrorLogger};

fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries, Duration::ZERO)
}

#[tokio::test]
async fn success_on_first_attempt_logs_nothing() {
    let logger = MemoryErrorLogger::new();
    let calls = AtomicU32::new(0);
    let counter = &calls;

    let result: Result<u32, String> = fast_policy(3)
        .run(&logger, "op", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        })
        .await;

    assert_eq!(result, Ok(7));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(logger.entries().is_empty());
}

#[tokio::test]
async fn one_warning_per_failure_before_success() {
    let logger = MemoryErrorLogger::new();
    let calls = AtomicU32::new(0);
    let counter = &calls;

    let result: Result<&str, String> = fast_policy(3)
        .run(&logger, "flaky", move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(format!("failure {n}"))
            } else {
                Ok("done")
            }
        })
        .await;

    assert_eq!(result, Ok("done"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let warnings = logger.entries_at(LogLevel::Warning);
    assert_eq!(warnings.len(), 2);
    assert_eq!(warnings[0].message, "Retry attempt 1 of 3");
    assert_eq!(warnings[1].message, "Retry attempt 2 of 3");
    assert_eq!(warnings[0].context_str("error"), Some("failure 0"));
    assert_eq!(warnings[1].context_str("operation"), Some("flaky"));
}

#[tokio::test]
async fn permanent_failure_returns_last_error() {
    let logger = MemoryErrorLogger::new();
    let calls = AtomicU32::new(0);
    let counter = &calls;

    let result: Result<(), String> = fast_policy(2)
        .run(&logger, "doomed", move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Err(format!("attempt {n} failed"))
        })
        .await;

    assert_eq!(result, Err("attempt 2 failed".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(logger.entries_at(LogLevel::Warning).len(), 2);
}

#[tokio::test]
async fn zero_retries_means_single_attempt() {
    let logger = MemoryErrorLogger::new();
    let calls = AtomicU32::new(0);
    let counter = &calls;

    let result: Result<(), &str> = fast_policy(0)
        .run(&logger, "once", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err("nope")
        })
        .await;

    assert_eq!(result, Err("nope"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(logger.entries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn waits_linearly_between_retries() {
    let logger = MemoryErrorLogger::new();
    let started = tokio::time::Instant::now();

    let result: Result<(), &str> = RetryPolicy::new(2, Duration::from_millis(100))
        .run(&logger, "slow", || async { Err("down") })
        .await;

    assert!(result.is_err());
    // 100ms before the first retry, 200ms before the second.
    assert!(started.elapsed() >= Duration::from_millis(300));
}
