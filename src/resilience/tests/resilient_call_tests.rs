// src/resilience/tests/resilient_call_tests.rs

use std::sync::Arc;
use std::time::Duration;

use super::utils::{bad_request, network_error, FlakyOperation};
use crate::error::ErrorKind;
use crate::resilience::{
    context, CircuitBreaker, CircuitBreakerConfig, CircuitState, ErrorHandler, ResilientCall,
    RetryConfig, RetryPolicy,
};

fn policy(max_attempts: usize) -> RetryPolicy {
    RetryPolicy::new(RetryConfig {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        jitter: false,
        ..RetryConfig::default()
    })
    .unwrap()
}

fn breaker(threshold: usize) -> Arc<CircuitBreaker> {
    Arc::new(CircuitBreaker::new(
        "remote",
        CircuitBreakerConfig {
            failure_threshold: threshold,
            reset_timeout: Duration::from_secs(60),
            tripping_kinds: None,
        },
    ))
}

#[test]
fn test_retries_through_closed_breaker() {
    let breaker = breaker(5);
    let call = ResilientCall::new("fetch", policy(3)).with_circuit_breaker(Arc::clone(&breaker));
    let op = FlakyOperation::new(2, network_error);

    assert_eq!(call.run(context([("endpoint", "query")]), || op.call()).unwrap(), "ok");
    assert_eq!(op.calls(), 3);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_count(), 0);
}

#[test]
fn test_open_breaker_stops_retry_loop() {
    let breaker = breaker(2);
    let handler = Arc::new(ErrorHandler::default());
    let call = ResilientCall::new("fetch", policy(5))
        .with_circuit_breaker(Arc::clone(&breaker))
        .with_error_handler(Arc::clone(&handler));
    let op = FlakyOperation::always_failing(network_error);

    let err = call.run(Default::default(), || op.call()).unwrap_err();

    // Two real attempts trip the breaker; the third is rejected and is terminal
    assert_eq!(err.kind, ErrorKind::CircuitBreakerOpen);
    assert_eq!(op.calls(), 2);
    assert_eq!(breaker.state(), CircuitState::Open);

    let summary = handler.summary();
    assert_eq!(summary.total_errors, 1);
    let record = &summary.most_recent_errors[0];
    assert_eq!(record.kind, ErrorKind::CircuitBreakerOpen);
    assert_eq!(record.context.get("operation").map(String::as_str), Some("fetch"));
}

#[test]
fn test_final_error_is_reported_once_with_context() {
    let handler = Arc::new(ErrorHandler::default());
    let call = ResilientCall::new("count", policy(3)).with_error_handler(Arc::clone(&handler));
    let op = FlakyOperation::always_failing(bad_request);

    let err = call
        .run(context([("endpoint", "count"), ("operation", "count_events")]), || op.call())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NonRetryable);
    assert_eq!(op.calls(), 1);

    let summary = handler.summary();
    assert_eq!(summary.total_errors, 1);
    let record = &summary.most_recent_errors[0];
    // Caller-supplied operation name wins
    assert_eq!(record.context.get("operation").map(String::as_str), Some("count_events"));
    assert_eq!(record.context.get("endpoint").map(String::as_str), Some("count"));
}

#[test]
fn test_success_reports_nothing() {
    let handler = Arc::new(ErrorHandler::default());
    let call = ResilientCall::new("ok", policy(2)).with_error_handler(Arc::clone(&handler));
    let op = FlakyOperation::new(1, network_error);

    call.run(Default::default(), || op.call()).unwrap();
    assert_eq!(handler.summary().total_errors, 0);
}

#[test]
fn test_settle_reports_errors_raised_before_the_call() {
    let handler = Arc::new(ErrorHandler::default());
    let call = ResilientCall::new("fetch", policy(3)).with_error_handler(Arc::clone(&handler));

    assert_eq!(call.settle(Default::default(), Ok(7)).unwrap(), 7);
    let err = call
        .settle::<()>(context([("endpoint", "query")]), Err(bad_request()))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NonRetryable);

    let summary = handler.summary();
    assert_eq!(summary.total_errors, 1);
    assert_eq!(
        summary.most_recent_errors[0].context.get("operation").map(String::as_str),
        Some("fetch")
    );
}

#[tokio::test]
async fn test_run_async_shares_breaker_and_retry_semantics() {
    let breaker = breaker(3);
    let call = ResilientCall::new("async", policy(4)).with_circuit_breaker(Arc::clone(&breaker));

    let flaky = &FlakyOperation::new(2, network_error);
    let value = call
        .run_async(Default::default(), move || async move { flaky.call() })
        .await
        .unwrap();
    assert_eq!(value, "ok");
    assert_eq!(flaky.calls(), 3);
    assert_eq!(breaker.state(), CircuitState::Closed);

    let down = &FlakyOperation::always_failing(network_error);
    let err = call
        .run_async(Default::default(), move || async move { down.call() })
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::CircuitBreakerOpen);
    assert_eq!(down.calls(), 3);
}
