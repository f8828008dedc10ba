// src/resilience/tests/circuit_breaker_tests.rs

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use super::utils::network_error;
use crate::error::{ErrorKind, Result, SeismicError};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

fn breaker(threshold: usize, reset_timeout: Duration) -> CircuitBreaker {
    CircuitBreaker::new(
        "test",
        CircuitBreakerConfig {
            failure_threshold: threshold,
            reset_timeout,
            tripping_kinds: None,
        },
    )
}

fn failing(calls: &AtomicUsize) -> Result<()> {
    calls.fetch_add(1, Ordering::SeqCst);
    Err(network_error())
}

fn succeeding(calls: &AtomicUsize) -> Result<()> {
    calls.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

#[test]
fn test_initial_state_is_closed() {
    let breaker = CircuitBreaker::new("default", CircuitBreakerConfig::default());

    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_count(), 0);
    assert!(breaker.allow_request().is_ok());
}

#[test]
fn test_circuit_opens_after_threshold_and_fails_fast() {
    let breaker = breaker(3, Duration::from_secs(60));
    let calls = AtomicUsize::new(0);

    for expected in 1..=3 {
        let err = breaker.protect(|| failing(&calls)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network, "the operation's own error propagates");
        assert_eq!(breaker.failure_count(), expected);
    }
    assert_eq!(breaker.state(), CircuitState::Open, "Circuit should be Open after 3 failures");

    // The next call never reaches the operation
    let err = breaker.protect(|| succeeding(&calls)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::CircuitBreakerOpen);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_success_in_closed_state_resets_failure_count() {
    let breaker = breaker(3, Duration::from_secs(60));
    let calls = AtomicUsize::new(0);

    let _ = breaker.protect(|| failing(&calls));
    let _ = breaker.protect(|| failing(&calls));
    assert_eq!(breaker.failure_count(), 2);

    breaker.protect(|| succeeding(&calls)).unwrap();
    assert_eq!(breaker.failure_count(), 0);

    // Two more failures shouldn't open it since the count was reset
    let _ = breaker.protect(|| failing(&calls));
    let _ = breaker.protect(|| failing(&calls));
    assert_eq!(breaker.state(), CircuitState::Closed);

    let _ = breaker.protect(|| failing(&calls));
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[test]
fn test_half_open_success_closes_circuit() {
    let breaker = breaker(2, Duration::from_millis(50));
    let calls = AtomicUsize::new(0);

    let _ = breaker.protect(|| failing(&calls));
    let _ = breaker.protect(|| failing(&calls));
    assert_eq!(breaker.state(), CircuitState::Open);

    std::thread::sleep(Duration::from_millis(80));

    breaker.protect(|| succeeding(&calls)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3, "trial call must be attempted");
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_count(), 0);
}

#[test]
fn test_half_open_failure_reopens_and_restarts_timeout() {
    let breaker = breaker(2, Duration::from_millis(50));
    let calls = AtomicUsize::new(0);

    let _ = breaker.protect(|| failing(&calls));
    let _ = breaker.protect(|| failing(&calls));
    std::thread::sleep(Duration::from_millis(80));

    let err = breaker.protect(|| failing(&calls)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Network);
    assert_eq!(breaker.state(), CircuitState::Open);

    // Timeout restarted: an immediate call fails fast
    let err = breaker.protect(|| succeeding(&calls)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::CircuitBreakerOpen);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    std::thread::sleep(Duration::from_millis(80));
    breaker.protect(|| succeeding(&calls)).unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[test]
fn test_non_tripping_errors_do_not_count() {
    let breaker = CircuitBreaker::new(
        "selective",
        CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(60),
            tripping_kinds: Some(HashSet::from([ErrorKind::Network, ErrorKind::Timeout])),
        },
    );

    let err = breaker
        .protect(|| -> Result<()> { Err(SeismicError::non_retryable("bad input")) })
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NonRetryable);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_count(), 0);

    let _ = breaker.protect(|| -> Result<()> { Err(SeismicError::timeout("slow")) });
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[test]
fn test_reset_closes_open_circuit() {
    let breaker = breaker(1, Duration::from_secs(60));
    let calls = AtomicUsize::new(0);
    let _ = breaker.protect(|| failing(&calls));
    assert_eq!(breaker.state(), CircuitState::Open);

    breaker.reset();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(breaker.protect(|| succeeding(&calls)).is_ok());
}

#[tokio::test]
async fn test_half_open_admits_a_single_trial_call() {
    let breaker = Arc::new(breaker(1, Duration::from_millis(50)));
    let _ = breaker.protect(|| -> Result<()> { Err(network_error()) });
    time::sleep(Duration::from_millis(80)).await;

    let slow_breaker = Arc::clone(&breaker);
    let trial = tokio::spawn(async move {
        slow_breaker
            .protect_async(|| async {
                time::sleep(Duration::from_millis(100)).await;
                Ok::<_, SeismicError>(())
            })
            .await
    });

    time::sleep(Duration::from_millis(20)).await;
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    let err = breaker
        .protect_async(|| async { Ok::<_, SeismicError>(()) })
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::CircuitBreakerOpen);

    trial.await.unwrap().unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_cancelled_trial_releases_half_open_slot() {
    let breaker = breaker(1, Duration::from_millis(30));
    let _ = breaker.protect(|| -> Result<()> { Err(network_error()) });
    time::sleep(Duration::from_millis(50)).await;

    // The trial future is dropped by the timeout before it finishes
    let cancelled = time::timeout(
        Duration::from_millis(10),
        breaker.protect_async(|| async {
            time::sleep(Duration::from_secs(5)).await;
            Ok::<_, SeismicError>(())
        }),
    )
    .await;
    assert!(cancelled.is_err());
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    breaker
        .protect_async(|| async { Ok::<_, SeismicError>(()) })
        .await
        .unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
}
