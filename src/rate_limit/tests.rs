// src/rate_limit/tests.rs

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;

use super::RateLimiter;

#[test]
fn test_first_request_is_not_delayed() {
    let limiter = RateLimiter::new(Duration::from_secs(5));
    assert!(limiter.last_request_time().is_none());

    let started = Instant::now();
    limiter.acquire_blocking();
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(limiter.last_request_time().is_some());
}

#[test]
fn test_consecutive_requests_are_spaced_by_interval() {
    let interval = Duration::from_millis(40);
    let limiter = RateLimiter::new(interval);

    let started = Instant::now();
    for _ in 0..4 {
        limiter.acquire_blocking();
    }
    // N requests take at least (N-1) intervals
    assert!(started.elapsed() >= interval * 3);
}

#[test]
fn test_idle_time_counts_toward_interval() {
    let interval = Duration::from_millis(30);
    let limiter = RateLimiter::new(interval);
    limiter.acquire_blocking();
    std::thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    limiter.acquire_blocking();
    assert!(started.elapsed() < interval);
}

#[test]
fn test_reserved_slots_never_overlap() {
    let interval = Duration::from_millis(100);
    let limiter = RateLimiter::new(interval);
    let now = Instant::now();

    assert_eq!(limiter.reserve(now), Duration::ZERO);
    assert_eq!(limiter.reserve(now), interval);
    assert_eq!(limiter.reserve(now), interval * 2);
    assert_eq!(limiter.last_request_time(), Some(now + interval * 2));
}

#[tokio::test]
async fn test_concurrent_async_callers_are_serialized() {
    let interval = Duration::from_millis(30);
    let limiter = Arc::new(RateLimiter::new(interval));

    let started = Instant::now();
    let tasks = (0..5).map(|_| {
        let limiter = Arc::clone(&limiter);
        tokio::spawn(async move {
            limiter.acquire().await;
            Instant::now()
        })
    });
    let mut departures: Vec<Instant> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    departures.sort();

    assert!(started.elapsed() >= interval * 4);
    for pair in departures.windows(2) {
        // Timer granularity can shave a little off each gap
        assert!(pair[1] - pair[0] >= interval - Duration::from_millis(5));
    }
}

#[test]
fn test_threads_sharing_a_limiter() {
    let interval = Duration::from_millis(20);
    let limiter = Arc::new(RateLimiter::new(interval));

    let started = Instant::now();
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            std::thread::spawn(move || {
                limiter.acquire_blocking();
                limiter.acquire_blocking();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(started.elapsed() >= interval * 5);
}
