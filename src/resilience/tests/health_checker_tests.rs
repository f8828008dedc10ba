// src/resilience/tests/health_checker_tests.rs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use crate::error::{Result, SeismicError};
use crate::resilience::health_checker::{disk_report, memory_report};
use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerProbe, HealthCheckConfig, HealthChecker,
    HealthStatus, OverallStatus, ProbeReport,
};

fn checker() -> HealthChecker {
    HealthChecker::new(HealthCheckConfig::default())
}

#[test]
fn test_disk_report_thresholds() {
    let plenty = disk_report(50 * 1024 * 1024 * 1024, 42.0);
    assert_eq!(plenty.status, HealthStatus::Healthy);
    assert_eq!(plenty.metrics.get("free_space_gb"), Some(&50.0));
    assert_eq!(plenty.metrics.get("free_percent"), Some(&42.0));

    assert_eq!(disk_report(1024, 10.0).status, HealthStatus::Warning);
    assert_eq!(disk_report(1024, 3.5).status, HealthStatus::Warning);
}

#[test]
fn test_memory_report_thresholds() {
    assert_eq!(memory_report(1 << 30, 45.0).status, HealthStatus::Healthy);
    assert_eq!(memory_report(1 << 20, 90.0).status, HealthStatus::Warning);

    let report = memory_report(2 * 1024 * 1024 * 1024, 97.0);
    assert_eq!(report.metrics.get("available_gb"), Some(&2.0));
    assert!(report.message.contains("97.0%"));
}

#[test]
fn test_failing_and_panicking_probes_become_errors() {
    let checker = checker();
    checker.register("ok", || -> Result<ProbeReport> { Ok(ProbeReport::healthy("fine")) });
    checker.register("broken", || -> Result<ProbeReport> {
        Err(SeismicError::storage("cache dir unreadable"))
    });
    checker.register("panics", || -> Result<ProbeReport> { panic!("probe bug") });

    let results = checker.run_checks();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].status, HealthStatus::Healthy);
    assert_eq!(results[1].status, HealthStatus::Error);
    assert!(results[1].message.contains("cache dir unreadable"));
    assert_eq!(results[2].status, HealthStatus::Error);

    let overall = checker.overall_health();
    assert_eq!(overall.status, OverallStatus::Unhealthy);
    assert_eq!(overall.error_checks, 2);
    assert_eq!(overall.total_checks, 3);
}

#[test]
fn test_degraded_only_when_more_than_half_warn() {
    let checker = checker();
    checker.register("a", || -> Result<ProbeReport> { Ok(ProbeReport::warning("slow")) });
    checker.register("b", || -> Result<ProbeReport> { Ok(ProbeReport::healthy("ok")) });
    checker.run_checks();
    // One of two warning is not a majority
    assert_eq!(checker.overall_health().status, OverallStatus::Healthy);
    assert_eq!(checker.overall_health().health_score, 50.0);

    checker.register("c", || -> Result<ProbeReport> { Ok(ProbeReport::warning("slow")) });
    checker.run_checks();
    let overall = checker.overall_health();
    assert_eq!(overall.status, OverallStatus::Degraded);
    assert_eq!(overall.warning_checks, 2);
}

#[test]
fn test_register_replaces_probe_with_same_name() {
    let checker = checker();
    checker.register("cache", || -> Result<ProbeReport> { Ok(ProbeReport::warning("old")) });
    checker.register("cache", || -> Result<ProbeReport> { Ok(ProbeReport::healthy("new")) });

    assert_eq!(checker.probe_names(), vec!["cache".to_string()]);
    let results = checker.run_checks();
    assert_eq!(results[0].message, "new");
}

#[test]
fn test_overall_health_runs_probes_when_no_results_yet() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let checker = checker();
    checker.register("counted", move || -> Result<ProbeReport> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(ProbeReport::healthy("ok"))
    });

    assert!(checker.last_results().is_empty());
    let overall = checker.overall_health();
    assert_eq!(overall.status, OverallStatus::Healthy);
    assert_eq!(overall.health_score, 100.0);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Cached results are reused
    checker.overall_health();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_empty_checker_scores_zero() {
    let overall = checker().overall_health();
    assert_eq!(overall.total_checks, 0);
    assert_eq!(overall.health_score, 0.0);
    assert_eq!(overall.status, OverallStatus::Healthy);
}

#[test]
fn test_circuit_breaker_probe_tracks_state() {
    let breaker = Arc::new(CircuitBreaker::new(
        "usgs",
        CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_millis(30),
            tripping_kinds: None,
        },
    ));
    let checker = checker();
    checker.register("usgs_circuit", CircuitBreakerProbe::new(Arc::clone(&breaker)));

    assert_eq!(checker.run_checks()[0].status, HealthStatus::Healthy);

    let _ = breaker.protect(|| -> Result<()> { Err(SeismicError::network("down")) });
    let results = checker.run_checks();
    assert_eq!(results[0].status, HealthStatus::Error);
    assert_eq!(results[0].metrics.get("failure_count"), Some(&1.0));

    std::thread::sleep(Duration::from_millis(50));
    breaker.allow_request().unwrap();
    assert_eq!(checker.run_checks()[0].status, HealthStatus::Warning);
}

#[test]
fn test_default_probes_are_registered() {
    let dir = tempfile::tempdir().unwrap();
    let checker = HealthChecker::with_default_probes(HealthCheckConfig::default(), dir.path());
    assert_eq!(
        checker.probe_names(),
        vec!["disk_space".to_string(), "memory_usage".to_string()]
    );
    assert_eq!(checker.run_checks().len(), 2);
}

#[tokio::test]
async fn test_background_runner_start_and_stop() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let checker = Arc::new(HealthChecker::new(HealthCheckConfig {
        check_interval: Duration::from_millis(20),
    }));
    checker.register("counted", move || -> Result<ProbeReport> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(ProbeReport::healthy("ok"))
    });

    let handle = checker.start();
    time::sleep(Duration::from_millis(90)).await;
    checker.stop();
    assert!(checker.is_stopped());

    time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("runner should stop after the next tick")
        .unwrap();
    assert!(runs.load(Ordering::SeqCst) >= 2);
    assert!(!checker.last_results().is_empty());
}
