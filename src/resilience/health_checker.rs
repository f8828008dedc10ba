use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use sysinfo::{Disks, System};
use tokio::task;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SeismicError};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitState};

/// Free disk below this percentage is reported as a warning
pub const DISK_FREE_WARNING_PERCENT: f64 = 10.0;
/// Memory use at or above this percentage is reported as a warning
pub const MEMORY_USED_WARNING_PERCENT: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// What a probe reports about its subsystem
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    pub status: HealthStatus,
    pub message: String,
    pub metrics: BTreeMap<String, f64>,
}

impl ProbeReport {
    pub fn new(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn healthy(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Healthy, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Warning, message)
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

/// Result of one probe run
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub name: String,
    pub status: HealthStatus,
    pub message: String,
    pub metrics: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate derived from the latest probe set
#[derive(Debug, Clone, Serialize)]
pub struct OverallHealth {
    pub status: OverallStatus,
    pub healthy_checks: usize,
    pub warning_checks: usize,
    pub error_checks: usize,
    pub total_checks: usize,
    /// Percentage of healthy probes, 0 when nothing is registered
    pub health_score: f64,
    pub last_check_time: DateTime<Utc>,
}

/// A named subsystem check
pub trait HealthProbe: Send + Sync {
    fn check(&self) -> Result<ProbeReport>;
}

impl<F> HealthProbe for F
where
    F: Fn() -> Result<ProbeReport> + Send + Sync,
{
    fn check(&self) -> Result<ProbeReport> {
        self()
    }
}

/// Configuration for periodic health checks
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// How often the background runner executes all probes
    pub check_interval: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
        }
    }
}

/// Registry of probes plus the results of the last run.
///
/// Like the error handler this is built once and shared through an `Arc`.
pub struct HealthChecker {
    probes: RwLock<Vec<(String, Arc<dyn HealthProbe>)>>,
    last_results: RwLock<Vec<HealthCheckResult>>,
    config: HealthCheckConfig,
    /// Cancel flag for the background task
    cancel_flag: Arc<AtomicBool>,
}

impl std::fmt::Debug for HealthChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.probes.read().iter().map(|(n, _)| n.clone()).collect();
        f.debug_struct("HealthChecker")
            .field("probes", &names)
            .field("config", &self.config)
            .finish()
    }
}

impl HealthChecker {
    /// Checker without any probes
    pub fn new(config: HealthCheckConfig) -> Self {
        Self {
            probes: RwLock::new(Vec::new()),
            last_results: RwLock::new(Vec::new()),
            config,
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Checker with the disk-space and memory-usage probes registered
    pub fn with_default_probes(config: HealthCheckConfig, data_dir: impl Into<PathBuf>) -> Self {
        let checker = Self::new(config);
        checker.register("disk_space", DiskSpaceProbe::new(data_dir));
        checker.register("memory_usage", MemoryProbe);
        info!("Health checker initialized");
        checker
    }

    /// Register a probe; a probe with the same name is replaced
    pub fn register(&self, name: impl Into<String>, probe: impl HealthProbe + 'static) {
        let name = name.into();
        let mut probes = self.probes.write();
        let probe: Arc<dyn HealthProbe> = Arc::new(probe);
        match probes.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = probe,
            None => probes.push((name.clone(), probe)),
        }
        info!("Registered health check: {}", name);
    }

    pub fn probe_names(&self) -> Vec<String> {
        self.probes.read().iter().map(|(n, _)| n.clone()).collect()
    }

    /// Run every probe; failures and panics become `error` results
    pub fn run_checks(&self) -> Vec<HealthCheckResult> {
        let probes: Vec<(String, Arc<dyn HealthProbe>)> = self.probes.read().clone();
        let mut results = Vec::with_capacity(probes.len());

        for (name, probe) in probes {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| probe.check()));
            let report = match outcome {
                Ok(Ok(report)) => report,
                Ok(Err(err)) => ProbeReport::new(HealthStatus::Error, format!("Health check failed: {}", err)),
                Err(_) => ProbeReport::new(HealthStatus::Error, "Health check panicked"),
            };

            match report.status {
                HealthStatus::Warning => warn!("Health check warning ({}): {}", name, report.message),
                HealthStatus::Error => error!("Health check error ({}): {}", name, report.message),
                HealthStatus::Healthy => debug!("Health check ok ({}): {}", name, report.message),
            }

            results.push(HealthCheckResult {
                name,
                status: report.status,
                message: report.message,
                metrics: report.metrics,
                timestamp: Utc::now(),
            });
        }

        *self.last_results.write() = results.clone();
        results
    }

    pub fn last_results(&self) -> Vec<HealthCheckResult> {
        self.last_results.read().clone()
    }

    /// Derive one status from the latest results, running the probes if none exist yet
    pub fn overall_health(&self) -> OverallHealth {
        let mut results = self.last_results();
        if results.is_empty() {
            results = self.run_checks();
        }
        summarize(&results)
    }

    /// Start the background task that re-runs the probes every `check_interval`
    pub fn start(self: &Arc<Self>) -> task::JoinHandle<()> {
        let checker = Arc::clone(self);
        let interval = self.config.check_interval;
        let cancel_flag = Arc::clone(&self.cancel_flag);
        cancel_flag.store(false, Ordering::SeqCst);

        task::spawn(async move {
            let mut interval_timer = time::interval(interval);

            loop {
                interval_timer.tick().await;

                // Check if we should stop
                if cancel_flag.load(Ordering::SeqCst) {
                    break;
                }

                let runner = Arc::clone(&checker);
                match task::spawn_blocking(move || runner.overall_health_after_run()).await {
                    Ok(overall) if overall.status != OverallStatus::Healthy => {
                        warn!(status = ?overall.status, score = overall.health_score, "Periodic health check")
                    }
                    Ok(overall) => {
                        debug!(score = overall.health_score, "Periodic health check passed")
                    }
                    Err(e) => error!("Health check task failed: {}", e),
                }
            }

            debug!("Health checker task stopped");
        })
    }

    /// Stop the background task after its current round
    pub fn stop(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    fn overall_health_after_run(&self) -> OverallHealth {
        let results = self.run_checks();
        summarize(&results)
    }
}

fn summarize(results: &[HealthCheckResult]) -> OverallHealth {
    let healthy_checks = results.iter().filter(|r| r.status == HealthStatus::Healthy).count();
    let warning_checks = results.iter().filter(|r| r.status == HealthStatus::Warning).count();
    let error_checks = results.iter().filter(|r| r.status == HealthStatus::Error).count();
    let total_checks = results.len();

    let status = if error_checks > 0 {
        OverallStatus::Unhealthy
    } else if warning_checks * 2 > total_checks {
        // More than half of the probes warn
        OverallStatus::Degraded
    } else {
        OverallStatus::Healthy
    };

    let health_score = if total_checks > 0 {
        healthy_checks as f64 / total_checks as f64 * 100.0
    } else {
        0.0
    };

    OverallHealth {
        status,
        healthy_checks,
        warning_checks,
        error_checks,
        total_checks,
        health_score,
        last_check_time: Utc::now(),
    }
}

/// Reports free space on the filesystem holding a directory
#[derive(Debug, Clone)]
pub struct DiskSpaceProbe {
    path: PathBuf,
}

impl DiskSpaceProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HealthProbe for DiskSpaceProbe {
    fn check(&self) -> Result<ProbeReport> {
        // The directory may not exist yet; fall back to the current directory
        let target = std::fs::canonicalize(&self.path)
            .or_else(|_| std::env::current_dir())
            .map_err(|e| SeismicError::storage(format!("Disk check failed: {}", e)))?;

        let disks = Disks::new_with_refreshed_list();
        let disk = disks
            .list()
            .iter()
            .filter(|d| target.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .ok_or_else(|| {
                SeismicError::storage(format!("No filesystem found for {}", target.display()))
            })?;

        let total = disk.total_space();
        if total == 0 {
            return Err(SeismicError::storage(format!(
                "Filesystem at {} reports zero size",
                disk.mount_point().display()
            )));
        }
        let free = disk.available_space();
        let free_percent = free as f64 / total as f64 * 100.0;

        Ok(disk_report(free, free_percent))
    }
}

pub(crate) fn disk_report(free_bytes: u64, free_percent: f64) -> ProbeReport {
    let status = if free_percent > DISK_FREE_WARNING_PERCENT {
        HealthStatus::Healthy
    } else {
        HealthStatus::Warning
    };
    ProbeReport::new(status, format!("{:.1}% disk space available", free_percent))
        .with_metric("free_space_gb", free_bytes as f64 / 1024f64.powi(3))
        .with_metric("free_percent", free_percent)
}

/// Reports system memory pressure
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryProbe;

impl HealthProbe for MemoryProbe {
    fn check(&self) -> Result<ProbeReport> {
        let mut system = System::new();
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            return Err(SeismicError::storage("Memory check failed: total memory unknown"));
        }
        let used_percent = system.used_memory() as f64 / total as f64 * 100.0;
        Ok(memory_report(system.available_memory(), used_percent))
    }
}

pub(crate) fn memory_report(available_bytes: u64, used_percent: f64) -> ProbeReport {
    let status = if used_percent < MEMORY_USED_WARNING_PERCENT {
        HealthStatus::Healthy
    } else {
        HealthStatus::Warning
    };
    ProbeReport::new(status, format!("{:.1}% memory used", used_percent))
        .with_metric("memory_percent", used_percent)
        .with_metric("available_gb", available_bytes as f64 / 1024f64.powi(3))
}

/// Surfaces a circuit breaker's state as a health signal
#[derive(Debug, Clone)]
pub struct CircuitBreakerProbe {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerProbe {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }
}

impl HealthProbe for CircuitBreakerProbe {
    fn check(&self) -> Result<ProbeReport> {
        let failures = self.breaker.failure_count() as f64;
        let report = match self.breaker.state() {
            CircuitState::Closed => {
                ProbeReport::healthy(format!("Circuit '{}' closed", self.breaker.name()))
            }
            CircuitState::HalfOpen => ProbeReport::warning(format!(
                "Circuit '{}' half-open, probing recovery",
                self.breaker.name()
            )),
            CircuitState::Open => ProbeReport::new(
                HealthStatus::Error,
                format!("Circuit '{}' open, dependency unavailable", self.breaker.name()),
            ),
        };
        Ok(report.with_metric("failure_count", failures))
    }
}
