use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, Result, SeismicError};

/// The state of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed,
    /// Circuit is open, requests fail fast without reaching the dependency
    Open,
    /// Reset timeout elapsed, a single trial request tests recovery
    HalfOpen,
}

/// Configuration for circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: usize,
    /// Duration to keep the circuit open before transitioning to half-open
    pub reset_timeout: Duration,
    /// Error kinds that count as failures; `None` counts every kind
    pub tripping_kinds: Option<HashSet<ErrorKind>>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            tripping_kinds: None,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: usize,
    last_failure_time: Option<Instant>,
    trial_in_flight: bool,
}

/// Failure-isolation wrapper for one remote dependency.
///
/// State transitions happen under a single mutex, so one breaker can be shared
/// between threads and tasks behind an `Arc`.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            breaker = %name,
            "Circuit breaker initialized: threshold={}, timeout={:?}",
            config.failure_threshold, config.reset_timeout
        );
        Self {
            name,
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current state of the circuit breaker
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> usize {
        self.inner.lock().failure_count
    }

    /// Force the breaker back to Closed
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure_time = None;
        inner.trial_in_flight = false;
        info!(breaker = %self.name, "Circuit breaker manually reset to closed");
    }

    /// Admit or reject a call, moving Open to HalfOpen once the reset timeout elapsed
    pub fn allow_request(&self) -> Result<()> {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_time
                    .map(|t| t.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!(breaker = %self.name, "Circuit breaker transitioning to half-open");
                    Ok(())
                } else {
                    Err(self.open_error("Circuit breaker is open"))
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(self.open_error("Circuit breaker is half-open with a trial call in flight"))
                } else {
                    inner.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count = 0;
        inner.trial_in_flight = false;
        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            info!(breaker = %self.name, "Circuit breaker reset to closed");
        }
    }

    /// Record a failed operation; errors outside the tripping kinds are ignored
    pub fn record_failure(&self, error: &SeismicError) {
        let mut inner = self.inner.lock();

        if !self.trips_on(error) {
            // Not a dependency failure, but the trial slot must be released
            inner.trial_in_flight = false;
            debug!(breaker = %self.name, kind = %error.kind, "Ignoring non-tripping error");
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                inner.last_failure_time = Some(Instant::now());

                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    warn!(
                        breaker = %self.name,
                        "Circuit breaker opened after {} consecutive failures",
                        inner.failure_count
                    );
                }
            }
            CircuitState::HalfOpen => {
                // Any failure of the trial call opens the circuit again
                inner.failure_count += 1;
                inner.state = CircuitState::Open;
                inner.last_failure_time = Some(Instant::now());
                inner.trial_in_flight = false;
                warn!(breaker = %self.name, "Circuit breaker re-opened after failure in half-open state");
            }
            CircuitState::Open => {
                // A call admitted before the circuit opened finished late
                inner.failure_count += 1;
            }
        }
    }

    /// Execute `operation` under breaker protection
    pub fn protect<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.allow_request()?;
        let guard = AdmittedCall::new(self);
        let result = operation();
        guard.finish(&result);
        result
    }

    /// Async version of [`protect`](Self::protect); dropping the future mid-call
    /// releases a half-open trial slot without counting an outcome.
    pub async fn protect_async<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.allow_request()?;
        let guard = AdmittedCall::new(self);
        let result = operation().await;
        guard.finish(&result);
        result
    }

    fn trips_on(&self, error: &SeismicError) -> bool {
        if error.kind == ErrorKind::CircuitBreakerOpen {
            return false;
        }
        match &self.config.tripping_kinds {
            Some(kinds) => kinds.contains(&error.kind),
            None => true,
        }
    }

    fn open_error(&self, message: &str) -> SeismicError {
        SeismicError::circuit_open(message)
            .with_detail("breaker", &self.name)
            .with_detail("reset_timeout_ms", self.config.reset_timeout.as_millis())
    }

    fn abandon_call(&self) {
        let mut inner = self.inner.lock();
        inner.trial_in_flight = false;
    }
}

/// Records the outcome of an admitted call, or releases its slot if it never finishes
struct AdmittedCall<'a> {
    breaker: &'a CircuitBreaker,
    finished: bool,
}

impl<'a> AdmittedCall<'a> {
    fn new(breaker: &'a CircuitBreaker) -> Self {
        Self {
            breaker,
            finished: false,
        }
    }

    fn finish<T>(mut self, result: &Result<T>) {
        self.finished = true;
        match result {
            Ok(_) => self.breaker.record_success(),
            Err(err) => self.breaker.record_failure(err),
        }
    }
}

impl Drop for AdmittedCall<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.breaker.abandon_call();
        }
    }
}
