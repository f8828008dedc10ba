use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::error::{ErrorKind, Result, SeismicError};

/// Configuration for retry strategy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total number of invocations allowed, including the first one
    pub max_attempts: usize,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier applied per attempt
    pub exponential_base: f64,
    /// Whether to scale delays by a random factor in [0.5, 1.0]
    pub jitter: bool,
    /// Error kinds worth retrying
    pub retryable_kinds: HashSet<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
            retryable_kinds: transient_kinds(),
        }
    }
}

fn transient_kinds() -> HashSet<ErrorKind> {
    [
        ErrorKind::Retryable,
        ErrorKind::RateLimit,
        ErrorKind::DataFormat,
        ErrorKind::Network,
        ErrorKind::Timeout,
    ]
    .into_iter()
    .collect()
}

/// Validated, immutable retry decision engine
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy, rejecting configurations that can never make progress
    pub fn new(config: RetryConfig) -> Result<Self> {
        if config.max_attempts == 0 {
            return Err(SeismicError::config("max_attempts must be at least 1"));
        }
        if config.max_delay < config.base_delay {
            return Err(SeismicError::config(format!(
                "max_delay {:?} is smaller than base_delay {:?}",
                config.max_delay, config.base_delay
            )));
        }
        if !(config.exponential_base.is_finite() && config.exponential_base >= 1.0) {
            return Err(SeismicError::config(format!(
                "exponential_base must be >= 1.0, got {}",
                config.exponential_base
            )));
        }
        Ok(Self { config })
    }

    /// Backoff used by the HTTP clients: `unit * 2^attempt`, no jitter, no cap
    /// below the largest delay it can produce, transient kinds only.
    pub fn client_backoff(max_retries: u32, unit: Duration) -> Self {
        let max_attempts = max_retries as usize + 1;
        let largest = unit.saturating_mul(2u32.saturating_pow(max_retries));
        Self {
            config: RetryConfig {
                max_attempts,
                base_delay: unit,
                max_delay: largest,
                exponential_base: 2.0,
                jitter: false,
                retryable_kinds: transient_kinds(),
            },
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.config.max_attempts
    }

    pub fn max_delay(&self) -> Duration {
        self.config.max_delay
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether `error` raised on zero-based `attempt` deserves another try
    pub fn should_retry(&self, error: &SeismicError, attempt: usize) -> bool {
        if attempt >= self.config.max_attempts {
            return false;
        }
        if error.is_terminal() {
            return false;
        }
        self.config.retryable_kinds.contains(&error.kind)
    }

    /// Delay before the retry that follows zero-based `attempt`, before jitter
    pub fn base_delay_for(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.config.base_delay.as_secs_f64() * self.config.exponential_base.powi(exponent);
        let capped = secs.min(self.config.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        let delay = self.base_delay_for(attempt);
        if self.config.jitter {
            // Random value between 50% and 100% of the calculated backoff
            let jitter = rand::random::<f64>() * 0.5 + 0.5;
            delay.mul_f64(jitter)
        } else {
            delay
        }
    }

    /// Same as [`calculate_delay`](Self::calculate_delay) with a caller-provided random source
    pub fn calculate_delay_with<R: Rng + ?Sized>(&self, attempt: usize, rng: &mut R) -> Duration {
        let delay = self.base_delay_for(attempt);
        if self.config.jitter {
            let jitter = rng.random::<f64>() * 0.5 + 0.5;
            delay.mul_f64(jitter)
        } else {
            delay
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            config: RetryConfig::default(),
        }
    }
}

/// Run `operation` until it succeeds, the policy gives up, or attempts run out.
///
/// Backoff sleeps block the calling thread.
pub fn retry_blocking<T, F>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut last_error = None;

    for attempt in 0..policy.max_attempts() {
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !policy.should_retry(&err, attempt) {
                    error!(operation = label, attempt = attempt + 1, "Non-retryable error: {}", err);
                    return Err(err);
                }
                if attempt + 1 < policy.max_attempts() {
                    let delay = policy.calculate_delay(attempt);
                    warn!(
                        operation = label,
                        "Attempt {} failed: {}. Retrying in {:.2}s",
                        attempt + 1,
                        err,
                        delay.as_secs_f64()
                    );
                    std::thread::sleep(delay);
                }
                last_error = Some(err);
            }
        }
    }

    error!(operation = label, "All {} attempts failed", policy.max_attempts());
    Err(last_error.unwrap_or_else(|| SeismicError::non_retryable("retry loop made no attempt")))
}

/// Async counterpart of [`retry_blocking`]; backoff sleeps yield to the runtime.
pub async fn retry_async<T, F, Fut>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..policy.max_attempts() {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !policy.should_retry(&err, attempt) {
                    error!(operation = label, attempt = attempt + 1, "Non-retryable error: {}", err);
                    return Err(err);
                }
                if attempt + 1 < policy.max_attempts() {
                    let delay = policy.calculate_delay(attempt);
                    warn!(
                        operation = label,
                        "Async attempt {} failed: {}. Retrying in {:.2}s",
                        attempt + 1,
                        err,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(err);
            }
        }
    }

    error!(operation = label, "All {} async attempts failed", policy.max_attempts());
    Err(last_error.unwrap_or_else(|| SeismicError::non_retryable("retry loop made no attempt")))
}
