// src/config/mod.rs

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, SeismicError};
use crate::resilience::CircuitBreakerConfig;

pub const DEFAULT_USGS_BASE_URL: &str = "https://earthquake.usgs.gov/fdsnws/event/1";
pub const DEFAULT_IRIS_BASE_URL: &str = "https://service.iris.edu";
pub const DEFAULT_USER_AGENT: &str = "seismic-data/0.1.0 (Research/Educational)";

/// Top-level configuration shared by the binaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeismicConfig {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub data: DataConfig,

    /// Root directory for response caches, one subdirectory per service
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Directory whose filesystem is watched by the disk-space probe
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for SeismicConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            data: DataConfig::default(),
            cache_dir: default_cache_dir(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".cache")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Remote service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_usgs_base_url")]
    pub usgs_base_url: String,

    #[serde(default = "default_iris_base_url")]
    pub iris_base_url: String,

    /// Per-request timeout
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            usgs_base_url: default_usgs_base_url(),
            iris_base_url: default_iris_base_url(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_usgs_base_url() -> String {
    DEFAULT_USGS_BASE_URL.to_string()
}

fn default_iris_base_url() -> String {
    DEFAULT_IRIS_BASE_URL.to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_retries() -> u32 {
    3
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

/// Expectations for incoming waveform data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Expected sampling rate in Hz
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,

    /// Analysis window in seconds; traces shorter than this get a warning
    #[serde(default = "default_window_length")]
    pub window_length: f64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            sampling_rate: default_sampling_rate(),
            window_length: default_window_length(),
        }
    }
}

fn default_sampling_rate() -> f64 {
    100.0
}

fn default_window_length() -> f64 {
    30.0
}

impl SeismicConfig {
    /// Build a configuration from defaults overridden by environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = env_string("USGS_API_URL") {
            config.api.usgs_base_url = url;
        }
        if let Some(url) = env_string("IRIS_API_URL") {
            config.api.iris_base_url = url;
        }
        if let Some(secs) = env_parse::<u64>("API_TIMEOUT_SECS")? {
            config.api.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = env_parse::<u32>("MAX_RETRIES")? {
            config.api.max_retries = retries;
        }
        if let Some(dir) = env_string("CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_string("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(rate) = env_parse::<f64>("SAMPLING_RATE")? {
            config.data.sampling_rate = rate;
        }
        if let Some(secs) = env_parse::<f64>("MIN_TRACE_DURATION_SECS")? {
            config.data.window_length = secs;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file; missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SeismicError::config(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        let config: SeismicConfig = serde_json::from_str(&raw).map_err(|e| {
            SeismicError::config(format!("Invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.timeout.is_zero() {
            return Err(SeismicError::config("API timeout must be greater than zero"));
        }
        if !(self.data.sampling_rate.is_finite() && self.data.sampling_rate > 0.0) {
            return Err(SeismicError::config(format!(
                "Sampling rate must be positive, got {}",
                self.data.sampling_rate
            )));
        }
        if !(self.data.window_length.is_finite() && self.data.window_length >= 0.0) {
            return Err(SeismicError::config(format!(
                "Window length must be non-negative, got {}",
                self.data.window_length
            )));
        }
        Ok(())
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| SeismicError::config(format!("Invalid value for {}: {}", name, e))),
        None => Ok(None),
    }
}

/// Constructor parameters of a remote data client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Retries after the first attempt, so at most `max_retries + 1` requests
    pub max_retries: u32,
    /// Minimum spacing between two outbound requests of one client
    pub rate_limit_interval: Duration,
    /// `None` disables the response cache
    pub cache_dir: Option<PathBuf>,
    pub cache_duration: Duration,
    /// Backoff before retry `n` is `backoff_unit * 2^n`
    pub backoff_unit: Duration,
    pub user_agent: String,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl ClientConfig {
    /// USGS allows roughly 600 requests per 10 minutes, so one per second
    pub fn usgs(config: &SeismicConfig) -> Self {
        Self {
            base_url: config.api.usgs_base_url.clone(),
            timeout: config.api.timeout,
            max_retries: config.api.max_retries,
            rate_limit_interval: Duration::from_secs(1),
            cache_dir: Some(config.cache_dir.join("usgs")),
            cache_duration: Duration::from_secs(5 * 60),
            backoff_unit: Duration::from_secs(1),
            user_agent: config.api.user_agent.clone(),
            circuit_breaker: None,
        }
    }

    /// IRIS is more lenient: two requests per second
    pub fn iris(config: &SeismicConfig) -> Self {
        Self {
            base_url: config.api.iris_base_url.clone(),
            timeout: config.api.timeout,
            max_retries: config.api.max_retries,
            rate_limit_interval: Duration::from_millis(500),
            cache_dir: Some(config.cache_dir.join("iris")),
            cache_duration: Duration::from_secs(5 * 60),
            backoff_unit: Duration::from_secs(1),
            user_agent: config.api.user_agent.clone(),
            circuit_breaker: None,
        }
    }

    pub fn with_circuit_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(SeismicError::config("Base URL must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(SeismicError::config("Request timeout must be greater than zero"));
        }
        Ok(())
    }
}

// Helper module to serialize/deserialize Duration with serde
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
