// library entry
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod rate_limit;
pub mod resilience;
pub mod storage;
pub mod validation;
pub mod waveform;

#[cfg(test)]
mod test_utils;

// Re-export key components for convenience
pub use client::{AsyncUsgsClient, EventQuery, IrisClient, StationQuery, UsgsClient, WaveformRequest};
pub use config::{ClientConfig, SeismicConfig};
pub use error::{ErrorKind, Result, SeismicError, Severity};
pub use logging::init as init_logging;
pub use rate_limit::RateLimiter;
pub use waveform::{Stream, Trace, TraceData};
