// src/resilience/mod.rs
//! Resilience substrate for every network-facing operation.
//!
//! 1. **Retry with Exponential Backoff** - Policy-driven retries for transient failures
//! 2. **Circuit Breaking** - Fail fast while a remote dependency is down
//! 3. **Resilient Calls** - Explicit composition of the two plus error reporting
//! 4. **Error Handling** - Process-wide aggregation of error statistics
//! 5. **Health Checks** - Named probes with an aggregate status

mod circuit_breaker;
mod error_handler;
mod health_checker;
mod resilient_call;
mod retry;

#[cfg(test)]
mod tests;

// Re-export key components
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error_handler::{context, ErrorHandler, ErrorRecord, ErrorSummary, DEFAULT_MAX_HISTORY};
pub use health_checker::{
    CircuitBreakerProbe, DiskSpaceProbe, HealthCheckConfig, HealthCheckResult, HealthChecker,
    HealthProbe, HealthStatus, MemoryProbe, OverallHealth, OverallStatus, ProbeReport,
    DISK_FREE_WARNING_PERCENT, MEMORY_USED_WARNING_PERCENT,
};
pub use resilient_call::ResilientCall;
pub use retry::{retry_async, retry_blocking, RetryConfig, RetryPolicy};
