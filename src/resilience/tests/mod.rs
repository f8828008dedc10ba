// src/resilience/tests/mod.rs
//! Tests for resilience features

mod circuit_breaker_tests;
mod health_checker_tests;
mod resilient_call_tests;

// Common test utilities for resilience testing
pub(crate) mod utils {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::{Result, SeismicError};

    /// Operation that fails a fixed number of times before succeeding
    pub struct FlakyOperation {
        failures_before_success: usize,
        make_error: fn() -> SeismicError,
        calls: AtomicUsize,
    }

    impl FlakyOperation {
        pub fn new(failures_before_success: usize, make_error: fn() -> SeismicError) -> Self {
            Self {
                failures_before_success,
                make_error,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn always_failing(make_error: fn() -> SeismicError) -> Self {
            Self::new(usize::MAX, make_error)
        }

        pub fn call(&self) -> Result<&'static str> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                Err((self.make_error)())
            } else {
                Ok("ok")
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    pub fn network_error() -> SeismicError {
        SeismicError::network("Simulated connection reset")
    }

    pub fn bad_request() -> SeismicError {
        SeismicError::non_retryable("Simulated malformed request")
    }
}
