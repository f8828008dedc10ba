use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Ensure initialization happens only once
static INIT: Once = Once::new();

/// Initialize the logging system with sensible defaults.
///
/// Log level can be set using the RUST_LOG environment variable.
/// Example: RUST_LOG=debug,seismic_data=trace
pub fn init() {
    init_with_default("info");
}

/// Same as [`init`] but with a caller-chosen filter when RUST_LOG is unset.
pub fn init_with_default(default_filter: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));

        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true) // Include module path in logs
                    .with_thread_ids(true) // Rate limiter waits show up per thread
                    .with_line_number(true),
            )
            .init();

        tracing::info!("Logging initialized");
    });
}

/// Macro for logging an outbound request attempt against a remote service
#[macro_export]
macro_rules! remote_fetch {
    ($service:expr, $endpoint:expr, $attempt:expr, $params:expr) => {
        tracing::debug!(
            service = %$service,
            endpoint = %$endpoint,
            attempt = $attempt,
            params = %$params,
            "Remote request"
        )
    };
}

/// Macro for logging cache lookups and writes
#[macro_export]
macro_rules! cache_op {
    ($operation:expr, $key:expr, $hit:expr) => {
        tracing::debug!(
            operation = $operation,
            key = %$key,
            hit = $hit,
            "Cache operation"
        )
    };
}
