use std::sync::Arc;

use dotenv::dotenv;
use seismic_data::client::AsyncUsgsClient;
use seismic_data::resilience::{
    CircuitBreakerConfig, CircuitBreakerProbe, ErrorHandler, HealthCheckConfig, HealthChecker, OverallStatus,
};
use seismic_data::{init_logging, ClientConfig, SeismicConfig};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> seismic_data::Result<()> {
    dotenv().ok();
    init_logging();
    info!("Seismic data service starting up");

    let config = SeismicConfig::from_env()?;
    debug!(?config, "Configuration loaded");

    let errors = Arc::new(ErrorHandler::default());
    let usgs = AsyncUsgsClient::open(
        ClientConfig::usgs(&config).with_circuit_breaker(CircuitBreakerConfig::default()),
    )?
    .with_error_handler(Arc::clone(&errors));

    let health = HealthChecker::with_default_probes(HealthCheckConfig::default(), &config.data_dir);
    if let Some(breaker) = usgs.circuit_breaker() {
        health.register("usgs_api", CircuitBreakerProbe::new(Arc::clone(breaker)));
    }

    match usgs.get_recent_events(24, 2.5).await {
        Ok(catalog) => {
            info!(
                events = catalog.len(),
                skipped = catalog.skipped.len(),
                "Recent earthquakes retrieved"
            );
            for quake in catalog.events.iter().rev().take(5) {
                info!(
                    id = %quake.id,
                    magnitude = ?quake.magnitude,
                    place = quake.place.as_deref().unwrap_or("unknown"),
                    "Latest event"
                );
            }
        }
        Err(e) => error!(kind = e.kind.name(), "Failed to fetch recent events: {}", e),
    }

    let overall = health.overall_health();
    if overall.status == OverallStatus::Healthy {
        info!(score = overall.health_score, "System healthy");
    } else {
        warn!(status = ?overall.status, score = overall.health_score, "System degraded");
    }

    let summary = errors.summary();
    if summary.total_errors > 0 {
        warn!(total = summary.total_errors, by_kind = ?summary.counts_by_kind, "Errors during run");
    }

    usgs.close();
    info!("Seismic data service stopped");
    Ok(())
}
