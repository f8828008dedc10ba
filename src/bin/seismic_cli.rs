// src/bin/seismic_cli.rs

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use prettytable::{row, Table};
use structopt::StructOpt;
use tracing::{error, info, warn};

use seismic_data::client::usgs::trailing_window;
use seismic_data::client::{EventCatalog, IrisClient, StationQuery, UsgsClient, WaveformRequest};
use seismic_data::logging;
use seismic_data::resilience::{
    CircuitBreakerConfig, CircuitBreakerProbe, HealthCheckConfig, HealthChecker, HealthStatus,
};
use seismic_data::validation::{sanitize_station_code, WaveformQualityCheck};
use seismic_data::{ClientConfig, EventQuery, SeismicConfig, SeismicError, TraceData};

#[derive(Debug, StructOpt)]
#[structopt(name = "seismic_cli", about = "Query USGS and IRIS seismic data services")]
struct Opt {
    /// JSON configuration file; environment variables are used when absent
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Verbosity level
    #[structopt(short, long, parse(from_occurrences))]
    verbose: usize,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Earthquakes of the last hours, oldest first
    Recent {
        #[structopt(long, default_value = "24")]
        hours: u32,
        #[structopt(long, default_value = "2.5")]
        min_magnitude: f64,
    },
    /// Largest earthquakes of the last days
    Significant {
        #[structopt(long, default_value = "30")]
        days: u32,
        #[structopt(long, default_value = "6.0")]
        min_magnitude: f64,
    },
    /// Number of matching earthquakes without downloading them
    Count {
        #[structopt(long, default_value = "7")]
        days: u32,
        #[structopt(long, default_value = "4.5")]
        min_magnitude: f64,
    },
    /// Stations from the IRIS station service
    Stations {
        #[structopt(long, default_value = "IU")]
        network: String,
        #[structopt(long, default_value = "*")]
        station: String,
        #[structopt(long, default_value = "BH?")]
        channel: String,
    },
    /// Download waveforms and save them as a sample list
    Waveforms {
        #[structopt(long)]
        network: String,
        #[structopt(long)]
        station: String,
        #[structopt(long, default_value = "00")]
        location: String,
        #[structopt(long, default_value = "BHZ")]
        channel: String,
        /// Start time, e.g. 2024-03-01T12:00:00
        #[structopt(long, parse(try_from_str = parse_time))]
        start: DateTime<Utc>,
        /// Window length in seconds
        #[structopt(long, default_value = "600")]
        duration: u64,
        /// Convert counts to physical units
        #[structopt(long)]
        remove_response: bool,
        #[structopt(short, long, parse(from_os_str))]
        output: Option<PathBuf>,
        /// Write a JSON validation report with score and recommendations
        #[structopt(long, parse(from_os_str))]
        report: Option<PathBuf>,
    },
    /// Run the health probes once, or every SECS seconds until Ctrl+C
    Health {
        #[structopt(long, value_name = "SECS")]
        watch: Option<u64>,
    },
    /// Delete every cached response
    ClearCache,
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map(|t| t.and_utc()))
        .map_err(|e| format!("invalid time '{}': {}", raw, e))
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
        bar.set_style(style);
    }
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn print_catalog(catalog: &EventCatalog) {
    let mut table = Table::new();
    table.add_row(row!["Time", "Mag", "Depth km", "Lat", "Lon", "Place"]);
    for quake in &catalog.events {
        table.add_row(row![
            quake.time.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()).unwrap_or_default(),
            quake.magnitude.map(|m| format!("{:.1}", m)).unwrap_or_default(),
            format!("{:.1}", quake.depth_km),
            format!("{:.3}", quake.latitude),
            format!("{:.3}", quake.longitude),
            quake.place.as_deref().unwrap_or("")
        ]);
    }
    table.printstd();
    if !catalog.skipped.is_empty() {
        warn!("{} events failed validation and were skipped", catalog.skipped.len());
    }
}

fn load_config(opt: &Opt) -> Result<SeismicConfig, SeismicError> {
    match &opt.config {
        Some(path) => SeismicConfig::from_file(path),
        None => SeismicConfig::from_env(),
    }
}

fn run(opt: Opt) -> Result<(), SeismicError> {
    let config = load_config(&opt)?;
    let usgs_config = ClientConfig::usgs(&config).with_circuit_breaker(CircuitBreakerConfig::default());
    let iris_config = ClientConfig::iris(&config);

    match opt.command {
        Command::Recent { hours, min_magnitude } => {
            let usgs = UsgsClient::new(usgs_config)?;
            let bar = spinner("Fetching recent earthquakes");
            let catalog = usgs.get_recent_events(hours, min_magnitude);
            bar.finish_and_clear();
            print_catalog(&catalog?);
        }
        Command::Significant { days, min_magnitude } => {
            let usgs = UsgsClient::new(usgs_config)?;
            let bar = spinner("Fetching significant earthquakes");
            let catalog = usgs.get_significant_events(days, min_magnitude);
            bar.finish_and_clear();
            print_catalog(&catalog?);
        }
        Command::Count { days, min_magnitude } => {
            let usgs = UsgsClient::new(usgs_config)?;
            let span = ChronoDuration::try_days(i64::from(days));
            let (start, end) = trailing_window(Utc::now(), span, &format!("{} days", days))?;
            let query = EventQuery::new()
                .between(start, end)
                .magnitude(Some(min_magnitude), None);
            let count = usgs.count_events(&query)?;
            println!("{} events of M{}+ in the last {} days", count, min_magnitude, days);
        }
        Command::Stations {
            network,
            station,
            channel,
        } => {
            let iris = IrisClient::new(iris_config, WaveformQualityCheck::from_config(&config.data))?;
            let bar = spinner("Fetching stations");
            let stations = iris.get_stations(
                &StationQuery::new()
                    .network(network)
                    .station(station)
                    .channel(channel),
            );
            bar.finish_and_clear();

            let mut table = Table::new();
            table.add_row(row!["Net", "Sta", "Lat", "Lon", "Elev m", "Site"]);
            for s in stations? {
                table.add_row(row![
                    s.network,
                    s.station,
                    format!("{:.4}", s.latitude),
                    format!("{:.4}", s.longitude),
                    format!("{:.0}", s.elevation),
                    s.site_name
                ]);
            }
            table.printstd();
        }
        Command::Waveforms {
            network,
            station,
            location,
            channel,
            start,
            duration,
            remove_response,
            output,
            report,
        } => {
            let station = sanitize_station_code(&station)?;
            let iris = IrisClient::new(iris_config, WaveformQualityCheck::from_config(&config.data))?;
            let end = i64::try_from(duration)
                .ok()
                .and_then(ChronoDuration::try_seconds)
                .and_then(|span| start.checked_add_signed(span))
                .ok_or_else(|| {
                    SeismicError::non_retryable(format!("Window of {}s is out of range", duration))
                        .with_code("INVALID_QUERY")
                })?;
            let request = WaveformRequest::new(network, station, location, channel, start, end)
                .with_response(true, remove_response);

            let bar = spinner("Downloading waveforms");
            let fetch = iris.get_waveforms(&request);
            bar.finish_and_clear();
            let fetch = fetch?;

            let mut table = Table::new();
            table.add_row(row!["Trace", "Start", "Samples", "SPS", "Units"]);
            for trace in fetch.stream.iter() {
                let stats = trace.stats();
                table.add_row(row![
                    stats.id(),
                    stats.start_time.format("%Y-%m-%dT%H:%M:%S%.3f"),
                    stats.npts,
                    stats.sampling_rate,
                    stats.units
                ]);
            }
            table.printstd();
            for warning in &fetch.quality.warnings {
                warn!("{}", warning);
            }
            println!("Quality score: {:.1}/100", fetch.quality.score);

            if let Some(path) = report {
                let report = iris.quality_check().validation_report(&fetch.stream);
                for recommendation in &report.recommendations {
                    warn!("{}", recommendation);
                }
                report.save(&path)?;
                println!("Validation report written to {}", path.display());
            }

            if let Some(path) = output {
                iris.save_waveforms(&fetch.stream, &path)?;
                println!("Saved {} traces to {}", fetch.stream.len(), path.display());
            }
        }
        Command::Health { watch } => {
            let usgs = UsgsClient::new(usgs_config)?;
            let checker = HealthChecker::with_default_probes(HealthCheckConfig::default(), &config.data_dir);
            if let Some(breaker) = usgs.circuit_breaker() {
                checker.register("usgs_api", CircuitBreakerProbe::new(Arc::clone(breaker)));
            }

            let running = Arc::new(AtomicBool::new(true));
            if watch.is_some() {
                let flag = Arc::clone(&running);
                if let Err(e) = ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst)) {
                    warn!("Cannot install Ctrl+C handler: {}", e);
                }
            }

            loop {
                print_health(&checker);
                let Some(secs) = watch else { break };
                let deadline = std::time::Instant::now() + Duration::from_secs(secs);
                while running.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
                    std::thread::sleep(Duration::from_millis(100));
                }
                if !running.load(Ordering::SeqCst) {
                    info!("Health watch stopped");
                    break;
                }
            }
        }
        Command::ClearCache => {
            let usgs = UsgsClient::new(usgs_config)?;
            let iris = IrisClient::new(iris_config, WaveformQualityCheck::from_config(&config.data))?;
            let removed = usgs.clear_cache()? + iris.clear_cache()?;
            println!("Removed {} cached responses", removed);
        }
    }
    Ok(())
}

fn print_health(checker: &HealthChecker) {
    let results = checker.run_checks();
    let mut table = Table::new();
    table.add_row(row!["Check", "Status", "Message"]);
    for result in &results {
        let status = match result.status {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Error => "error",
        };
        table.add_row(row![result.name, status, result.message]);
    }
    table.printstd();

    let overall = checker.overall_health();
    println!(
        "Overall: {:?} ({:.0}% healthy, {} checks)",
        overall.status, overall.health_score, overall.total_checks
    );
}

fn main() {
    let opt = Opt::from_args();

    let level = match opt.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    logging::init_with_default(&format!("seismic_cli={},seismic_data={}", level, level));

    if let Err(e) = run(opt) {
        error!(kind = e.kind.name(), "Command failed: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
