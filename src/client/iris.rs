// src/client/iris.rs

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::fdsn::{parse_channels, parse_events, parse_stations, CatalogEvent, ChannelRecord, StationRecord};
use super::fetcher::{open_cache, BlockingFetcher};
use super::query::{BoundingBox, EventQuery, GeoArea, StationLevel, StationQuery, WaveformRequest};
use super::{BlockingHttp, HttpTransport};
use crate::config::ClientConfig;
use crate::error::{Result, SeismicError};
use crate::resilience::{CircuitBreaker, ErrorHandler};
use crate::storage::CacheStore;
use crate::validation::{QualityReport, WaveformQualityCheck};
use crate::waveform::{seconds, slist, MemoryTrace, Stream, Trace, TraceData, TraceStats};

const SERVICE: &str = "iris";
const EVENT_ENDPOINT: &str = "fdsnws/event/1/query";
const STATION_ENDPOINT: &str = "fdsnws/station/1/query";
const TIMESERIES_ENDPOINT: &str = "irisws/timeseries/1/query";

/// Waveforms together with the advisory quality findings for them
#[derive(Debug)]
pub struct WaveformFetch {
    pub stream: Stream,
    pub quality: QualityReport,
    /// Channel metadata fetched to resolve codes or attach the response
    pub channels: Vec<ChannelRecord>,
}

/// Station search and time window around an event origin
#[derive(Debug, Clone)]
pub struct EventWaveformOptions {
    pub networks: Vec<String>,
    pub channels: Vec<String>,
    pub time_before: Duration,
    pub time_after: Duration,
    /// Half width of the station search box in degrees
    pub search_radius_deg: f64,
    pub attach_response: bool,
    pub remove_response: bool,
}

impl Default for EventWaveformOptions {
    fn default() -> Self {
        Self {
            networks: vec!["IU".into(), "US".into(), "N4".into()],
            channels: vec!["BHZ".into(), "HHZ".into()],
            time_before: Duration::from_secs(60),
            time_after: Duration::from_secs(300),
            search_radius_deg: 10.0,
            attach_response: true,
            remove_response: false,
        }
    }
}

/// Blocking client for the IRIS event, station and timeseries services
#[derive(Debug)]
pub struct IrisClient {
    fetcher: BlockingFetcher,
    quality: WaveformQualityCheck,
}

impl IrisClient {
    pub fn new(config: ClientConfig, quality: WaveformQualityCheck) -> Result<Self> {
        let transport = Arc::new(BlockingHttp::new(config.timeout, &config.user_agent)?);
        let cache = open_cache(&config)?;
        Self::with_transport(config, quality, transport, cache)
    }

    pub fn with_transport(
        config: ClientConfig,
        quality: WaveformQualityCheck,
        transport: Arc<dyn HttpTransport>,
        cache: Option<Arc<dyn CacheStore>>,
    ) -> Result<Self> {
        Ok(Self {
            fetcher: BlockingFetcher::new(SERVICE, &config, transport, cache)?,
            quality,
        })
    }

    pub fn with_error_handler(mut self, handler: Arc<ErrorHandler>) -> Self {
        self.fetcher = self.fetcher.with_error_handler(handler);
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.fetcher = self.fetcher.with_circuit_breaker(breaker);
        self
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.fetcher.circuit_breaker()
    }

    pub fn quality_check(&self) -> &WaveformQualityCheck {
        &self.quality
    }

    pub fn get_events(&self, query: &EventQuery) -> Result<Vec<CatalogEvent>> {
        let params = self.fetcher.checked(EVENT_ENDPOINT, query.to_fdsn_text_params())?;
        let events = self.fetcher.fetch_with(EVENT_ENDPOINT, &params, &parse_events)?;
        info!("Retrieved {} events", events.len());
        Ok(events)
    }

    pub fn get_stations(&self, query: &StationQuery) -> Result<Vec<StationRecord>> {
        let query = query.clone().at_level(StationLevel::Station);
        let params = self.fetcher.checked(STATION_ENDPOINT, query.to_params())?;
        let stations = self.fetcher.fetch_with(STATION_ENDPOINT, &params, &parse_stations)?;
        info!("Retrieved {} stations", stations.len());
        Ok(stations)
    }

    pub fn get_channels(&self, query: &StationQuery) -> Result<Vec<ChannelRecord>> {
        let query = query.clone().at_level(StationLevel::Channel);
        let params = self.fetcher.checked(STATION_ENDPOINT, query.to_params())?;
        let channels = self.fetcher.fetch_with(STATION_ENDPOINT, &params, &parse_channels)?;
        info!("Retrieved {} channels", channels.len());
        Ok(channels)
    }

    /// Waveforms for one request, with a quality report that never fails the fetch
    ///
    /// Wildcards and code lists are resolved to concrete channels through the
    /// station service first. Every resolved channel must download; response
    /// removal is best effort and keeps raw counts where it cannot be applied.
    pub fn get_waveforms(&self, request: &WaveformRequest) -> Result<WaveformFetch> {
        self.fetcher.checked(TIMESERIES_ENDPOINT, request.validate())?;

        let (targets, channels) = if request.has_wildcards() {
            let channels = self.get_channels(&request.channel_query())?;
            (resolve_targets(request, &channels), channels)
        } else {
            let channels = if request.attach_response {
                self.get_channels(&request.channel_query()).unwrap_or_else(|e| {
                    warn!("Could not attach response for {}: {}", request_id(request), e);
                    Vec::new()
                })
            } else {
                Vec::new()
            };
            (vec![request.clone()], channels)
        };

        let mut traces = Vec::new();
        for target in &targets {
            let params = self.fetcher.checked(TIMESERIES_ENDPOINT, target.to_timeseries_params())?;
            traces.extend(self.fetcher.fetch_with(TIMESERIES_ENDPOINT, &params, &slist::parse)?);
        }

        if request.remove_response {
            traces = traces
                .into_iter()
                .map(|trace| remove_response(trace, &channels))
                .collect();
        }

        let stream: Stream = traces.into_iter().map(Trace::from).collect();
        let quality = self.quality.check(&stream);
        info!(
            "Retrieved {} traces for {} ({} warnings)",
            stream.len(),
            request_id(request),
            quality.warnings.len()
        );
        Ok(WaveformFetch {
            stream,
            quality,
            channels,
        })
    }

    /// Waveforms from stations within the search box around an event
    ///
    /// Stations that fail to deliver are logged and skipped.
    pub fn get_waveforms_for_event(
        &self,
        event: &CatalogEvent,
        options: &EventWaveformOptions,
    ) -> Result<WaveformFetch> {
        let start = event.time - seconds(options.time_before.as_secs_f64());
        let end = event.time + seconds(options.time_after.as_secs_f64());
        info!(
            "Fetching waveforms for event at {} ({}, {})",
            event.time, event.latitude, event.longitude
        );

        let area = BoundingBox::around(event.latitude, event.longitude, options.search_radius_deg);
        let stations = self.get_stations(
            &StationQuery::new()
                .network(options.networks.join(","))
                .channel(options.channels.join(","))
                .within(GeoArea::BoundingBox(area))
                .active_between(start, end),
        )?;

        let mut stream = Stream::new();
        let mut channels = Vec::new();
        for station in &stations {
            let request = WaveformRequest::new(
                station.network.as_str(),
                station.station.as_str(),
                "*",
                options.channels.join(","),
                start,
                end,
            )
            .with_response(options.attach_response, options.remove_response);
            match self.get_waveforms(&request) {
                Ok(fetch) => {
                    stream.append(fetch.stream);
                    channels.extend(fetch.channels);
                }
                Err(e) => warn!(
                    "Failed to get waveforms for {}.{}: {}",
                    station.network, station.station, e
                ),
            }
        }

        let quality = self.quality.check(&stream);
        info!(
            "Retrieved {} traces from {} stations for event {}",
            stream.len(),
            stations.len(),
            event.event_id
        );
        Ok(WaveformFetch {
            stream,
            quality,
            channels,
        })
    }

    /// Write a stream as a sample-list file
    pub fn save_waveforms(&self, stream: &Stream, path: impl AsRef<Path>) -> Result<()> {
        slist::save(stream, path.as_ref())
    }

    /// Open a saved stream; samples are read when first accessed
    pub fn load_waveforms(&self, path: impl AsRef<Path>) -> Result<Stream> {
        slist::load(path.as_ref())
    }

    pub fn clear_cache(&self) -> Result<usize> {
        self.fetcher.clear_cache()
    }
}

fn request_id(request: &WaveformRequest) -> String {
    format!(
        "{}.{}.{}.{}",
        request.network, request.station, request.location, request.channel
    )
}

/// One request per distinct channel code, epochs collapsed
fn resolve_targets(request: &WaveformRequest, channels: &[ChannelRecord]) -> Vec<WaveformRequest> {
    let codes: BTreeSet<(&str, &str, &str, &str)> = channels
        .iter()
        .map(|c| {
            (
                c.network.as_str(),
                c.station.as_str(),
                c.location.as_str(),
                c.channel.as_str(),
            )
        })
        .collect();
    codes
        .into_iter()
        .map(|(net, sta, loc, cha)| request.for_channel(net, sta, loc, cha))
        .collect()
}

/// Channel epoch covering the start of a trace
fn channel_for<'a>(stats: &TraceStats, channels: &'a [ChannelRecord]) -> Option<&'a ChannelRecord> {
    let matches_codes = |c: &&ChannelRecord| {
        c.network == stats.network
            && c.station == stats.station
            && c.location == stats.location
            && c.channel == stats.channel
    };
    let covers = |c: &&ChannelRecord| {
        c.start_time <= stats.start_time && c.end_time.map_or(true, |end| end > stats.start_time)
    };
    channels
        .iter()
        .filter(matches_codes)
        .find(covers)
        .or_else(|| channels.iter().find(matches_codes))
}

fn response_scale(stats: &TraceStats, channels: &[ChannelRecord]) -> Result<(f64, String)> {
    let channel = channel_for(stats, channels).ok_or_else(|| {
        SeismicError::data_quality(format!("No response metadata for {}", stats.id()))
    })?;
    match channel.scale {
        Some(scale) if scale.is_finite() && scale != 0.0 => Ok((scale, channel.scale_units.clone())),
        _ => Err(SeismicError::data_quality(format!(
            "Unusable sensitivity for {}",
            stats.id()
        ))),
    }
}

/// Divide counts by the overall sensitivity; failures keep the raw trace
fn remove_response(trace: MemoryTrace, channels: &[ChannelRecord]) -> MemoryTrace {
    match response_scale(trace.stats(), channels) {
        Ok((scale, units)) => {
            let (mut stats, data) = trace.into_parts();
            stats.units = units;
            MemoryTrace::new(stats, data.into_iter().map(|v| v / scale).collect())
        }
        Err(e) => {
            warn!("Failed to remove instrument response: {}", e.message);
            trace
        }
    }
}
