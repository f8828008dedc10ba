// src/client/usgs.rs

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use super::fetcher::{open_cache, BlockingFetcher};
use super::query::{EventQuery, OrderBy, QueryParams, ResponseFormat};
use super::{BlockingHttp, HttpTransport};
use crate::config::ClientConfig;
use crate::error::{Result, SeismicError};
use crate::resilience::{CircuitBreaker, ErrorHandler};
use crate::storage::CacheStore;
use crate::validation::{CatalogReport, CatalogValidator};

pub(crate) const SERVICE: &str = "usgs";
pub(crate) const QUERY_ENDPOINT: &str = "query";
pub(crate) const COUNT_ENDPOINT: &str = "count";

/// One earthquake from a GeoJSON catalog response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Earthquake {
    pub id: String,
    pub time: Option<DateTime<Utc>>,
    pub longitude: f64,
    pub latitude: f64,
    pub depth_km: f64,
    pub magnitude: Option<f64>,
    pub magnitude_type: Option<String>,
    pub place: Option<String>,
    pub url: Option<String>,
    pub tsunami: bool,
    pub significance: Option<i64>,
}

impl Earthquake {
    /// Build from a feature that already passed event validation
    pub fn from_feature(feature: &Value) -> Result<Self> {
        let coordinates = feature["geometry"]["coordinates"]
            .as_array()
            .ok_or_else(|| SeismicError::data_format("Feature has no coordinates"))?;
        let coordinate = |i: usize| {
            coordinates
                .get(i)
                .and_then(Value::as_f64)
                .ok_or_else(|| SeismicError::data_format(format!("Coordinate {} is not a number", i)))
        };
        let properties = &feature["properties"];
        let text = |name: &str| properties[name].as_str().map(str::to_string);

        Ok(Self {
            id: feature["id"].as_str().unwrap_or_default().to_string(),
            time: properties["time"]
                .as_i64()
                .and_then(DateTime::<Utc>::from_timestamp_millis),
            longitude: coordinate(0)?,
            latitude: coordinate(1)?,
            depth_km: coordinate(2)?,
            magnitude: properties["mag"].as_f64(),
            magnitude_type: text("magType"),
            place: text("place"),
            url: text("url"),
            tsunami: properties["tsunami"].as_i64().unwrap_or(0) != 0,
            significance: properties["sig"].as_i64(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CatalogMetadata {
    pub generated: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub count: Option<u64>,
    pub api_version: Option<String>,
}

impl CatalogMetadata {
    fn from_value(metadata: &Value) -> Self {
        Self {
            generated: metadata["generated"]
                .as_i64()
                .and_then(DateTime::<Utc>::from_timestamp_millis),
            title: metadata["title"].as_str().map(str::to_string),
            url: metadata["url"].as_str().map(str::to_string),
            count: metadata["count"].as_u64(),
            api_version: metadata["api"].as_str().map(str::to_string),
        }
    }
}

/// Validated catalog: usable events plus what was left out and why
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventCatalog {
    pub metadata: CatalogMetadata,
    pub events: Vec<Earthquake>,
    /// Index of each rejected feature with the reason
    pub skipped: Vec<(usize, String)>,
}

impl EventCatalog {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn from_report(value: &Value, report: CatalogReport) -> Result<Self> {
        let features = value["features"].as_array().map(Vec::as_slice).unwrap_or_default();
        let events = report
            .valid_indices
            .iter()
            .filter_map(|&i| features.get(i))
            .map(Earthquake::from_feature)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            metadata: CatalogMetadata::from_value(&value["metadata"]),
            events,
            skipped: report.rejected,
        })
    }
}

fn wants_geojson(params: &QueryParams) -> bool {
    params
        .get("format")
        .map_or(true, |f| f == ResponseFormat::GeoJson.as_str())
}

/// Parse a JSON body and check it has the shape its endpoint promises
pub(crate) fn parse_object(
    endpoint: &str,
    params: &QueryParams,
    body: &str,
    validator: &CatalogValidator,
) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(body)?;
    match endpoint.trim_matches('/') {
        QUERY_ENDPOINT if wants_geojson(params) => {
            validator.validate(&value)?;
        }
        COUNT_ENDPOINT => {
            if !value["count"].is_u64() {
                return Err(SeismicError::data_format("Count response has no numeric 'count'"));
            }
        }
        _ => {}
    }
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(SeismicError::data_format("Response must be a JSON object")),
    }
}

pub(crate) fn parse_catalog(body: &str, validator: &CatalogValidator) -> Result<EventCatalog> {
    let value: Value = serde_json::from_str(body)?;
    let report = validator.validate(&value)?;
    EventCatalog::from_report(&value, report)
}

pub(crate) fn parse_count(body: &str) -> Result<u64> {
    let value: Value = serde_json::from_str(body)?;
    value["count"]
        .as_u64()
        .ok_or_else(|| SeismicError::data_format("Count response has no numeric 'count'"))
}

pub(crate) fn catalog_params(query: &EventQuery) -> Result<QueryParams> {
    if !query.format.is_json() {
        return Err(SeismicError::non_retryable(format!(
            "Format '{}' is not GeoJSON; use the text variant",
            query.format.as_str()
        )));
    }
    query.to_params()
}

/// Window of `span` ending at `now` truncated to the minute, so calls made
/// close together share a cache key
pub fn trailing_window(
    now: DateTime<Utc>,
    span: Option<ChronoDuration>,
    label: &str,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let end = now.duration_trunc(ChronoDuration::minutes(1)).unwrap_or(now);
    span.and_then(|span| end.checked_sub_signed(span))
        .map(|start| (start, end))
        .ok_or_else(|| {
            SeismicError::non_retryable(format!("Time window of {} reaches past the supported range", label))
                .with_code("INVALID_QUERY")
        })
}

pub(crate) fn recent_query_at(now: DateTime<Utc>, hours: u32, min_magnitude: f64) -> Result<EventQuery> {
    let span = ChronoDuration::try_hours(i64::from(hours));
    let (start, end) = trailing_window(now, span, &format!("{} hours", hours))?;
    Ok(EventQuery::new()
        .between(start, end)
        .magnitude(Some(min_magnitude), None)
        .ordered_by(OrderBy::TimeAsc))
}

pub(crate) fn significant_query_at(now: DateTime<Utc>, days: u32, min_magnitude: f64) -> Result<EventQuery> {
    let span = ChronoDuration::try_days(i64::from(days));
    let (start, end) = trailing_window(now, span, &format!("{} days", days))?;
    Ok(EventQuery::new()
        .between(start, end)
        .magnitude(Some(min_magnitude), None)
        .ordered_by(OrderBy::Magnitude))
}

/// Blocking client for the USGS FDSN event service
#[derive(Debug)]
pub struct UsgsClient {
    fetcher: BlockingFetcher,
    validator: CatalogValidator,
}

impl UsgsClient {
    /// Client backed by a pooled HTTP connection and the configured disk cache
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = Arc::new(BlockingHttp::new(config.timeout, &config.user_agent)?);
        let cache = open_cache(&config)?;
        Self::with_transport(config, transport, cache)
    }

    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        cache: Option<Arc<dyn CacheStore>>,
    ) -> Result<Self> {
        Ok(Self {
            fetcher: BlockingFetcher::new(SERVICE, &config, transport, cache)?,
            validator: CatalogValidator::default(),
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

    pub fn with_validator(mut self, validator: CatalogValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.fetcher.circuit_breaker()
    }

    /// GET `endpoint` and return the JSON object it answers with
    pub fn fetch(&self, endpoint: &str, params: &QueryParams) -> Result<Map<String, Value>> {
        let validator = &self.validator;
        self.fetcher
            .fetch_with(endpoint, params, &|body: &str| parse_object(endpoint, params, body, validator))
    }

    /// GET `endpoint` for formats that are not JSON
    pub fn fetch_text(&self, endpoint: &str, params: &QueryParams) -> Result<String> {
        self.fetcher.fetch_with(endpoint, params, &|body: &str| Ok(body.to_string()))
    }

    /// Validated GeoJSON catalog exactly as served
    pub fn get_events_raw(&self, query: &EventQuery) -> Result<Map<String, Value>> {
        let params = self.fetcher.checked(QUERY_ENDPOINT, catalog_params(query))?;
        self.fetch(QUERY_ENDPOINT, &params)
    }

    /// Catalog in one of the text formats (csv, text, xml, quakeml, kml)
    pub fn get_events_text(&self, query: &EventQuery) -> Result<String> {
        let params = self.fetcher.checked(QUERY_ENDPOINT, query.to_params())?;
        self.fetch_text(QUERY_ENDPOINT, &params)
    }

    pub fn get_events(&self, query: &EventQuery) -> Result<EventCatalog> {
        let params = self.fetcher.checked(QUERY_ENDPOINT, catalog_params(query))?;
        let validator = &self.validator;
        let catalog = self
            .fetcher
            .fetch_with(QUERY_ENDPOINT, &params, &|body: &str| parse_catalog(body, validator))?;
        info!("Retrieved {} earthquake events", catalog.len());
        Ok(catalog)
    }

    /// Events of the last `hours`, oldest first
    pub fn get_recent_events(&self, hours: u32, min_magnitude: f64) -> Result<EventCatalog> {
        let query = self
            .fetcher
            .checked(QUERY_ENDPOINT, recent_query_at(Utc::now(), hours, min_magnitude))?;
        self.get_events(&query)
    }

    /// Events of the last `days`, largest first
    pub fn get_significant_events(&self, days: u32, min_magnitude: f64) -> Result<EventCatalog> {
        let query = self
            .fetcher
            .checked(QUERY_ENDPOINT, significant_query_at(Utc::now(), days, min_magnitude))?;
        self.get_events(&query)
    }

    pub fn count_events(&self, query: &EventQuery) -> Result<u64> {
        let params = self.fetcher.checked(COUNT_ENDPOINT, query.to_count_params())?;
        self.fetcher.fetch_with(COUNT_ENDPOINT, &params, &parse_count)
    }

    pub fn clear_cache(&self) -> Result<usize> {
        self.fetcher.clear_cache()
    }
}
