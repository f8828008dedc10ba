// src/client/query.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SeismicError};

/// Request parameters, kept sorted so cache keys are canonical
pub type QueryParams = BTreeMap<String, String>;

/// Largest result set the event services hand out in one response
pub const MAX_EVENT_LIMIT: u32 = 20_000;

const KM_PER_DEGREE: f64 = 111.19;
const MAX_RADIUS_KM: f64 = 20_001.6;
const QUERY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const WAVEFORM_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderBy {
    /// Newest first
    #[default]
    Time,
    TimeAsc,
    /// Largest first
    Magnitude,
    MagnitudeAsc,
}

impl OrderBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderBy::Time => "time",
            OrderBy::TimeAsc => "time-asc",
            OrderBy::Magnitude => "magnitude",
            OrderBy::MagnitudeAsc => "magnitude-asc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    GeoJson,
    Csv,
    Text,
    Xml,
    QuakeMl,
    Kml,
}

impl ResponseFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseFormat::GeoJson => "geojson",
            ResponseFormat::Csv => "csv",
            ResponseFormat::Text => "text",
            ResponseFormat::Xml => "xml",
            ResponseFormat::QuakeMl => "quakeml",
            ResponseFormat::Kml => "kml",
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, ResponseFormat::GeoJson)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    pub fn new(min_latitude: f64, max_latitude: f64, min_longitude: f64, max_longitude: f64) -> Self {
        Self {
            min_latitude,
            max_latitude,
            min_longitude,
            max_longitude,
        }
    }

    /// Box of `±half_width` degrees around a point, clipped to valid coordinates
    pub fn around(latitude: f64, longitude: f64, half_width: f64) -> Self {
        Self {
            min_latitude: (latitude - half_width).max(-90.0),
            max_latitude: (latitude + half_width).min(90.0),
            min_longitude: (longitude - half_width).max(-180.0),
            max_longitude: (longitude + half_width).min(180.0),
        }
    }

    fn validate(&self) -> Result<()> {
        check_latitude(self.min_latitude)?;
        check_latitude(self.max_latitude)?;
        check_longitude(self.min_longitude)?;
        check_longitude(self.max_longitude)?;
        check_order("latitude", Some(self.min_latitude), Some(self.max_latitude))?;
        check_order("longitude", Some(self.min_longitude), Some(self.max_longitude))
    }
}

/// Geographic restriction of a query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GeoArea {
    BoundingBox(BoundingBox),
    Circle {
        latitude: f64,
        longitude: f64,
        max_radius_km: f64,
    },
}

impl GeoArea {
    fn validate(&self) -> Result<()> {
        match self {
            GeoArea::BoundingBox(bbox) => bbox.validate(),
            GeoArea::Circle {
                latitude,
                longitude,
                max_radius_km,
            } => {
                check_latitude(*latitude)?;
                check_longitude(*longitude)?;
                if !(0.0..=MAX_RADIUS_KM).contains(max_radius_km) {
                    return Err(invalid(format!(
                        "Radius must be within [0, {}] km, got {}",
                        MAX_RADIUS_KM, max_radius_km
                    )));
                }
                Ok(())
            }
        }
    }

    /// USGS event service takes the radius in kilometres
    fn write_km(&self, params: &mut QueryParams) {
        match self {
            GeoArea::BoundingBox(bbox) => write_bbox(bbox, params),
            GeoArea::Circle {
                latitude,
                longitude,
                max_radius_km,
            } => {
                params.insert("latitude".into(), latitude.to_string());
                params.insert("longitude".into(), longitude.to_string());
                params.insert("maxradiuskm".into(), max_radius_km.to_string());
            }
        }
    }

    /// FDSN services take the radius in degrees
    fn write_degrees(&self, params: &mut QueryParams) {
        match self {
            GeoArea::BoundingBox(bbox) => write_bbox(bbox, params),
            GeoArea::Circle {
                latitude,
                longitude,
                max_radius_km,
            } => {
                params.insert("latitude".into(), latitude.to_string());
                params.insert("longitude".into(), longitude.to_string());
                params.insert("maxradius".into(), format!("{:.4}", max_radius_km / KM_PER_DEGREE));
            }
        }
    }
}

fn write_bbox(bbox: &BoundingBox, params: &mut QueryParams) {
    params.insert("minlatitude".into(), bbox.min_latitude.to_string());
    params.insert("maxlatitude".into(), bbox.max_latitude.to_string());
    params.insert("minlongitude".into(), bbox.min_longitude.to_string());
    params.insert("maxlongitude".into(), bbox.max_longitude.to_string());
}

/// Earthquake catalog query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventQuery {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub min_magnitude: Option<f64>,
    pub max_magnitude: Option<f64>,
    pub min_depth: Option<f64>,
    pub max_depth: Option<f64>,
    pub area: Option<GeoArea>,
    pub limit: u32,
    pub order_by: OrderBy,
    pub format: ResponseFormat,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            start_time: None,
            end_time: None,
            min_magnitude: None,
            max_magnitude: None,
            min_depth: None,
            max_depth: None,
            area: None,
            limit: MAX_EVENT_LIMIT,
            order_by: OrderBy::default(),
            format: ResponseFormat::default(),
        }
    }
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    pub fn magnitude(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_magnitude = min;
        self.max_magnitude = max;
        self
    }

    pub fn depth(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_depth = min;
        self.max_depth = max;
        self
    }

    pub fn within(mut self, area: GeoArea) -> Self {
        self.area = Some(area);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn ordered_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    /// Reject malformed queries before they reach the network
    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start > end {
                return Err(invalid(format!("Start time {} is after end time {}", start, end)));
            }
        }
        for mag in [self.min_magnitude, self.max_magnitude].into_iter().flatten() {
            if !mag.is_finite() {
                return Err(invalid(format!("Magnitude must be finite, got {}", mag)));
            }
        }
        check_order("magnitude", self.min_magnitude, self.max_magnitude)?;
        check_order("depth", self.min_depth, self.max_depth)?;
        if let Some(area) = &self.area {
            area.validate()?;
        }
        if !(1..=MAX_EVENT_LIMIT).contains(&self.limit) {
            return Err(invalid(format!(
                "Limit must be within 1..={}, got {}",
                MAX_EVENT_LIMIT, self.limit
            )));
        }
        Ok(())
    }

    /// Parameters for the USGS `query` endpoint
    pub fn to_params(&self) -> Result<QueryParams> {
        let mut params = self.common_params()?;
        if let Some(area) = &self.area {
            area.write_km(&mut params);
        }
        params.insert("limit".into(), self.limit.to_string());
        params.insert("orderby".into(), self.order_by.as_str().into());
        params.insert("format".into(), self.format.as_str().into());
        Ok(params)
    }

    /// Parameters for the USGS `count` endpoint; ordering and limits do not apply
    pub fn to_count_params(&self) -> Result<QueryParams> {
        let mut params = self.common_params()?;
        if let Some(area) = &self.area {
            area.write_km(&mut params);
        }
        params.insert("format".into(), ResponseFormat::GeoJson.as_str().into());
        Ok(params)
    }

    /// Parameters for an FDSN event service answering in pipe-separated text
    pub fn to_fdsn_text_params(&self) -> Result<QueryParams> {
        let mut params = self.common_params()?;
        if let Some(area) = &self.area {
            area.write_degrees(&mut params);
        }
        params.insert("limit".into(), self.limit.to_string());
        params.insert("orderby".into(), self.order_by.as_str().into());
        params.insert("format".into(), ResponseFormat::Text.as_str().into());
        Ok(params)
    }

    fn common_params(&self) -> Result<QueryParams> {
        self.validate()?;
        let mut params = QueryParams::new();
        if let Some(start) = self.start_time {
            params.insert("starttime".into(), start.format(QUERY_TIME_FORMAT).to_string());
        }
        if let Some(end) = self.end_time {
            params.insert("endtime".into(), end.format(QUERY_TIME_FORMAT).to_string());
        }
        insert_opt(&mut params, "minmagnitude", self.min_magnitude);
        insert_opt(&mut params, "maxmagnitude", self.max_magnitude);
        insert_opt(&mut params, "mindepth", self.min_depth);
        insert_opt(&mut params, "maxdepth", self.max_depth);
        Ok(params)
    }
}

/// Detail level of a station metadata request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StationLevel {
    #[default]
    Station,
    Channel,
}

impl StationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StationLevel::Station => "station",
            StationLevel::Channel => "channel",
        }
    }
}

/// FDSN station metadata query; codes accept `*` and `?` wildcards
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationQuery {
    pub network: Option<String>,
    pub station: Option<String>,
    pub location: Option<String>,
    pub channel: Option<String>,
    pub area: Option<GeoArea>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub level: StationLevel,
}

impl StationQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn network(mut self, code: impl Into<String>) -> Self {
        self.network = Some(code.into());
        self
    }

    pub fn station(mut self, code: impl Into<String>) -> Self {
        self.station = Some(code.into());
        self
    }

    pub fn location(mut self, code: impl Into<String>) -> Self {
        self.location = Some(code.into());
        self
    }

    pub fn channel(mut self, code: impl Into<String>) -> Self {
        self.channel = Some(code.into());
        self
    }

    pub fn within(mut self, area: GeoArea) -> Self {
        self.area = Some(area);
        self
    }

    /// Only epochs active somewhere in `[start, end]`
    pub fn active_between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    pub fn at_level(mut self, level: StationLevel) -> Self {
        self.level = level;
        self
    }

    pub fn to_params(&self) -> Result<QueryParams> {
        let mut params = QueryParams::new();
        for (name, code) in [
            ("net", &self.network),
            ("sta", &self.station),
            ("cha", &self.channel),
        ] {
            if let Some(code) = code {
                params.insert(name.into(), check_code(name, code)?.to_string());
            }
        }
        if let Some(location) = &self.location {
            params.insert("loc".into(), location_param(location)?);
        }
        if let Some(area) = &self.area {
            area.validate()?;
            area.write_degrees(&mut params);
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start > end {
                return Err(invalid(format!("Start time {} is after end time {}", start, end)));
            }
        }
        if let Some(start) = self.start_time {
            params.insert("starttime".into(), start.format(QUERY_TIME_FORMAT).to_string());
        }
        if let Some(end) = self.end_time {
            params.insert("endtime".into(), end.format(QUERY_TIME_FORMAT).to_string());
        }
        params.insert("level".into(), self.level.as_str().into());
        params.insert("format".into(), "text".into());
        Ok(params)
    }
}

/// One waveform request; codes accept `*` and `?` wildcards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformRequest {
    pub network: String,
    pub station: String,
    /// Empty for the blank location code
    pub location: String,
    pub channel: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub attach_response: bool,
    pub remove_response: bool,
}

impl WaveformRequest {
    pub fn new(
        network: impl Into<String>,
        station: impl Into<String>,
        location: impl Into<String>,
        channel: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            network: network.into(),
            station: station.into(),
            location: location.into(),
            channel: channel.into(),
            start_time,
            end_time,
            attach_response: true,
            remove_response: false,
        }
    }

    /// Removing the response needs it attached first
    pub fn with_response(mut self, attach: bool, remove: bool) -> Self {
        self.attach_response = attach || remove;
        self.remove_response = remove;
        self
    }

    /// Whether any code is a pattern or a comma list rather than one channel
    pub fn has_wildcards(&self) -> bool {
        [&self.network, &self.station, &self.location, &self.channel]
            .iter()
            .any(|code| code.contains(['*', '?', ',']))
    }

    pub fn validate(&self) -> Result<()> {
        check_code("network", &self.network)?;
        check_code("station", &self.station)?;
        check_code("channel", &self.channel)?;
        location_param(&self.location)?;
        if self.start_time >= self.end_time {
            return Err(invalid(format!(
                "Waveform window is empty: {} to {}",
                self.start_time, self.end_time
            )));
        }
        Ok(())
    }

    /// Same window and flags for one concrete channel
    pub fn for_channel(&self, network: &str, station: &str, location: &str, channel: &str) -> Self {
        Self {
            network: network.to_string(),
            station: station.to_string(),
            location: location.to_string(),
            channel: channel.to_string(),
            ..self.clone()
        }
    }

    /// Station query resolving the codes of this request to channels
    pub fn channel_query(&self) -> StationQuery {
        StationQuery::new()
            .network(self.network.as_str())
            .station(self.station.as_str())
            .location(self.location.as_str())
            .channel(self.channel.as_str())
            .active_between(self.start_time, self.end_time)
            .at_level(StationLevel::Channel)
    }

    /// Parameters for the IRIS timeseries service in sample-list output
    pub fn to_timeseries_params(&self) -> Result<QueryParams> {
        self.validate()?;
        let mut params = QueryParams::new();
        params.insert("net".into(), self.network.clone());
        params.insert("sta".into(), self.station.clone());
        params.insert("loc".into(), location_param(&self.location)?);
        params.insert("cha".into(), self.channel.clone());
        params.insert("starttime".into(), self.start_time.format(WAVEFORM_TIME_FORMAT).to_string());
        params.insert("endtime".into(), self.end_time.format(WAVEFORM_TIME_FORMAT).to_string());
        params.insert("output".into(), "slist".into());
        Ok(params)
    }
}

fn invalid(message: String) -> SeismicError {
    SeismicError::non_retryable(message).with_code("INVALID_QUERY")
}

fn check_latitude(value: f64) -> Result<()> {
    if !(-90.0..=90.0).contains(&value) {
        return Err(invalid(format!("Latitude must be within [-90, 90], got {}", value)));
    }
    Ok(())
}

fn check_longitude(value: f64) -> Result<()> {
    if !(-180.0..=180.0).contains(&value) {
        return Err(invalid(format!("Longitude must be within [-180, 180], got {}", value)));
    }
    Ok(())
}

fn check_order(name: &str, min: Option<f64>, max: Option<f64>) -> Result<()> {
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(invalid(format!("Minimum {} {} exceeds maximum {}", name, min, max)));
        }
    }
    Ok(())
}

/// Network, station and channel codes: alphanumerics, wildcards, comma lists
fn check_code<'a>(name: &str, code: &'a str) -> Result<&'a str> {
    let valid = !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | '?' | ','));
    if !valid {
        return Err(invalid(format!("Invalid {} code '{}'", name, code)));
    }
    Ok(code)
}

/// The blank location code travels as `--`
fn location_param(location: &str) -> Result<String> {
    let trimmed = location.trim();
    if trimmed.is_empty() || trimmed == "--" {
        return Ok("--".to_string());
    }
    check_code("location", trimmed).map(str::to_string)
}

fn insert_opt(params: &mut QueryParams, name: &str, value: Option<f64>) {
    if let Some(value) = value {
        params.insert(name.to_string(), value.to_string());
    }
}
