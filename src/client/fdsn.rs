// src/client/fdsn.rs
//! Parsers for the pipe-separated FDSN text format.
//!
//! Each response is a `#`-prefixed header line followed by one record per
//! line. An empty body means the service had no matching data.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

use crate::error::{Result, SeismicError};

const EVENT_FIELDS: usize = 13;
const STATION_FIELDS: usize = 8;
const CHANNEL_FIELDS: usize = 17;

/// One row of an FDSN event text response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEvent {
    pub event_id: String,
    pub time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub depth_km: f64,
    pub author: String,
    pub catalog: String,
    pub contributor: String,
    pub contributor_id: String,
    pub magnitude_type: String,
    pub magnitude: Option<f64>,
    pub magnitude_author: String,
    pub location_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationRecord {
    pub network: String,
    pub station: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    pub site_name: String,
    pub start_time: DateTime<Utc>,
    /// `None` while the station is still operating
    pub end_time: Option<DateTime<Utc>>,
}

/// One channel epoch including its overall sensitivity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelRecord {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    pub depth: f64,
    pub azimuth: Option<f64>,
    pub dip: Option<f64>,
    pub sensor_description: String,
    /// Counts per physical unit
    pub scale: Option<f64>,
    pub scale_frequency: Option<f64>,
    pub scale_units: String,
    pub sample_rate: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ChannelRecord {
    pub fn id(&self) -> String {
        format!("{}.{}.{}.{}", self.network, self.station, self.location, self.channel)
    }
}

pub fn parse_events(text: &str) -> Result<Vec<CatalogEvent>> {
    records(text, EVENT_FIELDS)?
        .into_iter()
        .map(|(line, f)| {
            Ok(CatalogEvent {
                event_id: f[0].to_string(),
                time: time(line, f[1])?,
                latitude: number(line, "latitude", f[2])?,
                longitude: number(line, "longitude", f[3])?,
                depth_km: number(line, "depth", f[4])?,
                author: f[5].to_string(),
                catalog: f[6].to_string(),
                contributor: f[7].to_string(),
                contributor_id: f[8].to_string(),
                magnitude_type: f[9].to_string(),
                magnitude: optional_number(line, "magnitude", f[10])?,
                magnitude_author: f[11].to_string(),
                location_name: f[12].to_string(),
            })
        })
        .collect()
}

pub fn parse_stations(text: &str) -> Result<Vec<StationRecord>> {
    records(text, STATION_FIELDS)?
        .into_iter()
        .map(|(line, f)| {
            Ok(StationRecord {
                network: f[0].to_string(),
                station: f[1].to_string(),
                latitude: number(line, "latitude", f[2])?,
                longitude: number(line, "longitude", f[3])?,
                elevation: number(line, "elevation", f[4])?,
                site_name: f[5].to_string(),
                start_time: time(line, f[6])?,
                end_time: optional_time(line, f[7])?,
            })
        })
        .collect()
}

pub fn parse_channels(text: &str) -> Result<Vec<ChannelRecord>> {
    records(text, CHANNEL_FIELDS)?
        .into_iter()
        .map(|(line, f)| {
            Ok(ChannelRecord {
                network: f[0].to_string(),
                station: f[1].to_string(),
                location: f[2].to_string(),
                channel: f[3].to_string(),
                latitude: number(line, "latitude", f[4])?,
                longitude: number(line, "longitude", f[5])?,
                elevation: number(line, "elevation", f[6])?,
                depth: number(line, "depth", f[7])?,
                azimuth: optional_number(line, "azimuth", f[8])?,
                dip: optional_number(line, "dip", f[9])?,
                sensor_description: f[10].to_string(),
                scale: optional_number(line, "scale", f[11])?,
                scale_frequency: optional_number(line, "scale frequency", f[12])?,
                scale_units: f[13].to_string(),
                sample_rate: number(line, "sample rate", f[14])?,
                start_time: time(line, f[15])?,
                end_time: optional_time(line, f[16])?,
            })
        })
        .collect()
}

/// Data rows with their 1-based line numbers, fields trimmed
fn records(text: &str, expected: usize) -> Result<Vec<(usize, Vec<&str>)>> {
    let mut rows = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('|').map(str::trim).collect();
        if fields.len() != expected {
            return Err(SeismicError::data_format(format!(
                "Line {}: expected {} fields, found {}",
                index + 1,
                expected,
                fields.len()
            )));
        }
        rows.push((index + 1, fields));
    }
    Ok(rows)
}

fn number(line: usize, name: &str, raw: &str) -> Result<f64> {
    raw.parse::<f64>().map_err(|_| {
        SeismicError::data_format(format!("Line {}: invalid {} '{}'", line, name, raw))
    })
}

fn optional_number(line: usize, name: &str, raw: &str) -> Result<Option<f64>> {
    if raw.is_empty() {
        return Ok(None);
    }
    number(line, name, raw).map(Some)
}

/// FDSN timestamps, with or without fractional seconds or a trailing `Z`
pub(crate) fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim().trim_end_matches('Z');
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn time(line: usize, raw: &str) -> Result<DateTime<Utc>> {
    parse_time(raw).ok_or_else(|| {
        SeismicError::data_format(format!("Line {}: invalid time '{}'", line, raw))
    })
}

fn optional_time(line: usize, raw: &str) -> Result<Option<DateTime<Utc>>> {
    if raw.is_empty() {
        return Ok(None);
    }
    time(line, raw).map(Some)
}
