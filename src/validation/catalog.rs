use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, SeismicError};

/// Share of events that must pass for a collection to be accepted
pub const DEFAULT_MIN_VALID_EVENT_RATIO: f64 = 0.8;

/// Outcome of validating a feature collection
#[derive(Debug, Clone, Serialize)]
pub struct CatalogReport {
    pub total: usize,
    /// Indices of features that passed every check, in order
    pub valid_indices: Vec<usize>,
    /// Index and reason for every rejected feature
    pub rejected: Vec<(usize, String)>,
}

impl CatalogReport {
    pub fn valid(&self) -> usize {
        self.valid_indices.len()
    }

    /// 1.0 for an empty collection
    pub fn valid_ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.valid() as f64 / self.total as f64
        }
    }
}

/// Validates GeoJSON earthquake catalogs
#[derive(Debug, Clone)]
pub struct CatalogValidator {
    min_valid_ratio: f64,
}

impl Default for CatalogValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_VALID_EVENT_RATIO)
    }
}

impl CatalogValidator {
    pub fn new(min_valid_ratio: f64) -> Self {
        Self {
            min_valid_ratio: min_valid_ratio.clamp(0.0, 1.0),
        }
    }

    pub fn min_valid_ratio(&self) -> f64 {
        self.min_valid_ratio
    }

    /// Check the envelope, then every feature.
    ///
    /// Envelope problems are `DataFormat` errors. Rejected features are logged
    /// as warnings; the collection fails with `DataQuality` only when the valid
    /// share drops below the threshold.
    pub fn validate(&self, data: &Value) -> Result<CatalogReport> {
        debug!("Validating catalog response");
        let features = feature_list(data)?;

        let now = Utc::now();
        let mut report = CatalogReport {
            total: features.len(),
            valid_indices: Vec::with_capacity(features.len()),
            rejected: Vec::new(),
        };
        for (i, feature) in features.iter().enumerate() {
            match validate_event(feature, now) {
                Ok(()) => report.valid_indices.push(i),
                Err(e) => {
                    warn!("Event {} validation failed: {}", i, e.message);
                    report.rejected.push((i, e.message));
                }
            }
        }

        let ratio = report.valid_ratio();
        if ratio < self.min_valid_ratio {
            return Err(SeismicError::data_quality(format!(
                "Only {:.1}% of events are valid",
                ratio * 100.0
            ))
            .with_detail("valid", report.valid())
            .with_detail("total", report.total));
        }

        info!("Catalog validation passed: {}/{} events valid", report.valid(), report.total);
        Ok(report)
    }
}

fn feature_list(data: &Value) -> Result<&Vec<Value>> {
    let object = data
        .as_object()
        .ok_or_else(|| SeismicError::data_format("Catalog response must be a JSON object"))?;
    for field in ["type", "features"] {
        if !object.contains_key(field) {
            return Err(SeismicError::data_format(format!("Missing required field: {}", field)));
        }
    }
    if object.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        return Err(SeismicError::data_format("Invalid GeoJSON type"));
    }
    object
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| SeismicError::data_format("Features must be a list"))
}

/// Checks one GeoJSON feature; `now` bounds the event time
pub fn validate_event(feature: &Value, now: DateTime<Utc>) -> Result<()> {
    if !feature.is_object() {
        return Err(SeismicError::data_format("Event must be an object"));
    }
    if feature.get("type").and_then(Value::as_str) != Some("Feature") {
        return Err(SeismicError::data_format("Event type must be 'Feature'"));
    }

    let coordinates = feature
        .get("geometry")
        .filter(|g| g.is_object())
        .ok_or_else(|| SeismicError::data_format("Missing geometry"))?
        .get("coordinates")
        .and_then(Value::as_array)
        .filter(|c| c.len() >= 3)
        .ok_or_else(|| SeismicError::data_format("Invalid coordinates"))?;
    let number = |v: &Value| {
        v.as_f64()
            .ok_or_else(|| SeismicError::data_format("Coordinates must be numbers"))
    };
    let (longitude, latitude, depth) = (number(&coordinates[0])?, number(&coordinates[1])?, number(&coordinates[2])?);

    if !(-180.0..=180.0).contains(&longitude) {
        return Err(SeismicError::data_quality(format!("Invalid longitude: {}", longitude)));
    }
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(SeismicError::data_quality(format!("Invalid latitude: {}", latitude)));
    }
    if !(-10.0..=1000.0).contains(&depth) {
        return Err(SeismicError::data_quality(format!("Suspicious depth: {} km", depth)));
    }

    let properties = feature.get("properties");
    if let Some(magnitude) = properties.and_then(|p| p.get("mag")).filter(|m| !m.is_null()) {
        let magnitude = magnitude
            .as_f64()
            .ok_or_else(|| SeismicError::data_format("Magnitude must be a number"))?;
        if !(-2.0..=10.0).contains(&magnitude) {
            return Err(SeismicError::data_quality(format!("Suspicious magnitude: {}", magnitude)));
        }
    }

    if let Some(time) = properties.and_then(|p| p.get("time")).filter(|t| !t.is_null()) {
        let event_time = time
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| SeismicError::data_format("Invalid event time format"))?;
        if event_time > now {
            return Err(SeismicError::data_quality("Event time in the future"));
        }
    }

    Ok(())
}
