// src/validation/mod.rs
//! Response and waveform validation.
//!
//! Catalog validation decides whether a fetched event collection is usable at
//! all; individual bad events only produce warnings. Waveform checks are split
//! into an advisory pass ([`WaveformQualityCheck`]) that never fails a fetch,
//! and a strict pass ([`validate_stream`]) for callers that need clean data.
//! Both feed the 0 to 100 quality score and the JSON [`ValidationReport`].

mod catalog;
mod waveform;

#[cfg(test)]
mod tests;

pub use catalog::{validate_event, CatalogReport, CatalogValidator, DEFAULT_MIN_VALID_EVENT_RATIO};
pub use waveform::{
    sanitize_station_code, validate_stream, GapInfo, QualityMetrics, QualityReport, QualityWarning,
    StreamInfo, StreamThresholds, StreamValidation, ValidationReport, ValidationResults,
    WaveformQualityCheck, MAX_ACCEPTABLE_GAP_RATIO, MIN_ACCEPTABLE_SCORE, SAMPLING_RATE_TOLERANCE_HZ,
};
