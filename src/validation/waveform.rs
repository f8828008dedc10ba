use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DataConfig;
use crate::error::{Result, SeismicError};
use crate::waveform::{Gap, Stream, TraceData};

/// Allowed deviation from the expected sampling rate
pub const SAMPLING_RATE_TOLERANCE_HZ: f64 = 0.1;

/// Reports below this score recommend reprocessing
pub const MIN_ACCEPTABLE_SCORE: f64 = 70.0;
/// Reports above this missing-data share recommend interpolation
pub const MAX_ACCEPTABLE_GAP_RATIO: f64 = 0.1;

const MAX_STATION_CODE_LEN: usize = 10;

// Score deductions, in points out of 100
const GAP_PENALTY: f64 = 10.0;
const MAX_GAP_PENALTY: f64 = 50.0;
const SAMPLING_RATE_PENALTY_PER_HZ: f64 = 5.0;
const MAX_SAMPLING_RATE_PENALTY: f64 = 20.0;
const SHORT_TRACE_PENALTY: f64 = 30.0;

/// A borderline property of fetched waveform data
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityWarning {
    EmptyStream,
    Gaps {
        trace_id: String,
        count: usize,
    },
    SamplingRateMismatch {
        trace_id: String,
        expected: f64,
        actual: f64,
    },
    TooShort {
        trace_id: String,
        samples: usize,
        duration_secs: f64,
        min_duration_secs: f64,
    },
}

impl fmt::Display for QualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityWarning::EmptyStream => write!(f, "Empty stream received"),
            QualityWarning::Gaps { trace_id, count } => {
                write!(f, "{} gap(s) found in trace {}", count, trace_id)
            }
            QualityWarning::SamplingRateMismatch {
                trace_id,
                expected,
                actual,
            } => write!(
                f,
                "Sampling rate mismatch: expected {}, got {} for {}",
                expected, actual, trace_id
            ),
            QualityWarning::TooShort {
                trace_id,
                samples,
                duration_secs,
                min_duration_secs,
            } => write!(
                f,
                "Trace {} too short: {} samples ({:.1}s < {:.1}s)",
                trace_id, samples, duration_secs, min_duration_secs
            ),
        }
    }
}

/// Advisory findings attached to every waveform fetch
#[derive(Debug, Clone, Default, Serialize)]
pub struct QualityReport {
    pub trace_count: usize,
    pub gap_ratio: f64,
    /// Mean per-trace score in `[0, 100]`; an empty stream scores 0
    pub score: f64,
    pub warnings: Vec<QualityWarning>,
}

impl QualityReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Non-failing quality pass over a stream
#[derive(Debug, Clone)]
pub struct WaveformQualityCheck {
    pub expected_sampling_rate: f64,
    pub min_duration_secs: f64,
    /// Limits of the strict pass, used for scoring and reports
    pub thresholds: StreamThresholds,
}

impl WaveformQualityCheck {
    pub fn new(expected_sampling_rate: f64, min_duration_secs: f64) -> Self {
        Self {
            expected_sampling_rate,
            min_duration_secs,
            thresholds: StreamThresholds {
                min_duration_secs,
                ..StreamThresholds::default()
            },
        }
    }

    pub fn with_thresholds(mut self, thresholds: StreamThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Uses the configured sampling rate and analysis window length
    pub fn from_config(data: &DataConfig) -> Self {
        Self::new(data.sampling_rate, data.window_length)
    }

    pub fn check(&self, stream: &Stream) -> QualityReport {
        let mut report = QualityReport {
            trace_count: stream.len(),
            gap_ratio: stream.gap_ratio(),
            score: self.quality_score(stream),
            warnings: Vec::new(),
        };
        if stream.is_empty() {
            report.warnings.push(QualityWarning::EmptyStream);
        }

        let gaps = stream.gaps();
        for gap in &gaps {
            debug!("{}", gap);
        }
        for id in stream.ids() {
            let count = gaps.iter().filter(|g| g.trace_id == id).count();
            if count > 0 {
                report.warnings.push(QualityWarning::Gaps { trace_id: id, count });
            }
        }

        for trace in stream.iter() {
            let stats = trace.stats();
            if (stats.sampling_rate - self.expected_sampling_rate).abs() > SAMPLING_RATE_TOLERANCE_HZ {
                report.warnings.push(QualityWarning::SamplingRateMismatch {
                    trace_id: stats.id(),
                    expected: self.expected_sampling_rate,
                    actual: stats.sampling_rate,
                });
            }
            let duration = stats.duration_secs();
            if duration < self.min_duration_secs {
                report.warnings.push(QualityWarning::TooShort {
                    trace_id: stats.id(),
                    samples: stats.npts,
                    duration_secs: duration,
                    min_duration_secs: self.min_duration_secs,
                });
            }
        }

        for warning in &report.warnings {
            warn!("{}", warning);
        }
        report
    }

    /// Quality score in `[0, 100]`, the mean over all traces
    ///
    /// Each trace starts at 100 and is halved when it fails the strict checks.
    /// Every segment of a channel then loses 10 points per gap in that channel
    /// (at most 50), up to 20 points for sampling rate drift, and up to 30
    /// points in proportion to how far it falls short of the minimum duration.
    pub fn quality_score(&self, stream: &Stream) -> f64 {
        if stream.is_empty() {
            return 0.0;
        }

        let gaps = stream.gaps();
        let total: f64 = stream
            .iter()
            .map(|trace| {
                let stats = trace.stats();
                let mut score = 100.0;
                if validate_trace(trace, &self.thresholds).is_err() {
                    score *= 0.5;
                }

                let id = stats.id();
                let gap_count = gaps.iter().filter(|g| g.trace_id == id).count();
                score -= (gap_count as f64 * GAP_PENALTY).min(MAX_GAP_PENALTY);

                let drift = (stats.sampling_rate - self.expected_sampling_rate).abs();
                if drift > SAMPLING_RATE_TOLERANCE_HZ {
                    score -= (drift * SAMPLING_RATE_PENALTY_PER_HZ).min(MAX_SAMPLING_RATE_PENALTY);
                }

                let duration = stats.duration_secs();
                if duration < self.min_duration_secs {
                    score -= (1.0 - duration / self.min_duration_secs) * SHORT_TRACE_PENALTY;
                }
                f64::max(score, 0.0)
            })
            .sum();

        let score = total / stream.len() as f64;
        info!("Data quality score: {:.1}/100", score);
        score
    }

    /// Full report: stream overview, strict validation outcome, score, gaps,
    /// and what to do about them
    pub fn validation_report(&self, stream: &Stream) -> ValidationReport {
        let validation = match validate_stream(stream, &self.thresholds) {
            Ok(outcome) => ValidationResults {
                passed: true,
                valid_traces: outcome.valid,
                error: None,
            },
            Err(e) => ValidationResults {
                passed: false,
                valid_traces: 0,
                error: Some(e.to_string()),
            },
        };

        let gaps = stream.gaps();
        let quality = QualityMetrics {
            score: self.quality_score(stream),
            gap_info: GapInfo {
                total_gaps: gaps.len(),
                gap_ratio: stream.gap_ratio(),
                gaps,
            },
        };

        let mut recommendations = Vec::new();
        if quality.score < MIN_ACCEPTABLE_SCORE {
            recommendations.push("Consider filtering or reprocessing data".to_string());
        }
        if quality.gap_info.gap_ratio > MAX_ACCEPTABLE_GAP_RATIO {
            recommendations.push("Significant data gaps detected, consider interpolation".to_string());
        }

        let traces: Vec<_> = stream.iter().map(|t| t.stats()).collect();
        ValidationReport {
            generated_at: Utc::now(),
            stream_info: StreamInfo {
                trace_count: traces.len(),
                trace_ids: traces.iter().map(|s| s.id()).collect(),
                sampling_rates: traces.iter().map(|s| s.sampling_rate).collect(),
                durations_secs: traces.iter().map(|s| s.duration_secs()).collect(),
            },
            validation,
            quality,
            recommendations,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    pub trace_count: usize,
    pub trace_ids: Vec<String>,
    pub sampling_rates: Vec<f64>,
    pub durations_secs: Vec<f64>,
}

/// Outcome of [`validate_stream`] as recorded in a report
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResults {
    pub passed: bool,
    pub valid_traces: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GapInfo {
    pub total_gaps: usize,
    pub gap_ratio: f64,
    pub gaps: Vec<Gap>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityMetrics {
    pub score: f64,
    pub gap_info: GapInfo,
}

/// Serializable summary of a stream's fitness for analysis
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub generated_at: DateTime<Utc>,
    pub stream_info: StreamInfo,
    pub validation: ValidationResults,
    pub quality: QualityMetrics,
    pub recommendations: Vec<String>,
}

impl ValidationReport {
    /// Write the report as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| SeismicError::from(e).with_detail("path", path.display()))?;
        info!("Validation report saved to {}", path.display());
        Ok(())
    }
}

/// Limits for the strict stream validation
#[derive(Debug, Clone)]
pub struct StreamThresholds {
    pub min_sampling_rate: f64,
    pub max_sampling_rate: f64,
    pub min_duration_secs: f64,
    /// Share of traces that must pass
    pub min_valid_ratio: f64,
}

impl Default for StreamThresholds {
    fn default() -> Self {
        Self {
            min_sampling_rate: 1.0,
            max_sampling_rate: 1000.0,
            min_duration_secs: 10.0,
            min_valid_ratio: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamValidation {
    pub total: usize,
    pub valid: usize,
    pub rejected: Vec<(String, String)>,
}

/// Strict validation: fails unless enough traces are usable
pub fn validate_stream(stream: &Stream, thresholds: &StreamThresholds) -> Result<StreamValidation> {
    if stream.is_empty() {
        return Err(SeismicError::data_format("Stream is empty"));
    }

    let mut outcome = StreamValidation {
        total: stream.len(),
        valid: 0,
        rejected: Vec::new(),
    };
    for trace in stream.iter() {
        match validate_trace(trace, thresholds) {
            Ok(()) => outcome.valid += 1,
            Err(e) => {
                warn!("Trace {} validation failed: {}", trace.id(), e.message);
                outcome.rejected.push((trace.id(), e.message));
            }
        }
    }

    let ratio = outcome.valid as f64 / outcome.total as f64;
    if ratio < thresholds.min_valid_ratio {
        return Err(SeismicError::data_quality(format!(
            "Only {:.1}% of traces are valid",
            ratio * 100.0
        )));
    }
    info!("Stream validation passed: {}/{} traces valid", outcome.valid, outcome.total);
    Ok(outcome)
}

fn validate_trace<T: TraceData>(trace: &T, thresholds: &StreamThresholds) -> Result<()> {
    let stats = trace.stats();
    let sr = stats.sampling_rate;
    if !(thresholds.min_sampling_rate..=thresholds.max_sampling_rate).contains(&sr) {
        return Err(SeismicError::data_quality(format!("Invalid sampling rate: {} Hz", sr)));
    }
    let duration = stats.duration_secs();
    if duration < thresholds.min_duration_secs {
        return Err(SeismicError::data_quality(format!("Trace too short: {:.1}s", duration)));
    }

    let data = trace.samples()?;
    if data.is_empty() {
        return Err(SeismicError::data_format("Trace has no data"));
    }
    if data.iter().any(|v| !v.is_finite()) {
        return Err(SeismicError::data_quality("Trace contains NaN or infinite values"));
    }
    let first = data[0];
    if data.iter().all(|v| *v == first) {
        // Usually a dead or disconnected sensor
        return Err(SeismicError::data_quality("Trace has constant values"));
    }
    Ok(())
}

/// Trimmed, upper-cased station code
///
/// Codes are 1 to 10 characters. `*` and `?` wildcards may appear next to at
/// least one letter or digit.
pub fn sanitize_station_code(code: &str) -> Result<String> {
    let code = code.trim().to_uppercase();
    let invalid = |what: &str| {
        SeismicError::non_retryable(format!("Invalid station code {}: '{}'", what, code))
            .with_code("INVALID_QUERY")
    };

    if !(1..=MAX_STATION_CODE_LEN).contains(&code.chars().count()) {
        return Err(invalid("length"));
    }
    let mut literal = code.chars().filter(|c| !matches!(c, '*' | '?')).peekable();
    if literal.peek().is_none() || !literal.all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid("characters"));
    }
    Ok(code)
}
