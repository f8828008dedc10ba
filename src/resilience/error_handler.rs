use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{ErrorKind, SeismicError, Severity};

pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// One handled error as kept in the bounded history
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: ErrorKind,
    pub error_code: Option<String>,
    pub message: String,
    pub severity: Severity,
    pub context: BTreeMap<String, String>,
}

/// Aggregated view returned by [`ErrorHandler::summary`]
#[derive(Debug, Clone, Serialize)]
pub struct ErrorSummary {
    /// Every error ever handled, including those evicted from history
    pub total_errors: u64,
    /// Errors in the retained history younger than one hour
    pub recent_errors_1h: usize,
    pub counts_by_kind: BTreeMap<String, u64>,
    pub counts_by_severity: BTreeMap<Severity, u64>,
    /// Keyed by `Kind:severity`
    pub counts_by_kind_and_severity: BTreeMap<String, u64>,
    pub most_recent_errors: Vec<ErrorRecord>,
}

#[derive(Debug, Default)]
struct HandlerState {
    history: VecDeque<ErrorRecord>,
    counts: HashMap<(ErrorKind, Severity), u64>,
}

/// Process-lifetime aggregation point for errors.
///
/// Construct one at startup and hand an `Arc` to every client that should
/// report into it.
#[derive(Debug)]
pub struct ErrorHandler {
    max_history: usize,
    state: Mutex<HandlerState>,
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl ErrorHandler {
    pub fn new(max_history: usize) -> Self {
        info!(max_history, "Error handler initialized");
        Self {
            max_history: max_history.max(1),
            state: Mutex::new(HandlerState::default()),
        }
    }

    /// Record an error using the severity it carries
    pub fn report(&self, error: &SeismicError, context: BTreeMap<String, String>) {
        self.handle(error, context, error.severity);
    }

    /// Record an error, count it, and log it on the channel matching `severity`
    pub fn handle(&self, error: &SeismicError, context: BTreeMap<String, String>, severity: Severity) {
        let record = ErrorRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind: error.kind,
            error_code: error.error_code.clone(),
            message: error.message.clone(),
            severity,
            context,
        };

        match severity {
            Severity::Critical => {
                error!(critical = true, kind = %error.kind, context = ?record.context, "CRITICAL ERROR: {}", error)
            }
            Severity::High => error!(kind = %error.kind, context = ?record.context, "HIGH SEVERITY: {}", error),
            Severity::Medium => {
                warn!(kind = %error.kind, context = ?record.context, "MEDIUM SEVERITY: {}", error)
            }
            Severity::Low => info!(kind = %error.kind, context = ?record.context, "LOW SEVERITY: {}", error),
        }

        let mut state = self.state.lock();
        *state.counts.entry((error.kind, severity)).or_insert(0) += 1;
        state.history.push_back(record);
        while state.history.len() > self.max_history {
            state.history.pop_front();
        }
    }

    /// Summary with the ten most recent records
    pub fn summary(&self) -> ErrorSummary {
        self.summary_with(10)
    }

    pub fn summary_with(&self, recent: usize) -> ErrorSummary {
        let state = self.state.lock();
        let cutoff = Utc::now() - ChronoDuration::hours(1);

        let mut counts_by_kind = BTreeMap::new();
        let mut counts_by_severity = BTreeMap::new();
        let mut counts_by_kind_and_severity = BTreeMap::new();
        let mut total_errors = 0;

        for ((kind, severity), count) in &state.counts {
            total_errors += count;
            *counts_by_kind.entry(kind.name().to_string()).or_insert(0) += count;
            *counts_by_severity.entry(*severity).or_insert(0) += count;
            counts_by_kind_and_severity.insert(format!("{}:{}", kind.name(), severity), *count);
        }

        let recent_errors_1h = state
            .history
            .iter()
            .filter(|r| r.timestamp > cutoff)
            .count();

        let skip = state.history.len().saturating_sub(recent);
        let most_recent_errors = state.history.iter().skip(skip).cloned().collect();

        ErrorSummary {
            total_errors,
            recent_errors_1h,
            counts_by_kind,
            counts_by_severity,
            counts_by_kind_and_severity,
            most_recent_errors,
        }
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }
}

/// Build a context map from string pairs
pub fn context<I, K, V>(pairs: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: ToString,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.to_string()))
        .collect()
}
