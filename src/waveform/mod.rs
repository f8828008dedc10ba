// src/waveform/mod.rs
//! Seismic traces and streams.
//!
//! A trace is anything that can hand out [`TraceStats`] and its samples. Two
//! implementations exist: [`MemoryTrace`] holds samples in a vector, and
//! [`FileTrace`] reads its block of a saved sample-list file the first time the
//! samples are requested. [`Trace`] is the tagged union that [`Stream`] stores.

pub mod slist;


use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

use crate::error::{Result, SeismicError};

/// Discontinuities longer than this many sample intervals count as gaps
pub const GAP_TOLERANCE_SAMPLES: f64 = 1.5;

/// Header of one continuous trace segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceStats {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    /// Samples per second
    pub sampling_rate: f64,
    pub start_time: DateTime<Utc>,
    pub npts: usize,
    /// Physical unit of the samples, `COUNTS` for raw data
    pub units: String,
}

impl TraceStats {
    /// `NET.STA.LOC.CHA`
    pub fn id(&self) -> String {
        format!("{}.{}.{}.{}", self.network, self.station, self.location, self.channel)
    }

    /// Seconds between two samples
    pub fn delta(&self) -> f64 {
        if self.sampling_rate > 0.0 {
            1.0 / self.sampling_rate
        } else {
            0.0
        }
    }

    /// Time of the last sample
    pub fn end_time(&self) -> DateTime<Utc> {
        let last = self.npts.saturating_sub(1) as f64 * self.delta();
        self.start_time + seconds(last)
    }

    /// Covered time in seconds, `npts / sampling_rate`
    pub fn duration_secs(&self) -> f64 {
        self.npts as f64 * self.delta()
    }
}

pub(crate) fn seconds(secs: f64) -> ChronoDuration {
    ChronoDuration::nanoseconds((secs * 1e9).round() as i64)
}

/// Capability shared by every trace representation
pub trait TraceData {
    fn stats(&self) -> &TraceStats;

    fn samples(&self) -> Result<&[f64]>;

    fn id(&self) -> String {
        self.stats().id()
    }
}

/// Trace whose samples live in memory
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTrace {
    stats: TraceStats,
    data: Vec<f64>,
}

impl MemoryTrace {
    /// `npts` is taken from the data length
    pub fn new(mut stats: TraceStats, data: Vec<f64>) -> Self {
        stats.npts = data.len();
        Self { stats, data }
    }

    pub fn into_parts(self) -> (TraceStats, Vec<f64>) {
        (self.stats, self.data)
    }
}

impl TraceData for MemoryTrace {
    fn stats(&self) -> &TraceStats {
        &self.stats
    }

    fn samples(&self) -> Result<&[f64]> {
        Ok(&self.data)
    }
}

/// Trace backed by a block of a sample-list file, read on first access
#[derive(Debug)]
pub struct FileTrace {
    stats: TraceStats,
    path: PathBuf,
    /// Byte range of the sample block inside the file
    offset: u64,
    len: u64,
    data: OnceLock<Vec<f64>>,
}

impl FileTrace {
    pub(crate) fn new(stats: TraceStats, path: impl Into<PathBuf>, offset: u64, len: u64) -> Self {
        Self {
            stats,
            path: path.into(),
            offset,
            len,
            data: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.data.get().is_some()
    }
}

impl TraceData for FileTrace {
    fn stats(&self) -> &TraceStats {
        &self.stats
    }

    fn samples(&self) -> Result<&[f64]> {
        if let Some(data) = self.data.get() {
            return Ok(data);
        }
        let loaded = slist::read_block(&self.path, self.offset, self.len, self.stats.npts)?;
        // A racing loader may have won; either copy is identical
        let _ = self.data.set(loaded);
        self.data
            .get()
            .map(Vec::as_slice)
            .ok_or_else(|| SeismicError::storage(format!("Samples of {} not loaded", self.stats.id())))
    }
}

/// A trace in one of its representations
#[derive(Debug)]
pub enum Trace {
    InMemory(MemoryTrace),
    FileBacked(FileTrace),
}

impl Trace {
    pub fn in_memory(stats: TraceStats, data: Vec<f64>) -> Self {
        Trace::InMemory(MemoryTrace::new(stats, data))
    }

    /// Load the samples if needed and return an owned in-memory trace
    pub fn into_memory(self) -> Result<MemoryTrace> {
        match self {
            Trace::InMemory(trace) => Ok(trace),
            Trace::FileBacked(trace) => {
                let data = trace.samples()?.to_vec();
                Ok(MemoryTrace::new(trace.stats, data))
            }
        }
    }
}

impl TraceData for Trace {
    fn stats(&self) -> &TraceStats {
        match self {
            Trace::InMemory(t) => t.stats(),
            Trace::FileBacked(t) => t.stats(),
        }
    }

    fn samples(&self) -> Result<&[f64]> {
        match self {
            Trace::InMemory(t) => t.samples(),
            Trace::FileBacked(t) => t.samples(),
        }
    }
}

impl From<MemoryTrace> for Trace {
    fn from(trace: MemoryTrace) -> Self {
        Trace::InMemory(trace)
    }
}

/// A discontinuity between two segments of the same channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gap {
    pub trace_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_secs: f64,
    pub missing_samples: usize,
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} gap of {:.3}s ({} samples) at {}",
            self.trace_id,
            self.duration_secs,
            self.missing_samples,
            self.start_time.to_rfc3339()
        )
    }
}

/// Ordered collection of traces
#[derive(Debug, Default)]
pub struct Stream {
    traces: Vec<Trace>,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trace: impl Into<Trace>) {
        self.traces.push(trace.into());
    }

    pub fn append(&mut self, other: Stream) {
        self.traces.extend(other.traces);
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trace> {
        self.traces.iter()
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    pub fn into_traces(self) -> Vec<Trace> {
        self.traces
    }

    /// Distinct trace ids in first-seen order
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for trace in &self.traces {
            let id = trace.id();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    fn segments_by_id(&self) -> BTreeMap<String, Vec<&TraceStats>> {
        let mut by_id: BTreeMap<String, Vec<&TraceStats>> = BTreeMap::new();
        for trace in &self.traces {
            by_id.entry(trace.id()).or_default().push(trace.stats());
        }
        for segments in by_id.values_mut() {
            segments.sort_by_key(|s| s.start_time);
        }
        by_id
    }

    /// Gaps between consecutive segments of each channel; overlaps are ignored
    pub fn gaps(&self) -> Vec<Gap> {
        let mut gaps = Vec::new();
        for (id, segments) in self.segments_by_id() {
            for pair in segments.windows(2) {
                let (prev, next) = (pair[0], pair[1]);
                let delta = prev.delta();
                if delta <= 0.0 {
                    continue;
                }
                let prev_end = prev.end_time();
                let gap_secs = span_secs(prev_end, next.start_time);
                if gap_secs > GAP_TOLERANCE_SAMPLES * delta {
                    gaps.push(Gap {
                        trace_id: id.clone(),
                        start_time: prev_end,
                        end_time: next.start_time,
                        duration_secs: gap_secs,
                        missing_samples: ((gap_secs / delta).round() as usize).saturating_sub(1),
                    });
                }
            }
        }
        gaps
    }

    /// Fraction of expected samples missing across all channels, in `[0, 1]`
    pub fn gap_ratio(&self) -> f64 {
        let mut expected = 0.0;
        let mut actual = 0.0;
        for segments in self.segments_by_id().values() {
            let Some(first) = segments.first() else {
                continue;
            };
            let sampling_rate = first.sampling_rate;
            let last_end = segments.iter().map(|s| s.end_time()).max().unwrap_or(first.start_time);
            expected += span_secs(first.start_time, last_end) * sampling_rate + 1.0;
            actual += segments.iter().map(|s| s.npts as f64).sum::<f64>();
        }
        if expected <= 0.0 {
            return 0.0;
        }
        (1.0 - actual / expected).clamp(0.0, 1.0)
    }
}

impl FromIterator<Trace> for Stream {
    fn from_iter<I: IntoIterator<Item = Trace>>(iter: I) -> Self {
        Self {
            traces: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Stream {
    type Item = Trace;
    type IntoIter = std::vec::IntoIter<Trace>;

    fn into_iter(self) -> Self::IntoIter {
        self.traces.into_iter()
    }
}

fn span_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let span = to.signed_duration_since(from);
    span.num_nanoseconds()
        .map(|n| n as f64 / 1e9)
        .unwrap_or_else(|| span.num_milliseconds() as f64 / 1e3)
}
