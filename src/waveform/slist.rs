// src/waveform/slist.rs

// ASCII sample-list codec, as served by the IRIS timeseries service:
//
//   TIMESERIES IU_ANMO_00_BHZ_M, 4 samples, 20 sps, 2024-01-01T00:00:00.000000, SLIST, FLOAT, COUNTS
//   12.0
//   -3.5
//   ...
//
// One header per continuous segment, followed by its samples.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, info};

use crate::error::{Result, SeismicError};
use crate::waveform::{FileTrace, MemoryTrace, Stream, Trace, TraceData, TraceStats};

const HEADER_PREFIX: &str = "TIMESERIES";
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const DEFAULT_UNITS: &str = "COUNTS";

/// Parse every segment of a sample-list body; an empty body has no segments
pub fn parse(text: &str) -> Result<Vec<MemoryTrace>> {
    let mut traces = Vec::new();
    let mut current: Option<(TraceStats, Vec<f64>)> = None;

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with(HEADER_PREFIX) {
            if let Some((stats, data)) = current.take() {
                traces.push(finish_segment(stats, data)?);
            }
            let stats = parse_header(line)?;
            // The header count is untrusted; a sample needs at least two bytes
            let capacity = stats.npts.min(text.len() / 2);
            current = Some((stats, Vec::with_capacity(capacity)));
            continue;
        }
        match current.as_mut() {
            Some((_, data)) => parse_values(line, data).map_err(|e| e.with_detail("line", line_no + 1))?,
            None => {
                return Err(SeismicError::data_format("Sample list has data before any header")
                    .with_detail("line", line_no + 1))
            }
        }
    }
    if let Some((stats, data)) = current.take() {
        traces.push(finish_segment(stats, data)?);
    }
    Ok(traces)
}

/// Render a stream; file-backed traces are loaded on the way
pub fn write(stream: &Stream) -> Result<String> {
    let mut out = String::new();
    for trace in stream.iter() {
        out.push_str(&format_header(trace.stats()));
        out.push('\n');
        for value in trace.samples()? {
            out.push_str(&value.to_string());
            out.push('\n');
        }
    }
    Ok(out)
}

/// Write a stream to `path`, creating parent directories
pub fn save(stream: &Stream, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let body = write(stream)?;
    fs::write(path, body).map_err(|e| SeismicError::from(e).with_detail("path", path.display()))?;
    info!("Saved {} traces to {}", stream.len(), path.display());
    Ok(())
}

/// Index a saved file; samples stay on disk until a trace asks for them
pub fn load(path: &Path) -> Result<Stream> {
    let text = fs::read_to_string(path).map_err(|e| {
        SeismicError::storage(format!("Cannot read waveform file {}: {}", path.display(), e))
    })?;

    let mut stream = Stream::new();
    let mut pending: Option<(TraceStats, u64)> = None;
    let mut offset: u64 = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len() as u64;
        if !line.trim_start().starts_with(HEADER_PREFIX) {
            continue;
        }
        if let Some((stats, block_start)) = pending.take() {
            stream.push(Trace::FileBacked(FileTrace::new(stats, path, block_start, line_start - block_start)));
        }
        pending = Some((parse_header(line.trim())?, offset));
    }
    if let Some((stats, block_start)) = pending.take() {
        stream.push(Trace::FileBacked(FileTrace::new(stats, path, block_start, offset - block_start)));
    }

    info!("Loaded {} traces from {}", stream.len(), path.display());
    Ok(stream)
}

/// Read and parse one sample block of a saved file
pub(crate) fn read_block(path: &Path, offset: u64, len: u64, npts: usize) -> Result<Vec<f64>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut raw = String::new();
    file.take(len).read_to_string(&mut raw)?;

    let mut data = Vec::with_capacity(npts.min(raw.len() / 2));
    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        parse_values(line, &mut data)?;
    }
    if data.len() != npts {
        return Err(SeismicError::data_format(format!(
            "Waveform block in {} declares {} samples, found {}",
            path.display(),
            npts,
            data.len()
        )));
    }
    debug!(path = %path.display(), npts, "Loaded waveform block");
    Ok(data)
}

fn parse_values(line: &str, data: &mut Vec<f64>) -> Result<()> {
    for token in line.split_whitespace() {
        let value = token
            .parse::<f64>()
            .map_err(|_| SeismicError::data_format(format!("Invalid sample value '{}'", token)))?;
        data.push(value);
    }
    Ok(())
}

fn finish_segment(stats: TraceStats, data: Vec<f64>) -> Result<MemoryTrace> {
    if data.len() != stats.npts {
        return Err(SeismicError::data_format(format!(
            "Segment {} declares {} samples, found {}",
            stats.id(),
            stats.npts,
            data.len()
        )));
    }
    Ok(MemoryTrace::new(stats, data))
}

fn parse_header(line: &str) -> Result<TraceStats> {
    let malformed = |what: &str| {
        SeismicError::data_format(format!("Malformed sample list header ({}): {}", what, line))
    };

    let rest = line
        .strip_prefix(HEADER_PREFIX)
        .ok_or_else(|| malformed("prefix"))?
        .trim();
    let fields: Vec<&str> = rest.split(',').map(str::trim).collect();
    if fields.len() < 5 {
        return Err(malformed("field count"));
    }

    let codes: Vec<&str> = fields[0].split('_').collect();
    if codes.len() < 4 {
        return Err(malformed("trace id"));
    }

    let npts = leading_number::<usize>(fields[1]).ok_or_else(|| malformed("sample count"))?;
    let sampling_rate = leading_number::<f64>(fields[2])
        .filter(|sr| sr.is_finite() && *sr > 0.0)
        .ok_or_else(|| malformed("sampling rate"))?;
    let start_time = NaiveDateTime::parse_from_str(fields[3], TIME_FORMAT)
        .map(|t| t.and_utc())
        .map_err(|_| malformed("start time"))?;
    if !fields[4].eq_ignore_ascii_case("SLIST") {
        return Err(malformed("layout"));
    }
    let units = fields
        .get(6)
        .filter(|u| !u.is_empty())
        .map(|u| u.to_string())
        .unwrap_or_else(|| DEFAULT_UNITS.to_string());

    Ok(TraceStats {
        network: codes[0].to_string(),
        station: codes[1].to_string(),
        location: codes[2].to_string(),
        channel: codes[3].to_string(),
        sampling_rate,
        start_time,
        npts,
        units,
    })
}

fn leading_number<T: std::str::FromStr>(field: &str) -> Option<T> {
    field.split_whitespace().next()?.parse().ok()
}

fn format_header(stats: &TraceStats) -> String {
    format!(
        "{} {}_{}_{}_{}_D, {} samples, {} sps, {}, SLIST, FLOAT, {}",
        HEADER_PREFIX,
        stats.network,
        stats.station,
        stats.location,
        stats.channel,
        stats.npts,
        stats.sampling_rate,
        format_time(stats.start_time),
        stats.units
    )
}

/// Microsecond ISO form used by the timeseries service
pub fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}
