//! Performance record persistence.
//!
//! Each finished session leaves a plaintext log whose first three lines are
//! read back positionally by `repair` and by the evaluator, followed by the
//! invocation and a pretty-printed [`PerformanceRecord`]. The same record is
//! also written on its own as a `.session` snapshot.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::policy::EncodingParameters;
use crate::error::SessionError;
use crate::media::probe::SourceDescriptor;

/// Current snapshot layout.
pub const SCHEMA_VERSION: u32 = 1;

/// Filesystem locations derived for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPaths {
    pub source: PathBuf,
    pub output: PathBuf,
    pub log: PathBuf,
    pub snapshot: PathBuf,
}

/// Everything known about a finished transcode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub schema_version: u32,
    pub source: SourceDescriptor,
    pub parameters: EncodingParameters,
    pub paths: SessionPaths,
    pub invocation: String,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
    /// Wall-clock duration as `H:MM:SS.ffffff`.
    pub elapsed: String,
    pub elapsed_seconds: f64,
    pub output_size: u64,
    pub compression_ratio: i64,
    pub fps: f64,
}

impl PerformanceRecord {
    /// Resolution, source bitrate and encoder settings, one tab-aligned line each.
    pub fn settings_header(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, " Resolution:\t{}x{}", self.source.width, self.source.height);
        let _ = writeln!(out, " Bitrate:\t{}kbps", self.source.bitrate / 1000);
        let _ = writeln!(
            out,
            " Encoder:\tRF{} {}, {}",
            self.parameters.quality, self.parameters.speed_preset, self.parameters.options
        );
        out
    }
}

/// The positional header of a performance log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSummary {
    pub elapsed: String,
    pub fps: f64,
    /// `None` when the third line carries no ratio.
    pub compression_ratio: Option<i64>,
}

impl LogSummary {
    /// Frames per second with two decimals.
    pub fn fps_display(&self) -> String {
        format!("{:.2}", self.fps)
    }
}

/// Percent size reduction, truncated toward zero.
///
/// Negative when the output grew. A zero-byte source yields 0.
pub fn compression_ratio(source_size: u64, output_size: u64) -> i64 {
    if source_size == 0 {
        return 0;
    }
    (100.0 - output_size as f64 / source_size as f64 * 100.0).trunc() as i64
}

/// Encoding throughput over whole elapsed seconds, clamped to at least one.
pub fn frames_per_second(frames: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs().max(1);
    frames as f64 / seconds as f64
}

/// Formats a duration as `H:MM:SS.ffffff`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!(
        "{}:{:02}:{:02}.{:06}",
        total / 3600,
        (total % 3600) / 60,
        total % 60,
        elapsed.subsec_micros()
    )
}

/// Parses `H:MM:SS[.ffffff]` back into seconds.
pub fn parse_elapsed(elapsed: &str) -> Option<f64> {
    let mut parts = elapsed.trim().splitn(3, ':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    Some((hours * 3600 + minutes * 60) as f64 + seconds)
}

fn megabytes(bytes: u64) -> u64 {
    bytes / 1_000_000
}

/// Renders the full performance log for a record.
pub fn render_log(record: &PerformanceRecord) -> Result<String, SessionError> {
    let mut log = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(log, "{}", record.elapsed);
    let _ = writeln!(log, "{:.2} fps", record.fps);
    let _ = writeln!(
        log,
        "{}% reduction ({}mb to {}mb)",
        record.compression_ratio,
        megabytes(record.source.size),
        megabytes(record.output_size)
    );
    log.push('\n');
    log.push_str(&record.invocation);
    log.push_str("\n\n");
    log.push_str(&serde_json::to_string_pretty(record)?);
    log.push('\n');
    Ok(log)
}

/// Writes the performance log to `record.paths.log`.
pub fn write_log(record: &PerformanceRecord) -> Result<(), SessionError> {
    let log = render_log(record)?;
    std::fs::write(&record.paths.log, log)?;
    Ok(())
}

/// Reads the positional header of a performance log.
pub fn read_log_summary(path: &Path) -> Result<LogSummary, SessionError> {
    let content = std::fs::read_to_string(path)?;
    parse_log_summary(&content, path)
}

fn parse_log_summary(content: &str, path: &Path) -> Result<LogSummary, SessionError> {
    let parse_error = |message: &str| SessionError::LogParseFailed {
        path: path.to_path_buf(),
        message: message.to_string(),
    };

    let mut lines = content.lines();

    let elapsed = lines
        .next()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or_else(|| parse_error("missing elapsed time on line 1"))?
        .to_string();

    let fps = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .and_then(|token| token.parse::<f64>().ok())
        .ok_or_else(|| parse_error("missing fps on line 2"))?;

    let compression_ratio = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .and_then(|token| token.strip_suffix('%'))
        .and_then(|ratio| ratio.parse::<i64>().ok());

    Ok(LogSummary {
        elapsed,
        fps,
        compression_ratio,
    })
}

/// Writes the `.session` snapshot.
pub fn write_snapshot(record: &PerformanceRecord) -> Result<(), SessionError> {
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(&record.paths.snapshot, json)?;
    Ok(())
}

/// Reads a `.session` snapshot back.
pub fn read_snapshot(path: &Path) -> Result<PerformanceRecord, SessionError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
