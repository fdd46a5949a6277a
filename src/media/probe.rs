//! FFprobe wrapper for media analysis.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::encoder::policy::ResolutionClass;
use crate::error::ProbeError;

/// Static facts about a media file, gathered once per probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// File path as given.
    pub path: PathBuf,
    /// File name without extension.
    pub stem: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Duration in seconds.
    pub duration: f64,
    /// File size in bytes.
    pub size: u64,
    /// Video bitrate in bits per second.
    pub bitrate: u64,
    /// Total number of video frames.
    pub frames: u64,
    /// Video codec name.
    pub codec: String,
}

impl SourceDescriptor {
    /// Resolution bucket of the primary video stream.
    pub fn resolution_class(&self) -> ResolutionClass {
        ResolutionClass::from_height(self.height)
    }
}

/// Something that can describe a media file.
#[cfg_attr(test, mockall::automock)]
pub trait MediaProber: Send + Sync {
    /// Probes `path` and describes its primary video stream.
    fn probe(&self, path: &Path) -> Result<SourceDescriptor, ProbeError>;
}

/// [`MediaProber`] backed by the `ffprobe` executable.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    program: PathBuf,
}

impl FfprobeProber {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl MediaProber for FfprobeProber {
    fn probe(&self, path: &Path) -> Result<SourceDescriptor, ProbeError> {
        let command_failed = |message: String| ProbeError::CommandFailed {
            command: self.program.display().to_string(),
            path: path.to_path_buf(),
            message,
        };

        let output = Command::new(&self.program)
            .args([
                "-v", "quiet",
                "-print_format", "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .map_err(|e| command_failed(e.to_string()))?;

        if !output.status.success() {
            return Err(command_failed(format!(
                "exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let json: Value =
            serde_json::from_slice(&output.stdout).map_err(|e| ProbeError::ParseFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let file_size = std::fs::metadata(path).map(|m| m.len()).ok();
        let descriptor = parse_probe_output(&json, path, file_size)?;

        tracing::debug!(
            path = %path.display(),
            width = descriptor.width,
            height = descriptor.height,
            frames = descriptor.frames,
            codec = %descriptor.codec,
            "Probed media file"
        );

        Ok(descriptor)
    }
}

/// Parses ffprobe JSON output into a [`SourceDescriptor`].
///
/// `file_size` wins over the container's reported size when present.
pub fn parse_probe_output(
    json: &Value,
    path: &Path,
    file_size: Option<u64>,
) -> Result<SourceDescriptor, ProbeError> {
    let streams = json
        .get("streams")
        .and_then(|s| s.as_array())
        .ok_or_else(|| ProbeError::ParseFailed {
            path: path.to_path_buf(),
            message: "missing streams in ffprobe output".to_string(),
        })?;
    let format = json.get("format");

    let stream = streams
        .iter()
        .find(|s| is_primary_video(s))
        .ok_or_else(|| ProbeError::NoVideoStream {
            path: path.to_path_buf(),
        })?;

    let missing = |field: &'static str| ProbeError::MissingField {
        path: path.to_path_buf(),
        field,
    };

    let width = stream
        .get("width")
        .and_then(Value::as_u64)
        .ok_or_else(|| missing("width"))? as u32;
    let height = stream
        .get("height")
        .and_then(Value::as_u64)
        .ok_or_else(|| missing("height"))? as u32;

    let duration = numeric_field(stream, "duration")
        .or_else(|| format.and_then(|f| numeric_field(f, "duration")))
        .ok_or_else(|| missing("duration"))?;

    let bitrate = numeric_field(stream, "bit_rate")
        .or_else(|| format.and_then(|f| numeric_field(f, "bit_rate")))
        .map_or(0, |b| b as u64);

    let frames = match numeric_field(stream, "nb_frames") {
        Some(n) if n > 0.0 => n as u64,
        _ => {
            let rate = stream
                .get("avg_frame_rate")
                .and_then(Value::as_str)
                .and_then(parse_frame_rate)
                .or_else(|| {
                    stream
                        .get("r_frame_rate")
                        .and_then(Value::as_str)
                        .and_then(parse_frame_rate)
                })
                .ok_or_else(|| missing("nb_frames"))?;
            (duration * rate).round() as u64
        }
    };

    let size = file_size
        .or_else(|| format.and_then(|f| numeric_field(f, "size")).map(|s| s as u64))
        .unwrap_or(0);

    Ok(SourceDescriptor {
        path: path.to_path_buf(),
        stem: path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        width,
        height,
        duration,
        size,
        bitrate,
        frames,
        codec: stream
            .get("codec_name")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
    })
}

/// Video streams that are not cover art.
fn is_primary_video(stream: &Value) -> bool {
    let is_video = stream.get("codec_type").and_then(Value::as_str) == Some("video");
    let attached_pic = stream
        .get("disposition")
        .and_then(|d| d.get("attached_pic"))
        .and_then(Value::as_i64)
        == Some(1);
    is_video && !attached_pic
}

/// ffprobe reports most numbers as strings.
fn numeric_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Parses a rate such as `24000/1001`.
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let (num, den) = rate.split_once('/')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den == 0.0 || num == 0.0 {
        return None;
    }
    Some(num / den)
}
