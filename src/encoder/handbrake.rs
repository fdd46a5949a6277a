//! HandBrakeCLI subprocess wrapper.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, trace};

use super::policy::EncodingParameters;
use crate::config::model::ToolsConfig;
use crate::error::EncoderError;

/// Progress line reported by HandBrake.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeProgress {
    /// Percentage complete (0-100).
    pub percent: f32,
    /// Current encoding speed in frames per second.
    pub fps: Option<f32>,
    /// Estimated time remaining (e.g., "00h12m34s").
    pub eta: Option<String>,
}

/// A fully built encoder invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderJob {
    program: PathBuf,
    args: Vec<OsString>,
}

impl EncoderJob {
    /// Builds the HandBrakeCLI argument list for one encode.
    pub fn handbrake(
        tools: &ToolsConfig,
        parameters: &EncodingParameters,
        source: &Path,
        output: &Path,
    ) -> Self {
        let mut args: Vec<OsString> = Vec::with_capacity(14);

        args.push("--encoder-preset".into());
        args.push(parameters.speed_preset.clone().into());
        args.push("--preset-import-file".into());
        args.push(tools.preset_import_file.clone().into());
        args.push("--preset".into());
        args.push(parameters.preset_name.to_string().into());
        args.push("--quality".into());
        args.push(parameters.quality.to_string().into());
        args.push("--encopts".into());
        args.push(parameters.options.clone().into());
        args.push("--input".into());
        args.push(source.into());
        args.push("--output".into());
        args.push(output.into());

        Self {
            program: tools.encoder.clone(),
            args,
        }
    }

    /// Human-readable command line, as recorded in the performance log.
    pub fn invocation(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|part| {
                let part = part.to_string_lossy();
                if part.is_empty() || part.contains(char::is_whitespace) {
                    format!("\"{}\"", part)
                } else {
                    part.into_owned()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Spawns the encoder. Output is forwarded to the log at debug level.
    pub fn spawn(&self) -> Result<Child, EncoderError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        info!(program = %self.program.display(), "Starting encoder");

        let mut child = cmd
            .spawn()
            .map_err(|e| EncoderError::SpawnFailed(format!("{}: {}", self.program.display(), e)))?;

        // HandBrake rewrites its progress line with carriage returns.
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut segments = BufReader::new(stdout).split(b'\r');
                while let Ok(Some(segment)) = segments.next_segment().await {
                    let line = String::from_utf8_lossy(&segment);
                    match parse_progress(&line) {
                        Some(progress) => trace!(
                            percent = progress.percent,
                            fps = ?progress.fps,
                            eta = ?progress.eta,
                            "Encode progress"
                        ),
                        None => debug!(line = %line.trim(), "encoder output"),
                    }
                }
            });
        }

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(line = %line, "encoder log");
                }
            });
        }

        Ok(child)
    }
}

/// Parses a HandBrake progress line.
///
/// Example: `Encoding: task 1 of 1, 12.34 % (45.67 fps, avg 40.12 fps, ETA 00h12m34s)`
fn parse_progress(line: &str) -> Option<EncodeProgress> {
    let line = line.trim();
    let rest = line.strip_prefix("Encoding:")?;

    let percent_end = rest.find(" %")?;
    let percent = rest[..percent_end]
        .rsplit(|c: char| c == ',' || c.is_whitespace())
        .next()?
        .parse::<f32>()
        .ok()?;

    let details = rest[percent_end..]
        .find('(')
        .map(|start| &rest[percent_end + start + 1..])
        .map(|d| d.trim_end_matches(')'));

    let fps = details
        .and_then(|d| d.split_whitespace().next())
        .and_then(|f| f.parse::<f32>().ok());

    let eta = details
        .and_then(|d| d.find("ETA ").map(|i| &d[i + 4..]))
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());

    Some(EncodeProgress { percent, fps, eta })
}
