//! Per-variant evaluation summary file.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::EvaluationError;
use crate::media::frames::Alignment;

/// File name of the summary inside a variant's comparison directory.
pub const SUMMARY_FILE: &str = "summary.txt";

/// Scores and performance figures for one encoded variant.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationSummary {
    /// Mean similarity over scored samples.
    pub average: f64,
    /// Encode wall-clock time as recorded in the performance log.
    pub duration: String,
    /// Encode throughput as recorded in the performance log.
    pub fps: String,
    /// Percent size reduction.
    pub compression: i64,
    pub alignment: Alignment,
    /// `(sample number, score)` for each scored sample, ascending.
    pub scores: Vec<(u32, f64)>,
}

impl EvaluationSummary {
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(SUMMARY_FILE)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(out, "SSIM Avg:\t{}", self.average);
        let _ = writeln!(out, "Duration:\t{}", self.duration);
        let _ = writeln!(out, "FPS:\t\t{}", self.fps);
        let _ = writeln!(out, "Compression:\t{}%", self.compression);
        match self.alignment {
            Alignment::Matched => out.push_str("Alignment:\tmatched\n"),
            Alignment::Mismatch {
                source_frames,
                encoded_frames,
            } => {
                let _ = writeln!(out, "Alignment:\tmismatch\t{}\t{}", source_frames, encoded_frames);
            }
        }
        for (ordinal, score) in &self.scores {
            let _ = writeln!(out, "{}\t{}", ordinal, score);
        }
        out
    }

    /// Writes `summary.txt` into `dir`.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, EvaluationError> {
        let path = Self::path_in(dir);
        std::fs::write(&path, self.render())?;
        Ok(path)
    }

    /// Reads `summary.txt` from `dir`.
    pub fn read(dir: &Path) -> Result<Self, EvaluationError> {
        let path = Self::path_in(dir);
        let content = std::fs::read_to_string(&path)?;
        Self::parse(&content, &path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, EvaluationError> {
        let error = |message: String| EvaluationError::SummaryParseFailed {
            path: path.to_path_buf(),
            message,
        };

        let mut average = None;
        let mut duration = None;
        let mut fps = None;
        let mut compression = None;
        let mut alignment = Alignment::Matched;
        let mut scores = Vec::new();

        for (number, line) in content.lines().enumerate() {
            let fields: Vec<&str> = line.split('\t').filter(|f| !f.is_empty()).collect();
            let Some((&key, values)) = fields.split_first() else {
                continue;
            };

            match key {
                "SSIM Avg:" => average = values.first().and_then(|v| v.parse::<f64>().ok()),
                "Duration:" => duration = values.first().map(|v| v.to_string()),
                "FPS:" => fps = values.first().map(|v| v.to_string()),
                "Compression:" => {
                    compression = values
                        .first()
                        .and_then(|v| v.trim_end_matches('%').parse::<i64>().ok())
                }
                "Alignment:" => {
                    alignment = match values {
                        ["matched", ..] => Alignment::Matched,
                        ["mismatch", source, encoded, ..] => Alignment::Mismatch {
                            source_frames: source
                                .parse()
                                .map_err(|_| error(format!("bad frame count on line {}", number + 1)))?,
                            encoded_frames: encoded
                                .parse()
                                .map_err(|_| error(format!("bad frame count on line {}", number + 1)))?,
                        },
                        _ => return Err(error(format!("bad alignment on line {}", number + 1))),
                    }
                }
                ordinal => {
                    let ordinal = ordinal
                        .trim_end_matches(':')
                        .parse::<u32>()
                        .map_err(|_| error(format!("unexpected line {}: '{}'", number + 1, line)))?;
                    let score = values
                        .first()
                        .and_then(|v| v.parse::<f64>().ok())
                        .ok_or_else(|| error(format!("missing score on line {}", number + 1)))?;
                    scores.push((ordinal, score));
                }
            }
        }

        Ok(Self {
            average: average.ok_or_else(|| error("missing 'SSIM Avg'".to_string()))?,
            duration: duration.ok_or_else(|| error("missing 'Duration'".to_string()))?,
            fps: fps.ok_or_else(|| error("missing 'FPS'".to_string()))?,
            compression: compression.ok_or_else(|| error("missing 'Compression'".to_string()))?,
            alignment,
            scores,
        })
    }
}
