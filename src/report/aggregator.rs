//! Groups a movie's evaluated variants and compares them with its Baseline.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::ReportError;
use crate::evaluation::summary::EvaluationSummary;

/// Family name used for Baseline encodes.
pub const BASELINE: &str = "Baseline";

/// Configuration family and sub-variant of an encoded variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VariantKey {
    /// `Baseline` or the quality token, e.g. `RF21`.
    pub family: String,
    /// Remaining decorator tokens joined by `_`.
    pub sub_key: String,
}

impl VariantKey {
    /// Parses a variant directory name such as `movie_RF21_Medium_Small`.
    pub fn parse(movie: &str, name: &str) -> Result<Self, ReportError> {
        let foreign = || ReportError::ForeignVariant {
            movie: movie.to_string(),
            name: name.to_string(),
        };

        let decorator = name
            .strip_prefix(movie)
            .and_then(|rest| rest.strip_prefix('_'))
            .filter(|rest| rest.starts_with("RF"))
            .ok_or_else(foreign)?;

        let tokens: Vec<&str> = decorator.split('_').filter(|t| !t.is_empty()).collect();

        if tokens.contains(&BASELINE) {
            return Ok(Self {
                family: BASELINE.to_string(),
                sub_key: tokens.join("_"),
            });
        }

        let (family, rest) = tokens.split_first().ok_or_else(foreign)?;
        Ok(Self {
            family: family.to_string(),
            sub_key: rest.join("_"),
        })
    }

    pub fn is_baseline(&self) -> bool {
        self.family == BASELINE
    }

    /// Display name, e.g. `RF21_Medium_Small`.
    pub fn label(&self) -> String {
        if self.is_baseline() {
            BASELINE.to_string()
        } else if self.sub_key.is_empty() {
            self.family.clone()
        } else {
            format!("{}_{}", self.family, self.sub_key)
        }
    }
}

/// One non-Baseline variant compared against the Baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub key: VariantKey,
    pub summary: EvaluationSummary,
    /// Variant average minus Baseline average.
    pub similarity_delta: f64,
    /// Variant compression minus Baseline compression, in percentage points.
    pub compression_delta: i64,
}

/// All evaluated variants of one movie.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonReport {
    pub movie: String,
    pub baseline: EvaluationSummary,
    /// Sorted by family, then sub-variant.
    pub rows: Vec<ReportRow>,
}

impl ComparisonReport {
    /// Reads every `<movie>_RF*` summary under `comparison_dir`.
    pub fn aggregate(comparison_dir: &Path, movie: &str) -> Result<Self, ReportError> {
        let prefix = format!("{}_RF", movie);
        let mut names: Vec<String> = std::fs::read_dir(comparison_dir)?
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with(&prefix))
            .collect();
        names.sort();

        let mut baseline: Option<(String, EvaluationSummary)> = None;
        let mut variants: BTreeMap<VariantKey, EvaluationSummary> = BTreeMap::new();

        for name in names {
            let dir = comparison_dir.join(&name);
            if !EvaluationSummary::path_in(&dir).exists() {
                debug!(variant = %name, "No summary yet, skipping");
                continue;
            }

            let key = VariantKey::parse(movie, &name)?;
            let summary = EvaluationSummary::read(&dir)?;

            if key.is_baseline() {
                match &baseline {
                    Some((kept, _)) => {
                        warn!(kept = %kept, ignored = %name, "Multiple Baseline summaries, keeping the first");
                    }
                    None => baseline = Some((name, summary)),
                }
            } else if variants.insert(key, summary).is_some() {
                warn!(variant = %name, "Duplicate variant key, keeping the last");
            }
        }

        let (_, baseline) = baseline.ok_or_else(|| ReportError::MissingBaseline {
            movie: movie.to_string(),
        })?;

        let rows = variants
            .into_iter()
            .map(|(key, summary)| ReportRow {
                similarity_delta: summary.average - baseline.average,
                compression_delta: summary.compression - baseline.compression,
                key,
                summary,
            })
            .collect();

        Ok(Self {
            movie: movie.to_string(),
            baseline,
            rows,
        })
    }

    /// Tab-separated table: name, SSIM, delta, duration, compression, delta, fps.
    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(out, "{}", self.movie);
        let _ = writeln!(out, "Variant\tSSIM\tDelta\tDuration\tCompression\tDelta\tFPS");
        let _ = writeln!(
            out,
            "{}\t{:.4}\t-\t{}\t{}%\t-\t{}",
            BASELINE,
            self.baseline.average,
            self.baseline.duration,
            self.baseline.compression,
            self.baseline.fps
        );
        for row in &self.rows {
            let _ = writeln!(
                out,
                "{}\t{:.4}\t{:+.4}\t{}\t{}%\t{:+}%\t{}",
                row.key.label(),
                row.summary.average,
                row.similarity_delta,
                row.summary.duration,
                row.summary.compression,
                row.compression_delta,
                row.summary.fps
            );
        }
        out
    }
}
