//! Sequential batch of transcode sessions over a source directory.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};
use walkdir::WalkDir;

use super::interrupt::Cancellation;
use super::performance::{self, PerformanceRecord};
use super::policy::EncodeOverrides;
use super::session::TranscodeSession;
use crate::config::model::AppConfig;
use crate::error::{BatchError, SessionError};
use crate::media::probe::MediaProber;

/// Container extensions picked up from the source directory.
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "mkv", "mpg", "mpeg", "avi", "wmv", "flv", "webm", "ts",
];

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Records of sessions that finished, in run order.
    pub completed: Vec<PerformanceRecord>,
    /// Sources that failed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
    /// Wall-clock time of the whole batch.
    pub elapsed: Duration,
}

impl BatchSummary {
    /// Sum of encoder time across finished sessions.
    pub fn encode_seconds(&self) -> f64 {
        self.completed.iter().map(|r| r.elapsed_seconds).sum()
    }
}

/// Drives one session at a time over a list of sources.
pub struct SessionBatch<'a> {
    config: &'a AppConfig,
    overrides: EncodeOverrides,
    prober: &'a dyn MediaProber,
    delete_output: bool,
}

impl<'a> SessionBatch<'a> {
    /// Creates a batch, rejecting invalid overrides before any work starts.
    pub fn new(
        config: &'a AppConfig,
        overrides: EncodeOverrides,
        prober: &'a dyn MediaProber,
    ) -> Result<Self, BatchError> {
        overrides.validate()?;
        Ok(Self {
            config,
            overrides,
            prober,
            delete_output: false,
        })
    }

    /// Deletes each output once its performance log is written.
    pub fn with_delete_output(mut self, delete_output: bool) -> Self {
        self.delete_output = delete_output;
        self
    }

    /// Lists source files whose output does not exist yet.
    ///
    /// Unprobeable files are logged and left out.
    pub fn build_source_list(&self) -> Result<Vec<PathBuf>, BatchError> {
        let source_dir = self.config.workspace.source_path();

        let mut sources = Vec::new();
        for entry in WalkDir::new(&source_dir).min_depth(1).max_depth(1).follow_links(true) {
            let entry = entry.map_err(|e| BatchError::ListFailed {
                path: source_dir.clone(),
                message: e.to_string(),
            })?;
            let path = entry.path().to_path_buf();

            if !entry.file_type().is_file() || !is_source_file(&path) {
                continue;
            }

            match TranscodeSession::create(&path, self.config, &self.overrides, self.prober) {
                Ok(session) if session.paths().output.exists() => {
                    info!(
                        source = %path.display(),
                        output = %session.paths().output.display(),
                        "Output exists, skipping"
                    );
                }
                Ok(_) => sources.push(path),
                Err(e) => {
                    warn!(source = %path.display(), error = %e, "Skipping source");
                }
            }
        }

        if sources.is_empty() {
            return Err(BatchError::NoWorkRemaining { source_dir });
        }

        info!(count = sources.len(), "Built source list");
        Ok(sources)
    }

    /// Transcodes `sources` in order.
    ///
    /// Per-file failures are recorded and the batch moves on. Cancellation
    /// ends the batch after the in-flight session has been cleaned up.
    pub async fn run(
        &self,
        sources: &[PathBuf],
        cancel: &Cancellation,
    ) -> Result<BatchSummary, BatchError> {
        let started = Instant::now();
        let mut summary = BatchSummary::default();

        for (index, source) in sources.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(BatchError::Interrupted {
                    completed: summary.completed.len(),
                });
            }

            info!(
                source = %source.display(),
                position = index + 1,
                total = sources.len(),
                "Processing source"
            );

            match self.transcode(source, cancel).await {
                Ok(record) => summary.completed.push(record),
                Err(SessionError::Interrupted { path }) => {
                    warn!(source = %path.display(), "Batch interrupted");
                    return Err(BatchError::Interrupted {
                        completed: summary.completed.len(),
                    });
                }
                Err(e) => {
                    error!(source = %source.display(), error = %e, "Transcode failed");
                    summary.failed.push((source.clone(), e.to_string()));
                }
            }
        }

        summary.elapsed = started.elapsed();
        info!(
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            elapsed = %performance::format_elapsed(summary.elapsed),
            "Batch finished"
        );

        Ok(summary)
    }

    async fn transcode(
        &self,
        source: &Path,
        cancel: &Cancellation,
    ) -> Result<PerformanceRecord, SessionError> {
        let mut session = TranscodeSession::create(source, self.config, &self.overrides, self.prober)?;
        session.start()?;
        session.await_completion(cancel).await?;
        session.finish(self.delete_output)
    }
}

/// Case-insensitive extension check against [`SOURCE_EXTENSIONS`].
pub fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_lowercase();
            SOURCE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}
