//! A single source file's transcode lifecycle.
//!
//! `Created -> Running -> Finished | Aborted | Failed`. Only cancellation
//! leads to `Aborted`; an encoder error leads to `Failed`. A session owns its
//! encoder child exclusively, and both paths kill the child and remove the
//! partial output before the error is returned.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tokio::process::Child;
use tracing::{debug, info, warn};

use super::handbrake::EncoderJob;
use super::interrupt::Cancellation;
use super::performance::{self, PerformanceRecord, SessionPaths, SCHEMA_VERSION};
use super::policy::{self, EncodeOverrides, EncodingParameters};
use crate::config::model::AppConfig;
use crate::error::{EncoderError, SessionError};
use crate::media::probe::{MediaProber, SourceDescriptor};

/// Lifecycle state of a [`TranscodeSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Running,
    Finished,
    Aborted,
    Failed,
}

impl SessionState {
    fn name(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Running => "Running",
            Self::Finished => "Finished",
            Self::Aborted => "Aborted",
            Self::Failed => "Failed",
        }
    }
}

/// How the supervised child ended.
enum Outcome {
    Cancelled,
    Exited(std::io::Result<ExitStatus>),
}

/// One source file's encode, from probe to performance log.
#[derive(Debug)]
pub struct TranscodeSession {
    source: SourceDescriptor,
    parameters: EncodingParameters,
    paths: SessionPaths,
    job: EncoderJob,
    write_snapshot: bool,
    state: SessionState,
    started_at: Option<DateTime<Local>>,
    finished_at: Option<DateTime<Local>>,
    started: Option<Instant>,
    elapsed: Option<Duration>,
    child: Option<Child>,
}

impl TranscodeSession {
    /// Probes `path` and resolves everything needed to start encoding.
    pub fn create(
        path: &Path,
        config: &AppConfig,
        overrides: &EncodeOverrides,
        prober: &dyn MediaProber,
    ) -> Result<Self, SessionError> {
        let source = prober.probe(path)?;
        let class = source.resolution_class();

        let parameters = policy::resolve(class, overrides, &config.encoding).map_err(|e| {
            SessionError::InvalidConfiguration {
                path: path.to_path_buf(),
                source: e,
            }
        })?;

        let paths = derive_paths(path, &source.stem, &parameters, config);
        let job = EncoderJob::handbrake(&config.tools, &parameters, &paths.source, &paths.output);

        let session = Self {
            source,
            parameters,
            paths,
            job,
            write_snapshot: config.encoding.write_session_snapshot,
            state: SessionState::Created,
            started_at: None,
            finished_at: None,
            started: None,
            elapsed: None,
            child: None,
        };
        session.validate()?;

        debug!(
            source = %session.paths.source.display(),
            class = %class,
            quality = session.parameters.quality,
            speed = %session.parameters.speed_preset,
            options = %session.parameters.options,
            "Session created"
        );

        Ok(session)
    }

    /// Every resolved field must be non-empty before the session may start.
    fn validate(&self) -> Result<(), SessionError> {
        self.parameters
            .validate()
            .map_err(|e| SessionError::InvalidConfiguration {
                path: self.paths.source.clone(),
                source: e,
            })?;

        if self.source.stem.is_empty() {
            return Err(SessionError::InvalidConfiguration {
                path: self.paths.source.clone(),
                source: crate::error::ParameterError::Unresolved { field: "stem" },
            });
        }

        Ok(())
    }

    pub fn source(&self) -> &SourceDescriptor {
        &self.source
    }

    pub fn parameters(&self) -> &EncodingParameters {
        &self.parameters
    }

    pub fn paths(&self) -> &SessionPaths {
        &self.paths
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The encoder command line.
    pub fn invocation(&self) -> String {
        self.job.invocation()
    }

    /// Spawns the encoder.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Created {
            return Err(self.invalid_state("start"));
        }

        info!(
            source = %self.paths.source.display(),
            output = %self.paths.output.display(),
            command = %self.job.invocation(),
            "Starting transcode session"
        );

        let child = self.job.spawn()?;

        self.child = Some(child);
        self.started_at = Some(Local::now());
        self.started = Some(Instant::now());
        self.state = SessionState::Running;
        Ok(())
    }

    /// Waits for the encoder to exit or for `cancel` to fire.
    ///
    /// Both remove the partial output. Cancellation leaves the session
    /// `Aborted`; a nonzero exit or a failed wait leaves it `Failed`.
    pub async fn await_completion(&mut self, cancel: &Cancellation) -> Result<(), SessionError> {
        if self.state != SessionState::Running {
            return Err(self.invalid_state("await"));
        }
        let mut cancel = cancel.clone();
        let outcome = match self.child.as_mut() {
            Some(child) => tokio::select! {
                biased;
                _ = cancel.cancelled() => Outcome::Cancelled,
                status = child.wait() => Outcome::Exited(status),
            },
            None => {
                return Err(SessionError::InvalidState {
                    operation: "await",
                    state: "Running",
                })
            }
        };

        match outcome {
            Outcome::Cancelled => {
                warn!(source = %self.paths.source.display(), "Transcode interrupted");
                self.kill_child().await;
                self.end(SessionState::Aborted);
                Err(SessionError::Interrupted {
                    path: self.paths.source.clone(),
                })
            }
            Outcome::Exited(Err(e)) => {
                self.kill_child().await;
                self.end(SessionState::Failed);
                Err(EncoderError::WaitFailed(e.to_string()).into())
            }
            Outcome::Exited(Ok(status)) if !status.success() => {
                self.child = None;
                self.end(SessionState::Failed);
                Err(EncoderError::EncodeFailed {
                    code: status.code().unwrap_or(-1),
                }
                .into())
            }
            Outcome::Exited(Ok(_)) => {
                self.child = None;
                self.finished_at = Some(Local::now());
                self.elapsed = self.started.map(|s| s.elapsed());
                info!(output = %self.paths.output.display(), "Encoder finished");
                Ok(())
            }
        }
    }

    async fn kill_child(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill encoder");
            }
        }
    }

    fn end(&mut self, state: SessionState) {
        if let Err(e) = self.cleanup() {
            warn!(error = %e, output = %self.paths.output.display(), "Failed to remove partial output");
        }
        self.state = state;
    }

    /// Computes performance figures, persists them, and optionally deletes the output.
    pub fn finish(&mut self, delete_output: bool) -> Result<PerformanceRecord, SessionError> {
        let elapsed = match (self.state, self.elapsed) {
            (SessionState::Running, Some(elapsed)) if self.child.is_none() => elapsed,
            _ => return Err(self.invalid_state("finish")),
        };

        let output_size = std::fs::metadata(&self.paths.output)?.len();
        let record = PerformanceRecord {
            schema_version: SCHEMA_VERSION,
            source: self.source.clone(),
            parameters: self.parameters.clone(),
            paths: self.paths.clone(),
            invocation: self.job.invocation(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            elapsed: performance::format_elapsed(elapsed),
            elapsed_seconds: elapsed.as_secs_f64(),
            output_size,
            compression_ratio: performance::compression_ratio(self.source.size, output_size),
            fps: performance::frames_per_second(self.source.frames, elapsed),
        };

        performance::write_log(&record)?;
        if self.write_snapshot {
            performance::write_snapshot(&record)?;
        }
        self.state = SessionState::Finished;

        info!(
            output = %self.paths.output.display(),
            elapsed = %record.elapsed,
            fps = format!("{:.2}", record.fps),
            compression = record.compression_ratio,
            "Finished transcode"
        );

        if delete_output {
            self.cleanup()?;
        }

        Ok(record)
    }

    /// Deletes the output file. An absent file is not an error.
    pub fn cleanup(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.paths.output) {
            Ok(()) => {
                info!(output = %self.paths.output.display(), "Removed output");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Rebuilds the `.session` snapshot from an existing log and output.
    pub fn repair(&self) -> Result<PerformanceRecord, SessionError> {
        let summary = performance::read_log_summary(&self.paths.log)?;
        let output_size = std::fs::metadata(&self.paths.output)?.len();
        let compression_ratio = summary
            .compression_ratio
            .unwrap_or_else(|| performance::compression_ratio(self.source.size, output_size));

        let record = PerformanceRecord {
            schema_version: SCHEMA_VERSION,
            source: self.source.clone(),
            parameters: self.parameters.clone(),
            paths: self.paths.clone(),
            invocation: self.job.invocation(),
            started_at: None,
            finished_at: None,
            elapsed_seconds: performance::parse_elapsed(&summary.elapsed).unwrap_or_default(),
            elapsed: summary.elapsed,
            output_size,
            compression_ratio,
            fps: summary.fps,
        };

        performance::write_snapshot(&record)?;
        info!(snapshot = %self.paths.snapshot.display(), "Wrote session snapshot");
        Ok(record)
    }

    fn invalid_state(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            state: self.state.name(),
        }
    }
}

/// Output, log and snapshot locations for a source file.
fn derive_paths(
    source: &Path,
    stem: &str,
    parameters: &EncodingParameters,
    config: &AppConfig,
) -> SessionPaths {
    let name = format!("{}{}", stem, parameters.file_decorator());
    let output: PathBuf = config
        .workspace
        .output_path()
        .join(format!("{}.{}", name, config.encoding.output_extension));
    let performance_dir = config.workspace.performance_path();

    SessionPaths {
        source: source.to_path_buf(),
        output,
        log: performance_dir.join(format!("{}.log", name)),
        snapshot: performance_dir.join(format!("{}.session", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ParameterError, ProbeError};
    use crate::media::probe::MockMediaProber;

    fn descriptor(path: &Path, height: u32) -> SourceDescriptor {
        SourceDescriptor {
            path: path.to_path_buf(),
            stem: "movie".to_string(),
            width: height * 16 / 9,
            height,
            duration: 60.0,
            size: 1_000_000,
            bitrate: 1_000,
            frames: 1440,
            codec: "h264".to_string(),
        }
    }

    fn prober_for(height: u32) -> MockMediaProber {
        let mut prober = MockMediaProber::new();
        prober
            .expect_probe()
            .returning(move |path| Ok(descriptor(path, height)));
        prober
    }

    fn config(root: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.workspace.root = root.to_path_buf();
        config
    }

    #[test]
    fn create_derives_decorated_paths() {
        let config = config(Path::new("/work"));
        let overrides = EncodeOverrides {
            baseline: true,
            small: true,
            ..Default::default()
        };

        let session = TranscodeSession::create(
            Path::new("/work/source/movie.mp4"),
            &config,
            &overrides,
            &prober_for(720),
        )
        .unwrap();

        assert_eq!(session.state(), SessionState::Created);
        assert_eq!(
            session.paths().output,
            PathBuf::from("/work/hevc/movie_RF20_Medium_Baseline_Small.mp4")
        );
        assert_eq!(
            session.paths().log,
            PathBuf::from("/work/performance/movie_RF20_Medium_Baseline_Small.log")
        );
        assert_eq!(
            session.paths().snapshot,
            PathBuf::from("/work/performance/movie_RF20_Medium_Baseline_Small.session")
        );
        assert!(session
            .invocation()
            .contains("--encopts ctu=32:qg-size=32:tu-intra-depth=3:tu-inter-depth=3"));
    }

    #[test]
    fn probe_failure_is_reported() {
        let mut prober = MockMediaProber::new();
        prober.expect_probe().returning(|path| {
            Err(ProbeError::NoVideoStream {
                path: path.to_path_buf(),
            })
        });

        let err = TranscodeSession::create(
            Path::new("a.mp4"),
            &AppConfig::default(),
            &EncodeOverrides::default(),
            &prober,
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::Probe(ProbeError::NoVideoStream { .. })));
    }

    #[test]
    fn conflicting_overrides_fail_before_start() {
        let overrides = EncodeOverrides {
            baseline: true,
            best: true,
            ..Default::default()
        };
        let err = TranscodeSession::create(
            Path::new("a.mp4"),
            &AppConfig::default(),
            &overrides,
            &prober_for(1080),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidConfiguration {
                source: ParameterError::ConflictingPresetNames,
                ..
            }
        ));
    }

    #[test]
    fn finish_before_completion_is_rejected() {
        let mut session = TranscodeSession::create(
            Path::new("a.mp4"),
            &AppConfig::default(),
            &EncodeOverrides::default(),
            &prober_for(480),
        )
        .unwrap();

        assert!(matches!(
            session.finish(false),
            Err(SessionError::InvalidState {
                operation: "finish",
                state: "Created"
            })
        ));
    }

    #[tokio::test]
    async fn await_before_start_is_rejected() {
        let mut session = TranscodeSession::create(
            Path::new("a.mp4"),
            &AppConfig::default(),
            &EncodeOverrides::default(),
            &prober_for(480),
        )
        .unwrap();

        let err = session.await_completion(&Cancellation::never()).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { operation: "await", .. }));
    }

    #[test]
    fn cleanup_of_missing_output_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let session = TranscodeSession::create(
            &dir.path().join("source/movie.mp4"),
            &config(dir.path()),
            &EncodeOverrides::default(),
            &prober_for(2160),
        )
        .unwrap();

        assert!(session.cleanup().is_ok());
    }

    #[test]
    fn repair_rebuilds_snapshot_from_log() {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["hevc", "performance"] {
            std::fs::create_dir(dir.path().join(sub)).unwrap();
        }
        let session = TranscodeSession::create(
            &dir.path().join("source/movie.mp4"),
            &config(dir.path()),
            &EncodeOverrides::default(),
            &prober_for(1080),
        )
        .unwrap();

        std::fs::write(&session.paths().output, vec![0u8; 250_000]).unwrap();
        std::fs::write(&session.paths().log, "0:01:00.000000\n24.00 fps\n\n").unwrap();

        let record = session.repair().unwrap();
        assert_eq!(record.compression_ratio, 75);
        assert_eq!(record.elapsed_seconds, 60.0);
        assert!(session.paths().snapshot.exists());
    }
}
