//! End-to-end runs of transcode sessions against a stand-in encoder script.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use transcode_eval::config::AppConfig;
use transcode_eval::encoder::interrupt;
use transcode_eval::encoder::performance;
use transcode_eval::encoder::{Cancellation, EncodeOverrides, SessionBatch, SessionState, TranscodeSession};
use transcode_eval::error::{BatchError, EncoderError, ProbeError, SessionError};
use transcode_eval::media::probe::{MediaProber, SourceDescriptor};

/// Describes every file as a 720p, 240-frame, 1000-byte source.
struct FixedProber;

impl MediaProber for FixedProber {
    fn probe(&self, path: &Path) -> Result<SourceDescriptor, ProbeError> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| ProbeError::NoVideoStream {
                path: path.to_path_buf(),
            })?;

        Ok(SourceDescriptor {
            path: path.to_path_buf(),
            stem,
            width: 1280,
            height: 720,
            duration: 10.0,
            size: 1000,
            bitrate: 800,
            frames: 240,
            codec: "h264".to_string(),
        })
    }
}

/// Writes `encoded` to the path after `--output`, then runs `tail`.
fn encoder_script(dir: &Path, name: &str, tail: &str) -> PathBuf {
    let path = dir.join(name);
    let script = format!(
        "#!/bin/sh\n\
         out=\"\"\n\
         while [ $# -gt 0 ]; do\n\
         \x20 if [ \"$1\" = \"--output\" ]; then out=\"$2\"; fi\n\
         \x20 shift\n\
         done\n\
         printf 'encoded' > \"$out\"\n\
         {}\n",
        tail
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn workspace(tail: &str) -> (TempDir, AppConfig) {
    let dir = tempfile::tempdir().unwrap();
    for sub in ["source", "hevc", "performance", "comparison"] {
        std::fs::create_dir(dir.path().join(sub)).unwrap();
    }

    let mut config = AppConfig::default();
    config.workspace.root = dir.path().to_path_buf();
    config.tools.encoder = encoder_script(dir.path(), "fake-handbrake", tail);
    (dir, config)
}

fn add_source(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join("source").join(name);
    std::fs::write(&path, vec![0u8; 1000]).unwrap();
    path
}

#[tokio::test]
async fn finished_session_writes_log_and_snapshot() {
    let (dir, config) = workspace("exit 0");
    let source = add_source(&dir, "movie.mp4");

    let mut session =
        TranscodeSession::create(&source, &config, &EncodeOverrides::default(), &FixedProber).unwrap();
    session.start().unwrap();
    session.await_completion(&Cancellation::never()).await.unwrap();
    let record = session.finish(false).unwrap();

    assert_eq!(session.state(), SessionState::Finished);
    assert_eq!(record.paths.output, dir.path().join("hevc/movie_RF20_Medium.mp4"));
    assert_eq!(std::fs::read(&record.paths.output).unwrap(), b"encoded");
    assert_eq!(record.output_size, 7);
    assert_eq!(record.compression_ratio, 99);

    let summary = performance::read_log_summary(&record.paths.log).unwrap();
    assert_eq!(summary.compression_ratio, Some(99));
    assert_eq!(summary.elapsed, record.elapsed);

    let snapshot = performance::read_snapshot(&record.paths.snapshot).unwrap();
    assert_eq!(snapshot.parameters, record.parameters);
    assert_eq!(snapshot.output_size, 7);
}

#[tokio::test]
async fn delete_output_keeps_only_the_log() {
    let (dir, config) = workspace("exit 0");
    let source = add_source(&dir, "movie.mkv");

    let mut session =
        TranscodeSession::create(&source, &config, &EncodeOverrides::default(), &FixedProber).unwrap();
    session.start().unwrap();
    session.await_completion(&Cancellation::never()).await.unwrap();
    let record = session.finish(true).unwrap();

    assert!(!record.paths.output.exists());
    assert!(record.paths.log.exists());
}

#[tokio::test]
async fn interrupted_session_leaves_no_output() {
    let (dir, config) = workspace("exec sleep 30");
    let source = add_source(&dir, "movie.mp4");

    let mut session =
        TranscodeSession::create(&source, &config, &EncodeOverrides::default(), &FixedProber).unwrap();
    let output = session.paths().output.clone();
    let log = session.paths().log.clone();
    session.start().unwrap();

    let (handle, token) = interrupt::channel();
    let watched = output.clone();
    tokio::spawn(async move {
        for _ in 0..100 {
            if watched.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(10), session.await_completion(&token))
        .await
        .expect("cancellation should end the session");

    assert!(matches!(result, Err(SessionError::Interrupted { .. })));
    assert_eq!(session.state(), SessionState::Aborted);
    assert!(!output.exists());
    assert!(!log.exists());
}

#[tokio::test]
async fn failing_encoder_removes_partial_output() {
    let (dir, config) = workspace("exit 3");
    let source = add_source(&dir, "movie.mp4");

    let mut session =
        TranscodeSession::create(&source, &config, &EncodeOverrides::default(), &FixedProber).unwrap();
    session.start().unwrap();
    let err = session.await_completion(&Cancellation::never()).await.unwrap_err();

    assert!(
        matches!(err, SessionError::Encoder(EncoderError::EncodeFailed { code: 3 })),
        "unexpected error: {}",
        err
    );
    assert_eq!(session.state(), SessionState::Failed);
    assert!(!session.paths().output.exists());
}

#[tokio::test]
async fn second_batch_run_has_nothing_to_do() {
    let (dir, config) = workspace("exit 0");
    add_source(&dir, "a.mp4");
    add_source(&dir, "b.mkv");

    let batch = SessionBatch::new(&config, EncodeOverrides::default(), &FixedProber).unwrap();
    let sources = batch.build_source_list().unwrap();
    assert_eq!(sources.len(), 2);

    let summary = batch.run(&sources, &Cancellation::never()).await.unwrap();
    assert_eq!(summary.completed.len(), 2);
    assert!(summary.failed.is_empty());
    assert!(summary.encode_seconds() <= summary.elapsed.as_secs_f64());

    assert!(matches!(
        batch.build_source_list(),
        Err(BatchError::NoWorkRemaining { .. })
    ));
}

#[tokio::test]
async fn existing_output_is_left_untouched() {
    let (dir, config) = workspace("exit 0");
    add_source(&dir, "done.mp4");
    add_source(&dir, "todo.mp4");
    let finished = dir.path().join("hevc/done_RF20_Medium.mp4");
    std::fs::write(&finished, b"previous run").unwrap();

    let batch = SessionBatch::new(&config, EncodeOverrides::default(), &FixedProber).unwrap();
    let sources = batch.build_source_list().unwrap();
    assert_eq!(sources, vec![dir.path().join("source/todo.mp4")]);

    batch.run(&sources, &Cancellation::never()).await.unwrap();

    assert_eq!(std::fs::read(&finished).unwrap(), b"previous run");
    assert!(dir.path().join("hevc/todo_RF20_Medium.mp4").exists());
}

#[tokio::test]
async fn overrides_change_the_output_name() {
    let (dir, config) = workspace("exit 0");
    add_source(&dir, "movie.mp4");
    let overrides = EncodeOverrides {
        quality: Some(22),
        speed_preset: Some("slow".to_string()),
        baseline: true,
        ..Default::default()
    };

    let batch = SessionBatch::new(&config, overrides, &FixedProber).unwrap();
    let sources = batch.build_source_list().unwrap();
    let summary = batch.run(&sources, &Cancellation::never()).await.unwrap();

    assert_eq!(
        summary.completed[0].paths.output,
        dir.path().join("hevc/movie_RF22_Slow_Baseline.mp4")
    );
}

#[tokio::test]
async fn interrupting_a_batch_keeps_earlier_outputs() {
    let (dir, config) = workspace("case \"$out\" in *b_RF*) exec sleep 30 ;; esac");
    let first = add_source(&dir, "a.mp4");
    let second = add_source(&dir, "b.mp4");
    let finished = dir.path().join("hevc/a_RF20_Medium.mp4");
    let in_flight = dir.path().join("hevc/b_RF20_Medium.mp4");

    let (handle, token) = interrupt::channel();
    let watched = in_flight.clone();
    tokio::spawn(async move {
        for _ in 0..250 {
            if watched.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.cancel();
    });

    let batch = SessionBatch::new(&config, EncodeOverrides::default(), &FixedProber).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(10), batch.run(&[first, second], &token))
        .await
        .expect("cancellation should end the batch");

    assert!(matches!(result, Err(BatchError::Interrupted { completed: 1 })));
    assert_eq!(std::fs::read(&finished).unwrap(), b"encoded");
    assert!(dir.path().join("performance/a_RF20_Medium.log").exists());
    assert!(!in_flight.exists());
    assert!(!dir.path().join("performance/b_RF20_Medium.log").exists());
}
