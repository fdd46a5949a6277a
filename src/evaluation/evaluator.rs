//! Scores encoded variants against their source.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::similarity::SimilarityMetric;
use super::stack;
use super::summary::EvaluationSummary;
use crate::config::model::AppConfig;
use crate::encoder::performance::{self, PerformanceRecord};
use crate::error::EvaluationError;
use crate::media::frames::{Alignment, FrameExtractor, FramePair, FrameSampler};
use crate::media::probe::MediaProber;

/// Result of evaluating one variant.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    /// A new summary was written.
    Written {
        dir: PathBuf,
        summary: EvaluationSummary,
    },
    /// `summary.txt` already existed; nothing was done.
    AlreadyEvaluated { dir: PathBuf },
}

/// Samples frames, scores them, and writes per-variant summaries.
pub struct QualityEvaluator<'a> {
    config: &'a AppConfig,
    prober: &'a dyn MediaProber,
    extractor: &'a dyn FrameExtractor,
    metric: &'a dyn SimilarityMetric,
    stack: bool,
}

impl<'a> QualityEvaluator<'a> {
    pub fn new(
        config: &'a AppConfig,
        prober: &'a dyn MediaProber,
        extractor: &'a dyn FrameExtractor,
        metric: &'a dyn SimilarityMetric,
    ) -> Self {
        Self {
            config,
            prober,
            extractor,
            metric,
            stack: false,
        }
    }

    /// Also writes a `<n>-2up.png` per sample, source above encode.
    pub fn with_stack(mut self, stack: bool) -> Self {
        self.stack = stack;
        self
    }

    /// Encoded files in the output directory that belong to `source`.
    pub fn variants_for(&self, source: &Path) -> Result<Vec<PathBuf>, EvaluationError> {
        let Some(stem) = source.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            return Ok(Vec::new());
        };
        let prefix = format!("{}_RF", stem);

        let mut variants: Vec<PathBuf> = std::fs::read_dir(self.config.workspace.output_path())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.file_name()
                    .map(|n| n.to_string_lossy().starts_with(&prefix))
                    .unwrap_or(false)
            })
            .collect();
        variants.sort();
        Ok(variants)
    }

    /// Evaluates every variant of `source`. Per-variant failures are logged.
    pub fn evaluate_source(
        &self,
        source: &Path,
        num_frames: u32,
    ) -> Result<Vec<EvaluationOutcome>, EvaluationError> {
        let variants = self.variants_for(source)?;
        if variants.is_empty() {
            warn!(source = %source.display(), "No encoded variants found");
        }

        let mut outcomes = Vec::with_capacity(variants.len());
        for encoded in variants {
            match self.evaluate_variant(source, &encoded, num_frames) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(encoded = %encoded.display(), error = %e, "Evaluation failed"),
            }
        }
        Ok(outcomes)
    }

    /// Samples `num_frames` frame pairs and writes the variant's summary.
    pub fn evaluate_variant(
        &self,
        source: &Path,
        encoded: &Path,
        num_frames: u32,
    ) -> Result<EvaluationOutcome, EvaluationError> {
        let variant = file_stem(encoded);
        let dir = self.config.workspace.comparison_path().join(&variant);

        if EvaluationSummary::path_in(&dir).exists() {
            info!(variant = %variant, "Summary exists, already evaluated");
            return Ok(EvaluationOutcome::AlreadyEvaluated { dir });
        }

        let sampler = FrameSampler::new(self.extractor, num_frames)?;
        let source_info = self.prober.probe(source)?;
        let encoded_info = self.prober.probe(encoded)?;
        let plan = sampler.plan(source_info.frames, encoded_info.frames)?;

        std::fs::create_dir_all(&dir)?;
        info!(variant = %variant, frames = ?plan.indices, "Sampling frames");

        let mut pairs = Vec::with_capacity(plan.indices.len());
        for (ordinal, &index) in (1u32..).zip(plan.indices.iter()) {
            match sampler.extract_pair(source, encoded, ordinal, index, &dir) {
                Ok(pair) => {
                    if self.stack {
                        if let Err(e) = stack::write_two_up(&pair) {
                            warn!(ordinal, error = %e, "Could not write stacked comparison");
                        }
                    }
                    pairs.push(pair);
                }
                Err(e) => warn!(ordinal, index, error = %e, "Skipping sample"),
            }
        }

        let scores = self.score_pairs(&pairs);
        let (duration, fps, compression) =
            self.performance_figures(&variant, Some((source_info.size, encoded_info.size)));

        let summary = EvaluationSummary {
            average: average(&scores),
            duration,
            fps,
            compression,
            alignment: plan.alignment,
            scores,
        };
        summary.write(&dir)?;
        info!(variant = %variant, average = summary.average, "Wrote summary");

        Ok(EvaluationOutcome::Written { dir, summary })
    }

    /// Re-scores the frame pairs already stored in a comparison directory.
    pub fn evaluate_existing(&self, dir: &Path) -> Result<EvaluationOutcome, EvaluationError> {
        if EvaluationSummary::path_in(dir).exists() {
            info!(dir = %dir.display(), "Summary exists, already evaluated");
            return Ok(EvaluationOutcome::AlreadyEvaluated {
                dir: dir.to_path_buf(),
            });
        }

        let pairs = stored_pairs(dir)?;
        let scores = self.score_pairs(&pairs);
        let variant = file_stem(dir);
        let (duration, fps, compression) = self.performance_figures(&variant, None);

        let summary = EvaluationSummary {
            average: average(&scores),
            duration,
            fps,
            compression,
            alignment: Alignment::Matched,
            scores,
        };
        summary.write(dir)?;
        info!(variant = %variant, average = summary.average, "Wrote summary");

        Ok(EvaluationOutcome::Written {
            dir: dir.to_path_buf(),
            summary,
        })
    }

    /// The `.session` snapshot of a variant, if one was written.
    pub fn session_record(&self, variant: &str) -> Option<PerformanceRecord> {
        let path = self
            .config
            .workspace
            .performance_path()
            .join(format!("{}.session", variant));
        if !path.exists() {
            return None;
        }
        match performance::read_snapshot(&path) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(snapshot = %path.display(), error = %e, "Unreadable session snapshot");
                None
            }
        }
    }

    /// Names of comparison directories, sorted.
    pub fn comparison_dirs(&self) -> Result<Vec<String>, EvaluationError> {
        let root = self.config.workspace.comparison_path();
        if !root.exists() {
            return Ok(Vec::new());
        }
        let mut names: Vec<String> = std::fs::read_dir(root)?
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Scores each pair; failed samples are logged and dropped.
    fn score_pairs(&self, pairs: &[FramePair]) -> Vec<(u32, f64)> {
        let mut scores = Vec::with_capacity(pairs.len());
        for pair in pairs {
            match self.metric.score(&pair.source, &pair.encoded) {
                Ok(score) => {
                    info!(ordinal = pair.ordinal, metric = self.metric.name(), score, "Scored sample");
                    scores.push((pair.ordinal, score));
                }
                Err(e) => warn!(ordinal = pair.ordinal, error = %e, "Skipping sample"),
            }
        }
        scores
    }

    /// Duration, fps and compression for a variant, read from its performance log.
    fn performance_figures(&self, variant: &str, sizes: Option<(u64, u64)>) -> (String, String, i64) {
        let log = self
            .config
            .workspace
            .performance_path()
            .join(format!("{}.log", variant));
        let fallback_ratio =
            sizes.map_or(0, |(source, encoded)| performance::compression_ratio(source, encoded));

        match performance::read_log_summary(&log) {
            Ok(summary) => (
                summary.elapsed.clone(),
                summary.fps_display(),
                summary.compression_ratio.unwrap_or(fallback_ratio),
            ),
            Err(e) => {
                warn!(log = %log.display(), error = %e, "No usable performance log");
                ("unknown".to_string(), "unknown".to_string(), fallback_ratio)
            }
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Mean of the scores, 0.0 with a warning when nothing was scored.
fn average(scores: &[(u32, f64)]) -> f64 {
    if scores.is_empty() {
        warn!("No samples could be scored");
        return 0.0;
    }
    scores.iter().map(|(_, s)| s).sum::<f64>() / scores.len() as f64
}

/// Groups `<n>-*.png` files in `dir` into numbered pairs. Stacked
/// `<n>-2up.png` images are not frames and are left out.
fn stored_pairs(dir: &Path) -> Result<Vec<FramePair>, EvaluationError> {
    let mut pngs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e.eq_ignore_ascii_case("png")).unwrap_or(false))
        .filter(|p| !p.to_string_lossy().ends_with("-2up.png"))
        .collect();

    if pngs.len() % 2 != 0 {
        return Err(EvaluationError::UnpairedFrames {
            path: dir.to_path_buf(),
            count: pngs.len(),
        });
    }
    pngs.sort();

    let mut groups: BTreeMap<u32, Vec<PathBuf>> = BTreeMap::new();
    for png in pngs {
        let ordinal = png
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.split('-').next())
            .and_then(|n| n.parse::<u32>().ok());
        match ordinal {
            Some(ordinal) => groups.entry(ordinal).or_default().push(png),
            None => warn!(file = %png.display(), "Ignoring unnumbered frame"),
        }
    }

    groups
        .into_iter()
        .map(|(ordinal, mut files)| {
            if files.len() != 2 {
                return Err(EvaluationError::UnpairedFrames {
                    path: dir.to_path_buf(),
                    count: files.len(),
                });
            }
            let source_at = files
                .iter()
                .position(|f| f.to_string_lossy().ends_with("-source.png"))
                .unwrap_or(0);
            let source = files.remove(source_at);
            let encoded = files.remove(0);
            Ok(FramePair {
                ordinal,
                index: 0,
                source,
                encoded,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::similarity::MockSimilarityMetric;
    use crate::media::frames::MockFrameExtractor;
    use crate::media::probe::{MockMediaProber, SourceDescriptor};

    struct Workspace {
        dir: tempfile::TempDir,
        config: AppConfig,
    }

    fn workspace() -> Workspace {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["source", "hevc", "performance", "comparison"] {
            std::fs::create_dir(dir.path().join(sub)).unwrap();
        }
        let mut config = AppConfig::default();
        config.workspace.root = dir.path().to_path_buf();
        Workspace { dir, config }
    }

    fn prober(source_frames: u64, encoded_frames: u64) -> MockMediaProber {
        let mut prober = MockMediaProber::new();
        prober.expect_probe().returning(move |path| {
            let is_source = path.to_string_lossy().contains("/source/");
            Ok(SourceDescriptor {
                path: path.to_path_buf(),
                stem: file_stem(path),
                width: 1920,
                height: 1080,
                duration: 100.0,
                size: if is_source { 1000 } else { 400 },
                bitrate: 1,
                frames: if is_source { source_frames } else { encoded_frames },
                codec: "h264".to_string(),
            })
        });
        prober
    }

    fn touching_extractor() -> MockFrameExtractor {
        let mut extractor = MockFrameExtractor::new();
        extractor.expect_extract().returning(|_, _, destination| {
            std::fs::write(destination, b"png")?;
            Ok(())
        });
        extractor
    }

    #[test]
    fn failed_samples_are_skipped_and_average_uses_the_rest() {
        let ws = workspace();
        let source = ws.dir.path().join("source/movie.mp4");
        let encoded = ws.dir.path().join("hevc/movie_RF21_Medium.mp4");
        std::fs::write(
            ws.dir.path().join("performance/movie_RF21_Medium.log"),
            "0:10:00.000000\n30.00 fps\n60% reduction (1mb to 0mb)\n",
        )
        .unwrap();

        let prober = prober(100, 98);
        let extractor = touching_extractor();
        let mut metric = MockSimilarityMetric::new();
        metric.expect_name().return_const("SSIM");
        metric.expect_score().returning(|source, _| {
            if source.ends_with("2-source.png") {
                Err(EvaluationError::DimensionMismatch {
                    left_width: 1,
                    left_height: 1,
                    right_width: 2,
                    right_height: 2,
                })
            } else {
                Ok(0.9)
            }
        });

        let evaluator = QualityEvaluator::new(&ws.config, &prober, &extractor, &metric);
        let outcome = evaluator.evaluate_variant(&source, &encoded, 3).unwrap();

        let EvaluationOutcome::Written { dir, summary } = outcome else {
            panic!("expected a new summary");
        };
        assert_eq!(dir, ws.dir.path().join("comparison/movie_RF21_Medium"));
        assert_eq!(summary.scores, vec![(1, 0.9), (3, 0.9)]);
        assert!((summary.average - 0.9).abs() < 1e-12);
        assert_eq!(summary.duration, "0:10:00.000000");
        assert_eq!(summary.fps, "30.00");
        assert_eq!(summary.compression, 60);
        assert_eq!(
            summary.alignment,
            Alignment::Mismatch {
                source_frames: 100,
                encoded_frames: 98
            }
        );
        assert!(dir.join("1-source.png").exists());
        assert!(dir.join("summary.txt").exists());
    }

    #[test]
    fn existing_summary_makes_evaluation_a_no_op() {
        let ws = workspace();
        let dir = ws.dir.path().join("comparison/movie_RF21_Medium");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("summary.txt"), "done").unwrap();

        let prober = MockMediaProber::new();
        let extractor = MockFrameExtractor::new();
        let metric = MockSimilarityMetric::new();
        let evaluator = QualityEvaluator::new(&ws.config, &prober, &extractor, &metric);

        let outcome = evaluator
            .evaluate_variant(
                &ws.dir.path().join("source/movie.mp4"),
                &ws.dir.path().join("hevc/movie_RF21_Medium.mp4"),
                5,
            )
            .unwrap();
        assert_eq!(outcome, EvaluationOutcome::AlreadyEvaluated { dir });
    }

    #[test]
    fn missing_log_falls_back_to_sizes() {
        let ws = workspace();
        let prober = prober(60, 60);
        let extractor = touching_extractor();
        let mut metric = MockSimilarityMetric::new();
        metric.expect_name().return_const("SSIM");
        metric.expect_score().returning(|_, _| Ok(1.0));

        let evaluator = QualityEvaluator::new(&ws.config, &prober, &extractor, &metric);
        let outcome = evaluator
            .evaluate_variant(
                &ws.dir.path().join("source/movie.mp4"),
                &ws.dir.path().join("hevc/movie_RF18_Slow_Baseline.mp4"),
                1,
            )
            .unwrap();

        let EvaluationOutcome::Written { summary, .. } = outcome else {
            panic!("expected a new summary");
        };
        assert_eq!(summary.compression, 60);
        assert_eq!(summary.duration, "unknown");
        assert_eq!(summary.alignment, Alignment::Matched);
    }

    #[test]
    fn rescoring_stored_frames_pairs_by_number() {
        let ws = workspace();
        let dir = ws.dir.path().join("comparison/movie_RF21_Medium");
        std::fs::create_dir(&dir).unwrap();
        for name in ["1-source.png", "1-encoded.png", "2-source.png", "2-encoded.png"] {
            std::fs::write(dir.join(name), b"png").unwrap();
        }

        let prober = MockMediaProber::new();
        let extractor = MockFrameExtractor::new();
        let mut metric = MockSimilarityMetric::new();
        metric.expect_name().return_const("SSIM");
        metric
            .expect_score()
            .withf(|source, encoded| {
                source.to_string_lossy().ends_with("-source.png")
                    && encoded.to_string_lossy().ends_with("-encoded.png")
            })
            .times(2)
            .returning(|_, _| Ok(0.8));

        let evaluator = QualityEvaluator::new(&ws.config, &prober, &extractor, &metric);
        let EvaluationOutcome::Written { summary, .. } = evaluator.evaluate_existing(&dir).unwrap() else {
            panic!("expected a new summary");
        };
        assert_eq!(summary.scores, vec![(1, 0.8), (2, 0.8)]);
    }

    #[test]
    fn odd_frame_count_is_rejected() {
        let ws = workspace();
        let dir = ws.dir.path().join("comparison/movie_RF21_Medium");
        std::fs::create_dir(&dir).unwrap();
        for name in ["1-source.png", "1-encoded.png", "2-source.png"] {
            std::fs::write(dir.join(name), b"png").unwrap();
        }

        let prober = MockMediaProber::new();
        let extractor = MockFrameExtractor::new();
        let metric = MockSimilarityMetric::new();
        let evaluator = QualityEvaluator::new(&ws.config, &prober, &extractor, &metric);

        assert!(matches!(
            evaluator.evaluate_existing(&dir),
            Err(EvaluationError::UnpairedFrames { count: 3, .. })
        ));
    }

    #[test]
    fn variants_are_matched_by_stem_prefix() {
        let ws = workspace();
        for name in ["movie_RF21_Medium.mp4", "movie_RF18_Slow_Baseline.mp4", "movie2_RF21_Medium.mp4"] {
            std::fs::write(ws.dir.path().join("hevc").join(name), b"x").unwrap();
        }
        let prober = MockMediaProber::new();
        let extractor = MockFrameExtractor::new();
        let metric = MockSimilarityMetric::new();
        let evaluator = QualityEvaluator::new(&ws.config, &prober, &extractor, &metric);

        let variants = evaluator
            .variants_for(&ws.dir.path().join("source/movie.mp4"))
            .unwrap();
        let names: Vec<_> = variants
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["movie_RF18_Slow_Baseline.mp4", "movie_RF21_Medium.mp4"]);
    }

    #[test]
    fn stacked_comparisons_are_written_when_requested() {
        let ws = workspace();
        let prober = prober(100, 100);
        let mut extractor = MockFrameExtractor::new();
        extractor.expect_extract().returning(|media, _, destination| {
            let shade = if media.to_string_lossy().contains("/source/") { 200 } else { 50 };
            image::RgbImage::from_pixel(4, 2, image::Rgb([shade; 3]))
                .save(destination)
                .map_err(|e| EvaluationError::ImageWriteFailed {
                    path: destination.to_path_buf(),
                    message: e.to_string(),
                })
        });
        let mut metric = MockSimilarityMetric::new();
        metric.expect_name().return_const("SSIM");
        metric.expect_score().returning(|_, _| Ok(0.95));

        let evaluator = QualityEvaluator::new(&ws.config, &prober, &extractor, &metric).with_stack(true);
        let EvaluationOutcome::Written { dir, summary } = evaluator
            .evaluate_variant(
                &ws.dir.path().join("source/movie.mp4"),
                &ws.dir.path().join("hevc/movie_RF21_Medium.mp4"),
                2,
            )
            .unwrap()
        else {
            panic!("expected a new summary");
        };

        assert_eq!(summary.scores.len(), 2);
        let stacked = image::open(dir.join("2-2up.png")).unwrap().to_rgb8();
        assert_eq!(stacked.dimensions(), (4, 4));
        assert_eq!(stacked.get_pixel(0, 0).0, [200; 3]);
        assert_eq!(stacked.get_pixel(0, 3).0, [50; 3]);
    }

    #[test]
    fn stacking_is_off_by_default() {
        let ws = workspace();
        let prober = prober(100, 100);
        let extractor = touching_extractor();
        let mut metric = MockSimilarityMetric::new();
        metric.expect_name().return_const("SSIM");
        metric.expect_score().returning(|_, _| Ok(0.9));

        let evaluator = QualityEvaluator::new(&ws.config, &prober, &extractor, &metric);
        let EvaluationOutcome::Written { dir, .. } = evaluator
            .evaluate_variant(
                &ws.dir.path().join("source/movie.mp4"),
                &ws.dir.path().join("hevc/movie_RF21_Medium.mp4"),
                1,
            )
            .unwrap()
        else {
            panic!("expected a new summary");
        };
        assert!(!dir.join("1-2up.png").exists());
    }

    #[test]
    fn rescoring_ignores_stacked_images() {
        let ws = workspace();
        let dir = ws.dir.path().join("comparison/movie_RF21_Medium");
        std::fs::create_dir(&dir).unwrap();
        for name in ["1-source.png", "1-encoded.png", "1-2up.png", "2-source.png", "2-encoded.png"] {
            std::fs::write(dir.join(name), b"png").unwrap();
        }

        let prober = MockMediaProber::new();
        let extractor = MockFrameExtractor::new();
        let mut metric = MockSimilarityMetric::new();
        metric.expect_name().return_const("SSIM");
        metric
            .expect_score()
            .withf(|_, encoded| encoded.to_string_lossy().ends_with("-encoded.png"))
            .times(2)
            .returning(|_, _| Ok(0.7));

        let evaluator = QualityEvaluator::new(&ws.config, &prober, &extractor, &metric);
        let EvaluationOutcome::Written { summary, .. } = evaluator.evaluate_existing(&dir).unwrap() else {
            panic!("expected a new summary");
        };
        assert_eq!(summary.scores, vec![(1, 0.7), (2, 0.7)]);
    }

    #[test]
    fn session_record_is_optional() {
        let ws = workspace();
        let prober = MockMediaProber::new();
        let extractor = MockFrameExtractor::new();
        let metric = MockSimilarityMetric::new();
        let evaluator = QualityEvaluator::new(&ws.config, &prober, &extractor, &metric);

        assert!(evaluator.session_record("movie_RF21_Medium").is_none());

        std::fs::write(ws.dir.path().join("performance/movie_RF21_Medium.session"), "{").unwrap();
        assert!(evaluator.session_record("movie_RF21_Medium").is_none());
    }
}
