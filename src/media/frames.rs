//! Evenly spaced frame sampling from a source and its encode.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::EvaluationError;

/// Whether source and encode report the same frame count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alignment {
    Matched,
    Mismatch { source_frames: u64, encoded_frames: u64 },
}

impl Alignment {
    pub fn from_counts(source_frames: u64, encoded_frames: u64) -> Self {
        if source_frames == encoded_frames {
            Self::Matched
        } else {
            Self::Mismatch {
                source_frames,
                encoded_frames,
            }
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched)
    }
}

/// Frame indices to sample: `stride * k` for `k = 1..=samples`, with
/// `stride = total_frames / (samples + 1)`.
pub fn sample_indices(total_frames: u64, samples: u32) -> Result<Vec<u64>, EvaluationError> {
    if samples == 0 {
        return Err(EvaluationError::NoSamples);
    }
    let stride = total_frames / (u64::from(samples) + 1);
    Ok((1..=u64::from(samples)).map(|k| stride * k).collect())
}

/// Decodes a single frame of a media file to a lossless image.
#[cfg_attr(test, mockall::automock)]
pub trait FrameExtractor: Send + Sync {
    /// Writes frame `index` of `media` to `destination`.
    fn extract(&self, media: &Path, index: u64, destination: &Path) -> Result<(), EvaluationError>;
}

/// [`FrameExtractor`] backed by the `ffmpeg` executable.
#[derive(Debug, Clone)]
pub struct FfmpegFrameExtractor {
    program: PathBuf,
}

impl FfmpegFrameExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl FrameExtractor for FfmpegFrameExtractor {
    fn extract(&self, media: &Path, index: u64, destination: &Path) -> Result<(), EvaluationError> {
        let failed = |message: String| EvaluationError::FrameExtractionFailed {
            path: media.to_path_buf(),
            index,
            message,
        };

        let output = Command::new(&self.program)
            .args(["-v", "error", "-y", "-i"])
            .arg(media)
            .arg("-vf")
            .arg(format!("select=eq(n\\,{})", index))
            .args(["-vsync", "0", "-frames:v", "1"])
            .arg(destination)
            .output()
            .map_err(|e| failed(e.to_string()))?;

        if !output.status.success() {
            return Err(failed(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        if !destination.exists() {
            return Err(failed("no frame written".to_string()));
        }

        debug!(media = %media.display(), index, "Extracted frame");
        Ok(())
    }
}

/// Locations of one sampled frame pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePair {
    /// 1-based sample number.
    pub ordinal: u32,
    /// Frame index in both files.
    pub index: u64,
    pub source: PathBuf,
    pub encoded: PathBuf,
}

impl FramePair {
    /// Paths of the `<ordinal>-source.png` / `<ordinal>-encoded.png` pair in `dir`.
    pub fn in_dir(dir: &Path, ordinal: u32, index: u64) -> Self {
        Self {
            ordinal,
            index,
            source: dir.join(format!("{}-source.png", ordinal)),
            encoded: dir.join(format!("{}-encoded.png", ordinal)),
        }
    }

    /// `<ordinal>-2up.png` beside the pair: source stacked above encode.
    pub fn two_up(&self) -> PathBuf {
        self.source.with_file_name(format!("{}-2up.png", self.ordinal))
    }
}

/// Plan for sampling one source/encode pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePlan {
    pub indices: Vec<u64>,
    pub alignment: Alignment,
}

/// Pulls corresponding frames out of a source and an encode.
pub struct FrameSampler<'a> {
    extractor: &'a dyn FrameExtractor,
    samples: u32,
}

impl<'a> FrameSampler<'a> {
    pub fn new(extractor: &'a dyn FrameExtractor, samples: u32) -> Result<Self, EvaluationError> {
        if samples == 0 {
            return Err(EvaluationError::NoSamples);
        }
        Ok(Self { extractor, samples })
    }

    /// Chooses indices from the source frame count.
    ///
    /// A frame-count mismatch is logged and recorded, but sampling still
    /// proceeds by index.
    pub fn plan(&self, source_frames: u64, encoded_frames: u64) -> Result<SamplePlan, EvaluationError> {
        let alignment = Alignment::from_counts(source_frames, encoded_frames);
        if !alignment.is_matched() {
            warn!(
                source_frames,
                encoded_frames,
                "Frame counts do not match, samples may be time-shifted"
            );
        }

        Ok(SamplePlan {
            indices: sample_indices(source_frames, self.samples)?,
            alignment,
        })
    }

    /// Extracts frame `index` from both files into `dir`.
    pub fn extract_pair(
        &self,
        source: &Path,
        encoded: &Path,
        ordinal: u32,
        index: u64,
        dir: &Path,
    ) -> Result<FramePair, EvaluationError> {
        let pair = FramePair::in_dir(dir, ordinal, index);
        self.extractor.extract(source, index, &pair.source)?;
        self.extractor.extract(encoded, index, &pair.encoded)?;
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::{eq, function};

    #[test]
    fn evenly_spaced_indices() {
        assert_eq!(sample_indices(100, 5).unwrap(), vec![16, 32, 48, 64, 80]);
        assert_eq!(sample_indices(2880, 1).unwrap(), vec![1440]);
    }

    #[test]
    fn zero_samples_is_rejected() {
        assert!(matches!(sample_indices(100, 0), Err(EvaluationError::NoSamples)));
        let extractor = MockFrameExtractor::new();
        assert!(FrameSampler::new(&extractor, 0).is_err());
    }

    #[test]
    fn mismatch_is_recorded_but_sampling_continues() {
        let extractor = MockFrameExtractor::new();
        let sampler = FrameSampler::new(&extractor, 3).unwrap();

        let plan = sampler.plan(100, 98).unwrap();
        assert_eq!(plan.indices, vec![25, 50, 75]);
        assert_eq!(
            plan.alignment,
            Alignment::Mismatch {
                source_frames: 100,
                encoded_frames: 98
            }
        );
        assert!(sampler.plan(100, 100).unwrap().alignment.is_matched());
    }

    #[test]
    fn extracts_same_index_from_both_files() {
        let mut extractor = MockFrameExtractor::new();
        extractor
            .expect_extract()
            .with(
                function(|p: &Path| p == Path::new("src.mp4")),
                eq(32u64),
                function(|p: &Path| p == Path::new("out/2-source.png")),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));
        extractor
            .expect_extract()
            .with(
                function(|p: &Path| p == Path::new("enc.mp4")),
                eq(32u64),
                function(|p: &Path| p == Path::new("out/2-encoded.png")),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));

        let sampler = FrameSampler::new(&extractor, 5).unwrap();
        let pair = sampler
            .extract_pair(Path::new("src.mp4"), Path::new("enc.mp4"), 2, 32, Path::new("out"))
            .unwrap();

        assert_eq!(pair.source, PathBuf::from("out/2-source.png"));
        assert_eq!(pair.encoded, PathBuf::from("out/2-encoded.png"));
    }
}
