//! Error types for transcoding, evaluation and reporting.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading and parsing errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {message}")]
    ParseFailed { path: PathBuf, message: String },

    #[error("Config validation failed with {error_count} error(s)")]
    ValidationFailed { error_count: usize },
}

/// Invalid or contradictory encoding parameters.
///
/// Always reported before any encoder process is started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParameterError {
    #[error("Quality {quality} is outside the allowed range [{min}, {max}]")]
    QualityOutOfRange { quality: i32, min: i32, max: i32 },

    #[error("Unknown encoder preset '{preset}' (did you mean '{suggestion}'?)")]
    UnknownPreset { preset: String, suggestion: String },

    #[error("--baseline and --best cannot be combined")]
    ConflictingPresetNames,

    #[error("Encoding parameter '{field}' was not resolved")]
    Unresolved { field: &'static str },
}

/// Media probing errors.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to run '{command}' on '{path}': {message}")]
    CommandFailed {
        command: String,
        path: PathBuf,
        message: String,
    },

    #[error("Failed to parse ffprobe output for '{path}': {message}")]
    ParseFailed { path: PathBuf, message: String },

    #[error("No video stream found in '{path}'")]
    NoVideoStream { path: PathBuf },

    #[error("Video stream in '{path}' is missing '{field}'")]
    MissingField { path: PathBuf, field: &'static str },
}

/// External encoder process errors.
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Process spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Encoder exited with code {code}")]
    EncodeFailed { code: i32 },

    #[error("Failed to wait for encoder: {0}")]
    WaitFailed(String),
}

/// Errors raised while driving a single transcode session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid configuration for '{path}': {source}")]
    InvalidConfiguration {
        path: PathBuf,
        source: ParameterError,
    },

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error("Transcode of '{path}' was interrupted")]
    Interrupted { path: PathBuf },

    #[error("Cannot {operation} a session in state {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Failed to parse performance log '{path}': {message}")]
    LogParseFailed { path: PathBuf, message: String },

    #[error("Failed to serialize session record: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Batch-level errors.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("No source files left to transcode in '{source_dir}'")]
    NoWorkRemaining { source_dir: PathBuf },

    #[error("Batch interrupted after {completed} completed transcode(s)")]
    Interrupted { completed: usize },

    #[error(transparent)]
    InvalidConfiguration(#[from] ParameterError),

    #[error("Failed to list source directory '{path}': {message}")]
    ListFailed { path: PathBuf, message: String },
}

/// Frame sampling and similarity scoring errors.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("At least one sample frame is required")]
    NoSamples,

    #[error("Failed to extract frame {index} from '{path}': {message}")]
    FrameExtractionFailed {
        path: PathBuf,
        index: u64,
        message: String,
    },

    #[error("Frame dimensions differ: {left_width}x{left_height} vs {right_width}x{right_height}")]
    DimensionMismatch {
        left_width: u32,
        left_height: u32,
        right_width: u32,
        right_height: u32,
    },

    #[error("Failed to load frame '{path}': {message}")]
    ImageLoadFailed { path: PathBuf, message: String },

    #[error("Failed to write image '{path}': {message}")]
    ImageWriteFailed { path: PathBuf, message: String },

    #[error("Odd number of frames ({count}) found in '{path}'")]
    UnpairedFrames { path: PathBuf, count: usize },

    #[error("Failed to parse summary '{path}': {message}")]
    SummaryParseFailed { path: PathBuf, message: String },

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Comparison report errors.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("No Baseline summary found for '{movie}'")]
    MissingBaseline { movie: String },

    #[error("Variant directory '{name}' does not belong to '{movie}'")]
    ForeignVariant { movie: String, name: String },

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
