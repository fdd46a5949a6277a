//! Configuration data structures.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure containing all settings.
///
/// Every section falls back to its defaults, so an empty or missing file is a
/// valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Working directory layout.
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// External tool locations.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Encoder defaults not covered by the resolution table.
    #[serde(default)]
    pub encoding: EncodingConfig,

    /// Comparison settings.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

/// Directory layout of a transcode workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceConfig {
    /// Root of the workspace; the other directories are relative to it.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Directory holding source media.
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    /// Directory receiving encoded outputs.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory receiving performance logs and session snapshots.
    #[serde(default = "default_performance_dir")]
    pub performance_dir: PathBuf,

    /// Directory receiving sampled frames and evaluation summaries.
    #[serde(default = "default_comparison_dir")]
    pub comparison_dir: PathBuf,
}

impl WorkspaceConfig {
    /// Absolute-or-root-relative source directory.
    pub fn source_path(&self) -> PathBuf {
        self.root.join(&self.source_dir)
    }

    /// Absolute-or-root-relative output directory.
    pub fn output_path(&self) -> PathBuf {
        self.root.join(&self.output_dir)
    }

    /// Absolute-or-root-relative performance directory.
    pub fn performance_path(&self) -> PathBuf {
        self.root.join(&self.performance_dir)
    }

    /// Absolute-or-root-relative comparison directory.
    pub fn comparison_path(&self) -> PathBuf {
        self.root.join(&self.comparison_dir)
    }
}

/// External executables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    /// Encoder executable.
    #[serde(default = "default_encoder")]
    pub encoder: PathBuf,

    /// HandBrake preset file passed with `--preset-import-file`.
    #[serde(default = "default_preset_import_file")]
    pub preset_import_file: PathBuf,

    /// Media prober executable.
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,

    /// Frame decoder executable.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
}

/// Encoder defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodingConfig {
    /// Speed preset used when none is given on the command line.
    #[serde(default = "default_speed_preset")]
    pub default_speed_preset: String,

    /// Option tokens appended when `--small` is requested.
    #[serde(default = "default_small_options")]
    pub small_options: String,

    /// Container extension of encoded outputs.
    #[serde(default = "default_output_extension")]
    pub output_extension: String,

    /// Whether to write a `.session` snapshot next to each performance log.
    #[serde(default = "default_true")]
    pub write_session_snapshot: bool,
}

/// Comparison settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationConfig {
    /// Number of frames sampled per variant.
    #[serde(default = "default_num_frames")]
    pub num_frames: u32,
}

// Default value functions

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("source")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("hevc")
}

fn default_performance_dir() -> PathBuf {
    PathBuf::from("performance")
}

fn default_comparison_dir() -> PathBuf {
    PathBuf::from("comparison")
}

fn default_encoder() -> PathBuf {
    PathBuf::from("HandBrakeCLI")
}

fn default_preset_import_file() -> PathBuf {
    PathBuf::from("presets.json")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_speed_preset() -> String {
    "medium".to_string()
}

fn default_small_options() -> String {
    "tu-intra-depth=3:tu-inter-depth=3".to_string()
}

fn default_output_extension() -> String {
    "mp4".to_string()
}

fn default_true() -> bool {
    true
}

fn default_num_frames() -> u32 {
    5
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            source_dir: default_source_dir(),
            output_dir: default_output_dir(),
            performance_dir: default_performance_dir(),
            comparison_dir: default_comparison_dir(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            encoder: default_encoder(),
            preset_import_file: default_preset_import_file(),
            ffprobe: default_ffprobe(),
            ffmpeg: default_ffmpeg(),
        }
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            default_speed_preset: default_speed_preset(),
            small_options: default_small_options(),
            output_extension: default_output_extension(),
            write_session_snapshot: true,
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            num_frames: default_num_frames(),
        }
    }
}
