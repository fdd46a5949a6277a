//! Command-line interface definitions.

use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::encoder::policy::EncodeOverrides;

/// Batch HEVC transcoding through HandBrakeCLI with SSIM comparison.
#[derive(Parser, Debug)]
#[command(name = "transcode-eval", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(
        short,
        long,
        default_value = "transcode-eval.yaml",
        env = "TRANSCODE_EVAL_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Increase logging verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Returns the log level based on verbosity flags.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transcode one source file or every pending file in the source directory.
    Transcode(TranscodeArgs),

    /// Sample frames from each encoded variant and score them against the source.
    Compare(CompareArgs),

    /// Score frames already stored in a comparison directory.
    Evaluate(EvaluateArgs),

    /// Print the comparison table of every variant against its Baseline.
    Report(ReportArgs),

    /// Rebuild a session snapshot from an existing performance log.
    Repair(RepairArgs),

    /// Display the effective configuration.
    #[command(name = "config-show")]
    ConfigShow,
}

/// Encoder overrides shared by `transcode` and `repair`.
#[derive(Args, Debug, Clone, Default)]
#[command(group(ArgGroup::new("preset_name").args(["baseline", "best"])))]
pub struct OverrideArgs {
    /// Constant quality (RF) value, -12 to 51.
    #[arg(short, long, allow_hyphen_values = true)]
    pub quality: Option<i32>,

    /// x265 speed preset (e.g. medium, slow).
    #[arg(short, long)]
    pub preset: Option<String>,

    /// Use the Baseline HandBrake preset.
    #[arg(long)]
    pub baseline: bool,

    /// Use the Best HandBrake preset.
    #[arg(long)]
    pub best: bool,

    /// Append transform-unit depth options for smaller output.
    #[arg(long)]
    pub small: bool,
}

impl From<&OverrideArgs> for EncodeOverrides {
    fn from(args: &OverrideArgs) -> Self {
        Self {
            quality: args.quality,
            speed_preset: args.preset.clone(),
            baseline: args.baseline,
            best: args.best,
            small: args.small,
        }
    }
}

/// Arguments for the transcode subcommand.
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["file", "all"])))]
pub struct TranscodeArgs {
    /// Source file to transcode.
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Transcode every source file without an existing output.
    #[arg(long)]
    pub all: bool,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Delete each output after its performance log is written.
    #[arg(long)]
    pub delete: bool,

    /// Skip the confirmation prompt when combining --all with overrides.
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the compare subcommand.
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["source", "all"])))]
pub struct CompareArgs {
    /// Source file name (in the source directory) to compare.
    #[arg(short, long)]
    pub source: Option<String>,

    /// Compare every source file.
    #[arg(long)]
    pub all: bool,

    /// Frames to sample per variant (defaults to the configured value).
    #[arg(short, long)]
    pub num_frames: Option<u32>,

    /// Also write a `<n>-2up.png` per sample with the source above the encode.
    #[arg(long)]
    pub stack: bool,
}

/// Arguments for the evaluate subcommand.
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Comparison directory name; prompts with a menu when omitted.
    #[arg(short, long)]
    pub dir: Option<String>,
}

/// Arguments for the report subcommand.
#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Movie file stem; every source is reported when omitted.
    #[arg(short, long)]
    pub movie: Option<String>,
}

/// Arguments for the repair subcommand.
#[derive(Args, Debug)]
pub struct RepairArgs {
    /// Source file whose session should be rebuilt.
    #[arg(short, long)]
    pub file: PathBuf,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}
