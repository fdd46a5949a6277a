//! transcode-eval - batch HEVC transcoding through HandBrakeCLI with SSIM
//! comparison of the resulting encoder-configuration variants.
//!
//! The library exposes each stage separately: [`encoder`] drives transcode
//! sessions, [`media`] probes files and samples frames, [`evaluation`] scores
//! variants and [`report`] compares them against the Baseline.

pub mod cli;
pub mod config;
pub mod encoder;
pub mod error;
pub mod evaluation;
pub mod media;
pub mod prompt;
pub mod report;
pub mod validation;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::cli::{Cli, Commands, CompareArgs, EvaluateArgs, ReportArgs, RepairArgs, TranscodeArgs};
use crate::config::AppConfig;
use crate::encoder::batch::is_source_file;
use crate::encoder::{interrupt, EncodeOverrides, SessionBatch, TranscodeSession};
use crate::error::{BatchError, ReportError};
use crate::evaluation::{EvaluationOutcome, QualityEvaluator, Ssim};
use crate::media::frames::FfmpegFrameExtractor;
use crate::media::probe::FfprobeProber;
use crate::report::ComparisonReport;

/// Runs the command selected on the command line.
pub async fn run(cli: Cli) -> Result<()> {
    setup_logging(cli.log_level(), cli.json_logs)?;

    match cli.command {
        Commands::Transcode(args) => transcode(args, &cli.config).await,
        Commands::Compare(args) => compare(args, &cli.config),
        Commands::Evaluate(args) => evaluate(args, &cli.config),
        Commands::Report(args) => report(args, &cli.config),
        Commands::Repair(args) => repair(args, &cli.config),
        Commands::ConfigShow => show_config(&cli.config),
    }
}

/// Initializes the tracing subscriber. Logs go to stderr so stdout stays
/// reserved for reports.
fn setup_logging(level: &str, json: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let result = if json {
        builder.json().with_file(true).with_line_number(true).try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

/// Transcodes one file or every pending file.
async fn transcode(args: TranscodeArgs, config_path: &Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    let overrides = EncodeOverrides::from(&args.overrides);
    let prober = FfprobeProber::new(&config.tools.ffprobe);

    if args.all && (overrides.quality.is_some() || overrides.speed_preset.is_some()) && !args.yes {
        warn!("Combining --all with --quality or --preset applies one setting to every resolution");
        let stdin = std::io::stdin();
        let confirmed = prompt::ask_yes_no(&mut stdin.lock(), &mut std::io::stdout(), "Proceed?")
            .context("Failed to read confirmation")?;
        if !confirmed {
            info!("Exiting");
            return Ok(());
        }
    }

    let batch = SessionBatch::new(&config, overrides, &prober)?.with_delete_output(args.delete);

    let sources = match &args.file {
        Some(file) => {
            if !file.is_file() {
                anyhow::bail!("Source file not found: '{}'", file.display());
            }
            vec![file.clone()]
        }
        None => match batch.build_source_list() {
            Ok(sources) => sources,
            Err(BatchError::NoWorkRemaining { source_dir }) => {
                info!(source_dir = %source_dir.display(), "Nothing to transcode");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        },
    };

    let cancel = interrupt::install_ctrl_c();
    let summary = batch.run(&sources, &cancel).await?;

    println!(
        "Transcoded {} file(s) in {} ({} encoding, {} failed)",
        summary.completed.len(),
        encoder::performance::format_elapsed(summary.elapsed),
        encoder::performance::format_elapsed(Duration::from_secs_f64(summary.encode_seconds())),
        summary.failed.len()
    );
    for record in &summary.completed {
        println!(
            "  {}\t{}\t{:.2} fps\t{}%",
            record.paths.output.display(),
            record.elapsed,
            record.fps,
            record.compression_ratio
        );
    }
    for (source, reason) in &summary.failed {
        println!("  FAILED {}: {}", source.display(), reason);
    }

    if !summary.failed.is_empty() {
        anyhow::bail!("{} transcode(s) failed", summary.failed.len());
    }
    Ok(())
}

/// Samples and scores every variant of the selected sources.
fn compare(args: CompareArgs, config_path: &Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    let prober = FfprobeProber::new(&config.tools.ffprobe);
    let extractor = FfmpegFrameExtractor::new(&config.tools.ffmpeg);
    let evaluator = QualityEvaluator::new(&config, &prober, &extractor, &Ssim).with_stack(args.stack);
    let num_frames = args.num_frames.unwrap_or(config.evaluation.num_frames);

    let sources = match &args.source {
        Some(name) => {
            let path = config.workspace.source_path().join(name);
            if !path.is_file() {
                anyhow::bail!("Invalid filename: '{}'", path.display());
            }
            vec![path]
        }
        None => source_files(&config)?,
    };

    info!(frames = num_frames, sources = sources.len(), "Comparing variants");

    let mut written = 0;
    for source in &sources {
        for outcome in evaluator.evaluate_source(source, num_frames)? {
            if let EvaluationOutcome::Written { dir, summary } = outcome {
                println!("{}\t{:.4}", dir.display(), summary.average);
                written += 1;
            }
        }
    }

    println!("Wrote {} summary file(s)", written);
    Ok(())
}

/// Scores frames already stored in one comparison directory.
fn evaluate(args: EvaluateArgs, config_path: &Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    let prober = FfprobeProber::new(&config.tools.ffprobe);
    let extractor = FfmpegFrameExtractor::new(&config.tools.ffmpeg);
    let evaluator = QualityEvaluator::new(&config, &prober, &extractor, &Ssim);
    let choices = evaluator.comparison_dirs()?;

    let name = match args.dir {
        Some(dir) if choices.contains(&dir) => dir,
        Some(dir) => anyhow::bail!("Invalid directory: '{}'", dir),
        None => {
            if choices.is_empty() {
                println!("No transcode directories to evaluate.");
                return Ok(());
            }
            println!("Choose a transcode to evaluate:");
            let stdin = std::io::stdin();
            match prompt::choose_from_menu(&mut stdin.lock(), &mut std::io::stdout(), &choices)? {
                Some(index) => choices[index].clone(),
                None => return Ok(()),
            }
        }
    };

    let dir = config.workspace.comparison_path().join(&name);
    match evaluator.evaluate_existing(&dir)? {
        EvaluationOutcome::Written { summary, .. } => {
            if let Some(record) = evaluator.session_record(&name) {
                print!("{}", record.settings_header());
            }
            print!("{}", summary.render());
        }
        EvaluationOutcome::AlreadyEvaluated { .. } => {
            println!("summary.txt exists, {} has already been evaluated.", name)
        }
    }
    Ok(())
}

/// Prints comparison tables.
fn report(args: ReportArgs, config_path: &Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    let comparison_dir = config.workspace.comparison_path();

    match args.movie {
        Some(movie) => {
            let report = ComparisonReport::aggregate(&comparison_dir, &movie)?;
            println!("{}", report.render());
        }
        None => {
            for source in source_files(&config)? {
                let Some(movie) = source.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                    continue;
                };
                match ComparisonReport::aggregate(&comparison_dir, &movie) {
                    Ok(report) => println!("{}", report.render()),
                    Err(ReportError::MissingBaseline { movie }) => {
                        warn!(movie = %movie, "No Baseline summary, skipping");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }
    Ok(())
}

/// Rewrites a session snapshot from its performance log.
fn repair(args: RepairArgs, config_path: &Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    let prober = FfprobeProber::new(&config.tools.ffprobe);
    let overrides = EncodeOverrides::from(&args.overrides);

    let session = TranscodeSession::create(&args.file, &config, &overrides, &prober)?;
    let record = session.repair()?;

    println!("Wrote {}", record.paths.snapshot.display());
    Ok(())
}

/// Displays the effective configuration.
fn show_config(config_path: &Path) -> Result<()> {
    let config = config::loader::load_from_path(config_path)?;
    let yaml = serde_yaml::to_string(&config)?;
    println!("{}", yaml);
    Ok(())
}

/// Source files, sorted by name.
fn source_files(config: &AppConfig) -> Result<Vec<PathBuf>> {
    let dir = config.workspace.source_path();
    let mut files = Vec::new();

    for entry in WalkDir::new(&dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("Failed to list '{}'", dir.display()))?;
        if entry.file_type().is_file() && is_source_file(entry.path()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}
