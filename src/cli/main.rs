//! Batch image processing CLI
//!
//! Runs one pipeline over every image in an input directory and writes the
//! results to an output directory.

use super::config::CliConfigBuilder;
use crate::{
    batch::{BatchProcessor, BatchReport, EXIT_FATAL, EXIT_SUCCESS},
    config::{BackgroundSpec, Dimensions, Guidance, Preset},
    pipeline::{output_suffix, Pipeline},
    removal::DEFAULT_KEY_TOLERANCE,
    services::{BatchProcessingStats, ConsoleProgressReporter, ProcessingStage, ProgressReporter},
    tracing_config::{init_cli_tracing, spans},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

/// Batch image processor: background removal, autocrop, resize, padding, background fill
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "imager")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Directory to read images from
    #[arg(short = 'i', long, value_name = "DIR", default_value = "./input")]
    pub input_dir: PathBuf,

    /// Directory to write results to (created if missing)
    #[arg(short = 'o', long, value_name = "DIR", default_value = "./output")]
    pub output_dir: PathBuf,

    /// Remove image backgrounds
    #[arg(short = 'b', long = "background_removal", visible_alias = "background-removal")]
    pub background_removal: bool,

    /// Trim transparent margins
    #[arg(short = 'c', long)]
    pub crop: bool,

    /// Fit inside WIDTHxHEIGHT, keeping the aspect ratio
    #[arg(short = 'r', long, value_name = "WxH")]
    pub resize: Option<Dimensions>,

    /// Transparent border in pixels (needs --resize)
    #[arg(short = 'p', long, value_name = "PIXELS")]
    pub padding: Option<u32>,

    /// Background color name, hex code or image path (also -bg)
    #[arg(long, value_name = "VALUE")]
    pub background: Option<BackgroundSpec>,

    /// Generate a complementary fill instead of naming a background
    #[arg(long, value_enum, conflicts_with = "background")]
    pub guidance: Option<Guidance>,

    /// Catalog preset; explicit flags override its values
    #[arg(long, value_enum)]
    pub preset: Option<Preset>,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value_t = CliOutputFormat::Png)]
    pub format: CliOutputFormat,

    /// Background remover [default: tract with --model, color-key otherwise]
    #[arg(long, value_enum)]
    pub remover: Option<CliRemover>,

    /// Segmentation model (.onnx) for the tract remover
    #[arg(short = 'm', long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Per-channel tolerance of the color-key remover
    #[arg(long, default_value_t = DEFAULT_KEY_TOLERANCE)]
    pub key_tolerance: u8,

    /// Seconds a single background removal may take
    #[arg(long, value_name = "SECS", default_value_t = 120)]
    pub removal_timeout: u64,

    /// Descend into subdirectories of the input directory
    #[arg(short = 'R', long)]
    pub recursive: bool,

    /// Only process file names matching this glob (e.g. "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Move each processed input into <input-dir>/processed/
    #[arg(long)]
    pub move_processed: bool,

    /// Write a JSON report of the batch
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Jpeg,
    Webp,
    Tiff,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliRemover {
    /// ONNX segmentation model run by tract
    Tract,
    /// Key out the backdrop color sampled from the corners
    ColorKey,
}

/// Rewrite `-bg VALUE` and `-bg=VALUE` to `--background`
///
/// Short flags are single characters, so clap would read `-bg` as `-b -g`.
/// Arguments after `--` are left alone.
pub(crate) fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut seen_terminator = false;
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            if seen_terminator {
                return arg;
            }
            if arg == "--" {
                seen_terminator = true;
                return arg;
            }
            if arg == "-bg" {
                return OsString::from("--background");
            }
            match arg.to_str().and_then(|s| s.strip_prefix("-bg=")) {
                Some(value) => OsString::from(format!("--background={}", value)),
                None => arg,
            }
        })
        .collect()
}

/// Parse arguments, run the batch and return the process exit code
pub async fn main() -> Result<i32> {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(e) => return Ok(report_parse_error(&e)),
    };

    let session_id = init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::pipeline_config(&cli)?;
    let output_format = CliConfigBuilder::output_format(cli.format);
    let timeout = CliConfigBuilder::removal_timeout(cli.removal_timeout)?;

    let remover = if config.background_removal {
        Some(CliConfigBuilder::build_remover(
            cli.remover,
            cli.model.as_deref(),
            cli.key_tolerance,
        )?)
    } else {
        if cli.remover.is_some() || cli.model.is_some() {
            warn!("Background removal is off; --remover/--model have no effect");
        }
        None
    };
    let remover_name = remover.as_ref().map_or("none", |r| r.name()).to_string();

    let mut builder = Pipeline::builder(config)
        .output_format(output_format)
        .removal_timeout(timeout)
        .reporter(Arc::new(ConsoleProgressReporter::new(cli.verbose > 0)));
    if let Some(remover) = remover {
        builder = builder.remover(remover);
    }
    let pipeline = builder.build().context("Failed to set up the pipeline")?;

    run(&cli, &pipeline)
        .instrument(spans::session(&session_id, &remover_name))
        .await
}

/// Print a clap error or help text and pick the exit code
///
/// Usage errors exit 1 so that 2 keeps meaning "some files failed".
pub(crate) fn report_parse_error(error: &clap::Error) -> i32 {
    let _ = error.print();
    if error.use_stderr() {
        EXIT_FATAL
    } else {
        EXIT_SUCCESS
    }
}

async fn run(cli: &Cli, pipeline: &Pipeline) -> Result<i32> {
    let options = CliConfigBuilder::batch_options(cli);
    let processor = BatchProcessor::new(pipeline, options.clone());
    let files = processor
        .discover()
        .with_context(|| format!("Failed to scan {}", options.input_dir.display()))?;

    info!("Starting imager");
    info!("Input: {}", options.input_dir.display());
    info!("Output: {}", options.output_dir.display());
    info!(
        "Stages: {} (suffix '{}', format {})",
        describe_stages(pipeline),
        output_suffix(pipeline.config()),
        pipeline.output_format()
    );

    let progress_bar = if files.len() > 1 {
        Some(create_progress_bar(files.len())?)
    } else {
        None
    };
    let processor = match &progress_bar {
        Some(pb) => processor.with_reporter(Arc::new(IndicatifProgressReporter::new(pb.clone()))),
        None => processor,
    };

    let report = processor
        .run_files(&files)
        .instrument(spans::batch_processing(&options.input_dir, files.len()))
        .await
        .context("Batch processing failed")?;

    if let Some(pb) = progress_bar {
        pb.finish_with_message(format!(
            "Completed! Processed: {}, Failed: {}",
            report.processed.len(),
            report.failed.len()
        ));
    }

    print_failures(&report);

    if let Some(path) = &cli.report {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    Ok(report.exit_code())
}

fn describe_stages(pipeline: &Pipeline) -> String {
    let config = pipeline.config();
    if config.is_passthrough() {
        return "none (copy)".to_string();
    }
    let mut stages = Vec::new();
    if config.background_removal {
        stages.push(ProcessingStage::BackgroundRemoval.name().to_string());
    }
    if config.crop {
        stages.push(ProcessingStage::Crop.name().to_string());
    }
    if let Some(target) = config.resize {
        stages.push(format!("resize {}", target));
    }
    if let Some(padding) = config.padding {
        stages.push(format!("padding {}px", padding));
    }
    if let Some(background) = &config.background {
        stages.push(format!("background {}", background));
    }
    stages.join(", ")
}

fn print_failures(report: &BatchReport) {
    for failure in &report.failed {
        match failure.stage {
            Some(stage) => warn!("  ✗ {} ({}): {}", failure.input.display(), stage, failure.error),
            None => warn!("  ✗ {}: {}", failure.input.display(), failure.error),
        }
    }
}

fn create_progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Progress reporter that drives an indicatif bar
struct IndicatifProgressReporter {
    bar: ProgressBar,
}

impl IndicatifProgressReporter {
    fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn report_stage(&self, item: &str, stage: ProcessingStage) {
        self.bar.set_message(format!("{} ({})", item, stage));
    }

    fn report_item_completed(&self, _item: &str, _elapsed_ms: u64) {
        self.bar.inc(1);
    }

    fn report_error(&self, item: &str, stage: Option<ProcessingStage>, error: &str) {
        self.bar.suspend(|| match stage {
            Some(stage) => tracing::error!(item = %item, stage = %stage, "❌ {}: {}", item, error),
            None => tracing::error!(item = %item, "❌ {}: {}", item, error),
        });
        self.bar.inc(1);
    }

    fn report_batch_progress(&self, stats: &BatchProcessingStats) {
        self.bar.set_message(progress_message(stats));
    }
}

fn progress_message(stats: &BatchProcessingStats) -> String {
    format!(
        "{} - {} left - ETA {}",
        stats.current_item_name,
        stats.remaining(),
        ConsoleProgressReporter::format_eta(stats.eta_seconds)
    )
}
