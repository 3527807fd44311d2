//! Single-image interactive front-end
//!
//! Asks for an image and its settings on stdin, runs the same pipeline as
//! the batch tool and writes the result to the output directory. A bad
//! answer or a failing image is reported and the session moves on.

use super::config::CliConfigBuilder;
use super::main_impl::{normalize_args, report_parse_error, CliOutputFormat, CliRemover};
use crate::{
    config::{BackgroundSpec, Dimensions, OutputFormat, PipelineConfig, Preset},
    error::ImagerError,
    pipeline::{Pipeline, DEFAULT_REMOVAL_TIMEOUT},
    removal::{BackgroundRemover, DEFAULT_KEY_TOLERANCE},
    tracing_config::{init_cli_tracing, spans},
};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Process single images interactively
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "imager-interactive")]
pub struct InteractiveCli {
    /// Directory to write results to (created if missing)
    #[arg(short = 'o', long, value_name = "DIR", default_value = "./output")]
    pub output_dir: PathBuf,

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

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Settings that stay fixed for a whole session
pub struct SessionSettings {
    pub output_dir: PathBuf,
    pub output_format: OutputFormat,
    pub removal_timeout: Duration,
    pub remover: Arc<dyn BackgroundRemover>,
}

impl SessionSettings {
    #[must_use]
    pub fn new(output_dir: PathBuf, remover: Arc<dyn BackgroundRemover>) -> Self {
        Self {
            output_dir,
            output_format: OutputFormat::default(),
            removal_timeout: DEFAULT_REMOVAL_TIMEOUT,
            remover,
        }
    }
}

/// One prompt/answer loop over any reader and writer
pub struct InteractiveSession<R, W> {
    input: R,
    output: W,
    settings: SessionSettings,
}

/// One answered round of prompts
enum Submission {
    Quit,
    Config(PathBuf, PipelineConfig),
}

impl<R: BufRead, W: Write> InteractiveSession<R, W> {
    pub fn new(input: R, output: W, settings: SessionSettings) -> Self {
        Self {
            input,
            output,
            settings,
        }
    }

    /// Consume the session and hand back the writer
    pub fn into_output(self) -> W {
        self.output
    }

    /// Run until an empty path or end of input
    ///
    /// Returns the number of images written.
    pub async fn run(&mut self) -> Result<usize> {
        writeln!(self.output, "imager: process one image at a time. Leave the path empty to quit.")?;
        let mut saved = 0;

        loop {
            let submission = match self.read_submission() {
                Ok(submission) => submission,
                Err(e) => {
                    writeln!(self.output, "Error: {}", e)?;
                    continue;
                },
            };
            let (path, config) = match submission {
                Submission::Quit => break,
                Submission::Config(path, config) => (path, config),
            };

            writeln!(self.output, "{}", describe_settings(&config))?;

            match self.process(&path, config).await {
                Ok((output_path, (width, height))) => {
                    saved += 1;
                    writeln!(
                        self.output,
                        "Saved {} ({}x{})",
                        output_path.display(),
                        width,
                        height
                    )?;
                },
                Err(e) => writeln!(self.output, "Error: {}", e)?,
            }
        }

        writeln!(self.output, "Bye. {} image(s) written.", saved)?;
        Ok(saved)
    }

    fn read_submission(&mut self) -> Result<Submission> {
        let Some(path) = self.prompt("Image path")? else {
            return Ok(Submission::Quit);
        };
        let path = PathBuf::from(unquote(&path));

        let presets: Vec<&str> = Preset::ALL.iter().map(|p| p.name()).collect();
        let preset = self.prompt(&format!("Preset ({}, empty for none)", presets.join(", ")))?;
        if let Some(preset) = preset {
            let preset: Preset = preset.parse()?;
            return Ok(Submission::Config(path, preset.to_config()));
        }

        let crop = self.ask_yes_no("Crop")?;
        let background_removal = self.ask_yes_no("Remove background")?;
        let resize = self
            .prompt("Resize WxH (empty for none)")?
            .map(|value| value.parse::<Dimensions>())
            .transpose()?;
        let padding = if resize.is_some() {
            self.prompt("Padding in pixels (empty for none)")?
                .map(|value| {
                    value
                        .parse::<u32>()
                        .map_err(|_| ImagerError::config_value_error("padding", &value, "non-negative integer"))
                })
                .transpose()?
        } else {
            None
        };
        let background = self
            .prompt("Background color or image path (empty for none)")?
            .map(|value| value.parse::<BackgroundSpec>())
            .transpose()?;

        let config = PipelineConfig::builder()
            .crop(crop)
            .background_removal(background_removal)
            .resize_opt(resize)
            .padding_opt(padding)
            .background_opt(background)
            .build()?;
        Ok(Submission::Config(path, config))
    }

    async fn process(&self, path: &Path, config: PipelineConfig) -> Result<(PathBuf, (u32, u32))> {
        let pipeline = Pipeline::builder(config)
            .output_format(self.settings.output_format)
            .removal_timeout(self.settings.removal_timeout)
            .remover(Arc::clone(&self.settings.remover))
            .build()?;

        std::fs::create_dir_all(&self.settings.output_dir).with_context(|| {
            format!("Failed to create {}", self.settings.output_dir.display())
        })?;

        let result = pipeline.process_file(path).await?;
        let output_path = pipeline.save_result(&result, &self.settings.output_dir)?;
        Ok((output_path, result.dimensions()))
    }

    /// Print a prompt and read one trimmed line; `None` for empty or EOF
    fn prompt(&mut self, label: &str) -> Result<Option<String>> {
        write!(self.output, "{}: ", label)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let line = line.trim();
        Ok((!line.is_empty()).then(|| line.to_string()))
    }

    fn ask_yes_no(&mut self, label: &str) -> Result<bool> {
        let answer = self.prompt(&format!("{} [y/N]", label))?;
        match answer.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("n" | "no" | "false" | "0") => Ok(false),
            Some("y" | "yes" | "true" | "1") => Ok(true),
            Some(other) => anyhow::bail!("expected y or n, got '{}'", other),
        }
    }
}

/// Strip the quotes terminals add around dragged-in paths
fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = value.strip_prefix(quote).and_then(|v| v.strip_suffix(quote)) {
            return inner;
        }
    }
    value
}

/// Human-readable list of the settings about to be applied
#[must_use]
pub fn describe_settings(config: &PipelineConfig) -> String {
    let resize = config
        .resize
        .map_or_else(|| "No resize".to_string(), |target| target.to_string());
    let padding = config.padding.map_or_else(|| "none".to_string(), |p| format!("{}px", p));
    let background = config
        .background
        .as_ref()
        .map_or_else(|| "none".to_string(), ToString::to_string);

    format!(
        "Settings:\n  - Crop: {}\n  - Remove Background: {}\n  - Resize: {}\n  - Padding: {}\n  - Background: {}",
        config.crop, config.background_removal, resize, padding, background
    )
}

/// Entry point of the `imager-interactive` binary
pub async fn main() -> Result<i32> {
    let cli = match InteractiveCli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(e) => return Ok(report_parse_error(&e)),
    };
    let session_id = init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    let remover = CliConfigBuilder::build_remover(cli.remover, cli.model.as_deref(), cli.key_tolerance)?;
    let remover_name = remover.name().to_string();

    let settings = SessionSettings {
        output_dir: cli.output_dir.clone(),
        output_format: CliConfigBuilder::output_format(cli.format),
        removal_timeout: CliConfigBuilder::removal_timeout(cli.removal_timeout)?,
        remover,
    };

    // stdout stays unlocked: log events from blocking workers also write to it
    let mut session = InteractiveSession::new(std::io::stdin().lock(), std::io::stdout(), settings);
    session
        .run()
        .instrument(spans::session(&session_id, &remover_name))
        .await?;

    Ok(0)
}
