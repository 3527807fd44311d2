//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliOutputFormat, CliRemover};
use crate::{
    batch::BatchOptions,
    config::{Guidance, OutputFormat, PipelineConfig},
    removal::{BackgroundRemover, ColorKeyRemover},
};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Convert CLI arguments to library configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the pipeline configuration
    ///
    /// A preset is the starting point; explicit flags override it.
    pub(crate) fn pipeline_config(cli: &Cli) -> Result<PipelineConfig> {
        let base = cli.preset.map(|preset| preset.to_config()).unwrap_or_default();

        let config = PipelineConfig::builder()
            .background_removal(base.background_removal || cli.background_removal)
            .crop(base.crop || cli.crop)
            .resize_opt(cli.resize.or(base.resize))
            .padding_opt(cli.padding.or(base.padding))
            .background_opt(
                cli.background
                    .clone()
                    .or_else(|| cli.guidance.map(Guidance::to_background))
                    .or(base.background),
            )
            .build()
            .context("Invalid processing options")?;

        Ok(config)
    }

    pub(crate) fn output_format(format: CliOutputFormat) -> OutputFormat {
        match format {
            CliOutputFormat::Png => OutputFormat::Png,
            CliOutputFormat::Jpeg => OutputFormat::Jpeg,
            CliOutputFormat::Webp => OutputFormat::WebP,
            CliOutputFormat::Tiff => OutputFormat::Tiff,
        }
    }

    pub(crate) fn batch_options(cli: &Cli) -> BatchOptions {
        BatchOptions {
            input_dir: cli.input_dir.clone(),
            output_dir: cli.output_dir.clone(),
            recursive: cli.recursive,
            pattern: cli.pattern.clone(),
            move_processed: cli.move_processed,
        }
    }

    pub(crate) fn removal_timeout(seconds: u64) -> Result<Duration> {
        if seconds == 0 {
            anyhow::bail!("--removal-timeout must be at least 1 second");
        }
        Ok(Duration::from_secs(seconds))
    }

    /// Resolve which remover to use
    ///
    /// Without `--remover`, a model path selects the model remover and its
    /// absence selects the color key.
    pub(crate) fn resolve_remover(remover: Option<CliRemover>, model: Option<&Path>) -> CliRemover {
        remover.unwrap_or(if model.is_some() {
            CliRemover::Tract
        } else {
            CliRemover::ColorKey
        })
    }

    /// Construct the background remover
    pub(crate) fn build_remover(
        remover: Option<CliRemover>,
        model: Option<&Path>,
        key_tolerance: u8,
    ) -> Result<Arc<dyn BackgroundRemover>> {
        match Self::resolve_remover(remover, model) {
            CliRemover::ColorKey => {
                if model.is_some() {
                    tracing::warn!("--model is ignored by the color-key remover");
                }
                Ok(Arc::new(ColorKeyRemover::new(key_tolerance)))
            },
            CliRemover::Tract => Self::build_model_remover(model),
        }
    }

    #[cfg(feature = "tract")]
    fn build_model_remover(model: Option<&Path>) -> Result<Arc<dyn BackgroundRemover>> {
        use crate::{backends::TractBackend, models::ModelSpec, removal::ModelRemover};

        let model = model.context("--remover tract requires --model <PATH.onnx>")?;
        let _span = crate::tracing_config::spans::model_loading(model).entered();

        let spec = ModelSpec::from_path(model).context("Failed to resolve model")?;
        tracing::info!(
            "Loading model {} ({}x{} input)",
            spec.name(),
            spec.preprocessing.target_size[1],
            spec.preprocessing.target_size[0]
        );
        let backend = TractBackend::load(spec).context("Failed to load model")?;
        Ok(Arc::new(ModelRemover::new(backend)))
    }

    #[cfg(not(feature = "tract"))]
    fn build_model_remover(_model: Option<&Path>) -> Result<Arc<dyn BackgroundRemover>> {
        anyhow::bail!("this build has no model backend; rebuild with --features tract or use --remover color-key")
    }
}
