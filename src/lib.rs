#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # imager
//!
//! Batch image processing for product and catalog photos: background
//! removal, autocrop, aspect-preserving resize, padding to a fixed canvas
//! and compositing onto a background color or image.
//!
//! ## Features
//!
//! - **Fixed stage order**: load → background removal → crop → resize →
//!   padding → composite → save, each stage optional
//! - **Pluggable removers**: an ONNX segmentation model through Tract, or a
//!   model-free color key for flat backdrops
//! - **Batch driver**: sorted discovery, continue-on-failure, JSON report,
//!   atomic output writes
//! - **Presets**: six ready-made thumbnail settings (`s-light` … `l-dark`)
//! - **CLI Integration**: `imager` and `imager-interactive` binaries (enable
//!   with the `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imager::{Dimensions, Pipeline, PipelineConfig, removal::ColorKeyRemover};
//! use std::sync::Arc;
//!
//! # async fn example() -> imager::Result<()> {
//! let config = PipelineConfig::builder()
//!     .background_removal(true)
//!     .crop(true)
//!     .resize(Dimensions::new(480, 480)?)
//!     .padding(96)
//!     .background("whitesmoke".parse()?)
//!     .build()?;
//!
//! let pipeline = Pipeline::builder(config)
//!     .remover(Arc::new(ColorKeyRemover::default()))
//!     .build()?;
//!
//! let result = pipeline.process_file("input/shoe.jpg").await?;
//! let written = pipeline.save_result(&result, "output")?;
//! println!("wrote {}", written.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Batch processing
//!
//! ```rust,no_run
//! use imager::{BatchOptions, BatchProcessor, Pipeline, Preset};
//! use std::sync::Arc;
//!
//! # async fn example(remover: Arc<dyn imager::BackgroundRemover>) -> imager::Result<()> {
//! let pipeline = Pipeline::builder(Preset::MLight.to_config())
//!     .remover(remover)
//!     .build()?;
//! let report = BatchProcessor::new(&pipeline, BatchOptions::default()).run().await?;
//! std::process::exit(report.exit_code());
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): pure Rust ONNX backend for model-based removal
//! - `cli` (default): command-line binaries and progress reporting
//! - `tracing-json`: JSON log output for the binaries

pub mod backends;
pub mod batch;
#[cfg(feature = "cli")]
pub mod cli;
pub mod color;
pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod pipeline;
pub mod removal;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod transform;
pub mod types;
pub mod utils;

// Public API exports
pub use backends::*;
pub use batch::{BatchOptions, BatchProcessor, BatchReport, FailedFile, ProcessedFile};
pub use color::Color;
pub use config::{
    BackgroundSpec, Dimensions, Guidance, OutputFormat, PipelineConfig, PipelineConfigBuilder, Preset,
};
pub use error::{ImagerError, Result};
pub use inference::InferenceBackend;
pub use models::{ModelSpec, PreprocessingConfig};
pub use pipeline::{output_file_name, output_suffix, Pipeline, PipelineBuilder, ProcessingResult};
pub use removal::{BackgroundRemover, ColorKeyRemover, ModelRemover};
pub use services::{
    BatchProcessingStats, ConsoleProgressReporter, ImageIOService, NoOpProgressReporter,
    OutputFormatHandler, ProcessingStage, ProgressReporter,
};
pub use transform::{autocrop, composite_on_background, pad_to_canvas, resize_to_fit, Background};
pub use types::{SegmentationMask, StageTimings};
pub use utils::{ImagePreprocessor, PreprocessingOptions};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, spans, TracingConfig, TracingFormat};

/// Process a single image held in memory with `config`
///
/// Convenience for callers that do not need timings or file naming.
///
/// # Errors
/// The first failing stage, see [`Pipeline::process_image`].
///
/// # Examples
/// ```rust
/// use imager::{process_image, Dimensions, PipelineConfig};
/// use image::DynamicImage;
///
/// # async fn example() -> imager::Result<()> {
/// let config = PipelineConfig::builder().resize(Dimensions::new(800, 600)?).build()?;
/// let resized = process_image(DynamicImage::new_rgb8(1000, 500), config, None).await?;
/// assert_eq!((resized.width(), resized.height()), (800, 400));
/// # Ok(())
/// # }
/// ```
pub async fn process_image(
    image: image::DynamicImage,
    config: PipelineConfig,
    remover: Option<std::sync::Arc<dyn BackgroundRemover>>,
) -> Result<image::DynamicImage> {
    let mut builder = Pipeline::builder(config);
    if let Some(remover) = remover {
        builder = builder.remover(remover);
    }
    builder.build()?.process_image(image).await
}

/// Decode `image_bytes` and process them with `config`
///
/// # Errors
/// `UnsupportedImage` when the bytes are not a decodable image, otherwise
/// the first failing stage.
pub async fn process_bytes(
    image_bytes: &[u8],
    config: PipelineConfig,
    remover: Option<std::sync::Arc<dyn BackgroundRemover>>,
) -> Result<image::DynamicImage> {
    let image = ImageIOService::load_from_bytes(image_bytes)
        .map_err(|e| e.at_stage(ProcessingStage::Load))?;
    process_image(image, config, remover).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    #[tokio::test]
    async fn test_process_image_resize() {
        let config = PipelineConfig::builder()
            .resize(Dimensions::new(800, 600).unwrap())
            .build()
            .unwrap();
        let result = process_image(DynamicImage::new_rgb8(1000, 500), config, None)
            .await
            .unwrap();
        assert_eq!((result.width(), result.height()), (800, 400));
    }

    #[tokio::test]
    async fn test_process_bytes_rejects_garbage() {
        let err = process_bytes(b"not an image", PipelineConfig::default(), None)
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(&ProcessingStage::Load));
        assert!(matches!(err.root(), ImagerError::UnsupportedImage(_)));
    }

    #[tokio::test]
    async fn test_removal_requires_remover() {
        let config = PipelineConfig::builder().background_removal(true).build().unwrap();
        let err = process_image(DynamicImage::new_rgb8(4, 4), config, None).await.unwrap_err();
        assert!(matches!(err, ImagerError::InvalidConfig(_)));
    }
}
