//! Per-image pipeline orchestration
//!
//! Stages always run in the same order and are skipped when their option
//! is off:
//!
//! load → background removal → crop → resize → padding → composite → save
//!
//! Compositing runs last so a padded border is filled with the background
//! too. The first failing stage aborts the image and is named in the error.

use crate::{
    config::{OutputFormat, PipelineConfig},
    error::{ImagerError, Result},
    removal::BackgroundRemover,
    services::{
        ImageIOService, NoOpProgressReporter, OutputFormatHandler, ProcessingStage,
        ProgressReporter,
    },
    transform::{self, Background},
    types::StageTimings,
};
use image::DynamicImage;
use instant::Instant;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Upper bound for a single background removal call
pub const DEFAULT_REMOVAL_TIMEOUT: Duration = Duration::from_secs(120);

/// Label used for images that did not come from a file
const IN_MEMORY_ITEM: &str = "<image>";

/// Output of one pipeline run
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// Final image
    pub image: DynamicImage,
    /// Source file, if the image was loaded from disk
    pub input_path: Option<PathBuf>,
    /// `<stem><suffix>.<ext>` for the configured format
    pub output_name: String,
    /// Time per stage that ran
    pub timings: StageTimings,
}

impl ProcessingResult {
    /// Stages that ran, in order
    #[must_use]
    pub fn stages(&self) -> Vec<ProcessingStage> {
        self.timings.stages_run()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

/// Immutable pipeline shared by every image of a batch
pub struct Pipeline {
    config: PipelineConfig,
    remover: Option<Arc<dyn BackgroundRemover>>,
    background: Option<Background>,
    removal_timeout: Duration,
    output_format: OutputFormat,
    reporter: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("remover", &self.remover.as_ref().map(|r| r.name().to_string()))
            .field("removal_timeout", &self.removal_timeout)
            .field("output_format", &self.output_format)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Pipeline`]
pub struct PipelineBuilder {
    config: PipelineConfig,
    remover: Option<Arc<dyn BackgroundRemover>>,
    removal_timeout: Duration,
    output_format: OutputFormat,
    reporter: Arc<dyn ProgressReporter>,
}

impl PipelineBuilder {
    /// Background remover used when background removal is enabled
    #[must_use]
    pub fn remover(mut self, remover: Arc<dyn BackgroundRemover>) -> Self {
        self.remover = Some(remover);
        self
    }

    #[must_use]
    pub fn removal_timeout(mut self, timeout: Duration) -> Self {
        self.removal_timeout = timeout;
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Receives a callback before every stage
    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Validate everything that can fail before the first image
    ///
    /// # Errors
    /// - `InvalidConfig` / `InvalidDimension` from config validation
    /// - `InvalidConfig` when background removal is on without a remover
    /// - `InvalidColorOrPath` when the background cannot be resolved
    pub fn build(self) -> Result<Pipeline> {
        self.config.validate()?;

        if self.config.background_removal && self.remover.is_none() {
            return Err(ImagerError::invalid_config(
                "background removal is enabled but no remover was configured",
            ));
        }
        if self.removal_timeout.is_zero() {
            return Err(ImagerError::invalid_config("removal timeout must be positive"));
        }

        let background = self
            .config
            .background
            .as_ref()
            .map(ImageIOService::load_background)
            .transpose()?;

        if self.config.background.is_none()
            && !OutputFormatHandler::supports_transparency(self.output_format)
            && (self.config.background_removal || self.config.padding.is_some())
        {
            tracing::warn!(
                "{} output has no alpha channel; transparent areas will lose their transparency",
                self.output_format
            );
        }

        debug!(config = ?self.config, "Pipeline ready");

        Ok(Pipeline {
            config: self.config,
            remover: self.remover,
            background,
            removal_timeout: self.removal_timeout,
            output_format: self.output_format,
            reporter: self.reporter,
        })
    }
}

impl Pipeline {
    /// Start building a pipeline for `config`
    ///
    /// # Examples
    /// ```rust,no_run
    /// use imager::{config::PipelineConfig, pipeline::Pipeline, removal::ColorKeyRemover};
    /// use std::sync::Arc;
    ///
    /// # async fn example() -> imager::Result<()> {
    /// let config = PipelineConfig::builder().background_removal(true).crop(true).build()?;
    /// let pipeline = Pipeline::builder(config)
    ///     .remover(Arc::new(ColorKeyRemover::default()))
    ///     .build()?;
    /// let result = pipeline.process_file("input/shoe.jpg").await?;
    /// pipeline.save_result(&result, "output")?;
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder {
            config,
            remover: None,
            removal_timeout: DEFAULT_REMOVAL_TIMEOUT,
            output_format: OutputFormat::default(),
            reporter: Arc::new(NoOpProgressReporter),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    /// Run every enabled stage on an in-memory image
    ///
    /// # Errors
    /// `ImagerError::Stage` naming the first stage that failed.
    pub async fn process_image(&self, image: DynamicImage) -> Result<DynamicImage> {
        let mut timings = StageTimings::new();
        self.run_stages(IN_MEMORY_ITEM, image, &mut timings).await
    }

    /// Load a file and run every enabled stage on it
    ///
    /// # Errors
    /// `ImagerError::Stage` naming the first stage that failed, starting
    /// with `load` for unreadable or undecodable files.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn process_file<P: AsRef<Path>>(&self, path: P) -> Result<ProcessingResult> {
        let path = path.as_ref();
        let item = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let total_start = Instant::now();
        let mut timings = StageTimings::new();

        let image = self.timed(&item, ProcessingStage::Load, &mut timings, || {
            ImageIOService::load_image(path)
        })?;
        debug!(
            width = image.width(),
            height = image.height(),
            color = ?image.color(),
            "Decoded input"
        );

        let image = self.run_stages(&item, image, &mut timings).await?;
        timings.total_ms = elapsed_ms(total_start);

        debug!(timings = %timings.breakdown(), "Pipeline finished");

        Ok(ProcessingResult {
            image,
            input_path: Some(path.to_path_buf()),
            output_name: output_file_name(path, &self.config, self.output_format),
            timings,
        })
    }

    /// Write a result into `output_dir` under its derived name
    ///
    /// The write is atomic: either the complete file appears or nothing.
    ///
    /// # Errors
    /// `ImagerError::Stage` with stage `save`.
    pub fn save_result<P: AsRef<Path>>(&self, result: &ProcessingResult, output_dir: P) -> Result<PathBuf> {
        let output_path = output_dir.as_ref().join(&result.output_name);
        self.reporter.report_stage(&result.output_name, ProcessingStage::Save);
        ImageIOService::save_image(&result.image, &output_path, self.output_format)
            .map_err(|e| e.at_stage(ProcessingStage::Save))?;
        Ok(output_path)
    }

    async fn run_stages(
        &self,
        item: &str,
        image: DynamicImage,
        timings: &mut StageTimings,
    ) -> Result<DynamicImage> {
        let mut image = image;

        if self.config.background_removal {
            self.reporter.report_stage(item, ProcessingStage::BackgroundRemoval);
            let start = Instant::now();
            image = self
                .remove_background(image)
                .await
                .map_err(|e| e.at_stage(ProcessingStage::BackgroundRemoval))?;
            timings.record(ProcessingStage::BackgroundRemoval, elapsed_ms(start));
        }

        if self.config.crop {
            image = self.timed(item, ProcessingStage::Crop, timings, || transform::autocrop(&image))?;
        }

        if let (Some(target), Some((content_width, content_height))) =
            (self.config.resize, self.config.content_box())
        {
            image = self.timed(item, ProcessingStage::Resize, timings, || {
                transform::resize_to_fit(&image, content_width, content_height)
            })?;

            if self.config.padding.is_some() {
                image = self.timed(item, ProcessingStage::Padding, timings, || {
                    transform::pad_to_canvas(&image, target.width, target.height)
                })?;
            }
        }

        if let Some(background) = &self.background {
            image = self.timed(item, ProcessingStage::Composite, timings, || {
                Ok(transform::composite_on_background(&image, background))
            })?;
        }

        Ok(image)
    }

    /// Run a synchronous stage, recording its time and tagging its errors
    fn timed<T>(
        &self,
        item: &str,
        stage: ProcessingStage,
        timings: &mut StageTimings,
        operation: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        self.reporter.report_stage(item, stage);
        let start = Instant::now();
        let value = operation().map_err(|e| e.at_stage(stage))?;
        timings.record(stage, elapsed_ms(start));
        Ok(value)
    }

    /// Call the remover on a blocking worker, bounded by the timeout
    ///
    /// A call that times out keeps running on its worker thread until the
    /// remover returns; its result is discarded.
    async fn remove_background(&self, image: DynamicImage) -> Result<DynamicImage> {
        let remover = self
            .remover
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| ImagerError::invalid_config("no background remover configured"))?;
        let (width, height) = (image.width(), image.height());
        let name = remover.name().to_string();

        let task = tokio::task::spawn_blocking(move || remover.remove_background(&image));

        let removed = match tokio::time::timeout(self.removal_timeout, task).await {
            Err(_) => {
                return Err(ImagerError::background_removal(format!(
                    "{} remover timed out after {}s",
                    name,
                    self.removal_timeout.as_secs_f32()
                )))
            },
            Ok(Err(join_error)) => {
                return Err(ImagerError::background_removal(format!(
                    "{} remover worker failed: {}",
                    name, join_error
                )))
            },
            Ok(Ok(result)) => result?,
        };

        if (removed.width(), removed.height()) != (width, height) {
            return Err(ImagerError::background_removal(format!(
                "{} remover returned {}x{} for a {}x{} image",
                name,
                removed.width(),
                removed.height(),
                width,
                height
            )));
        }

        Ok(if removed.color().has_alpha() {
            removed
        } else {
            DynamicImage::ImageRgba8(removed.to_rgba8())
        })
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Suffix describing which stages changed the image
///
/// `_b` background removed, `_c` cropped, `_{W}x{H}` resized,
/// `_bg` composited onto a background.
#[must_use]
pub fn output_suffix(config: &PipelineConfig) -> String {
    let mut suffix = String::new();
    if config.background_removal {
        suffix.push_str("_b");
    }
    if config.crop {
        suffix.push_str("_c");
    }
    if let Some(target) = config.resize {
        suffix.push_str(&format!("_{}", target));
    }
    if config.background.is_some() {
        suffix.push_str("_bg");
    }
    suffix
}

/// `<stem><suffix>.<ext>` for `input`
///
/// # Examples
/// ```rust
/// use imager::config::{OutputFormat, PipelineConfig};
/// use imager::pipeline::output_file_name;
/// use std::path::Path;
///
/// let config = PipelineConfig::builder().crop(true).build()?;
/// assert_eq!(output_file_name(Path::new("in/shoe.jpg"), &config, OutputFormat::Png), "shoe_c.png");
/// # Ok::<(), imager::ImagerError>(())
/// ```
#[must_use]
pub fn output_file_name(input: &Path, config: &PipelineConfig, format: OutputFormat) -> String {
    let stem = input
        .file_stem()
        .map_or_else(|| "image".to_string(), |s| s.to_string_lossy().into_owned());
    format!(
        "{}{}.{}",
        stem,
        output_suffix(config),
        OutputFormatHandler::get_extension(format)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::RecordingRemover;
    use crate::color::Color;
    use crate::config::{BackgroundSpec, Dimensions};
    use image::{Rgba, RgbaImage};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Reporter that remembers the stage sequence
    #[derive(Default)]
    struct StageLog(Mutex<Vec<ProcessingStage>>);

    impl ProgressReporter for StageLog {
        fn report_stage(&self, _item: &str, stage: ProcessingStage) {
            self.0.lock().unwrap().push(stage);
        }
        fn report_item_completed(&self, _item: &str, _elapsed_ms: u64) {}
        fn report_error(&self, _item: &str, _stage: Option<ProcessingStage>, _error: &str) {}
    }

    fn opaque(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([50, 60, 70, 255])))
    }

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions::new(width, height).unwrap()
    }

    #[tokio::test]
    async fn test_resize_only() {
        let config = PipelineConfig::builder().resize(dims(800, 600)).build().unwrap();
        let pipeline = Pipeline::builder(config).build().unwrap();

        let result = pipeline.process_image(opaque(1000, 500)).await.unwrap();
        assert_eq!((result.width(), result.height()), (800, 400));
    }

    #[tokio::test]
    async fn test_resize_with_zero_padding_fills_target() {
        let config = PipelineConfig::builder()
            .resize(dims(800, 600))
            .padding(0)
            .build()
            .unwrap();
        let pipeline = Pipeline::builder(config).build().unwrap();

        let result = pipeline.process_image(opaque(1000, 500)).await.unwrap().to_rgba8();
        assert_eq!(result.dimensions(), (800, 600));
        assert_eq!(result.get_pixel(400, 50)[3], 0);
        assert_eq!(result.get_pixel(400, 300)[3], 255);
        assert_eq!(result.get_pixel(400, 550)[3], 0);
    }

    #[tokio::test]
    async fn test_padding_shrinks_content_box() {
        let config = PipelineConfig::builder()
            .resize(dims(200, 200))
            .padding(20)
            .build()
            .unwrap();
        let pipeline = Pipeline::builder(config).build().unwrap();

        let result = pipeline.process_image(opaque(100, 100)).await.unwrap().to_rgba8();
        assert_eq!(result.dimensions(), (200, 200));
        assert_eq!(result.get_pixel(19, 100)[3], 0);
        assert_eq!(result.get_pixel(20, 100)[3], 255);
        assert_eq!(result.get_pixel(179, 100)[3], 255);
        assert_eq!(result.get_pixel(180, 100)[3], 0);
    }

    #[tokio::test]
    async fn test_padding_gets_background_fill() {
        let config = PipelineConfig::builder()
            .resize(dims(100, 100))
            .padding(10)
            .background(BackgroundSpec::Color(Color::rgb(255, 0, 0)))
            .build()
            .unwrap();
        let pipeline = Pipeline::builder(config).build().unwrap();

        let result = pipeline.process_image(opaque(50, 50)).await.unwrap();
        assert!(!result.color().has_alpha());
        let rgb = result.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(rgb.get_pixel(50, 50).0, [50, 60, 70]);
    }

    #[tokio::test]
    async fn test_stage_order() {
        let log = Arc::new(StageLog::default());
        let config = PipelineConfig::builder()
            .background_removal(true)
            .crop(true)
            .resize(dims(64, 64))
            .padding(4)
            .background(BackgroundSpec::Color(Color::WHITE))
            .build()
            .unwrap();
        let pipeline = Pipeline::builder(config)
            .remover(Arc::new(RecordingRemover::new()))
            .reporter(log.clone())
            .build()
            .unwrap();

        pipeline.process_image(opaque(30, 20)).await.unwrap();

        assert_eq!(
            *log.0.lock().unwrap(),
            vec![
                ProcessingStage::BackgroundRemoval,
                ProcessingStage::Crop,
                ProcessingStage::Resize,
                ProcessingStage::Padding,
                ProcessingStage::Composite,
            ]
        );
    }

    #[tokio::test]
    async fn test_crop_runs_after_background_removal() {
        let remover = RecordingRemover {
            clear_left_half: true,
            ..RecordingRemover::default()
        };
        let config = PipelineConfig::builder()
            .background_removal(true)
            .crop(true)
            .build()
            .unwrap();
        let pipeline = Pipeline::builder(config)
            .remover(Arc::new(remover))
            .build()
            .unwrap();

        // Opaque RGB input would fail autocrop if crop ran first
        let input = DynamicImage::new_rgb8(40, 10);
        let result = pipeline.process_image(input).await.unwrap();
        assert_eq!((result.width(), result.height()), (20, 10));
    }

    #[tokio::test]
    async fn test_remover_required_when_enabled() {
        let config = PipelineConfig::builder().background_removal(true).build().unwrap();
        let result = Pipeline::builder(config).build();
        assert!(matches!(result, Err(ImagerError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_invalid_background_fails_at_build() {
        let config = PipelineConfig::builder()
            .background(BackgroundSpec::Image(PathBuf::from("/no/such/bg.png")))
            .build()
            .unwrap();
        let result = Pipeline::builder(config).build();
        assert!(matches!(result, Err(ImagerError::InvalidColorOrPath(_))));
    }

    #[tokio::test]
    async fn test_remover_failure_is_tagged() {
        let config = PipelineConfig::builder().background_removal(true).build().unwrap();
        let pipeline = Pipeline::builder(config)
            .remover(Arc::new(RecordingRemover::failing()))
            .build()
            .unwrap();

        let err = pipeline.process_image(opaque(8, 8)).await.unwrap_err();
        assert_eq!(err.stage(), Some(&ProcessingStage::BackgroundRemoval));
        assert!(matches!(err.root(), ImagerError::BackgroundRemoval(_)));
    }

    #[tokio::test]
    async fn test_remover_timeout() {
        let config = PipelineConfig::builder().background_removal(true).build().unwrap();
        let pipeline = Pipeline::builder(config)
            .remover(Arc::new(RecordingRemover::slow(Duration::from_millis(500))))
            .removal_timeout(Duration::from_millis(20))
            .build()
            .unwrap();

        let err = pipeline.process_image(opaque(8, 8)).await.unwrap_err();
        assert_eq!(err.stage(), Some(&ProcessingStage::BackgroundRemoval));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_crop_without_alpha_is_tagged() {
        let config = PipelineConfig::builder().crop(true).build().unwrap();
        let pipeline = Pipeline::builder(config).build().unwrap();

        let err = pipeline.process_image(DynamicImage::new_rgb8(4, 4)).await.unwrap_err();
        assert_eq!(err.stage(), Some(&ProcessingStage::Crop));
        assert!(matches!(err.root(), ImagerError::MissingAlphaChannel(_)));
    }

    #[tokio::test]
    async fn test_process_file_and_save() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("shoe.png");
        ImageIOService::save_image(&opaque(40, 20), &input, OutputFormat::Png).unwrap();

        let config = PipelineConfig::builder()
            .resize(dims(20, 20))
            .background(BackgroundSpec::Color(Color::BLACK))
            .build()
            .unwrap();
        let pipeline = Pipeline::builder(config).build().unwrap();

        let result = pipeline.process_file(&input).await.unwrap();
        assert_eq!(result.output_name, "shoe_20x20_bg.png");
        assert_eq!(
            result.stages(),
            vec![ProcessingStage::Load, ProcessingStage::Resize, ProcessingStage::Composite]
        );
        assert_eq!(result.dimensions(), (20, 10));

        let out_dir = temp_dir.path().join("out");
        let written = pipeline.save_result(&result, &out_dir).unwrap();
        assert_eq!(written, out_dir.join("shoe_20x20_bg.png"));
        assert!(written.exists());
    }

    #[tokio::test]
    async fn test_process_file_load_failure() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("broken.jpg");
        std::fs::write(&input, b"garbage").unwrap();

        let pipeline = Pipeline::builder(PipelineConfig::default()).build().unwrap();
        let err = pipeline.process_file(&input).await.unwrap_err();
        assert_eq!(err.stage(), Some(&ProcessingStage::Load));
        assert!(matches!(err.root(), ImagerError::UnsupportedImage(_)));
    }

    #[test]
    fn test_output_names() {
        let input = Path::new("/in/photo.jpeg");
        let config = PipelineConfig::default();
        assert_eq!(output_file_name(input, &config, OutputFormat::Png), "photo.png");

        let config = PipelineConfig::builder()
            .background_removal(true)
            .crop(true)
            .resize(dims(320, 280))
            .background(BackgroundSpec::Color(Color::WHITE))
            .build()
            .unwrap();
        assert_eq!(output_suffix(&config), "_b_c_320x280_bg");
        assert_eq!(
            output_file_name(input, &config, OutputFormat::Jpeg),
            "photo_b_c_320x280_bg.jpg"
        );
    }
}
