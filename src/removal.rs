//! Background removal adapters
//!
//! The pipeline only sees [`BackgroundRemover`]: an image goes in, the same
//! image with an alpha channel comes out. Two implementations ship:
//! [`ModelRemover`] runs a segmentation model through an
//! [`InferenceBackend`], and [`ColorKeyRemover`] keys out a flat backdrop
//! without any model.

use crate::error::{ImagerError, Result};
use crate::inference::InferenceBackend;
use crate::types::SegmentationMask;
use crate::utils::ImagePreprocessor;
use image::{DynamicImage, Rgba};
use instant::Instant;
use tracing::{instrument, span, Level};

/// Default per-channel tolerance for [`ColorKeyRemover`]
pub const DEFAULT_KEY_TOLERANCE: u8 = 30;

/// Cuts the subject out of an image
///
/// Implementations must return an image of the same width and height as
/// the input, carrying an alpha channel. They are called from a blocking
/// worker thread and may take a long time.
pub trait BackgroundRemover: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Return the input with the background made transparent
    ///
    /// # Errors
    /// `BackgroundRemoval` when the image cannot be segmented.
    fn remove_background(&self, image: &DynamicImage) -> Result<DynamicImage>;
}

/// Remover backed by a segmentation model
///
/// preprocess → infer → mask → apply alpha
#[derive(Debug)]
pub struct ModelRemover<B: InferenceBackend> {
    backend: B,
}

impl<B: InferenceBackend> ModelRemover<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Run the model and return the foreground mask at the image's size
    #[instrument(skip(self, image), fields(backend = %self.backend.name(), width = image.width(), height = image.height()))]
    pub fn segment(&self, image: &DynamicImage) -> Result<SegmentationMask> {
        let preprocess_start = Instant::now();
        let tensor = {
            let _span = span!(Level::DEBUG, "preprocessing").entered();
            ImagePreprocessor::preprocess_for_inference(image, self.backend.preprocessing_config())?
        };
        let preprocess_ms = preprocess_start.elapsed().as_millis() as u64;

        let inference_start = Instant::now();
        let output = {
            let _span = span!(Level::DEBUG, "inference").entered();
            self.backend.infer(&tensor)?
        };
        let inference_ms = inference_start.elapsed().as_millis() as u64;

        let mask = {
            let _span = span!(Level::DEBUG, "postprocessing").entered();
            SegmentationMask::from_tensor(&output, (image.width(), image.height()))?
        };

        tracing::debug!(
            preprocess_ms,
            inference_ms,
            coverage = %format!("{:.1}%", mask.coverage() * 100.0),
            "Segmentation finished"
        );
        Ok(mask)
    }
}

impl<B: InferenceBackend> BackgroundRemover for ModelRemover<B> {
    fn name(&self) -> &str {
        self.backend.name()
    }

    fn remove_background(&self, image: &DynamicImage) -> Result<DynamicImage> {
        let mask = self.segment(image)?;
        mask.apply_to(image)
    }
}

/// Model-free remover for product shots on a flat backdrop
///
/// The key color is the per-channel median of the four corner pixels.
/// Pixels within `tolerance` of the key on every channel become
/// transparent; all others keep their color and alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorKeyRemover {
    pub tolerance: u8,
}

impl Default for ColorKeyRemover {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_KEY_TOLERANCE,
        }
    }
}

impl ColorKeyRemover {
    #[must_use]
    pub fn new(tolerance: u8) -> Self {
        Self { tolerance }
    }

    /// Backdrop color sampled from the corners
    #[must_use]
    pub fn key_color(image: &image::RgbaImage) -> Option<[u8; 3]> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let corners = [
            image.get_pixel(0, 0),
            image.get_pixel(width - 1, 0),
            image.get_pixel(0, height - 1),
            image.get_pixel(width - 1, height - 1),
        ];

        let median = |channel: usize| {
            let mut values = corners.map(|p| p.0.get(channel).copied().unwrap_or(0));
            values.sort_unstable();
            // Mean of the two middle values of four
            let [_, low, high, _] = values;
            ((u16::from(low) + u16::from(high) + 1) / 2) as u8
        };

        Some([median(0), median(1), median(2)])
    }
}

impl BackgroundRemover for ColorKeyRemover {
    fn name(&self) -> &str {
        "color-key"
    }

    fn remove_background(&self, image: &DynamicImage) -> Result<DynamicImage> {
        let mut rgba = image.to_rgba8();
        let key = Self::key_color(&rgba)
            .ok_or_else(|| ImagerError::background_removal("cannot key an empty image"))?;

        let mut cleared = 0usize;
        for pixel in rgba.pixels_mut() {
            let matches_key = pixel
                .0
                .iter()
                .zip(key.iter())
                .all(|(value, key)| value.abs_diff(*key) <= self.tolerance);
            if matches_key {
                *pixel = Rgba([0, 0, 0, 0]);
                cleared += 1;
            }
        }

        tracing::debug!(
            key = %format!("#{:02X}{:02X}{:02X}", key[0], key[1], key[2]),
            tolerance = self.tolerance,
            cleared,
            "Color key applied"
        );
        Ok(DynamicImage::ImageRgba8(rgba))
    }
}
