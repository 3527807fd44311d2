//! Output format handling service
//!
//! This module separates output format conversion logic from business logic,
//! making the system more testable and maintainable.

use crate::config::OutputFormat;
use image::{DynamicImage, ImageFormat};

/// Service for handling output format conversions
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Convert a pipeline result into a pixel layout the target encoder accepts
    ///
    /// Images with alpha become RGBA8 (or RGB8 for JPEG, which drops alpha),
    /// images without alpha become RGB8.
    ///
    /// # Examples
    /// ```rust
    /// use imager::{config::OutputFormat, services::OutputFormatHandler};
    /// use image::{DynamicImage, RgbaImage};
    ///
    /// let image = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));
    /// let prepared = OutputFormatHandler::prepare(&image, OutputFormat::Jpeg);
    /// assert!(!prepared.color().has_alpha());
    /// ```
    #[must_use]
    pub fn prepare(image: &DynamicImage, format: OutputFormat) -> DynamicImage {
        let keep_alpha = image.color().has_alpha() && Self::supports_transparency(format);
        match (keep_alpha, image) {
            (true, DynamicImage::ImageRgba8(_)) | (false, DynamicImage::ImageRgb8(_)) => {
                image.clone()
            },
            (true, _) => DynamicImage::ImageRgba8(image.to_rgba8()),
            (false, _) => DynamicImage::ImageRgb8(image.to_rgb8()),
        }
    }

    /// Get the appropriate file extension for a given output format
    ///
    /// # Examples
    /// ```rust
    /// use imager::{config::OutputFormat, services::OutputFormatHandler};
    ///
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Png), "png");
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Jpeg), "jpg");
    /// ```
    #[must_use]
    pub fn get_extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::WebP => "webp",
            OutputFormat::Tiff => "tiff",
        }
    }

    /// Check if a format supports transparency (alpha channel)
    #[must_use]
    pub fn supports_transparency(format: OutputFormat) -> bool {
        match format {
            OutputFormat::Png | OutputFormat::WebP | OutputFormat::Tiff => true,
            OutputFormat::Jpeg => false,
        }
    }

    /// Encoder format used by the `image` crate
    #[must_use]
    pub fn image_format(format: OutputFormat) -> ImageFormat {
        match format {
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::WebP => ImageFormat::WebP,
            OutputFormat::Tiff => ImageFormat::Tiff,
        }
    }

    /// Warn when a transparent result is about to lose its alpha channel
    pub fn warn_if_alpha_dropped(image: &DynamicImage, format: OutputFormat) {
        if image.color().has_alpha() && !Self::supports_transparency(format) {
            tracing::warn!(
                "Output format {:?} does not support transparency; alpha channel will be dropped",
                format
            );
        }
    }
}
