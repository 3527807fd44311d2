//! Image preprocessing for segmentation model inference

use crate::{
    error::{ImagerError, Result},
    models::PreprocessingConfig,
    transform::fit_dimensions,
};
use image::{imageops, DynamicImage, ImageBuffer, RgbImage};
use ndarray::Array4;

/// Configuration for preprocessing behavior
#[derive(Debug, Clone)]
pub struct PreprocessingOptions {
    /// Padding color for aspect ratio preservation (RGB)
    pub padding_color: [u8; 3],
}

impl Default for PreprocessingOptions {
    fn default() -> Self {
        Self {
            padding_color: [255, 255, 255],
        }
    }
}

/// Builds normalized NCHW tensors from images
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess an image for model inference
    ///
    /// This function handles:
    /// - RGB conversion
    /// - Aspect ratio preserving resize
    /// - Center padding to the model input size
    /// - Normalization to tensor format (NCHW)
    pub fn preprocess_image(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
        options: &PreprocessingOptions,
    ) -> Result<Array4<f32>> {
        let canvas = Self::letterbox(image, preprocessing_config, options)?;
        Ok(Self::canvas_to_tensor(&canvas, preprocessing_config))
    }

    /// Fit `image` into the model input size and center it on a padded canvas
    ///
    /// The content placement matches what
    /// [`SegmentationMask::from_tensor`](crate::types::SegmentationMask::from_tensor)
    /// reads back.
    pub fn letterbox(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
        options: &PreprocessingOptions,
    ) -> Result<RgbImage> {
        let [target_height, target_width] = preprocessing_config.target_size;
        if target_width == 0 || target_height == 0 {
            return Err(ImagerError::invalid_config("model input size must be positive"));
        }

        let rgb_image = image.to_rgb8();
        let (orig_width, orig_height) = rgb_image.dimensions();
        if orig_width == 0 || orig_height == 0 {
            return Err(ImagerError::invalid_dimension("cannot preprocess an empty image"));
        }

        let (new_width, new_height) =
            fit_dimensions(orig_width, orig_height, target_width, target_height);

        let resized = imageops::resize(
            &rgb_image,
            new_width,
            new_height,
            imageops::FilterType::Triangle,
        );

        let padding = options.padding_color;
        let mut canvas = ImageBuffer::from_pixel(target_width, target_height, image::Rgb(padding));

        let offset_x = (target_width - new_width) / 2;
        let offset_y = (target_height - new_height) / 2;
        imageops::replace(&mut canvas, &resized, i64::from(offset_x), i64::from(offset_y));

        Ok(canvas)
    }

    /// Convert canvas to normalized tensor
    fn canvas_to_tensor(canvas: &RgbImage, preprocessing_config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        Array4::from_shape_fn((1, 3, height as usize, width as usize), |(_, c, y, x)| {
            let value = canvas.get_pixel(x as u32, y as u32).0.get(c).copied().unwrap_or(0);
            let m = mean.get(c).copied().unwrap_or(0.0);
            let s = std.get(c).copied().unwrap_or(1.0);
            (f32::from(value) / 255.0 - m) / s
        })
    }

    /// Tensor only, with default options
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        Self::preprocess_image(image, preprocessing_config, &PreprocessingOptions::default())
    }
}
