//! Shared data types: segmentation masks and per-stage timings

use crate::error::{ImagerError, Result};
use crate::services::ProcessingStage;
use crate::transform::fit_dimensions;
use image::{imageops, DynamicImage, GrayImage, Rgba};
use ndarray::Array4;
use serde::{Deserialize, Serialize};

/// Foreground probability per pixel, 0 = background, 255 = foreground
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    /// Mask data as grayscale values (0-255), row-major
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    /// Create a new segmentation mask
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    /// Create mask from a grayscale image
    #[must_use]
    pub fn from_image(image: &GrayImage) -> Self {
        Self::new(image.as_raw().clone(), image.dimensions())
    }

    /// Convert mask to a grayscale image
    pub fn to_image(&self) -> Result<GrayImage> {
        let (width, height) = self.dimensions;
        GrayImage::from_raw(width, height, self.data.clone()).ok_or_else(|| {
            ImagerError::background_removal(format!(
                "mask buffer of {} bytes does not match {}x{}",
                self.data.len(),
                width,
                height
            ))
        })
    }

    /// Turn a `[1, C, H, W]` model output into a mask at the source size
    ///
    /// The model saw the source aspect-fitted and centered in its square
    /// input, so only that content region is read back. Values outside
    /// 0-1 are min-max normalized first.
    pub fn from_tensor(tensor: &Array4<f32>, original_dimensions: (u32, u32)) -> Result<Self> {
        let &[batch, channels, height, width] = tensor.shape() else {
            return Err(ImagerError::background_removal("output tensor is not 4D"));
        };
        if batch != 1 || channels == 0 || height == 0 || width == 0 {
            return Err(ImagerError::background_removal(format!(
                "unexpected output tensor shape {:?}",
                tensor.shape()
            )));
        }

        let (orig_width, orig_height) = original_dimensions;
        if orig_width == 0 || orig_height == 0 {
            return Err(ImagerError::invalid_dimension("cannot build a mask for an empty image"));
        }

        let mask_width = u32::try_from(width)
            .map_err(|_| ImagerError::background_removal("output tensor too wide"))?;
        let mask_height = u32::try_from(height)
            .map_err(|_| ImagerError::background_removal("output tensor too tall"))?;

        let (content_width, content_height) =
            fit_dimensions(orig_width, orig_height, mask_width, mask_height);
        let offset_x = ((mask_width - content_width) / 2) as usize;
        let offset_y = ((mask_height - content_height) / 2) as usize;

        let plane = tensor.index_axis(ndarray::Axis(0), 0);
        let plane = plane.index_axis(ndarray::Axis(0), 0);

        let mut values = Vec::with_capacity(content_width as usize * content_height as usize);
        for y in 0..content_height as usize {
            for x in 0..content_width as usize {
                values.push(plane.get((offset_y + y, offset_x + x)).copied().unwrap_or(0.0));
            }
        }

        let (min, max) = values
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        let needs_normalization = min < 0.0 || max > 1.0;
        let range = max - min;

        let bytes: Vec<u8> = values
            .iter()
            .map(|v| {
                let unit = if !needs_normalization {
                    *v
                } else if range > f32::EPSILON {
                    (v - min) / range
                } else {
                    0.0
                };
                (unit.clamp(0.0, 1.0) * 255.0).round() as u8
            })
            .collect();

        let content = GrayImage::from_raw(content_width, content_height, bytes)
            .ok_or_else(|| ImagerError::background_removal("mask buffer size mismatch"))?;
        let restored = if (content_width, content_height) == original_dimensions {
            content
        } else {
            imageops::resize(&content, orig_width, orig_height, imageops::FilterType::Triangle)
        };

        Ok(Self::from_image(&restored))
    }

    /// Use the mask as alpha channel, combined with any existing alpha
    ///
    /// Fully masked-out pixels become transparent black.
    pub fn apply_to(&self, image: &DynamicImage) -> Result<DynamicImage> {
        let mut rgba = image.to_rgba8();
        if rgba.dimensions() != self.dimensions {
            return Err(ImagerError::background_removal(format!(
                "mask {}x{} does not match image {}x{}",
                self.dimensions.0,
                self.dimensions.1,
                rgba.width(),
                rgba.height()
            )));
        }

        for (pixel, mask) in rgba.pixels_mut().zip(self.data.iter()) {
            let alpha = ((u16::from(pixel[3]) * u16::from(*mask) + 127) / 255) as u8;
            *pixel = if alpha == 0 {
                Rgba([0, 0, 0, 0])
            } else {
                Rgba([pixel[0], pixel[1], pixel[2], alpha])
            };
        }

        Ok(DynamicImage::ImageRgba8(rgba))
    }

    /// Fraction of pixels with a non-zero mask value
    #[must_use]
    pub fn coverage(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().filter(|v| **v > 0).count() as f64 / self.data.len() as f64
    }
}

/// Wall-clock milliseconds spent per pipeline stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    /// Stages in the order they ran
    pub stages: Vec<(ProcessingStage, u64)>,
    /// Total end-to-end processing time
    pub total_ms: u64,
}

impl StageTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: ProcessingStage, elapsed_ms: u64) {
        self.stages.push((stage, elapsed_ms));
    }

    /// Time recorded for `stage`, if it ran
    #[must_use]
    pub fn get(&self, stage: ProcessingStage) -> Option<u64> {
        self.stages
            .iter()
            .find(|(recorded, _)| *recorded == stage)
            .map(|(_, ms)| *ms)
    }

    /// Stages that ran, in order
    #[must_use]
    pub fn stages_run(&self) -> Vec<ProcessingStage> {
        self.stages.iter().map(|(stage, _)| *stage).collect()
    }

    /// One-line breakdown for debug logs
    #[must_use]
    pub fn breakdown(&self) -> String {
        let parts: Vec<String> = self
            .stages
            .iter()
            .map(|(stage, ms)| format!("{}={}ms", stage, ms))
            .collect();
        format!("{} (total {}ms)", parts.join(", "), self.total_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn test_mask_from_square_tensor() {
        // Square source fills the whole square model output
        let mut tensor = Array4::<f32>::zeros((1, 1, 4, 4));
        tensor[[0, 0, 0, 0]] = 1.0;
        let mask = SegmentationMask::from_tensor(&tensor, (4, 4)).unwrap();
        assert_eq!(mask.dimensions, (4, 4));
        assert_eq!(mask.data[0], 255);
        assert_eq!(mask.data[1], 0);
    }

    #[test]
    fn test_mask_reads_only_content_region() {
        // 8x4 source in an 8x8 input occupies rows 2..6
        let mut tensor = Array4::<f32>::zeros((1, 1, 8, 8));
        for y in 2..6 {
            for x in 0..8 {
                tensor[[0, 0, y, x]] = 1.0;
            }
        }
        let mask = SegmentationMask::from_tensor(&tensor, (8, 4)).unwrap();
        assert_eq!(mask.dimensions, (8, 4));
        assert!(mask.data.iter().all(|v| *v == 255));
    }

    #[test]
    fn test_mask_normalizes_logits() {
        let mut tensor = Array4::<f32>::from_elem((1, 1, 2, 2), -4.0);
        tensor[[0, 0, 1, 1]] = 6.0;
        let mask = SegmentationMask::from_tensor(&tensor, (2, 2)).unwrap();
        assert_eq!(mask.data, vec![0, 0, 0, 255]);
    }

    #[test]
    fn test_mask_rejects_bad_shapes() {
        let tensor = Array4::<f32>::zeros((2, 1, 4, 4));
        assert!(SegmentationMask::from_tensor(&tensor, (4, 4)).is_err());
        let tensor = Array4::<f32>::zeros((1, 1, 4, 4));
        assert!(SegmentationMask::from_tensor(&tensor, (0, 4)).is_err());
    }

    #[test]
    fn test_apply_mask() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 1, Rgba([9, 8, 7, 255])));
        let mask = SegmentationMask::new(vec![0, 255], (2, 1));
        let result = mask.apply_to(&image).unwrap().to_rgba8();
        assert_eq!(result.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(result.get_pixel(1, 0), &Rgba([9, 8, 7, 255]));
        assert!((mask.coverage() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_apply_mask_dimension_mismatch() {
        let image = DynamicImage::new_rgb8(3, 3);
        let mask = SegmentationMask::new(vec![255; 4], (2, 2));
        assert!(matches!(mask.apply_to(&image), Err(ImagerError::BackgroundRemoval(_))));
    }

    #[test]
    fn test_stage_timings() {
        let mut timings = StageTimings::new();
        timings.record(ProcessingStage::Load, 3);
        timings.record(ProcessingStage::Crop, 1);
        timings.total_ms = 4;

        assert_eq!(timings.get(ProcessingStage::Crop), Some(1));
        assert_eq!(timings.get(ProcessingStage::Resize), None);
        assert_eq!(timings.stages_run(), vec![ProcessingStage::Load, ProcessingStage::Crop]);
        assert_eq!(timings.breakdown(), "load=3ms, crop=1ms (total 4ms)");
    }
}
