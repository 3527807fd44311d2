//! Mock backends and removers for tests that must not need a model file

use crate::{
    error::{ImagerError, Result},
    inference::InferenceBackend,
    models::PreprocessingConfig,
    removal::BackgroundRemover,
};
use image::DynamicImage;
use ndarray::Array4;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock inference backend producing a fixed mask pattern
///
/// The mask is foreground inside the centered half of the input and
/// background elsewhere.
#[derive(Debug)]
pub struct MockBackend {
    preprocessing_config: PreprocessingConfig,
    should_fail_inference: bool,
    calls: AtomicUsize,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            preprocessing_config: PreprocessingConfig {
                target_size: [32, 32],
                normalization_mean: [0.5, 0.5, 0.5],
                normalization_std: [1.0, 1.0, 1.0],
            },
            should_fail_inference: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a mock backend that will fail during inference
    #[must_use]
    pub fn new_failing_inference() -> Self {
        Self {
            should_fail_inference: true,
            ..Self::new()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InferenceBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail_inference {
            return Err(ImagerError::background_removal("Mock inference failure"));
        }

        let shape = input.shape();
        let (height, width) = (shape[2], shape[3]);
        Ok(Array4::from_shape_fn((1, 1, height, width), |(_, _, y, x)| {
            let inside_y = y >= height / 4 && y < height * 3 / 4;
            let inside_x = x >= width / 4 && x < width * 3 / 4;
            if inside_y && inside_x {
                1.0
            } else {
                0.0
            }
        }))
    }

    fn preprocessing_config(&self) -> &PreprocessingConfig {
        &self.preprocessing_config
    }
}

/// Remover that records calls and can fail or stall on demand
#[derive(Debug, Default)]
pub struct RecordingRemover {
    pub calls: Arc<Mutex<Vec<(u32, u32)>>>,
    pub fail: bool,
    pub delay: Option<Duration>,
    /// Make the left half transparent instead of keeping everything
    pub clear_left_half: bool,
}

impl RecordingRemover {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }
}

impl BackgroundRemover for RecordingRemover {
    fn name(&self) -> &str {
        "recording"
    }

    fn remove_background(&self, image: &DynamicImage) -> Result<DynamicImage> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((image.width(), image.height()));
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail {
            return Err(ImagerError::background_removal("Mock remover failure"));
        }

        let mut rgba = image.to_rgba8();
        if self.clear_left_half {
            let half = rgba.width() / 2;
            for (x, _, pixel) in rgba.enumerate_pixels_mut() {
                if x < half {
                    pixel.0 = [0, 0, 0, 0];
                }
            }
        }
        Ok(DynamicImage::ImageRgba8(rgba))
    }
}
