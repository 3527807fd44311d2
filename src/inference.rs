//! Inference backend abstraction

use crate::{error::Result, models::PreprocessingConfig};
use ndarray::Array4;

/// A loaded segmentation model that maps an NCHW image tensor to a mask tensor
///
/// Backends are loaded up front and then only read, so `infer` takes `&self`
/// and implementations must be shareable across threads.
pub trait InferenceBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Run inference on a `[1, 3, H, W]` input tensor
    ///
    /// # Errors
    /// - Model inference failures
    /// - Tensor conversion errors
    /// - Output that is not a 4D tensor
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Preprocessing the model expects
    fn preprocessing_config(&self) -> &PreprocessingConfig;
}
