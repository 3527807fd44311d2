//! Tract backend for segmentation models
//!
//! Tract is a pure Rust ONNX runtime, so models run without native
//! libraries. Models are loaded once from a local `.onnx` file and the
//! resulting plan is shared read-only across calls.

use crate::error::{ImagerError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelSpec, PreprocessingConfig};
use instant::Instant;
use ndarray::Array4;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend running an ONNX segmentation model on the CPU
pub struct TractBackend {
    model: TractModel,
    spec: ModelSpec,
}

impl std::fmt::Debug for TractBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TractBackend").field("spec", &self.spec).finish_non_exhaustive()
    }
}

impl TractBackend {
    /// Load, optimize and plan the model described by `spec`
    ///
    /// # Errors
    /// `BackgroundRemoval` when the file cannot be parsed as ONNX or the
    /// graph cannot be optimized for the configured input size.
    pub fn load(spec: ModelSpec) -> Result<Self> {
        let load_start = Instant::now();
        let [height, width] = spec.preprocessing.target_size;

        tracing::info!(
            model = %spec.name(),
            input = %format!("{}x{}", width, height),
            "🚀 Initializing Tract backend"
        );

        let fail = |operation: &str, error: &dyn std::fmt::Display| {
            ImagerError::model_error_with_context(
                operation,
                &spec.path,
                &error.to_string(),
                &["check that the file is an ONNX segmentation model with one image input"],
            )
        };

        let model = onnx()
            .model_for_path(&spec.path)
            .map_err(|e| fail("parse", &e))?
            .with_input_fact(0, f32::fact([1, 3, height as usize, width as usize]).into())
            .map_err(|e| fail("configure input of", &e))?
            .into_optimized()
            .map_err(|e| fail("optimize", &e))?
            .into_runnable()
            .map_err(|e| fail("plan", &e))?;

        tracing::info!(
            "✅ Tract backend initialized in {}ms",
            load_start.elapsed().as_millis()
        );

        Ok(Self { model, spec })
    }

    /// Model this backend was loaded from
    #[must_use]
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &str {
        "tract"
    }

    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        tracing::debug!("🔮 Running Tract inference on {:?}", input.shape());
        let inference_start = Instant::now();

        let contiguous = input.as_standard_layout();
        let data = contiguous
            .as_slice()
            .ok_or_else(|| ImagerError::background_removal("input tensor is not contiguous"))?;
        let input_tensor = Tensor::from_shape(input.shape(), data).map_err(|e| {
            ImagerError::background_removal(format!("Failed to build input tensor: {e}"))
        })?;

        let outputs = self.model.run(tvec![input_tensor.into()]).map_err(|e| {
            ImagerError::background_removal(format!("Tract inference failed: {e}"))
        })?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| ImagerError::background_removal("No output tensor found"))?
            .into_arc_tensor();

        let output_view = output_tensor.to_array_view::<f32>().map_err(|e| {
            ImagerError::background_removal(format!("Failed to convert output tensor: {e}"))
        })?;

        let shape = match output_view.shape() {
            // [1, H, W] masks get a channel axis
            &[n, h, w] => (n, 1, h, w),
            &[n, c, h, w] => (n, c, h, w),
            other => {
                return Err(ImagerError::background_removal(format!(
                    "Expected 3D or 4D output tensor, got shape {:?}",
                    other
                )))
            },
        };

        let output = Array4::from_shape_vec(shape, output_view.iter().copied().collect())
            .map_err(|e| {
                ImagerError::background_removal(format!("Failed to reshape output tensor: {e}"))
            })?;

        tracing::debug!(
            "✅ Tract inference completed in {}ms, output {:?}",
            inference_start.elapsed().as_millis(),
            output.shape()
        );

        Ok(output)
    }

    fn preprocessing_config(&self) -> &PreprocessingConfig {
        &self.spec.preprocessing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_rejects_non_onnx_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.onnx");
        std::fs::write(&path, b"definitely not protobuf").unwrap();

        let spec = ModelSpec::from_path(&path).unwrap();
        let err = TractBackend::load(spec).unwrap_err();

        assert!(matches!(err, ImagerError::BackgroundRemoval(_)));
        assert!(err.to_string().contains("broken.onnx"));
    }
}
