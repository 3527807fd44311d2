//! Local segmentation model description
//!
//! A model is a single `.onnx` file on disk. Its preprocessing parameters
//! come from a `preprocessor_config.json` sidecar in the same directory,
//! in the layout HuggingFace uses, or fall back to ISNet defaults.

use crate::error::{ImagerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the optional preprocessing sidecar
pub const PREPROCESSOR_CONFIG_FILE: &str = "preprocessor_config.json";

/// Input geometry and normalization expected by a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// `[height, width]` of the square model input
    pub target_size: [u32; 2],
    /// Per-channel mean in 0-1 range
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation in 0-1 range
    pub normalization_std: [f32; 3],
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            target_size: [1024, 1024],
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [1.0, 1.0, 1.0],
        }
    }
}

impl PreprocessingConfig {
    /// Parse a HuggingFace-style preprocessor config
    ///
    /// `size` may be `{"height", "width"}`, `{"shortest_edge"}` or a bare
    /// integer. Mean/std given in 0-255 range are rescaled to 0-1. Missing
    /// keys keep their defaults.
    pub fn from_huggingface(value: &serde_json::Value) -> Result<Self> {
        let defaults = Self::default();

        let target_size = match value.get("size") {
            Some(size) => Self::parse_size(size)?,
            None => defaults.target_size,
        };
        let normalization_mean = match value.get("image_mean") {
            Some(mean) => Self::parse_channels(mean, "image_mean")?,
            None => defaults.normalization_mean,
        };
        let normalization_std = match value.get("image_std") {
            Some(std) => Self::parse_channels(std, "image_std")?,
            None => defaults.normalization_std,
        };

        if normalization_std.iter().any(|s| *s <= 0.0) {
            return Err(ImagerError::invalid_config(
                "image_std values must be positive",
            ));
        }

        Ok(Self {
            target_size,
            normalization_mean,
            normalization_std,
        })
    }

    fn parse_size(size: &serde_json::Value) -> Result<[u32; 2]> {
        let as_u32 = |value: Option<&serde_json::Value>, name: &str| -> Result<u32> {
            value
                .and_then(serde_json::Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0)
                .ok_or_else(|| {
                    ImagerError::invalid_config(format!("Invalid {} in preprocessor size", name))
                })
        };

        if size.is_u64() {
            let edge = as_u32(Some(size), "size")?;
            return Ok([edge, edge]);
        }
        if let Some(edge) = size.get("shortest_edge") {
            let edge = as_u32(Some(edge), "shortest_edge")?;
            return Ok([edge, edge]);
        }

        let height = as_u32(size.get("height"), "height")?;
        let width = as_u32(size.get("width"), "width")?;
        Ok([height, width])
    }

    fn parse_channels(value: &serde_json::Value, name: &str) -> Result<[f32; 3]> {
        let values: Vec<f64> = value
            .as_array()
            .map(|items| items.iter().filter_map(serde_json::Value::as_f64).collect())
            .unwrap_or_default();

        let [a, b, c] = values.as_slice() else {
            return Err(ImagerError::invalid_config(format!(
                "{} must have exactly 3 numeric values",
                name
            )));
        };

        let scale = if [a, b, c].iter().any(|v| **v > 1.0) { 255.0 } else { 1.0 };
        Ok([(a / scale) as f32, (b / scale) as f32, (c / scale) as f32])
    }

    /// Square edge length of the model input
    #[must_use]
    pub fn input_edge(&self) -> u32 {
        self.target_size[0].max(self.target_size[1])
    }
}

/// A model file plus its preprocessing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub path: PathBuf,
    pub preprocessing: PreprocessingConfig,
}

impl ModelSpec {
    /// Describe the model at `path`, reading the sidecar config if present
    ///
    /// # Errors
    /// `BackgroundRemoval` when the model file is missing, or
    /// `InvalidConfig` when the sidecar exists but cannot be parsed.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ImagerError::model_error_with_context(
                "load",
                path,
                "file not found",
                &["pass an ONNX segmentation model with --model", "use --remover color-key"],
            ));
        }

        let sidecar = path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(PREPROCESSOR_CONFIG_FILE);

        let preprocessing = if sidecar.is_file() {
            let text = std::fs::read_to_string(&sidecar)
                .map_err(|e| ImagerError::file_io_error("read", &sidecar, &e))?;
            let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                ImagerError::invalid_config(format!("{}: {}", sidecar.display(), e))
            })?;
            let config = PreprocessingConfig::from_huggingface(&value)?;
            tracing::debug!(sidecar = %sidecar.display(), ?config, "Loaded preprocessing config");
            config
        } else {
            PreprocessingConfig::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            preprocessing,
        })
    }

    /// Model name for logs: the file stem
    #[must_use]
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map_or_else(|| "model".to_string(), |s| s.to_string_lossy().into_owned())
    }
}
