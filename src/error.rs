//! Error types for image processing operations

use crate::services::ProcessingStage;
use thiserror::Error;

/// Result type alias for imager operations
pub type Result<T> = std::result::Result<T, ImagerError>;

/// Error kinds surfaced by the transform pipeline and its collaborators
#[derive(Error, Debug)]
pub enum ImagerError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoder/decoder errors reported by the image crate
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// File cannot be decoded as an image
    #[error("Unsupported image: {0}")]
    UnsupportedImage(String),

    /// Operation needs an alpha channel the image does not have
    #[error("Missing alpha channel: {0}")]
    MissingAlphaChannel(String),

    /// Resize/padding target is zero or the canvas is too small
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),

    /// Background removal model failed to load, run, or finish in time
    #[error("Background removal failed: {0}")]
    BackgroundRemoval(String),

    /// Background value is neither a parseable color nor a readable image
    #[error("Invalid background '{0}': expected a color name, hex code, or readable image file")]
    InvalidColorOrPath(String),

    /// Inconsistent combination of options
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A pipeline stage failed; wraps the underlying cause
    #[error("{stage} failed: {source}")]
    Stage {
        stage: ProcessingStage,
        #[source]
        source: Box<ImagerError>,
    },
}

impl ImagerError {
    /// Create a new unsupported image error
    pub fn unsupported_image<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedImage(msg.into())
    }

    /// Create a new missing alpha channel error
    pub fn missing_alpha<S: Into<String>>(msg: S) -> Self {
        Self::MissingAlphaChannel(msg.into())
    }

    /// Create a new invalid dimension error
    pub fn invalid_dimension<S: Into<String>>(msg: S) -> Self {
        Self::InvalidDimension(msg.into())
    }

    /// Create a new background removal error
    pub fn background_removal<S: Into<String>>(msg: S) -> Self {
        Self::BackgroundRemoval(msg.into())
    }

    /// Create a new invalid color or path error
    pub fn invalid_color_or_path<S: Into<String>>(value: S) -> Self {
        Self::InvalidColorOrPath(value.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Attach the pipeline stage that produced this error
    ///
    /// Errors that already carry a stage are returned unchanged so the
    /// innermost stage wins.
    #[must_use]
    pub fn at_stage(self, stage: ProcessingStage) -> Self {
        match self {
            Self::Stage { .. } => self,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage at which the error happened, if known
    #[must_use]
    pub fn stage(&self) -> Option<&ProcessingStage> {
        match self {
            Self::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Underlying error with any stage wrapper removed
    #[must_use]
    pub fn root(&self) -> &ImagerError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    // Contextual error creators

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }

    /// Create image decoding error with format context
    pub fn image_load_error<P: AsRef<std::path::Path>>(path: P, error: &image::ImageError) -> Self {
        let path_ref = path.as_ref();
        let extension = path_ref
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown");

        Self::UnsupportedImage(format!(
            "'{}' (extension: {}): {}. Supported formats: PNG, JPEG, WebP, TIFF, BMP, GIF",
            path_ref.display(),
            extension,
            error
        ))
    }

    /// Create model error with troubleshooting context
    pub fn model_error_with_context<P: AsRef<std::path::Path>>(
        operation: &str,
        model_path: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::BackgroundRemoval(format!(
            "Failed to {} model '{}': {}.{}",
            operation,
            model_path.as_ref().display(),
            error,
            suggestion_text
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidDimension(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }
}
