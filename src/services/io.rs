//! Image I/O operations service
//!
//! This module separates file I/O operations from business logic,
//! making the system more testable and maintainable.

use crate::{
    config::{BackgroundSpec, OutputFormat},
    error::{ImagerError, Result},
    services::OutputFormatHandler,
    transform::Background,
};
use image::{codecs::jpeg::JpegEncoder, DynamicImage};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

/// JPEG quality used for lossy output
const JPEG_QUALITY: u8 = 90;

/// Name of the subdirectory that receives inputs after successful processing
pub const PROCESSED_DIR_NAME: &str = "processed";

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Falls back to content sniffing when the extension does not match the
    /// actual encoding.
    ///
    /// # Examples
    /// ```rust,no_run
    /// use imager::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("input/photo.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(ImagerError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                tracing::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );

                let data = std::fs::read(path_ref).map_err(|io_err| {
                    ImagerError::file_io_error("read image data", path_ref, &io_err)
                })?;

                image::load_from_memory(&data)
                    .map_err(|content_err| ImagerError::image_load_error(path_ref, &content_err))
            },
        }
    }

    /// Decode an image held in memory
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes).map_err(|e| {
            ImagerError::unsupported_image(format!("Failed to decode image from bytes: {}", e))
        })
    }

    /// Encode an image into memory in the given format
    pub fn encode(image: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>> {
        OutputFormatHandler::warn_if_alpha_dropped(image, format);
        let prepared = OutputFormatHandler::prepare(image, format);
        let mut cursor = Cursor::new(Vec::new());

        match format {
            OutputFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
                prepared.write_with_encoder(encoder)?;
            },
            other => {
                prepared.write_to(&mut cursor, OutputFormatHandler::image_format(other))?;
            },
        }

        Ok(cursor.into_inner())
    }

    /// Save an image atomically
    ///
    /// The encoded bytes go to a temporary file next to `path`, which is then
    /// renamed into place. A failed save leaves no file at `path`.
    ///
    /// # Examples
    /// ```rust,no_run
    /// use imager::{config::OutputFormat, services::ImageIOService};
    /// use image::DynamicImage;
    ///
    /// # let image = DynamicImage::new_rgb8(100, 100);
    /// ImageIOService::save_image(&image, "output/photo_c.png", OutputFormat::Png)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn save_image<P: AsRef<Path>>(
        image: &DynamicImage,
        path: P,
        format: OutputFormat,
    ) -> Result<()> {
        let path_ref = path.as_ref();
        let parent = match path_ref.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        std::fs::create_dir_all(parent)
            .map_err(|e| ImagerError::file_io_error("create output directory", parent, &e))?;

        let bytes = Self::encode(image, format)?;

        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| ImagerError::file_io_error("create temporary file in", parent, &e))?;
        temp.write_all(&bytes)
            .and_then(|()| temp.flush())
            .map_err(|e| ImagerError::file_io_error("write", temp.path(), &e))?;
        temp.persist(path_ref)
            .map_err(|e| ImagerError::file_io_error("persist output", path_ref, &e.error))?;

        tracing::debug!(
            path = %path_ref.display(),
            bytes = bytes.len(),
            "Saved {:?} output",
            format
        );
        Ok(())
    }

    /// Resolve a background spec into a ready-to-composite background
    ///
    /// Image backgrounds are decoded here so a batch pays the cost once.
    pub fn load_background(spec: &BackgroundSpec) -> Result<Background> {
        match spec {
            BackgroundSpec::Color(color) => Ok(Background::Color(*color)),
            BackgroundSpec::Image(path) => {
                if !path.is_file() {
                    return Err(ImagerError::invalid_color_or_path(
                        path.display().to_string(),
                    ));
                }
                let image = Self::load_image(path).map_err(|e| {
                    tracing::debug!("Background image {} unusable: {}", path.display(), e);
                    ImagerError::invalid_color_or_path(path.display().to_string())
                })?;
                Ok(Background::Image(image))
            },
        }
    }

    /// Move a processed input into the `processed/` subdirectory of its parent
    ///
    /// Returns the new location. An existing file with the same name is
    /// replaced.
    pub fn move_to_processed<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
        let path_ref = path.as_ref();
        let parent = path_ref.parent().unwrap_or_else(|| Path::new("."));
        let processed_dir = parent.join(PROCESSED_DIR_NAME);

        std::fs::create_dir_all(&processed_dir).map_err(|e| {
            ImagerError::file_io_error("create processed directory", &processed_dir, &e)
        })?;

        let file_name = path_ref.file_name().ok_or_else(|| {
            ImagerError::file_io_error(
                "move",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
            )
        })?;
        let destination = processed_dir.join(file_name);

        std::fs::rename(path_ref, &destination)
            .map_err(|e| ImagerError::file_io_error("move processed input", path_ref, &e))?;
        Ok(destination)
    }

    /// Check if a file path has a supported image extension
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_lowercase().as_str(),
                    "jpg" | "jpeg" | "png" | "webp" | "bmp" | "tif" | "tiff" | "gif"
                )
            })
    }
}
