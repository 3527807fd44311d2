//! Configuration types for image processing operations

use crate::color::Color;
use crate::error::{ImagerError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Output image format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
    /// JPEG (no transparency, alpha is dropped)
    Jpeg,
    /// WebP with alpha channel transparency
    WebP,
    /// TIFF with alpha channel transparency and lossless compression
    Tiff,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Png => write!(f, "png"),
            Self::Jpeg => write!(f, "jpeg"),
            Self::WebP => write!(f, "webp"),
            Self::Tiff => write!(f, "tiff"),
        }
    }
}

/// Target size for the resize stage, both sides positive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    /// Create dimensions, rejecting zero sides
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ImagerError::invalid_dimension(format!(
                "{}x{}: width and height must be positive",
                width, height
            )));
        }
        Ok(Self { width, height })
    }
}

impl FromStr for Dimensions {
    type Err = ImagerError;

    /// Parse `WxH`, e.g. `800x600`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            ImagerError::invalid_dimension(format!(
                "'{}': expected WIDTHxHEIGHT with positive integers, e.g. 800x600",
                s
            ))
        };

        let (width, height) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(invalid)?;
        let width: u32 = width.trim().parse().map_err(|_| invalid())?;
        let height: u32 = height.trim().parse().map_err(|_| invalid())?;

        Self::new(width, height).map_err(|_| invalid())
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl Serialize for Dimensions {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Dimensions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// Background to composite onto: a color or an image file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundSpec {
    Color(Color),
    Image(PathBuf),
}

impl FromStr for BackgroundSpec {
    type Err = ImagerError;

    /// Colors win over paths; a file literally named `red` needs `./red`
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ImagerError::invalid_color_or_path(s));
        }
        Ok(match Color::parse(trimmed) {
            Some(color) => Self::Color(color),
            None => Self::Image(PathBuf::from(trimmed)),
        })
    }
}

impl fmt::Display for BackgroundSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Color(color) => write!(f, "{}", color),
            Self::Image(path) => write!(f, "{}", path.display()),
        }
    }
}

impl Serialize for BackgroundSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BackgroundSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// Generated background that complements the subject
///
/// A white or black base whose brightness is scaled up or down. Brightening
/// white or darkening black saturates, so the fills come out as pure white
/// and pure black.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum Guidance {
    /// Brightened white base
    Lighter,
    /// Darkened black base
    Darker,
}

impl Guidance {
    const LIGHTER_FACTOR: f32 = 1.5;
    const DARKER_FACTOR: f32 = 0.5;

    /// Fill color produced by this guidance
    #[must_use]
    pub fn background_color(self) -> Color {
        match self {
            Guidance::Lighter => Color::WHITE.with_brightness(Self::LIGHTER_FACTOR),
            Guidance::Darker => Color::BLACK.with_brightness(Self::DARKER_FACTOR),
        }
    }

    #[must_use]
    pub fn to_background(self) -> BackgroundSpec {
        BackgroundSpec::Color(self.background_color())
    }
}

impl FromStr for Guidance {
    type Err = ImagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lighter" => Ok(Guidance::Lighter),
            "darker" => Ok(Guidance::Darker),
            _ => Err(ImagerError::invalid_config(format!(
                "unknown guidance '{}' (expected lighter or darker)",
                s
            ))),
        }
    }
}

/// Which pipeline stages run and with what parameters
///
/// Immutable once built; one config drives a whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Run the background remover first
    pub background_removal: bool,

    /// Trim fully transparent margins
    pub crop: bool,

    /// Aspect-preserving resize target
    pub resize: Option<Dimensions>,

    /// Transparent border in pixels; the final image is exactly `resize`
    pub padding: Option<u32>,

    /// Flatten onto this color or image
    pub background: Option<BackgroundSpec>,
}

impl PipelineConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use imager::config::{Dimensions, PipelineConfig};
    ///
    /// let config = PipelineConfig::builder()
    ///     .crop(true)
    ///     .resize(Dimensions::new(800, 600)?)
    ///     .padding(24)
    ///     .background("whitesmoke".parse()?)
    ///     .build()?;
    /// assert_eq!(config.content_box(), Some((752, 552)));
    /// # Ok::<(), imager::ImagerError>(())
    /// ```
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate the combination of options
    ///
    /// # Errors
    /// - `InvalidConfig` when padding is set without a resize target
    /// - `InvalidDimension` when twice the padding does not fit inside the target
    pub fn validate(&self) -> Result<()> {
        match (self.padding, self.resize) {
            (Some(padding), None) => Err(ImagerError::invalid_config(format!(
                "padding ({}px) requires a resize target",
                padding
            ))),
            (Some(padding), Some(target)) => {
                let doubled = u64::from(padding) * 2;
                if doubled >= u64::from(target.width) || doubled >= u64::from(target.height) {
                    let max = (target.width.min(target.height).saturating_sub(1)) / 2;
                    Err(ImagerError::config_value_error(
                        "padding",
                        padding,
                        &format!("0-{} for {}", max, target),
                    ))
                } else {
                    Ok(())
                }
            },
            (None, _) => Ok(()),
        }
    }

    /// Size the resize stage aims for: the target minus padding on each side
    #[must_use]
    pub fn content_box(&self) -> Option<(u32, u32)> {
        self.resize.map(|target| {
            let padding = self.padding.unwrap_or(0);
            (
                target.width.saturating_sub(padding.saturating_mul(2)),
                target.height.saturating_sub(padding.saturating_mul(2)),
            )
        })
    }

    /// True when no stage would change the image
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        !self.background_removal
            && !self.crop
            && self.resize.is_none()
            && self.padding.is_none()
            && self.background.is_none()
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn background_removal(mut self, enabled: bool) -> Self {
        self.config.background_removal = enabled;
        self
    }

    #[must_use]
    pub fn crop(mut self, enabled: bool) -> Self {
        self.config.crop = enabled;
        self
    }

    #[must_use]
    pub fn resize(mut self, dimensions: Dimensions) -> Self {
        self.config.resize = Some(dimensions);
        self
    }

    /// Set or clear the resize target
    #[must_use]
    pub fn resize_opt(mut self, dimensions: Option<Dimensions>) -> Self {
        self.config.resize = dimensions;
        self
    }

    #[must_use]
    pub fn padding(mut self, pixels: u32) -> Self {
        self.config.padding = Some(pixels);
        self
    }

    #[must_use]
    pub fn padding_opt(mut self, pixels: Option<u32>) -> Self {
        self.config.padding = pixels;
        self
    }

    #[must_use]
    pub fn background(mut self, background: BackgroundSpec) -> Self {
        self.config.background = Some(background);
        self
    }

    #[must_use]
    pub fn background_opt(mut self, background: Option<BackgroundSpec>) -> Self {
        self.config.background = background;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// Returns the first validation failure, see [`PipelineConfig::validate`]
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Ready-made settings for catalog thumbnails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum Preset {
    SLight,
    MLight,
    LLight,
    SDark,
    MDark,
    LDark,
}

impl Preset {
    pub const ALL: [Preset; 6] = [
        Preset::SLight,
        Preset::MLight,
        Preset::LLight,
        Preset::SDark,
        Preset::MDark,
        Preset::LDark,
    ];

    const LIGHT_BACKGROUND: Color = Color::rgb(245, 245, 245);
    const DARK_BACKGROUND: Color = Color::rgb(0x2A, 0x37, 0x3D);

    /// Square edge length and padding for the preset size
    fn geometry(self) -> (u32, u32) {
        match self {
            Preset::SLight | Preset::SDark => (240, 48),
            Preset::MLight | Preset::MDark => (480, 96),
            Preset::LLight | Preset::LDark => (960, 128),
        }
    }

    fn background_color(self) -> Color {
        match self {
            Preset::SLight | Preset::MLight | Preset::LLight => Self::LIGHT_BACKGROUND,
            Preset::SDark | Preset::MDark | Preset::LDark => Self::DARK_BACKGROUND,
        }
    }

    /// Expand the preset: remove background, crop, square resize, padding, fill
    #[must_use]
    pub fn to_config(self) -> PipelineConfig {
        let (edge, padding) = self.geometry();
        PipelineConfig {
            background_removal: true,
            crop: true,
            resize: Some(Dimensions {
                width: edge,
                height: edge,
            }),
            padding: Some(padding),
            background: Some(BackgroundSpec::Color(self.background_color())),
        }
    }

    /// Kebab-case name as accepted on the command line
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Preset::SLight => "s-light",
            Preset::MLight => "m-light",
            Preset::LLight => "l-light",
            Preset::SDark => "s-dark",
            Preset::MDark => "m-dark",
            Preset::LDark => "l-dark",
        }
    }
}

impl FromStr for Preset {
    type Err = ImagerError;

    /// Accepts `s-light`, `S light`, `s_light` and similar spellings
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| if c == ' ' || c == '_' { '-' } else { c.to_ascii_lowercase() })
            .collect();
        Self::ALL
            .into_iter()
            .find(|preset| preset.name() == normalized)
            .ok_or_else(|| {
                ImagerError::invalid_config(format!(
                    "unknown preset '{}' (expected one of s-light, m-light, l-light, s-dark, m-dark, l-dark)",
                    s
                ))
            })
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
