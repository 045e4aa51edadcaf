//! Downscaling of uploaded images.
//!
//! One routine serves every variant; a [`ResizeVariant`] only names the
//! target size and the filename suffix.

use crate::config::ImageConfig;
use image::ImageFormat;
use std::io::Cursor;
use thiserror::Error;

/// Content types accepted for uploads.
pub const ALLOWED_CONTENT_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/gif"];

/// Errors produced while resizing.
#[derive(Error, Debug)]
pub enum ImageError {
    /// Not PNG, JPEG or GIF
    #[error("Unsupported image format")]
    UnsupportedFormat,

    /// Decoding or encoding failed
    #[error("Image codec error: {0}")]
    Codec(#[from] image::ImageError),
}

/// A derived copy of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeVariant {
    /// Variant name, for logs
    pub name: String,
    /// Longest side of the output, in pixels
    pub max_dimension: u32,
    /// Appended to the original blob name
    pub suffix: String,
}

impl ResizeVariant {
    /// Creates a variant.
    #[must_use]
    pub fn new(name: impl Into<String>, max_dimension: u32, suffix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_dimension,
            suffix: suffix.into(),
        }
    }

    /// Thumbnail variant (`_thumb`).
    #[must_use]
    pub fn thumbnail(max_dimension: u32) -> Self {
        Self::new("thumbnail", max_dimension, "_thumb")
    }

    /// Display variant (`_display`).
    #[must_use]
    pub fn display(max_dimension: u32) -> Self {
        Self::new("display", max_dimension, "_display")
    }

    /// Blob name of this variant of `original`.
    #[must_use]
    pub fn filename(&self, original: &str) -> String {
        format!("{original}{}", self.suffix)
    }
}

/// Variants produced for every upload.
#[must_use]
pub fn default_variants(config: &ImageConfig) -> Vec<ResizeVariant> {
    vec![
        ResizeVariant::thumbnail(config.thumbnail_size),
        ResizeVariant::display(config.display_size),
    ]
}

fn supported(format: ImageFormat) -> Option<&'static str> {
    let content_type = format.to_mime_type();
    ALLOWED_CONTENT_TYPES
        .contains(&content_type)
        .then_some(content_type)
}

/// Content type of `bytes`, if it is an accepted image format.
#[must_use]
pub fn detect_content_type(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().and_then(supported)
}

/// Downscales `bytes` so neither side exceeds the variant's dimension.
///
/// The output keeps the input format and aspect ratio. Images that already
/// fit are returned unchanged.
///
/// # Errors
///
/// [`ImageError::UnsupportedFormat`] for formats outside
/// [`ALLOWED_CONTENT_TYPES`], [`ImageError::Codec`] when decoding or encoding
/// fails.
pub fn resize(bytes: &[u8], variant: &ResizeVariant) -> Result<Vec<u8>, ImageError> {
    let format = image::guess_format(bytes)?;
    if supported(format).is_none() {
        return Err(ImageError::UnsupportedFormat);
    }

    let decoded = image::load_from_memory_with_format(bytes, format)?;
    if decoded.width() <= variant.max_dimension && decoded.height() <= variant.max_dimension {
        return Ok(bytes.to_vec());
    }

    let scaled = decoded.thumbnail(variant.max_dimension, variant.max_dimension);
    let mut encoded = Cursor::new(Vec::new());
    scaled.write_to(&mut encoded, format)?;
    Ok(encoded.into_inner())
}
