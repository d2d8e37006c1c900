//! Stamp image normalization.
//!
//! A user-supplied stamp can be any raster format the `image` crate decodes.
//! Before it is embedded as the signature graphic it is turned into a JPEG of
//! exactly the configured size with no transparency left:
//!
//! 1. decode
//! 2. resize to the target size (stretching, aspect ratio is not preserved)
//! 3. flatten onto white when the file name has a `.png` extension
//! 4. encode as JPEG
//!
//! Transparency is detected from the extension, not from the pixels. A PNG
//! supplied under another name keeps whatever colour its transparent pixels
//! carry.

use crate::config::SignerConfig;
use crate::error::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, Rgb, RgbImage};
use std::path::Path;

/// A named stamp image as supplied by the caller.
#[derive(Clone)]
pub struct StampImage {
    /// File name, used for its extension
    pub name: String,
    /// Raw encoded image bytes
    pub data: Vec<u8>,
}

impl StampImage {
    /// Create a stamp image from a file name and its contents.
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Read a stamp image from disk, keeping the file name.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { name, data })
    }
}

impl std::fmt::Debug for StampImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StampImage")
            .field("name", &self.name)
            .field("data", &format!("{} bytes", self.data.len()))
            .finish()
    }
}

/// JPEG stamp ready to be embedded.
#[derive(Debug, Clone)]
pub struct NormalizedStamp {
    /// Baseline JPEG bytes, three colour components
    pub jpeg: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Turns arbitrary stamp images into fixed-size opaque JPEGs.
#[derive(Debug, Clone, Copy)]
pub struct ImageNormalizer {
    width: u32,
    height: u32,
    quality: u8,
}

impl ImageNormalizer {
    /// Create a normalizer for the given target size and JPEG quality.
    pub fn new(width: u32, height: u32, quality: u8) -> Self {
        Self {
            width,
            height,
            quality: quality.clamp(1, 100),
        }
    }

    /// Normalizer using the stamp size and quality of a configuration.
    pub fn from_config(config: &SignerConfig) -> Self {
        Self::new(config.stamp_width, config.stamp_height, config.jpeg_quality)
    }

    /// Target size in pixels.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Run the whole pipeline on a stamp image.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidArgument` if the target size has a zero dimension
    /// - `Error::Decode` if the image cannot be decoded or encoded
    pub fn normalize(&self, stamp: &StampImage) -> Result<NormalizedStamp> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidArgument(format!(
                "stamp target size must be positive, got {}x{}",
                self.width, self.height
            )));
        }

        let decoded = image::load_from_memory(&stamp.data)
            .map_err(|e| Error::Decode(format!("{}: {}", stamp.name, e)))?;
        log::debug!(
            "Decoded stamp '{}' ({}x{}, {:?})",
            stamp.name,
            decoded.width(),
            decoded.height(),
            decoded.color()
        );

        let resized = resize(&decoded, self.width, self.height);
        let opaque = if has_transparency_extension(&stamp.name) {
            flatten_onto_white(&resized)
        } else {
            resized.to_rgb8()
        };

        let jpeg = encode_jpeg(&opaque, self.quality)?;
        Ok(NormalizedStamp {
            jpeg,
            width: opaque.width(),
            height: opaque.height(),
        })
    }
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::from_config(&SignerConfig::default())
    }
}

/// Whether a file name has the `.png` extension (any case).
pub fn has_transparency_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("png"))
        .unwrap_or(false)
}

/// Stretch an image to exactly `width` x `height` with Lanczos resampling.
pub fn resize(image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    image.resize_exact(width, height, FilterType::Lanczos3)
}

/// Composite an image over an opaque white background.
pub fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Encode an RGB image as baseline JPEG.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)
        .map_err(|e| Error::Decode(format!("JPEG encoding failed: {}", e)))?;
    Ok(out)
}
