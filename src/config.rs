//! Configuration for stamp signing.
//!
//! One [`SignerConfig`] is held by one [`StampSigner`](crate::StampSigner).
//! All stamp, font and digest defaults live here rather than in global state.
//!
//! # Example
//!
//! ```
//! use pdf_signet::config::SignerConfig;
//! use pdf_signet::layout::VerticalAnchor;
//!
//! let config = SignerConfig::default()
//!     .with_stamp_size(200, 80)
//!     .with_margins(36.0, 36.0)
//!     .with_vertical_anchor(VerticalAnchor::Bottom);
//! assert!(config.validate().is_ok());
//! ```

use crate::error::{Error, Result};
use crate::layout::VerticalAnchor;
use crate::signatures::{DigestAlgorithm, StandardFont};
use serde::{Deserialize, Serialize};

/// Default signature reservation in bytes.
pub const DEFAULT_ESTIMATED_SIGNATURE_SIZE: usize = crate::signatures::DEFAULT_ESTIMATED_SIZE;

/// Signing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Stamp width in pixels; also its width on the page in points.
    pub stamp_width: u32,

    /// Stamp height in pixels; also its height on the page in points.
    pub stamp_height: u32,

    /// Distance between the stamp and the right page edge.
    pub margin_right: f32,

    /// Vertical distance used by the stamp anchor.
    pub margin_bottom: f32,

    /// Which page edge `margin_bottom` is measured against.
    pub vertical_anchor: VerticalAnchor,

    /// JPEG quality for normalized stamp images (1-100).
    pub jpeg_quality: u8,

    /// Font for the textual signature description.
    pub font: StandardFont,

    /// Font size for the textual signature description.
    pub font_size: f32,

    /// Digest algorithm for the signature.
    pub digest: DigestAlgorithm,

    /// Bytes reserved for the CMS container.
    pub estimated_signature_size: usize,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SignerConfig {
    /// Create new configuration with defaults.
    pub fn new() -> Self {
        Self {
            stamp_width: 150,
            stamp_height: 150,
            margin_right: 20.0,
            margin_bottom: 150.0,
            vertical_anchor: VerticalAnchor::Top,
            jpeg_quality: 75,
            font: StandardFont::Helvetica,
            font_size: 12.0,
            digest: DigestAlgorithm::Sha256,
            estimated_signature_size: DEFAULT_ESTIMATED_SIGNATURE_SIZE,
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SignerConfig = serde_json::from_str(json)
            .map_err(|e| Error::InvalidArgument(format!("signer configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the stamp size.
    pub fn with_stamp_size(mut self, width: u32, height: u32) -> Self {
        self.stamp_width = width;
        self.stamp_height = height;
        self
    }

    /// Set the right and bottom margins.
    pub fn with_margins(mut self, right: f32, bottom: f32) -> Self {
        self.margin_right = right;
        self.margin_bottom = bottom;
        self
    }

    /// Set the vertical anchor.
    pub fn with_vertical_anchor(mut self, anchor: VerticalAnchor) -> Self {
        self.vertical_anchor = anchor;
        self
    }

    /// Set the JPEG quality.
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Set the description font and size.
    pub fn with_font(mut self, font: StandardFont, size: f32) -> Self {
        self.font = font;
        self.font_size = size;
        self
    }

    /// Set the digest algorithm.
    pub fn with_digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    /// Set the CMS reservation size.
    pub fn with_estimated_signature_size(mut self, size: usize) -> Self {
        self.estimated_signature_size = size;
        self
    }

    /// Check the configuration for values no signature can be built from.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for a zero stamp dimension, a JPEG
    /// quality outside 1..=100, a non-positive font size or a negative margin.
    pub fn validate(&self) -> Result<()> {
        if self.stamp_width == 0 || self.stamp_height == 0 {
            return Err(Error::InvalidArgument(format!(
                "stamp size must be positive, got {}x{}",
                self.stamp_width, self.stamp_height
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::InvalidArgument(format!(
                "JPEG quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if !(self.font_size > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "font size must be positive, got {}",
                self.font_size
            )));
        }
        if self.margin_right < 0.0 || self.margin_bottom < 0.0 {
            return Err(Error::InvalidArgument("margins must not be negative".to_string()));
        }
        Ok(())
    }
}
