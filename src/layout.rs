//! Placement of visible signature stamps.
//!
//! PDF page coordinates have their origin in the bottom-left corner. A stamp
//! is anchored toward the top-right of the page, offset by a right margin and
//! a vertical margin. When the stamp does not fit, the affected coordinate is
//! clamped to the page origin so the rectangle never leaves the page to the
//! left or below.

use crate::config::SignerConfig;
use serde::{Deserialize, Serialize};

/// Which page edge the vertical margin is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VerticalAnchor {
    /// `y = page_height - stamp_height - margin` (stamp hangs below the top edge)
    #[default]
    Top,
    /// `y = margin` when the stamp fits vertically, otherwise 0
    Bottom,
}

/// On-page rectangle of a visible stamp, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StampGeometry {
    /// Left edge
    pub x: f32,
    /// Bottom edge
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl StampGeometry {
    /// Create a new geometry.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle as `[llx, lly, urx, ury]`.
    pub fn to_rect(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }
}

/// Compute the lower-left corner of a stamp anchored at the top-right.
///
/// `x = max(0, page_width - stamp_width - margin_right)` and
/// `y = max(0, page_height - stamp_height - margin_bottom)`.
///
/// # Examples
///
/// ```
/// use pdf_signet::layout::place;
///
/// assert_eq!(place(600.0, 800.0, 150.0, 150.0, 5.0, 5.0), (445.0, 645.0));
/// assert_eq!(place(100.0, 100.0, 150.0, 150.0, 5.0, 5.0), (0.0, 0.0));
/// ```
pub fn place(
    page_width: f32,
    page_height: f32,
    stamp_width: f32,
    stamp_height: f32,
    margin_right: f32,
    margin_bottom: f32,
) -> (f32, f32) {
    let x = (page_width - stamp_width - margin_right).max(0.0);
    let y = (page_height - stamp_height - margin_bottom).max(0.0);
    (x, y)
}

/// Stamp size, margins and anchor taken together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StampLayout {
    /// Stamp width in points
    pub width: f32,
    /// Stamp height in points
    pub height: f32,
    /// Distance from the right page edge
    pub margin_right: f32,
    /// Vertical margin, see [`VerticalAnchor`]
    pub margin_bottom: f32,
    /// Edge the vertical margin is measured against
    pub anchor: VerticalAnchor,
}

impl StampLayout {
    /// Layout described by a signer configuration.
    pub fn from_config(config: &SignerConfig) -> Self {
        Self {
            width: config.stamp_width as f32,
            height: config.stamp_height as f32,
            margin_right: config.margin_right,
            margin_bottom: config.margin_bottom,
            anchor: config.vertical_anchor,
        }
    }

    /// Stamp rectangle for a page of the given size.
    pub fn geometry(&self, page_width: f32, page_height: f32) -> StampGeometry {
        let (x, top_y) = place(
            page_width,
            page_height,
            self.width,
            self.height,
            self.margin_right,
            self.margin_bottom,
        );
        let y = match self.anchor {
            VerticalAnchor::Top => top_y,
            VerticalAnchor::Bottom => {
                if page_height - self.height - self.margin_bottom >= 0.0 {
                    self.margin_bottom
                } else {
                    0.0
                }
            },
        };
        log::debug!(
            "Stamp {}x{} on {}x{} page at ({}, {})",
            self.width,
            self.height,
            page_width,
            page_height,
            x,
            y
        );
        StampGeometry::new(x, y, self.width, self.height)
    }
}
