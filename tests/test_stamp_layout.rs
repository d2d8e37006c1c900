//! Tests for stamp placement on the page.

use pdf_signet::config::SignerConfig;
use pdf_signet::layout::{place, StampGeometry, StampLayout, VerticalAnchor};
use proptest::prelude::*;

mod place_tests {
    use super::*;

    #[test]
    fn test_a4_default_stamp() {
        // 150x150 stamp, 20pt right margin, 150pt vertical margin
        let (x, y) = place(595.0, 842.0, 150.0, 150.0, 20.0, 150.0);
        assert_eq!((x, y), (425.0, 542.0));
    }

    #[test]
    fn test_letter_default_config() {
        let geometry = StampLayout::from_config(&SignerConfig::default()).geometry(612.0, 792.0);
        assert_eq!(geometry, StampGeometry::new(442.0, 492.0, 150.0, 150.0));
        assert_eq!(geometry.to_rect(), [442.0, 492.0, 592.0, 642.0]);
    }

    #[test]
    fn test_oversized_stamp_clamps_to_origin() {
        assert_eq!(place(100.0, 80.0, 150.0, 150.0, 20.0, 150.0), (0.0, 0.0));
    }

    #[test]
    fn test_only_width_overflows() {
        assert_eq!(place(100.0, 1000.0, 150.0, 150.0, 0.0, 0.0), (0.0, 850.0));
    }
}

mod anchor_tests {
    use super::*;

    fn layout(anchor: VerticalAnchor) -> StampLayout {
        StampLayout::from_config(
            &SignerConfig::default()
                .with_stamp_size(100, 50)
                .with_margins(10.0, 30.0)
                .with_vertical_anchor(anchor),
        )
    }

    #[test]
    fn test_bottom_anchor_uses_margin() {
        let geometry = layout(VerticalAnchor::Bottom).geometry(600.0, 800.0);
        assert_eq!((geometry.x, geometry.y), (490.0, 30.0));
    }

    #[test]
    fn test_bottom_anchor_without_room() {
        let geometry = layout(VerticalAnchor::Bottom).geometry(600.0, 60.0);
        assert_eq!(geometry.y, 0.0);
    }

    #[test]
    fn test_top_anchor_matches_place() {
        let geometry = layout(VerticalAnchor::Top).geometry(600.0, 800.0);
        assert_eq!((geometry.x, geometry.y), place(600.0, 800.0, 100.0, 50.0, 10.0, 30.0));
    }
}

proptest! {
    #[test]
    fn prop_never_negative(
        page_w in 0.0f32..2000.0,
        page_h in 0.0f32..2000.0,
        stamp_w in 0.0f32..2000.0,
        stamp_h in 0.0f32..2000.0,
        margin_r in 0.0f32..500.0,
        margin_b in 0.0f32..500.0,
    ) {
        let (x, y) = place(page_w, page_h, stamp_w, stamp_h, margin_r, margin_b);
        prop_assert!(x >= 0.0);
        prop_assert!(y >= 0.0);
        if stamp_w > page_w && stamp_h > page_h {
            prop_assert_eq!((x, y), (0.0, 0.0));
        }
    }
}
