//! The drawing surface the core talks to.
//!
//! The core never renders anything itself. It hands drawables and overlay
//! annotations to a [`Scene`] and keeps only the returned handles.
use serde::{Deserialize, Serialize};

use crate::icon::MarkerIcon;
use crate::models::{CategoryId, Placement, Position, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DrawableId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverlayHandle(pub u64);

/// A marker as the scene sees it.
#[derive(Debug, Clone)]
pub struct Drawable {
    pub marker_id: u64,
    pub category: CategoryId,
    pub icon: MarkerIcon,
    pub placement: Placement,
}

impl Drawable {
    /// Scene-space bounds of the icon.
    ///
    /// Icons scale about their anchor, so the top-left corner moves toward
    /// the anchor as the scale shrinks.
    pub fn scene_rect(&self) -> Rect {
        scaled_rect(&self.icon, self.placement)
    }
}

pub fn scaled_rect(icon: &MarkerIcon, placement: Placement) -> Rect {
    let s = placement.scale;
    let origin = placement.position + icon.anchor * (1.0 - s);
    Rect::new(origin.x, origin.y, icon.width() * s, icon.height() * s)
}

/// Translucent box with a member-count label drawn over a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOverlay {
    pub rect: Rect,
    pub label: String,
    pub label_position: Position,
}

pub trait Scene {
    fn add_drawable(&mut self, item: Drawable) -> DrawableId;
    fn update_drawable(&mut self, id: DrawableId, placement: Placement);
    fn remove_drawable(&mut self, id: DrawableId);
    fn bounding_box(&self, id: DrawableId) -> Option<Rect>;
    fn set_selected(&mut self, id: DrawableId, selected: bool);
    fn draw_overlay_rect(&mut self, overlay: ClusterOverlay) -> OverlayHandle;
    fn clear_overlays(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Bitmap;
    use image::RgbaImage;

    fn icon() -> MarkerIcon {
        MarkerIcon {
            base: Bitmap::from_image(RgbaImage::new(100, 200)),
            badge: Bitmap::empty(),
            badge_offset: Position::default(),
            anchor: Position::new(50.0, 200.0),
        }
    }

    #[test]
    fn test_scene_rect_unit_scale() {
        let r = scaled_rect(
            &icon(),
            Placement {
                position: Position::new(10.0, 20.0),
                scale: 1.0,
            },
        );
        assert_eq!(r, Rect::new(10.0, 20.0, 100.0, 200.0));
    }

    #[test]
    fn test_scene_rect_scales_about_anchor() {
        let r = scaled_rect(
            &icon(),
            Placement {
                position: Position::new(0.0, 0.0),
                scale: 0.5,
            },
        );
        // Anchor stays put at (50, 200)
        assert!((r.x - 25.0).abs() < 1e-9);
        assert!((r.y - 100.0).abs() < 1e-9);
        assert!((r.x + 0.5 * 50.0 - 50.0).abs() < 1e-9);
        assert!((r.bottom() - 200.0).abs() < 1e-9);
    }
}
