use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::cache::{AssetCache, Bitmap, IconLayer};
use crate::models::{Level, Position};

/// Geometry and asset paths for composite marker icons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IconConfig {
    pub surface_pointer: String,
    pub underground_pointer: String,
    /// Pin tip of the pointer artwork, in source-image pixels.
    pub anchor: Position,
    pub size: u32,
    pub badge_ratio: f64,
}

impl Default for IconConfig {
    fn default() -> Self {
        IconConfig {
            surface_pointer: "icons/arrow_pointer.png".to_string(),
            underground_pointer: "icons/underground_arrow_pointer.png".to_string(),
            anchor: Position::new(63.5, 110.0),
            size: 100,
            badge_ratio: 0.65,
        }
    }
}

impl IconConfig {
    pub fn pointer_for(&self, level: Level) -> &str {
        match level {
            Level::Surface => &self.surface_pointer,
            Level::Underground => &self.underground_pointer,
        }
    }
}

/// A pointer icon with a round category badge set into it.
#[derive(Debug, Clone)]
pub struct MarkerIcon {
    pub base: Bitmap,
    pub badge: Bitmap,
    /// Badge position relative to the base bitmap's top-left corner.
    pub badge_offset: Position,
    /// Pin tip relative to the base bitmap's top-left corner.
    pub anchor: Position,
}

impl MarkerIcon {
    /// Build the icon for a marker on `level` wearing the badge at `badge_path`.
    pub fn compose(
        cache: &mut AssetCache,
        config: &IconConfig,
        level: Level,
        badge_path: &str,
    ) -> MarkerIcon {
        let size = config.size;
        let base = cache.get(IconLayer::Base, config.pointer_for(level), size, size);

        let badge_size = (size as f64 * config.badge_ratio) as u32;
        let badge = cache.get(IconLayer::Overlay, badge_path, badge_size, badge_size);
        let badge = match badge.image() {
            Some(img) => Bitmap::from_image(circular_crop(img)),
            None => badge,
        };

        let (bw, bh) = (base.width() as f64, base.height() as f64);
        let (ow, oh) = (badge.width() as f64, badge.height() as f64);
        let badge_offset = Position::new((bw - ow) / 2.0, (bh - oh) / 2.0 - bh / 10.0);

        let longest = bw.max(bh);
        let anchor = if longest > 0.0 {
            config.anchor * (size as f64 / longest)
        } else {
            config.anchor
        };

        MarkerIcon {
            base,
            badge,
            badge_offset,
            anchor,
        }
    }

    pub fn width(&self) -> f64 {
        self.base.width() as f64
    }

    pub fn height(&self) -> f64 {
        self.base.height() as f64
    }
}

/// Square-crop `src` around its centre and clear everything outside the
/// inscribed circle.
pub fn circular_crop(src: &RgbaImage) -> RgbaImage {
    let side = src.width().min(src.height());
    let x0 = (src.width() - side) / 2;
    let y0 = (src.height() - side) / 2;
    let radius = side as f64 / 2.0;

    RgbaImage::from_fn(side, side, |x, y| {
        let dx = x as f64 + 0.5 - radius;
        let dy = y as f64 + 0.5 - radius;
        if dx * dx + dy * dy <= radius * radius {
            *src.get_pixel(x0 + x, y0 + y)
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::MemorySource;

    fn cache() -> AssetCache {
        let src = MemorySource::default()
            .with("icons/arrow_pointer.png", 127, 220)
            .with("icons/underground_arrow_pointer.png", 127, 220)
            .with("badges/42.jpg", 80, 80);
        AssetCache::new(src)
    }

    #[test]
    fn test_circular_crop_clears_corners() {
        let src = RgbaImage::from_pixel(10, 6, Rgba([255, 255, 255, 255]));
        let out = circular_crop(&src);
        assert_eq!(out.dimensions(), (6, 6));
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(5, 5)[3], 0);
        assert_eq!(out.get_pixel(3, 3)[3], 255);
    }

    #[test]
    fn test_compose_geometry() {
        let mut cache = cache();
        let icon = MarkerIcon::compose(&mut cache, &IconConfig::default(), Level::Surface, "badges/42.jpg");
        // 127x220 fitted into 100x100 -> 58x100
        assert_eq!(icon.base.height(), 100);
        assert_eq!(icon.badge.width(), 65);
        assert_eq!(icon.badge.height(), 65);
        assert!((icon.badge_offset.y - (17.5 - 10.0)).abs() < 1e-9);
        // Longest side already equals the target size, so the anchor is unscaled
        assert!((icon.anchor.x - 63.5).abs() < 1e-9);
        assert!((icon.anchor.y - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_compose_uses_both_namespaces() {
        let mut cache = cache();
        let config = IconConfig::default();
        MarkerIcon::compose(&mut cache, &config, Level::Underground, "badges/42.jpg");
        assert!(cache.contains(IconLayer::Base, "icons/underground_arrow_pointer.png", 100, 100));
        assert!(cache.contains(IconLayer::Overlay, "badges/42.jpg", 65, 65));
    }

    #[test]
    fn test_compose_missing_badge_still_builds() {
        let mut cache = cache();
        let icon = MarkerIcon::compose(&mut cache, &IconConfig::default(), Level::Surface, "badges/none.jpg");
        assert!(icon.badge.is_empty());
        assert!(!icon.base.is_empty());
    }
}
