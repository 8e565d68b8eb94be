use serde::{Deserialize, Serialize};

/// Wheel-driven zoom level with hard bounds.
///
/// A step that would leave `[min_zoom, max_zoom]` is dropped entirely rather
/// than clamped, so repeated steps always land on the same ladder of values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ZoomController {
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub zoom_in_factor: f64,
    pub zoom_out_factor: f64,
    current: f64,
}

impl Default for ZoomController {
    fn default() -> Self {
        ZoomController {
            min_zoom: 0.15,
            max_zoom: 3.0,
            zoom_in_factor: 1.2,
            zoom_out_factor: 0.8,
            current: 1.0,
        }
    }
}

impl ZoomController {
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Apply one wheel notch. Returns `true` when the zoom changed.
    pub fn step(&mut self, zoom_in: bool) -> bool {
        let factor = if zoom_in {
            self.zoom_in_factor
        } else {
            self.zoom_out_factor
        };
        let next = self.current * factor;
        if next < self.min_zoom || next > self.max_zoom {
            return false;
        }
        self.current = next;
        true
    }

    /// Jump to an absolute zoom, clamped into the bounds. NaN is ignored.
    pub fn set(&mut self, zoom: f64) -> f64 {
        if !zoom.is_nan() {
            self.current = zoom.clamp(self.min_zoom, self.max_zoom);
        }
        self.current
    }
}
