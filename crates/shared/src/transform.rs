//! Zoom-adaptive marker placement.
//!
//! Every constant here is fitted to one rendering stack: icons are scaled
//! about their own origin, which drifts the visible pin tip as the zoom
//! changes. The compensation curve pulls it back. A different renderer needs
//! its own calibration, not these numbers.
use serde::{Deserialize, Serialize};

use crate::models::{Placement, Position};

/// Display scale clamp: `scale = clamp(k / zoom, min_scale, max_scale)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScaleCalibration {
    pub k: f64,
    pub min_scale: f64,
    pub max_scale: f64,
}

impl Default for ScaleCalibration {
    fn default() -> Self {
        ScaleCalibration {
            k: 0.5,
            min_scale: 0.02,
            max_scale: 1.75,
        }
    }
}

impl ScaleCalibration {
    pub fn scale_for(&self, zoom: f64) -> f64 {
        // NaN and non-positive zoom behave like the smallest possible zoom.
        if zoom.is_nan() || zoom <= 0.0 {
            return self.max_scale;
        }
        (self.k / zoom).clamp(self.min_scale, self.max_scale)
    }
}

/// Zoom-dependent correction added to a marker's display position.
pub trait ZoomCompensation {
    fn offset(&self, zoom: f64) -> Position;
}

/// Reverse linear remap of zoom onto an offset magnitude.
///
/// Zoom is clamped into `[x_min, x_max]`; `x_max` maps to `min_val` and
/// `x_min` maps to `max_val`. The magnitude is weighted separately per axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReverseLinearRemap {
    pub min_val: f64,
    pub max_val: f64,
    pub x_min: f64,
    pub x_max: f64,
    pub x_weight: f64,
    pub y_weight: f64,
}

impl Default for ReverseLinearRemap {
    fn default() -> Self {
        ReverseLinearRemap {
            min_val: 0.01,
            max_val: 40.0,
            x_min: 0.02,
            x_max: 1.75,
            x_weight: 0.5,
            y_weight: 1.0,
        }
    }
}

impl ReverseLinearRemap {
    pub fn magnitude(&self, zoom: f64) -> f64 {
        let span = self.x_max - self.x_min;
        if span <= 0.0 {
            return self.min_val;
        }
        let clamped = if zoom.is_nan() {
            self.x_min
        } else {
            zoom.clamp(self.x_min, self.x_max)
        };
        let t = (self.x_max - clamped) / span;
        self.min_val + t * (self.max_val - self.min_val)
    }
}

impl ZoomCompensation for ReverseLinearRemap {
    fn offset(&self, zoom: f64) -> Position {
        let m = self.magnitude(zoom);
        Position::new(m * self.x_weight, m * self.y_weight)
    }
}

/// Maps a marker's logical position to its display placement at a zoom.
#[derive(Debug, Clone, Default)]
pub struct MarkerTransform<C = ReverseLinearRemap> {
    pub scale: ScaleCalibration,
    pub compensation: C,
}

impl<C: ZoomCompensation> MarkerTransform<C> {
    pub fn new(scale: ScaleCalibration, compensation: C) -> Self {
        MarkerTransform {
            scale,
            compensation,
        }
    }

    /// `anchor` is the offset from the icon's origin to its visual pin tip.
    pub fn place(&self, logical: Position, anchor: Position, zoom: f64) -> Placement {
        Placement {
            position: logical - anchor + self.compensation.offset(zoom),
            scale: self.scale.scale_for(zoom),
        }
    }
}
