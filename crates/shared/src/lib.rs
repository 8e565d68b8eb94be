//! Marker clustering, zoom-adaptive placement and icon caching for a tiled
//! map viewer.
//!
//! Everything here runs on a single thread. Hosts that load data in the
//! background must hand results back to the owning thread before calling in.
pub mod cache;
pub mod cluster;
pub mod grid;
pub mod icon;
pub mod models;
pub mod registry;
pub mod scene;
pub mod transform;
pub mod zoom;

use serde::{Deserialize, Serialize};

/// Every empirically tuned constant in one place.
///
/// The defaults are fitted to one renderer's geometry and must be
/// recalibrated for another.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Calibration {
    pub scale: transform::ScaleCalibration,
    pub compensation: transform::ReverseLinearRemap,
    pub cluster: cluster::ClusterConfig,
    pub icon: icon::IconConfig,
    pub map: grid::MapCalibration,
    pub zoom: zoom::ZoomController,
}

impl Calibration {
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("Failed to parse calibration: {}", e))
    }

    pub fn marker_transform(&self) -> transform::MarkerTransform {
        transform::MarkerTransform::new(self.scale, self.compensation)
    }
}
