use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use markermap_shared::grid::MapCalibration;
use markermap_shared::models::{CategoryId, CategoryMeta, Level, MarkerRecord};
use markermap_shared::registry::MarkerDataProvider;
use serde::Deserialize;

/// Where category badge images live under the assets directory.
pub const BADGE_DIR: &str = "resources/official";

#[derive(Deserialize)]
struct RawLabel {
    id: CategoryId,
    name: String,
}

#[derive(Deserialize)]
struct RawPoint {
    id: u64,
    label_id: CategoryId,
    x_pos: f64,
    y_pos: f64,
    #[serde(default)]
    z_level: i64,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct RawDataset {
    #[serde(default)]
    label_list: Vec<RawLabel>,
    #[serde(default)]
    point_list: Vec<RawPoint>,
}

/// The full marker dataset, held in memory and grouped by category.
pub struct Dataset {
    categories: BTreeMap<CategoryId, CategoryMeta>,
    records: HashMap<CategoryId, Vec<MarkerRecord>>,
}

impl Dataset {
    pub fn load(path: &Path, calibration: &MapCalibration) -> Result<Self, String> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let dataset = Self::from_json(&data, calibration)
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        tracing::info!(
            categories = dataset.categories.len(),
            markers = dataset.record_count(),
            "Loaded marker dataset"
        );
        Ok(dataset)
    }

    pub fn from_json(json: &str, calibration: &MapCalibration) -> Result<Self, String> {
        let raw: RawDataset =
            serde_json::from_str(json).map_err(|e| format!("Failed to parse dataset: {}", e))?;

        let categories: BTreeMap<CategoryId, CategoryMeta> = raw
            .label_list
            .into_iter()
            .map(|label| {
                let meta = CategoryMeta {
                    id: label.id,
                    name: label.name,
                    icon_path: format!("{}/{}.jpg", BADGE_DIR, label.id),
                };
                (label.id, meta)
            })
            .collect();

        let mut records: HashMap<CategoryId, Vec<MarkerRecord>> = HashMap::new();
        let mut orphans = 0usize;
        for point in raw.point_list {
            if !categories.contains_key(&point.label_id) {
                orphans += 1;
                continue;
            }
            let pos = calibration.to_scene(point.x_pos, point.y_pos);
            records.entry(point.label_id).or_default().push(MarkerRecord {
                id: point.id,
                x: pos.x,
                y: pos.y,
                level: Level::from_z_level(point.z_level),
                raw_metadata: serde_json::Value::Object(point.extra),
            });
        }
        if orphans > 0 {
            tracing::warn!(points = orphans, "Skipped points with an unknown label");
        }

        Ok(Dataset { categories, records })
    }

    pub fn categories(&self) -> impl Iterator<Item = &CategoryMeta> {
        self.categories.values()
    }

    pub fn contains(&self, id: CategoryId) -> bool {
        self.categories.contains_key(&id)
    }

    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }
}

impl MarkerDataProvider for Dataset {
    fn category(&self, id: CategoryId) -> Option<CategoryMeta> {
        self.categories.get(&id).cloned()
    }

    fn get_records(&self, id: CategoryId) -> Result<Vec<MarkerRecord>, String> {
        if !self.categories.contains_key(&id) {
            return Err(format!("Unknown category {}", id));
        }
        Ok(self.records.get(&id).cloned().unwrap_or_default())
    }
}
