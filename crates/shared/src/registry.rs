//! Live markers, grouped by category.
//!
//! The registry follows an externally owned selection set. Each call to
//! [`MarkerRegistry::reconcile`] loads categories that became selected and
//! tears down the ones that were deselected. Markers of a category live in a
//! flat arena; everything else refers to them by index.
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::cache::AssetCache;
use crate::icon::{IconConfig, MarkerIcon};
use crate::models::{CategoryId, CategoryMeta, Level, MarkerRecord, Placement, Position};
use crate::scene::{Drawable, DrawableId, Scene};
use crate::transform::MarkerTransform;

/// Source of category metadata and marker records.
pub trait MarkerDataProvider {
    fn category(&self, id: CategoryId) -> Option<CategoryMeta>;
    fn get_records(&self, id: CategoryId) -> Result<Vec<MarkerRecord>, String>;
}

#[derive(Debug, Clone)]
pub struct Marker {
    id: u64,
    category: CategoryId,
    logical: Position,
    level: Level,
    anchor: Position,
    placement: Placement,
    drawable: DrawableId,
    metadata: serde_json::Value,
}

impl Marker {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn category(&self) -> CategoryId {
        self.category
    }

    /// Map-space position. Fixed for the marker's lifetime.
    pub fn logical_position(&self) -> Position {
        self.logical
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn drawable(&self) -> DrawableId {
        self.drawable
    }

    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }
}

/// What a single reconcile pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub loaded: Vec<CategoryId>,
    pub unloaded: Vec<CategoryId>,
    pub failed: Vec<CategoryId>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty() && self.unloaded.is_empty() && self.failed.is_empty()
    }
}

pub struct MarkerRegistry {
    transform: MarkerTransform,
    icons: AssetCache,
    icon_config: IconConfig,
    zoom: f64,
    categories: BTreeMap<CategoryId, Vec<Marker>>,
    // Selected categories that could not be loaded. They are not retried
    // until they leave the selection.
    failed: BTreeSet<CategoryId>,
}

impl MarkerRegistry {
    pub fn new(transform: MarkerTransform, icons: AssetCache, icon_config: IconConfig) -> Self {
        MarkerRegistry {
            transform,
            icons,
            icon_config,
            zoom: 1.0,
            categories: BTreeMap::new(),
            failed: BTreeSet::new(),
        }
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn icons(&self) -> &AssetCache {
        &self.icons
    }

    pub fn icons_mut(&mut self) -> &mut AssetCache {
        &mut self.icons
    }

    pub fn loaded_categories(&self) -> impl Iterator<Item = CategoryId> + '_ {
        self.categories.keys().copied()
    }

    pub fn is_loaded(&self, id: CategoryId) -> bool {
        self.categories.contains_key(&id)
    }

    pub fn marker_count(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    /// Markers of a category in load order. Empty when it is not loaded.
    pub fn markers_of(&self, id: CategoryId) -> &[Marker] {
        self.categories.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Bring the loaded categories in line with `selected`.
    pub fn reconcile(
        &mut self,
        selected: &BTreeSet<CategoryId>,
        provider: &dyn MarkerDataProvider,
        scene: &mut dyn Scene,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let stale: Vec<CategoryId> = self
            .categories
            .keys()
            .filter(|id| !selected.contains(id))
            .copied()
            .collect();
        for id in stale {
            self.unload(id, scene);
            report.unloaded.push(id);
        }
        self.failed.retain(|id| selected.contains(id));

        for &id in selected {
            if self.categories.contains_key(&id) || self.failed.contains(&id) {
                continue;
            }
            match self.load(id, provider, scene) {
                Ok(count) => {
                    tracing::info!(category = id, markers = count, "Loaded category");
                    report.loaded.push(id);
                }
                Err(e) => {
                    tracing::warn!(category = id, error = %e, "Category failed to load");
                    self.failed.insert(id);
                    report.failed.push(id);
                }
            }
        }

        report
    }

    fn unload(&mut self, id: CategoryId, scene: &mut dyn Scene) {
        if let Some(markers) = self.categories.remove(&id) {
            for marker in &markers {
                scene.remove_drawable(marker.drawable);
            }
            tracing::info!(category = id, markers = markers.len(), "Unloaded category");
        }
    }

    fn load(
        &mut self,
        id: CategoryId,
        provider: &dyn MarkerDataProvider,
        scene: &mut dyn Scene,
    ) -> Result<usize, String> {
        let meta = provider
            .category(id)
            .ok_or_else(|| format!("No metadata for category {}", id))?;
        let records = provider.get_records(id)?;
        if records.is_empty() {
            tracing::debug!(category = id, "Category has no markers");
        }

        // Build every drawable before touching the scene so a category is
        // either fully present or absent.
        let staged: Vec<(MarkerRecord, Drawable)> = records
            .into_iter()
            .map(|record| {
                let icon =
                    MarkerIcon::compose(&mut self.icons, &self.icon_config, record.level, &meta.icon_path);
                let logical = Position::new(record.x, record.y);
                let placement = self.transform.place(logical, icon.anchor, self.zoom);
                let drawable = Drawable {
                    marker_id: record.id,
                    category: id,
                    icon,
                    placement,
                };
                (record, drawable)
            })
            .collect();

        let markers: Vec<Marker> = staged
            .into_iter()
            .map(|(record, drawable)| {
                let anchor = drawable.icon.anchor;
                let placement = drawable.placement;
                let handle = scene.add_drawable(drawable);
                Marker {
                    id: record.id,
                    category: id,
                    logical: Position::new(record.x, record.y),
                    level: record.level,
                    anchor,
                    placement,
                    drawable: handle,
                    metadata: record.raw_metadata,
                }
            })
            .collect();

        let count = markers.len();
        self.categories.insert(id, markers);
        Ok(count)
    }

    /// Re-place every live marker for a new zoom level.
    pub fn on_zoom_changed(&mut self, zoom: f64, scene: &mut dyn Scene) {
        self.zoom = zoom;
        for markers in self.categories.values_mut() {
            for marker in markers.iter_mut() {
                marker.placement = self.transform.place(marker.logical, marker.anchor, zoom);
                scene.update_drawable(marker.drawable, marker.placement);
            }
        }
    }
}
