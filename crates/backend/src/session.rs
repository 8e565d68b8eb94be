use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use markermap_shared::cache::{AssetCache, Bitmap, IconLayer};
use markermap_shared::cluster::{Cluster, ClusteringEngine};
use markermap_shared::models::CategoryId;
use markermap_shared::registry::{MarkerRegistry, ReconcileReport};
use markermap_shared::zoom::ZoomController;
use markermap_shared::Calibration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::dataset::Dataset;
use crate::scene::InMemoryScene;

/// One viewer's state: what is selected, what is loaded and how it is drawn.
///
/// The core is single-threaded, so the session is only ever touched under
/// the [`SharedSession`] lock.
pub struct MapSession {
    dataset: Dataset,
    registry: MarkerRegistry,
    engine: ClusteringEngine,
    scene: InMemoryScene,
    selected: BTreeSet<CategoryId>,
    zoom: ZoomController,
}

pub type SharedSession = Arc<Mutex<MapSession>>;

impl MapSession {
    pub fn new(dataset: Dataset, calibration: &Calibration, icons: AssetCache) -> Self {
        let mut registry = MarkerRegistry::new(
            calibration.marker_transform(),
            icons,
            calibration.icon.clone(),
        );
        let zoom = calibration.zoom;
        let mut scene = InMemoryScene::default();
        registry.on_zoom_changed(zoom.current(), &mut scene);

        MapSession {
            dataset,
            registry,
            engine: ClusteringEngine::new(calibration.cluster),
            scene,
            selected: BTreeSet::new(),
            zoom,
        }
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn registry(&self) -> &MarkerRegistry {
        &self.registry
    }

    pub fn scene(&self) -> &InMemoryScene {
        &self.scene
    }

    pub fn selected(&self) -> &BTreeSet<CategoryId> {
        &self.selected
    }

    /// Add a category to the selection. It is loaded on the next poll.
    pub fn select(&mut self, id: CategoryId) -> Result<bool, String> {
        if !self.dataset.contains(id) {
            return Err(format!("Unknown category {}", id));
        }
        Ok(self.selected.insert(id))
    }

    pub fn deselect(&mut self, id: CategoryId) -> bool {
        self.selected.remove(&id)
    }

    /// Bring loaded markers in line with the selection.
    pub fn poll(&mut self) -> ReconcileReport {
        self.registry
            .reconcile(&self.selected, &self.dataset, &mut self.scene)
    }

    pub fn zoom(&self) -> f64 {
        self.zoom.current()
    }

    pub fn set_zoom(&mut self, zoom: f64) -> f64 {
        let zoom = self.zoom.set(zoom);
        self.registry.on_zoom_changed(zoom, &mut self.scene);
        zoom
    }

    /// One wheel notch. Steps past the zoom bounds leave everything as is.
    pub fn zoom_step(&mut self, zoom_in: bool) -> f64 {
        if self.zoom.step(zoom_in) {
            self.registry
                .on_zoom_changed(self.zoom.current(), &mut self.scene);
        }
        self.zoom.current()
    }

    pub fn find_clusters(
        &mut self,
        category: CategoryId,
        radius: f64,
        max_clusters: usize,
        mark: bool,
    ) -> Result<Vec<Cluster>, String> {
        self.engine.find_clusters(
            &self.registry,
            &mut self.scene,
            category,
            radius,
            max_clusters,
            mark,
        )
    }

    pub fn clear_clusters(&mut self) {
        self.engine.clear_marks(&mut self.scene);
    }

    pub fn icon(&mut self, layer: IconLayer, path: &str, width: u32, height: u32) -> Bitmap {
        self.registry.icons_mut().get(layer, path, width, height)
    }
}

/// Reconcile the session on a fixed period until the task is aborted.
///
/// A reconcile decodes icons from disk, so it runs on the blocking pool
/// under the session lock. The next tick is awaited only once it finishes,
/// and late ticks are skipped rather than bunched up.
pub fn spawn_poller(session: SharedSession, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let shared = session.clone();
            match tokio::task::spawn_blocking(move || shared.blocking_lock().poll()).await {
                Ok(report) if !report.is_empty() => tracing::debug!(
                    loaded = ?report.loaded,
                    unloaded = ?report.unloaded,
                    failed = ?report.failed,
                    "Reconciled selection"
                ),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Reconcile task failed"),
            }
        }
    })
}
