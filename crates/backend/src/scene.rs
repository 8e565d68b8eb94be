use std::collections::BTreeMap;

use markermap_shared::models::{Placement, Rect};
use markermap_shared::scene::{ClusterOverlay, Drawable, DrawableId, OverlayHandle, Scene};

pub struct SceneItem {
    pub drawable: Drawable,
    pub selected: bool,
}

/// Scene that keeps drawables in memory for clients to query.
#[derive(Default)]
pub struct InMemoryScene {
    next_drawable: u64,
    next_overlay: u64,
    items: BTreeMap<DrawableId, SceneItem>,
    overlays: Vec<(OverlayHandle, ClusterOverlay)>,
}

impl InMemoryScene {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: DrawableId) -> Option<&SceneItem> {
        self.items.get(&id)
    }

    pub fn selected_count(&self) -> usize {
        self.items.values().filter(|item| item.selected).count()
    }

    pub fn overlays(&self) -> impl Iterator<Item = &ClusterOverlay> {
        self.overlays.iter().map(|(_, overlay)| overlay)
    }
}

impl Scene for InMemoryScene {
    fn add_drawable(&mut self, item: Drawable) -> DrawableId {
        self.next_drawable += 1;
        let id = DrawableId(self.next_drawable);
        self.items.insert(
            id,
            SceneItem {
                drawable: item,
                selected: false,
            },
        );
        id
    }

    fn update_drawable(&mut self, id: DrawableId, placement: Placement) {
        match self.items.get_mut(&id) {
            Some(item) => item.drawable.placement = placement,
            None => tracing::debug!(id = id.0, "Update for unknown drawable"),
        }
    }

    fn remove_drawable(&mut self, id: DrawableId) {
        self.items.remove(&id);
    }

    fn bounding_box(&self, id: DrawableId) -> Option<Rect> {
        self.items.get(&id).map(|item| item.drawable.scene_rect())
    }

    fn set_selected(&mut self, id: DrawableId, selected: bool) {
        if let Some(item) = self.items.get_mut(&id) {
            item.selected = selected;
        }
    }

    fn draw_overlay_rect(&mut self, overlay: ClusterOverlay) -> OverlayHandle {
        self.next_overlay += 1;
        let handle = OverlayHandle(self.next_overlay);
        self.overlays.push((handle, overlay));
        handle
    }

    fn clear_overlays(&mut self) {
        self.overlays.clear();
    }
}
