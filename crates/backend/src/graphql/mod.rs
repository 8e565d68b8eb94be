use async_graphql::{Context, Enum, Json, Object, SimpleObject};
use markermap_shared::cache::{CacheStats, IconLayer};
use markermap_shared::cluster::Cluster;
use markermap_shared::models::{CategoryId, Level, Position, Rect};
use markermap_shared::registry::Marker;
use markermap_shared::scene::ClusterOverlay;

use crate::session::SharedSession;

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
pub enum GqlLevel {
    Surface,
    Underground,
}

impl From<Level> for GqlLevel {
    fn from(l: Level) -> Self {
        match l {
            Level::Surface => GqlLevel::Surface,
            Level::Underground => GqlLevel::Underground,
        }
    }
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
pub enum GqlIconLayer {
    Base,
    Overlay,
}

impl From<GqlIconLayer> for IconLayer {
    fn from(l: GqlIconLayer) -> Self {
        match l {
            GqlIconLayer::Base => IconLayer::Base,
            GqlIconLayer::Overlay => IconLayer::Overlay,
        }
    }
}

// GraphQL output types

#[derive(SimpleObject, Clone)]
pub struct GqlPosition {
    pub x: f64,
    pub y: f64,
}

impl From<Position> for GqlPosition {
    fn from(p: Position) -> Self {
        GqlPosition { x: p.x, y: p.y }
    }
}

#[derive(SimpleObject)]
pub struct GqlRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl From<Rect> for GqlRect {
    fn from(r: Rect) -> Self {
        GqlRect {
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlCategory {
    pub id: CategoryId,
    pub name: String,
    pub icon_path: String,
    pub selected: bool,
    pub loaded: bool,
}

#[derive(SimpleObject)]
pub struct GqlMarker {
    pub id: u64,
    pub category_id: CategoryId,
    pub level: GqlLevel,
    pub position: GqlPosition,
    pub display_position: GqlPosition,
    pub scale: f64,
    pub metadata: Json<serde_json::Value>,
}

impl From<&Marker> for GqlMarker {
    fn from(m: &Marker) -> Self {
        let placement = m.placement();
        GqlMarker {
            id: m.id(),
            category_id: m.category(),
            level: m.level().into(),
            position: m.logical_position().into(),
            display_position: placement.position.into(),
            scale: placement.scale,
            metadata: Json(m.metadata().clone()),
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlCluster {
    pub category_id: CategoryId,
    pub size: usize,
    pub marker_ids: Vec<u64>,
    pub bounds: GqlRect,
}

impl From<Cluster> for GqlCluster {
    fn from(c: Cluster) -> Self {
        GqlCluster {
            category_id: c.category,
            size: c.len(),
            marker_ids: c.marker_ids,
            bounds: c.bounds.into(),
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlOverlay {
    pub rect: GqlRect,
    pub label: String,
    pub label_position: GqlPosition,
}

impl From<&ClusterOverlay> for GqlOverlay {
    fn from(o: &ClusterOverlay) -> Self {
        GqlOverlay {
            rect: o.rect.into(),
            label: o.label.clone(),
            label_position: o.label_position.into(),
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlCacheStats {
    pub layer: GqlIconLayer,
    pub capacity: usize,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub failures: u64,
}

impl GqlCacheStats {
    fn new(layer: GqlIconLayer, capacity: usize, s: CacheStats) -> Self {
        GqlCacheStats {
            layer,
            capacity,
            entries: s.entries,
            hits: s.hits,
            misses: s.misses,
            evictions: s.evictions,
            failures: s.failures,
        }
    }
}

// Query root

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn categories(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<GqlCategory>> {
        let session = ctx.data::<SharedSession>()?.lock().await;
        Ok(session
            .dataset()
            .categories()
            .map(|c| GqlCategory {
                id: c.id,
                name: c.name.clone(),
                icon_path: c.icon_path.clone(),
                selected: session.selected().contains(&c.id),
                loaded: session.registry().is_loaded(c.id),
            })
            .collect())
    }

    async fn selected_categories(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<CategoryId>> {
        let session = ctx.data::<SharedSession>()?.lock().await;
        Ok(session.selected().iter().copied().collect())
    }

    /// Live markers of a category. Empty until the category has been loaded.
    async fn markers(
        &self,
        ctx: &Context<'_>,
        category_id: CategoryId,
    ) -> async_graphql::Result<Vec<GqlMarker>> {
        let session = ctx.data::<SharedSession>()?.lock().await;
        Ok(session
            .registry()
            .markers_of(category_id)
            .iter()
            .map(GqlMarker::from)
            .collect())
    }

    async fn overlays(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<GqlOverlay>> {
        let session = ctx.data::<SharedSession>()?.lock().await;
        Ok(session.scene().overlays().map(GqlOverlay::from).collect())
    }

    async fn zoom(&self, ctx: &Context<'_>) -> async_graphql::Result<f64> {
        let session = ctx.data::<SharedSession>()?.lock().await;
        Ok(session.zoom())
    }

    async fn cache_stats(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<GqlCacheStats>> {
        let session = ctx.data::<SharedSession>()?.lock().await;
        let icons = session.registry().icons();
        Ok(vec![
            GqlCacheStats::new(GqlIconLayer::Base, icons.capacity(), icons.stats(IconLayer::Base)),
            GqlCacheStats::new(
                GqlIconLayer::Overlay,
                icons.capacity(),
                icons.stats(IconLayer::Overlay),
            ),
        ])
    }
}

// Mutation root

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Returns false when the category was already selected.
    async fn select_category(
        &self,
        ctx: &Context<'_>,
        category_id: CategoryId,
    ) -> async_graphql::Result<bool> {
        let mut session = ctx.data::<SharedSession>()?.lock().await;
        session.select(category_id).map_err(async_graphql::Error::new)
    }

    async fn deselect_category(
        &self,
        ctx: &Context<'_>,
        category_id: CategoryId,
    ) -> async_graphql::Result<bool> {
        let mut session = ctx.data::<SharedSession>()?.lock().await;
        Ok(session.deselect(category_id))
    }

    async fn set_zoom(&self, ctx: &Context<'_>, zoom: f64) -> async_graphql::Result<f64> {
        let mut session = ctx.data::<SharedSession>()?.lock().await;
        Ok(session.set_zoom(zoom))
    }

    async fn zoom_step(&self, ctx: &Context<'_>, zoom_in: bool) -> async_graphql::Result<f64> {
        let mut session = ctx.data::<SharedSession>()?.lock().await;
        Ok(session.zoom_step(zoom_in))
    }

    async fn find_clusters(
        &self,
        ctx: &Context<'_>,
        category_id: CategoryId,
        #[graphql(default = 100.0)] radius: f64,
        #[graphql(default = 5)] max_clusters: usize,
        #[graphql(default = false)] mark: bool,
    ) -> async_graphql::Result<Vec<GqlCluster>> {
        let mut session = ctx.data::<SharedSession>()?.lock().await;
        let clusters = session
            .find_clusters(category_id, radius, max_clusters, mark)
            .map_err(async_graphql::Error::new)?;
        Ok(clusters.into_iter().map(GqlCluster::from).collect())
    }

    async fn clear_clusters(&self, ctx: &Context<'_>) -> async_graphql::Result<bool> {
        let mut session = ctx.data::<SharedSession>()?.lock().await;
        session.clear_clusters();
        Ok(true)
    }
}

pub type Schema = async_graphql::Schema<QueryRoot, MutationRoot, async_graphql::EmptySubscription>;

pub fn build_schema(session: SharedSession) -> Schema {
    async_graphql::Schema::build(QueryRoot, MutationRoot, async_graphql::EmptySubscription)
        .data(session)
        .finish()
}
