//! On-demand marker grouping.
//!
//! Clustering runs in two phases over one category's markers:
//!
//! 1. Markers are bucketed into a uniform grid whose cell size equals the
//!    radius, and connected components are grown across each cell and its 8
//!    neighbours. Two markers connect when their Manhattan distance is within
//!    the radius. Components of one marker are dropped.
//! 2. Components that come within `radius * chain_merge_factor` of each other
//!    are merged with a disjoint-set, which reaches the same partition as
//!    rescanning all pairs until nothing changes.
//!
//! Distances are taken between logical positions. All markers of a category
//! share one display scale and compensation offset, so logical gaps equal
//! the on-screen gaps of the unscaled layer.
use serde::{Deserialize, Serialize};

use crate::grid::SpatialGrid;
use crate::models::{CategoryId, Position, Rect};
use crate::registry::MarkerRegistry;
use crate::scene::{ClusterOverlay, DrawableId, Scene};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClusterConfig {
    pub chain_merge_factor: f64,
    pub mark_padding: f64,
    /// Label position relative to the top-left of the padded box.
    pub label_offset: Position,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            chain_merge_factor: 1.5,
            mark_padding: 2.0,
            label_offset: Position::new(4.0, -20.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub category: CategoryId,
    /// Indices into [`MarkerRegistry::markers_of`], ascending.
    pub members: Vec<usize>,
    pub marker_ids: Vec<u64>,
    /// Bounds of the members' logical positions.
    pub bounds: Rect,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

fn manhattan(a: Position, b: Position) -> f64 {
    (a.x - b.x).abs() + (a.y - b.y).abs()
}

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        DisjointSet {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Phase 1: connected components of size >= 2, in discovery order.
fn proximity_components(positions: &[Position], radius: f64) -> Vec<Vec<usize>> {
    let grid = SpatialGrid::build(radius, positions.iter().copied().enumerate());
    let mut visited = vec![false; positions.len()];
    let mut components = Vec::new();

    for start in 0..positions.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        let mut stack = vec![start];
        let mut component = Vec::new();

        while let Some(current) = stack.pop() {
            component.push(current);
            for neighbour in grid.nearby(positions[current]) {
                if !visited[neighbour]
                    && manhattan(positions[current], positions[neighbour]) <= radius
                {
                    visited[neighbour] = true;
                    stack.push(neighbour);
                }
            }
        }

        if component.len() >= 2 {
            components.push(component);
        }
    }

    components
}

/// Phase 2: merge components that have any cross pair within `reach`.
fn chain_merge(positions: &[Position], components: Vec<Vec<usize>>, reach: f64) -> Vec<Vec<usize>> {
    let mut owner = vec![usize::MAX; positions.len()];
    for (c, component) in components.iter().enumerate() {
        for &i in component {
            owner[i] = c;
        }
    }

    let grid = SpatialGrid::build(
        reach,
        components
            .iter()
            .flatten()
            .map(|&i| (i, positions[i])),
    );

    let mut sets = DisjointSet::new(components.len());
    for (c, component) in components.iter().enumerate() {
        for &i in component {
            for j in grid.nearby(positions[i]) {
                let d = owner[j];
                if d != c
                    && sets.find(c) != sets.find(d)
                    && manhattan(positions[i], positions[j]) <= reach
                {
                    sets.union(c, d);
                }
            }
        }
    }

    // Groups come out ordered by their first component
    let mut slot_of_root = vec![usize::MAX; components.len()];
    let mut merged: Vec<Vec<usize>> = Vec::new();
    for (c, component) in components.into_iter().enumerate() {
        let root = sets.find(c);
        if slot_of_root[root] == usize::MAX {
            slot_of_root[root] = merged.len();
            merged.push(Vec::new());
        }
        merged[slot_of_root[root]].extend(component);
    }
    merged
}

/// Group `positions` into clusters of index sets, largest first.
///
/// `radius` must be finite and positive.
pub fn group_positions(positions: &[Position], radius: f64, chain_merge_factor: f64) -> Vec<Vec<usize>> {
    let components = proximity_components(positions, radius);
    let reach = radius * chain_merge_factor.max(1.0);
    let mut groups = chain_merge(positions, components, reach);
    for group in &mut groups {
        group.sort_unstable();
    }
    groups.sort_by(|a, b| b.len().cmp(&a.len()));
    groups
}

#[derive(Default)]
pub struct ClusteringEngine {
    config: ClusterConfig,
    marked: Vec<DrawableId>,
}

impl ClusteringEngine {
    pub fn new(config: ClusterConfig) -> Self {
        ClusteringEngine {
            config,
            marked: Vec::new(),
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Find clusters among the markers of `category`.
    ///
    /// The result is truncated to `max_clusters` unless `mark` is set, in
    /// which case every cluster is returned and annotated in the scene,
    /// replacing any earlier annotations.
    pub fn find_clusters(
        &mut self,
        registry: &MarkerRegistry,
        scene: &mut dyn Scene,
        category: CategoryId,
        radius: f64,
        max_clusters: usize,
        mark: bool,
    ) -> Result<Vec<Cluster>, String> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(format!("Cluster radius must be positive, got {}", radius));
        }

        let markers = registry.markers_of(category);
        if markers.is_empty() {
            return Ok(Vec::new());
        }

        let positions: Vec<Position> = markers.iter().map(|m| m.logical_position()).collect();
        let groups = group_positions(&positions, radius, self.config.chain_merge_factor);

        let mut clusters: Vec<Cluster> = groups
            .into_iter()
            .map(|members| {
                let bounds = Rect::enclosing(members.iter().map(|&i| positions[i]))
                    .unwrap_or_default();
                Cluster {
                    category,
                    marker_ids: members.iter().map(|&i| markers[i].id()).collect(),
                    members,
                    bounds,
                }
            })
            .collect();

        tracing::debug!(
            category,
            radius,
            markers = markers.len(),
            clusters = clusters.len(),
            "Clustered markers"
        );

        if mark {
            self.clear_marks(scene);
            for cluster in &clusters {
                self.mark(registry, scene, cluster);
            }
        } else {
            clusters.truncate(max_clusters);
        }

        Ok(clusters)
    }

    fn mark(&mut self, registry: &MarkerRegistry, scene: &mut dyn Scene, cluster: &Cluster) {
        let markers = registry.markers_of(cluster.category);
        let mut bounds: Option<Rect> = None;
        for &i in &cluster.members {
            let drawable = markers[i].drawable();
            scene.set_selected(drawable, true);
            self.marked.push(drawable);
            if let Some(rect) = scene.bounding_box(drawable) {
                bounds = Some(match bounds {
                    Some(b) => b.united(&rect),
                    None => rect,
                });
            }
        }

        let Some(bounds) = bounds else {
            return;
        };
        let rect = bounds.padded(self.config.mark_padding);
        scene.draw_overlay_rect(ClusterOverlay {
            rect,
            label: cluster.len().to_string(),
            label_position: rect.top_left() + self.config.label_offset,
        });
    }

    /// Remove cluster annotations and deselect the markers they covered.
    pub fn clear_marks(&mut self, scene: &mut dyn Scene) {
        scene.clear_overlays();
        for drawable in self.marked.drain(..) {
            scene.set_selected(drawable, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::{registry, select, FakeProvider, FakeScene};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn loaded(points: &[(f64, f64)]) -> (MarkerRegistry, FakeScene) {
        let provider = FakeProvider::default().with_points(1, points);
        let mut scene = FakeScene::default();
        let mut reg = registry();
        reg.reconcile(&select(&[1]), &provider, &mut scene);
        (reg, scene)
    }

    fn as_sets(clusters: &[Cluster]) -> BTreeSet<Vec<u64>> {
        clusters.iter().map(|c| c.marker_ids.clone()).collect()
    }

    const SCENARIO: [(f64, f64); 5] = [
        (0.0, 0.0),
        (10.0, 10.0),
        (1000.0, 1000.0),
        (1005.0, 1005.0),
        (5000.0, 0.0),
    ];

    #[test]
    fn test_two_close_pairs() {
        let (reg, mut scene) = loaded(&SCENARIO);
        let mut engine = ClusteringEngine::default();
        let clusters = engine.find_clusters(&reg, &mut scene, 1, 50.0, 5, false).unwrap();

        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.len() == 2));
        let sets: BTreeSet<Vec<usize>> = clusters.iter().map(|c| c.members.clone()).collect();
        assert!(sets.contains(&vec![0, 1]));
        assert!(sets.contains(&vec![2, 3]));
        assert!(clusters.iter().all(|c| !c.members.contains(&4)));
        assert!(scene.overlays.is_empty());
    }

    #[test]
    fn test_unknown_category_is_empty() {
        let (reg, mut scene) = loaded(&SCENARIO);
        let mut engine = ClusteringEngine::default();
        let clusters = engine.find_clusters(&reg, &mut scene, 42, 50.0, 5, false).unwrap();
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_all_singletons_is_empty() {
        let (reg, mut scene) = loaded(&[(0.0, 0.0), (500.0, 0.0), (0.0, 500.0)]);
        let mut engine = ClusteringEngine::default();
        let clusters = engine.find_clusters(&reg, &mut scene, 1, 50.0, 5, false).unwrap();
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_invalid_radius_rejected() {
        let (reg, mut scene) = loaded(&SCENARIO);
        let mut engine = ClusteringEngine::default();
        assert!(engine.find_clusters(&reg, &mut scene, 1, 0.0, 5, true).is_err());
        assert!(engine.find_clusters(&reg, &mut scene, 1, -3.0, 5, false).is_err());
        assert!(engine.find_clusters(&reg, &mut scene, 1, f64::NAN, 5, false).is_err());
        assert_eq!(scene.overlay_clears, 0);
    }

    #[test]
    fn test_manhattan_not_euclidean() {
        // Euclidean gap 42.4, Manhattan gap 60
        let positions = [Position::new(0.0, 0.0), Position::new(30.0, 30.0)];
        assert!(group_positions(&positions, 50.0, 1.5).is_empty());
        assert_eq!(group_positions(&positions, 60.0, 1.5), vec![vec![0, 1]]);
    }

    #[test]
    fn test_tiny_radius_still_clusters_coincident_markers() {
        let positions = [
            Position::new(1.0, 0.0),
            Position::new(1.0, 0.0),
            Position::new(-2.0, 0.0),
        ];
        assert_eq!(group_positions(&positions, 1e-300, 1.5), vec![vec![0, 1]]);
    }

    #[test]
    fn test_chain_merge_joins_nearby_clusters() {
        // Two pairs 70 apart: too far for phase 1 at radius 50, within 75
        let positions = [
            Position::new(0.0, 0.0),
            Position::new(20.0, 0.0),
            Position::new(90.0, 0.0),
            Position::new(110.0, 0.0),
        ];
        assert_eq!(group_positions(&positions, 50.0, 1.5), vec![vec![0, 1, 2, 3]]);
        assert_eq!(group_positions(&positions, 50.0, 1.0).len(), 2);
    }

    #[test]
    fn test_chain_merge_is_transitive() {
        // A-B and B-C within reach, A-C not
        let positions = [
            Position::new(0.0, 0.0),
            Position::new(10.0, 0.0),
            Position::new(80.0, 0.0),
            Position::new(90.0, 0.0),
            Position::new(160.0, 0.0),
            Position::new(170.0, 0.0),
        ];
        let groups = group_positions(&positions, 50.0, 1.5);
        assert_eq!(groups, vec![vec![0, 1, 2, 3, 4, 5]]);
    }

    #[test]
    fn test_singletons_are_not_absorbed_by_chain_merge() {
        let positions = [
            Position::new(0.0, 0.0),
            Position::new(10.0, 0.0),
            Position::new(80.0, 0.0),
        ];
        assert_eq!(group_positions(&positions, 50.0, 1.5), vec![vec![0, 1]]);
    }

    #[test]
    fn test_sorted_by_size_descending() {
        let positions = [
            Position::new(0.0, 0.0),
            Position::new(5.0, 0.0),
            Position::new(1000.0, 0.0),
            Position::new(1005.0, 0.0),
            Position::new(1010.0, 0.0),
        ];
        let groups = group_positions(&positions, 20.0, 1.5);
        assert_eq!(groups, vec![vec![2, 3, 4], vec![0, 1]]);
    }

    #[test]
    fn test_max_clusters_truncates_unless_marking() {
        let (reg, mut scene) = loaded(&SCENARIO);
        let mut engine = ClusteringEngine::default();
        let clusters = engine.find_clusters(&reg, &mut scene, 1, 50.0, 1, false).unwrap();
        assert_eq!(clusters.len(), 1);
        let clusters = engine.find_clusters(&reg, &mut scene, 1, 50.0, 1, true).unwrap();
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_mark_draws_boxes_and_selects() {
        let (reg, mut scene) = loaded(&SCENARIO);
        let mut engine = ClusteringEngine::default();
        let clusters = engine.find_clusters(&reg, &mut scene, 1, 50.0, 5, true).unwrap();

        assert_eq!(scene.overlays.len(), 2);
        assert_eq!(scene.selected.len(), 4);
        for overlay in &scene.overlays {
            assert_eq!(overlay.label, "2");
            assert!((overlay.label_position.x - (overlay.rect.x + 4.0)).abs() < 1e-9);
            assert!((overlay.label_position.y - (overlay.rect.y - 20.0)).abs() < 1e-9);
        }

        // The box covers both member icons plus padding
        let markers = reg.markers_of(1);
        let cluster = &clusters[0];
        let overlay = scene
            .overlays
            .iter()
            .find(|o| {
                let r = scene.bounding_box(markers[cluster.members[0]].drawable()).unwrap();
                o.rect.x <= r.x && o.rect.right() >= r.right()
            })
            .unwrap();
        for &i in &cluster.members {
            let r = scene.bounding_box(markers[i].drawable()).unwrap();
            assert!(overlay.rect.x <= r.x - 2.0 + 1e-9);
            assert!(overlay.rect.y <= r.y - 2.0 + 1e-9);
            assert!(overlay.rect.right() >= r.right() + 2.0 - 1e-9);
            assert!(overlay.rect.bottom() >= r.bottom() + 2.0 - 1e-9);
        }
    }

    #[test]
    fn test_mark_replaces_previous_overlays() {
        let (reg, mut scene) = loaded(&SCENARIO);
        let mut engine = ClusteringEngine::default();
        engine.find_clusters(&reg, &mut scene, 1, 50.0, 5, true).unwrap();
        engine.find_clusters(&reg, &mut scene, 1, 50.0, 5, true).unwrap();
        assert_eq!(scene.overlays.len(), 2);
        assert_eq!(scene.overlay_clears, 2);
    }

    #[test]
    fn test_clear_marks_deselects() {
        let (reg, mut scene) = loaded(&SCENARIO);
        let mut engine = ClusteringEngine::default();
        engine.find_clusters(&reg, &mut scene, 1, 50.0, 5, true).unwrap();
        engine.clear_marks(&mut scene);
        assert!(scene.overlays.is_empty());
        assert!(scene.selected.is_empty());
    }

    #[test]
    fn test_repeat_call_same_clusters() {
        let (reg, mut scene) = loaded(&SCENARIO);
        let mut engine = ClusteringEngine::default();
        let a = engine.find_clusters(&reg, &mut scene, 1, 50.0, 5, false).unwrap();
        let b = engine.find_clusters(&reg, &mut scene, 1, 50.0, 5, false).unwrap();
        assert_eq!(as_sets(&a), as_sets(&b));
    }

    fn positions_strategy() -> impl Strategy<Value = Vec<Position>> {
        prop::collection::vec((-500.0..500.0f64, -500.0..500.0f64), 0..80)
            .prop_map(|pts| pts.into_iter().map(|(x, y)| Position::new(x, y)).collect())
    }

    proptest! {
        #[test]
        fn prop_clusters_partition(positions in positions_strategy(), radius in 1.0..120.0f64) {
            let groups = group_positions(&positions, radius, 1.5);
            let mut seen = BTreeSet::new();
            for group in &groups {
                prop_assert!(group.len() >= 2);
                for &i in group {
                    prop_assert!(seen.insert(i));
                }
            }
            for pair in groups.windows(2) {
                prop_assert!(pair[0].len() >= pair[1].len());
            }
        }

        #[test]
        fn prop_clusters_deterministic(positions in positions_strategy(), radius in 1.0..120.0f64) {
            let a: BTreeSet<_> = group_positions(&positions, radius, 1.5).into_iter().collect();
            let b: BTreeSet<_> = group_positions(&positions, radius, 1.5).into_iter().collect();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_radius_monotonic(
            positions in positions_strategy(),
            r1 in 1.0..80.0f64,
            extra in 0.0..80.0f64,
        ) {
            let r2 = r1 + extra;
            let small = group_positions(&positions, r1, 1.5);
            let large = group_positions(&positions, r2, 1.5);
            for group in &small {
                let container = large.iter().find(|g| g.contains(&group[0]));
                prop_assert!(container.is_some());
                let container = container.unwrap();
                prop_assert!(group.iter().all(|i| container.contains(i)));
            }
        }

        #[test]
        fn prop_matches_pairwise_fixed_point(positions in positions_strategy(), radius in 1.0..120.0f64) {
            let fast: BTreeSet<_> = group_positions(&positions, radius, 1.5).into_iter().collect();
            let slow: BTreeSet<_> = brute_force(&positions, radius, 1.5).into_iter().collect();
            prop_assert_eq!(fast, slow);
        }
    }

    /// Quadratic reference: full pairwise components, then rescan-and-merge
    /// until a pass makes no change.
    fn brute_force(positions: &[Position], radius: f64, factor: f64) -> Vec<Vec<usize>> {
        let n = positions.len();
        let mut visited = vec![false; n];
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for start in 0..n {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            let mut stack = vec![start];
            let mut group = Vec::new();
            while let Some(cur) = stack.pop() {
                group.push(cur);
                for j in 0..n {
                    if !visited[j] && manhattan(positions[cur], positions[j]) <= radius {
                        visited[j] = true;
                        stack.push(j);
                    }
                }
            }
            if group.len() >= 2 {
                groups.push(group);
            }
        }

        let reach = radius * factor;
        let mut merged = true;
        while merged {
            merged = false;
            'scan: for a in 0..groups.len() {
                for b in (a + 1)..groups.len() {
                    let close = groups[a].iter().any(|&i| {
                        groups[b]
                            .iter()
                            .any(|&j| manhattan(positions[i], positions[j]) <= reach)
                    });
                    if close {
                        let other = groups.remove(b);
                        groups[a].extend(other);
                        merged = true;
                        break 'scan;
                    }
                }
            }
        }

        for group in &mut groups {
            group.sort_unstable();
        }
        groups
    }
}
