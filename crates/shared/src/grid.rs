//! Map grid system.
//!
//! The map is a mosaic of raster tiles named `<col>_<row>.<ext>`, laid out
//! edge to edge in scene space. Marker datasets use their own origin, so
//! every dataset coordinate is shifted by a fixed calibration offset before
//! it reaches the scene. Clustering buckets markers into a uniform grid of
//! square cells.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::Position;

// Dataset origin relative to the stitched tile mosaic, measured by matching
// two known landmarks between the source map and the rendered scene.
pub const DATASET_OFFSET_X: f64 = 15595.0;
pub const DATASET_OFFSET_Y: f64 = 8430.0;

/// Shift from dataset coordinates to scene coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MapCalibration {
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for MapCalibration {
    fn default() -> Self {
        MapCalibration {
            offset_x: DATASET_OFFSET_X,
            offset_y: DATASET_OFFSET_Y,
        }
    }
}

impl MapCalibration {
    /// Convert a dataset position into scene pixels, snapped to whole pixels.
    pub fn to_scene(&self, x: f64, y: f64) -> Position {
        Position::new((x + self.offset_x).round(), (y + self.offset_y).round())
    }
}

/// Parse a tile file name such as `12_7.webp` into `(col, row)`.
pub fn parse_tile_name(file_name: &str) -> Option<(i64, i64)> {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => file_name,
    };
    let mut parts = stem.split('_');
    let col = parts.next()?.parse().ok()?;
    let row = parts.next()?.parse().ok()?;
    Some((col, row))
}

/// Scene position of the top-left corner of a tile.
pub fn tile_origin(col: i64, row: i64, tile_w: u32, tile_h: u32) -> Position {
    Position::new((col * tile_w as i64) as f64, (row * tile_h as i64) as f64)
}

/// Cell coordinate of the bucketing grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub col: i64,
    pub row: i64,
}

impl CellKey {
    pub fn of(pos: Position, cell_size: f64) -> Self {
        CellKey {
            col: (pos.x / cell_size).floor() as i64,
            row: (pos.y / cell_size).floor() as i64,
        }
    }

    /// This cell and its 8 neighbours.
    ///
    /// Keys at the edge of the `i64` range saturate, so a neighbour may
    /// repeat the cell itself.
    pub fn neighbourhood(self) -> impl Iterator<Item = CellKey> {
        (-1..=1).flat_map(move |dr| {
            (-1..=1).map(move |dc| CellKey {
                col: self.col.saturating_add(dc),
                row: self.row.saturating_add(dr),
            })
        })
    }
}

/// Uniform grid of integer indices, each bucketed by the cell its position
/// falls in. Indices refer to whatever arena the caller owns.
pub struct SpatialGrid {
    cell_size: f64,
    cells: HashMap<CellKey, Vec<usize>>,
}

impl SpatialGrid {
    pub fn new(cell_size: f64) -> Self {
        SpatialGrid {
            cell_size,
            cells: HashMap::new(),
        }
    }

    /// Bucket `positions[i]` under index `i` for every element.
    pub fn build(cell_size: f64, positions: impl IntoIterator<Item = (usize, Position)>) -> Self {
        let mut grid = SpatialGrid::new(cell_size);
        for (index, pos) in positions {
            grid.insert(index, pos);
        }
        grid
    }

    pub fn insert(&mut self, index: usize, pos: Position) {
        self.cells
            .entry(CellKey::of(pos, self.cell_size))
            .or_default()
            .push(index);
    }

    /// Indices in the cell containing `pos` and its 8 neighbours.
    pub fn nearby(&self, pos: Position) -> impl Iterator<Item = usize> + '_ {
        CellKey::of(pos, self.cell_size)
            .neighbourhood()
            .filter_map(|key| self.cells.get(&key))
            .flat_map(|bucket| bucket.iter().copied())
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }
}
