use serde::{Deserialize, Serialize};

pub type CategoryId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    Surface,
    Underground,
}

impl Level {
    /// Datasets tag markers with a numeric `z_level`; 0 is the surface and
    /// anything else lives underground.
    pub fn from_z_level(z: i64) -> Self {
        if z == 0 {
            Level::Surface
        } else {
            Level::Underground
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Surface => write!(f, "Surface"),
            Level::Underground => write!(f, "Underground"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Position { x, y }
    }
}

impl std::ops::Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f64> for Position {
    type Output = Position;

    fn mul(self, rhs: f64) -> Position {
        Position::new(self.x * rhs, self.y * rhs)
    }
}

/// Axis-aligned rectangle in scene coordinates. `y` grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Rect { x, y, width, height }
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn top_left(&self) -> Position {
        Position::new(self.x, self.y)
    }

    /// Smallest rectangle containing both `self` and `other`.
    pub fn united(&self, other: &Rect) -> Rect {
        let left = self.left().min(other.left());
        let top = self.top().min(other.top());
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(left, top, right - left, bottom - top)
    }

    /// Grow the rectangle by `margin` on every side.
    pub fn padded(&self, margin: f64) -> Rect {
        Rect::new(
            self.x - margin,
            self.y - margin,
            self.width + 2.0 * margin,
            self.height + 2.0 * margin,
        )
    }

    /// Bounding box of a set of points, `None` when the iterator is empty.
    pub fn enclosing(points: impl IntoIterator<Item = Position>) -> Option<Rect> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Rect::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }
}

/// Zoom-dependent screen placement of a marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub position: Position,
    pub scale: f64,
}

/// One point as handed over by a marker data provider, already in scene
/// coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub level: Level,
    #[serde(default)]
    pub raw_metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryMeta {
    pub id: CategoryId,
    pub name: String,
    pub icon_path: String,
}
