//! Tile coordinates and tile-grid math
//!
//! The world's horizontal plane (x, z) is divided into square tiles of
//! `tile_world_size` units. Tile `(x, y)` covers world x in
//! `[x * size, (x + 1) * size)` and world z in `[y * size, (y + 1) * size)`.

use glam::{Vec2, Vec3};

use crate::{AgentBucket, Bounds};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Integer coordinates of a tile in the world grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct TilePosition {
    pub x: i32,
    pub y: i32,
}

impl TilePosition {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Tile containing a world-space point
    pub fn from_world(point: Vec3, tile_world_size: f32) -> Self {
        Self {
            x: (point.x / tile_world_size).floor() as i32,
            y: (point.z / tile_world_size).floor() as i32,
        }
    }

    /// Minimum corner of the tile on the horizontal plane
    pub fn world_min(&self, tile_world_size: f32) -> Vec2 {
        Vec2::new(self.x as f32, self.y as f32) * tile_world_size
    }

    pub fn world_center(&self, tile_world_size: f32) -> Vec2 {
        (Vec2::new(self.x as f32, self.y as f32) + Vec2::splat(0.5)) * tile_world_size
    }

    /// Horizontal world rectangle of the tile as bounds spanning all heights
    pub fn world_bounds(&self, tile_world_size: f32) -> Bounds {
        let min = self.world_min(tile_world_size);
        let max = min + Vec2::splat(tile_world_size);
        Bounds {
            min: Vec3::new(min.x, f32::MIN, min.y),
            max: Vec3::new(max.x, f32::MAX, max.y),
        }
    }

    /// Chebyshev distance in tiles
    pub fn distance(&self, other: &TilePosition) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

impl std::fmt::Display for TilePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Identifies one navmesh tile built for one agent shape
///
/// Ordering and equality follow the `(x, y, agent)` tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct TileId {
    pub position: TilePosition,
    pub agent: AgentBucket,
}

impl TileId {
    pub const fn new(x: i32, y: i32, agent: AgentBucket) -> Self {
        Self {
            position: TilePosition::new(x, y),
            agent,
        }
    }

    pub fn x(&self) -> i32 {
        self.position.x
    }

    pub fn y(&self) -> i32 {
        self.position.y
    }
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} agent {}", self.position, self.agent.0)
    }
}

/// A half-open rectangle of tiles, `begin` inclusive and `end` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TileRange {
    pub begin: TilePosition,
    pub end: TilePosition,
}

impl TileRange {
    pub fn new(begin: TilePosition, end: TilePosition) -> Self {
        Self { begin, end }
    }

    /// Every tile whose horizontal rectangle touches `bounds`
    pub fn covering(bounds: &Bounds, tile_world_size: f32) -> Self {
        let begin = TilePosition::from_world(bounds.min, tile_world_size);
        let last = TilePosition::from_world(bounds.max, tile_world_size);
        Self {
            begin,
            end: TilePosition::new(last.x + 1, last.y + 1),
        }
    }

    /// Tiles within `radius` world units of `point`, measured to the tile rectangle
    pub fn around(point: Vec3, radius: f32, tile_world_size: f32) -> Self {
        let r = radius.max(0.0);
        Self::covering(
            &Bounds::new(point, point).expanded_xz(r),
            tile_world_size,
        )
    }

    /// Tiles within `radius` tiles of `center`, the square of a Chebyshev ball
    pub fn around_tile(center: TilePosition, radius: i32) -> Self {
        let r = radius.max(0);
        Self {
            begin: TilePosition::new(center.x - r, center.y - r),
            end: TilePosition::new(center.x + r + 1, center.y + r + 1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.begin.x >= self.end.x || self.begin.y >= self.end.y
    }

    /// True when every tile of `other` is in this range
    pub fn contains_range(&self, other: &TileRange) -> bool {
        other.is_empty()
            || (other.begin.x >= self.begin.x
                && other.begin.y >= self.begin.y
                && other.end.x <= self.end.x
                && other.end.y <= self.end.y)
    }

    pub fn contains(&self, position: &TilePosition) -> bool {
        position.x >= self.begin.x
            && position.x < self.end.x
            && position.y >= self.begin.y
            && position.y < self.end.y
    }

    pub fn intersection(&self, other: &TileRange) -> TileRange {
        TileRange {
            begin: TilePosition::new(
                self.begin.x.max(other.begin.x),
                self.begin.y.max(other.begin.y),
            ),
            end: TilePosition::new(self.end.x.min(other.end.x), self.end.y.min(other.end.y)),
        }
    }

    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.end.x - self.begin.x) as usize * (self.end.y - self.begin.y) as usize
        }
    }

    /// Iterates tiles row by row
    pub fn iter(&self) -> impl Iterator<Item = TilePosition> {
        let range = *self;
        let xs = range.begin.x..range.end.x.max(range.begin.x);
        (range.begin.y..range.end.y)
            .flat_map(move |y| xs.clone().map(move |x| TilePosition::new(x, y)))
    }
}

/// The loaded region of the world: a center tile and a half size in tiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct CellGridBounds {
    pub center: TilePosition,
    pub half_size: i32,
}

impl CellGridBounds {
    pub fn new(center: TilePosition, half_size: i32) -> Self {
        Self {
            center,
            half_size: half_size.max(0),
        }
    }

    pub fn contains(&self, position: &TilePosition) -> bool {
        self.center.distance(position) <= self.half_size
    }

    pub fn range(&self) -> TileRange {
        TileRange {
            begin: TilePosition::new(
                self.center.x - self.half_size,
                self.center.y - self.half_size,
            ),
            end: TilePosition::new(
                self.center.x + self.half_size + 1,
                self.center.y + self.half_size + 1,
            ),
        }
    }
}
