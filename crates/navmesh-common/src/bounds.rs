//! Axis-aligned world-space bounds

use glam::{Vec2, Vec3};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// An axis-aligned box in world space (y is up)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    /// Creates bounds from two corners in any order
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Smallest bounds enclosing every point, or `None` for an empty iterator
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Self::new(first, first), |acc, p| Self {
            min: acc.min.min(p),
            max: acc.max.max(p),
        }))
    }

    /// True iff the bounds collapse to a single point
    pub fn is_empty(&self) -> bool {
        self.min == self.max
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Closed-interval overlap test on all three axes
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    /// Closed-interval overlap test on the horizontal plane only
    pub fn intersects_xz(&self, other: &Bounds) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.z <= other.max.z
            && other.min.z <= self.max.z
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.min.cmple(point).all() && point.cmple(self.max).all()
    }

    /// Grows the bounds by `amount` on the horizontal axes
    pub fn expanded_xz(&self, amount: f32) -> Bounds {
        let delta = Vec3::new(amount, 0.0, amount);
        Bounds {
            min: self.min - delta,
            max: self.max + delta,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn min_xz(&self) -> Vec2 {
        Vec2::new(self.min.x, self.min.z)
    }

    pub fn max_xz(&self) -> Vec2 {
        Vec2::new(self.max.x, self.max.z)
    }
}
