//! Math utilities
//!
//! Re-exports the double precision types from glam and adds the bounding box
//! used by the splitter, the octree and the tile builder.

pub use glam::{DMat4, DVec2, DVec3, DVec4};

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in double precision
///
/// `min <= max` is not enforced by the type; callers that build a box by hand
/// are expected to respect it. Boxes built with [`Aabb::from_points`] always do
/// unless no point was given.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: DVec3,
    /// Maximum corner
    pub max: DVec3,
}

impl Aabb {
    /// An inverted box that grows to the first point it is expanded with
    pub const EMPTY: Self = Self {
        min: DVec3::splat(f64::INFINITY),
        max: DVec3::splat(f64::NEG_INFINITY),
    };

    /// Create an AABB from min and max corners
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point, or [`Aabb::EMPTY`] for no points
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = DVec3>,
    {
        let mut aabb = Self::EMPTY;
        for point in points {
            aabb.expand_to_include(point);
        }
        aabb
    }

    /// Get the center of the AABB
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the half-extents of the AABB
    pub fn half_extents(&self) -> DVec3 {
        (self.max - self.min) * 0.5
    }

    /// Get the full size of the AABB
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    /// Largest extent over the three axes
    pub fn max_extent(&self) -> f64 {
        self.size().max_element()
    }

    /// Length of the min-max diagonal
    pub fn diagonal(&self) -> f64 {
        self.size().length()
    }

    /// Check if the AABB is empty
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Inclusive point containment
    pub fn contains_point(&self, point: DVec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Inclusive overlap test, true when the boxes only touch
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Expand the AABB to include a point
    pub fn expand_to_include(&mut self, point: DVec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Merge with another AABB
    pub fn merge(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Cube anchored at `min` whose side is the largest extent of this box
    pub fn enclosing_cube(&self) -> Aabb {
        let side = self.max_extent();
        Aabb::new(self.min, self.min + DVec3::splat(side))
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}
