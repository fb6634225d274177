//! Octree Partitioning
//!
//! Three successive planar splits (X, then Y, then Z) turning one mesh into
//! eight spatial octants.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::DVec3;
use crate::mesh::MinMesh;
use crate::split::{Axis, split};
use crate::GeometryResult;

/// One of the eight cells of an octree split
///
/// Top/Bottom is Y (top is `y >= q`), Left/Right is X (left is `x < q`) and
/// Near/Far is Z (near is `z < q`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Octant {
    TopLeftNear,
    TopLeftFar,
    BottomLeftNear,
    BottomLeftFar,
    TopRightNear,
    TopRightFar,
    BottomRightNear,
    BottomRightFar,
}

impl Octant {
    /// Octants in the order returned by [`octree_split`]
    pub const ALL: [Octant; 8] = [
        Octant::TopLeftNear,
        Octant::TopLeftFar,
        Octant::BottomLeftNear,
        Octant::BottomLeftFar,
        Octant::TopRightNear,
        Octant::TopRightFar,
        Octant::BottomRightNear,
        Octant::BottomRightFar,
    ];

    /// Three letter code used in tile names
    pub fn code(self) -> &'static str {
        match self {
            Octant::TopLeftNear => "TLN",
            Octant::TopLeftFar => "TLF",
            Octant::BottomLeftNear => "BLN",
            Octant::BottomLeftFar => "BLF",
            Octant::TopRightNear => "TRN",
            Octant::TopRightFar => "TRF",
            Octant::BottomRightNear => "BRN",
            Octant::BottomRightFar => "BRF",
        }
    }

    pub fn from_code(code: &str) -> Option<Octant> {
        Self::ALL.into_iter().find(|octant| octant.code() == code)
    }

    /// Name of the child tile of `parent` in this octant
    pub fn child_name(self, parent: &str) -> String {
        format!("{}_{}", parent, self.code())
    }
}

impl fmt::Display for Octant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

fn halves(mesh: &MinMesh, q: f64, axis: Axis) -> GeometryResult<(MinMesh, MinMesh)> {
    let outcome = split(mesh, q, axis)?;
    Ok((outcome.left, outcome.right))
}

/// Split `mesh` into eight octants around `point`, in [`Octant::ALL`] order
///
/// Octants nothing falls into come back as empty meshes.
pub fn octree_split(mesh: &MinMesh, point: DVec3) -> GeometryResult<[MinMesh; 8]> {
    let (left, right) = halves(mesh, point.x, Axis::X)?;

    let (left_bottom, left_top) = halves(&left, point.y, Axis::Y)?;
    let (right_bottom, right_top) = halves(&right, point.y, Axis::Y)?;

    let (tln, tlf) = halves(&left_top, point.z, Axis::Z)?;
    let (bln, blf) = halves(&left_bottom, point.z, Axis::Z)?;
    let (trn, trf) = halves(&right_top, point.z, Axis::Z)?;
    let (brn, brf) = halves(&right_bottom, point.z, Axis::Z)?;

    Ok([tln, tlf, bln, blf, trn, trf, brn, brf])
}

/// Split point for [`octree_split`]
///
/// Axes much thinner than the largest one are split at their minimum so thin
/// meshes are not cut into near-empty slabs; the others are split at the
/// bounds center.
pub fn split_point(mesh: &MinMesh) -> DVec3 {
    let bounds = mesh.bounds();
    let size = bounds.size();
    let center = bounds.center();
    let largest = size.max_element();

    let mut point = DVec3::ZERO;
    for axis in Axis::ALL {
        let i = axis.index();
        point[i] = if size[i] < largest * 0.5 {
            bounds.min[i]
        } else {
            center[i]
        };
    }
    point
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{concat, triangle_at, unit_cube};

    fn octant_center(octant: Octant) -> DVec3 {
        let (x, y, z) = match octant {
            Octant::TopLeftNear => (-1.0, 1.0, -1.0),
            Octant::TopLeftFar => (-1.0, 1.0, 1.0),
            Octant::BottomLeftNear => (-1.0, -1.0, -1.0),
            Octant::BottomLeftFar => (-1.0, -1.0, 1.0),
            Octant::TopRightNear => (1.0, 1.0, -1.0),
            Octant::TopRightFar => (1.0, 1.0, 1.0),
            Octant::BottomRightNear => (1.0, -1.0, -1.0),
            Octant::BottomRightFar => (1.0, -1.0, 1.0),
        };
        DVec3::new(x, y, z)
    }

    #[test]
    fn test_octant_codes() {
        assert_eq!(Octant::TopLeftNear.child_name("root"), "root_TLN");
        assert_eq!(Octant::from_code("BRF"), Some(Octant::BottomRightFar));
        assert_eq!(Octant::from_code("XYZ"), None);
        assert_eq!(Octant::BottomLeftNear.to_string(), "BLN");
    }

    #[test]
    fn test_each_triangle_lands_in_its_octant() {
        let parts: Vec<MinMesh> = Octant::ALL
            .iter()
            .map(|&octant| triangle_at(octant_center(octant), 0.25))
            .collect();
        let mesh = concat(&parts);

        let octants = octree_split(&mesh, DVec3::ZERO).unwrap();
        for (octant, child) in Octant::ALL.iter().zip(&octants) {
            assert_eq!(child.triangle_count(), 1, "octant {}", octant);
            assert!(child.bounds().contains_point(octant_center(*octant)));
            assert!(child.validate().is_ok());
        }
    }

    #[test]
    fn test_empty_octants_are_returned_empty() {
        let mesh = triangle_at(octant_center(Octant::BottomRightFar), 0.25);
        let octants = octree_split(&mesh, DVec3::ZERO).unwrap();

        let non_empty: Vec<Octant> = Octant::ALL
            .iter()
            .zip(&octants)
            .filter(|(_, child)| !child.is_empty())
            .map(|(octant, _)| *octant)
            .collect();
        assert_eq!(non_empty, vec![Octant::BottomRightFar]);
        assert!(octants[0].is_empty());
        assert_eq!(octants[0].submesh_count(), 1);
    }

    #[test]
    fn test_cube_octants_cover_the_cube() {
        let mesh = unit_cube();
        let octants = octree_split(&mesh, split_point(&mesh)).unwrap();

        let total: usize = octants.iter().map(|m| m.triangle_count()).sum();
        assert!(total > mesh.triangle_count());

        let merged = octants
            .iter()
            .filter(|m| !m.is_empty())
            .fold(crate::math::Aabb::EMPTY, |acc, m| acc.merge(&m.bounds()));
        assert_eq!(merged, mesh.bounds());
        assert!(octants.iter().all(|m| !m.is_empty()));
    }

    fn area(mesh: &MinMesh) -> f64 {
        mesh.triangles
            .chunks_exact(3)
            .map(|t| {
                let [a, b, c] = [t[0], t[1], t[2]].map(|i| mesh.vertices[i as usize].position);
                (b - a).cross(c - a).length() * 0.5
            })
            .sum()
    }

    #[test]
    fn test_straddling_triangles_conserve_area() {
        let mesh = unit_cube();
        let expected = area(&mesh);

        for point in [DVec3::splat(0.5), DVec3::new(0.3, 0.7, 0.1)] {
            let octants = octree_split(&mesh, point).unwrap();
            let total: f64 = octants.iter().map(area).sum();
            assert!((total - expected).abs() < 1e-9, "area {} at {:?}", total, point);

            let mut bounds = crate::math::Aabb::EMPTY;
            for child in &octants {
                child.validate().unwrap();
                assert_eq!(child.submesh_count(), 1);
                bounds = bounds.merge(&child.bounds());
            }
            assert_eq!(bounds, mesh.bounds());
            assert!(octants.iter().all(|child| !child.is_empty()));
        }
    }

    #[test]
    fn test_split_point_uses_center_for_cubes() {
        assert_eq!(split_point(&unit_cube()), DVec3::splat(0.5));
    }

    #[test]
    fn test_split_point_uses_min_on_thin_axes() {
        let mut mesh = unit_cube();
        for vertex in &mut mesh.vertices {
            vertex.position.y *= 0.1;
            vertex.position.z += 3.0;
        }
        let point = split_point(&mesh);
        assert_eq!(point, DVec3::new(0.5, 0.0, 3.5));
    }
}
