//! Planar Mesh Splitting
//!
//! Exact clipping of a [`MinMesh`] against an axis-aligned plane.
//!
//! - Triangles fully on one side are copied with their winding preserved
//! - Straddling triangles become one triangle on the apex side and a quad
//!   (two triangles) on the other side
//! - Cut vertices interpolate position and UV with the same parameter and sit
//!   exactly on the plane
//! - Submesh slots are kept aligned on both outputs, empty ones included
//!
//! Every cut vertex is computed from its edge with the left endpoint first, so
//! the same source edge always yields bit-identical seam vertices on both sides
//! of the plane.

use serde::{Deserialize, Serialize};

use crate::math::DVec3;
use crate::mesh::{MinMesh, SubMeshDescriptorBuilder, Vertex};
use crate::{GeometryError, GeometryResult};

/// Coordinate axis used to orient a split plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Component index of this axis
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Coordinate of a vertex along this axis
    pub fn dimension(self, vertex: &Vertex) -> f64 {
        vertex.position[self.index()]
    }

    /// Point where the segment `a -> b` crosses the plane `dimension = q`
    ///
    /// Position and UV share the same interpolation parameter, and the
    /// coordinate along the axis is set to `q` exactly.
    pub fn cut_edge(self, a: &Vertex, b: &Vertex, q: f64) -> GeometryResult<Vertex> {
        let da = self.dimension(a);
        let db = self.dimension(b);
        let t = (q - da) / (db - da);
        if !t.is_finite() {
            return Err(GeometryError::NonFiniteSlope { axis: self, q });
        }

        let mut position: DVec3 = a.position + (b.position - a.position) * t;
        position[self.index()] = q;
        let uv = a.uv + (b.uv - a.uv) * t;

        Ok(Vertex::new(position, uv))
    }
}

/// Result of [`split`]
#[derive(Debug, Clone, PartialEq)]
pub struct SplitOutcome {
    /// Triangles with `dimension < q`
    pub left: MinMesh,
    /// Triangles with `dimension >= q`
    pub right: MinMesh,
    /// Number of triangles cut into one plus two pieces
    pub intersections: usize,
}

impl SplitOutcome {
    /// Cut vertices created by the split, two per intersected triangle
    pub fn new_vertex_count(&self) -> usize {
        self.intersections * 2
    }
}

#[derive(Clone, Copy)]
struct Corner {
    index: u32,
    vertex: Vertex,
}

/// One output half under construction
struct SideBuilder {
    vertices: Vec<Vertex>,
    triangles: Vec<u32>,
    remap: Vec<u32>,
    descriptors: SubMeshDescriptorBuilder,
}

impl SideBuilder {
    const UNMAPPED: u32 = u32::MAX;

    fn new(source_vertex_count: usize, submesh_count: usize) -> Self {
        Self {
            vertices: Vec::new(),
            triangles: Vec::new(),
            remap: vec![Self::UNMAPPED; source_vertex_count],
            descriptors: SubMeshDescriptorBuilder::new(submesh_count),
        }
    }

    fn source(&mut self, corner: &Corner) -> u32 {
        let slot = &mut self.remap[corner.index as usize];
        if *slot == Self::UNMAPPED {
            *slot = self.vertices.len() as u32;
            self.vertices.push(corner.vertex);
        }
        *slot
    }

    // Cut vertices are never shared, each use gets its own copy.
    fn fresh(&mut self, vertex: Vertex) -> u32 {
        self.vertices.push(vertex);
        (self.vertices.len() - 1) as u32
    }

    fn push_face(&mut self, submesh: usize, face: [u32; 3]) -> GeometryResult<()> {
        self.descriptors.add_face(submesh, self.triangles.len())?;
        self.triangles.extend_from_slice(&face);
        Ok(())
    }

    fn push_source_face(&mut self, submesh: usize, corners: &[Corner; 3]) -> GeometryResult<()> {
        let face = [
            self.source(&corners[0]),
            self.source(&corners[1]),
            self.source(&corners[2]),
        ];
        self.push_face(submesh, face)
    }

    fn finish(self) -> MinMesh {
        MinMesh::new(self.vertices, self.triangles, self.descriptors.build())
    }
}

fn on_plane(axis: Axis, corner: &Corner, q: f64) -> bool {
    (axis.dimension(&corner.vertex) - q).abs() < f64::EPSILON
}

/// Split `mesh` by the plane `axis = q`
///
/// The input is validated first; an invalid mesh or a non-finite cut is an
/// error and no partial output is returned.
pub fn split(mesh: &MinMesh, q: f64, axis: Axis) -> GeometryResult<SplitOutcome> {
    mesh.validate()?;

    let submesh_count = mesh.submesh_count();
    let mut left = SideBuilder::new(mesh.vertex_count(), submesh_count);
    let mut right = SideBuilder::new(mesh.vertex_count(), submesh_count);
    let mut intersections = 0;

    for (submesh, descriptor) in mesh.submeshes.iter().enumerate() {
        for face in mesh.triangles[descriptor.range()].chunks_exact(3) {
            let corners = [face[0], face[1], face[2]].map(|index| Corner {
                index,
                vertex: mesh.vertices[index as usize],
            });
            let sides = corners.map(|c| axis.dimension(&c.vertex) < q);

            match sides {
                [true, true, true] => left.push_source_face(submesh, &corners)?,
                [false, false, false] => right.push_source_face(submesh, &corners)?,
                _ => {
                    let left_count = sides.iter().filter(|&&s| s).count();
                    let apex_is_left = left_count == 1;
                    let apex = sides
                        .iter()
                        .position(|&s| s == apex_is_left)
                        .unwrap_or_default();
                    let rotated = [
                        corners[apex],
                        corners[(apex + 1) % 3],
                        corners[(apex + 2) % 3],
                    ];

                    let cut = if apex_is_left {
                        clip_left_apex(axis, q, submesh, &rotated, &mut left, &mut right)?
                    } else {
                        clip_right_apex(axis, q, submesh, &rotated, &mut left, &mut right)?
                    };
                    if cut {
                        intersections += 1;
                    }
                }
            }
        }
    }

    let outcome = SplitOutcome {
        left: left.finish(),
        right: right.finish(),
        intersections,
    };
    log::trace!(
        "split {:?} at {}: {} left / {} right triangles, {} intersections",
        axis,
        q,
        outcome.left.triangle_count(),
        outcome.right.triangle_count(),
        intersections
    );
    Ok(outcome)
}

/// Apex alone on the left, `[apex, r1, r2]` in winding order
fn clip_left_apex(
    axis: Axis,
    q: f64,
    submesh: usize,
    corners: &[Corner; 3],
    left: &mut SideBuilder,
    right: &mut SideBuilder,
) -> GeometryResult<bool> {
    let [apex, r1, r2] = corners;
    if on_plane(axis, r1, q) && on_plane(axis, r2, q) {
        right.push_source_face(submesh, corners)?;
        return Ok(false);
    }

    let t1 = axis.cut_edge(&apex.vertex, &r1.vertex, q)?;
    let t2 = axis.cut_edge(&apex.vertex, &r2.vertex, q)?;

    let a = left.source(apex);
    let t1_left = left.fresh(t1);
    let t2_left = left.fresh(t2);
    left.push_face(submesh, [a, t1_left, t2_left])?;

    let t1_right = right.fresh(t1);
    let t2_right = right.fresh(t2);
    let b = right.source(r1);
    let c = right.source(r2);
    right.push_face(submesh, [t1_right, b, c])?;
    right.push_face(submesh, [t1_right, c, t2_right])?;

    Ok(true)
}

/// Apex alone on the right, `[apex, l1, l2]` in winding order
fn clip_right_apex(
    axis: Axis,
    q: f64,
    submesh: usize,
    corners: &[Corner; 3],
    left: &mut SideBuilder,
    right: &mut SideBuilder,
) -> GeometryResult<bool> {
    let [apex, l1, l2] = corners;
    if on_plane(axis, l1, q) && on_plane(axis, l2, q) {
        left.push_source_face(submesh, corners)?;
        return Ok(false);
    }

    let t1 = axis.cut_edge(&l1.vertex, &apex.vertex, q)?;
    let t2 = axis.cut_edge(&l2.vertex, &apex.vertex, q)?;

    let a = right.source(apex);
    let t1_right = right.fresh(t1);
    let t2_right = right.fresh(t2);
    right.push_face(submesh, [a, t1_right, t2_right])?;

    let t1_left = left.fresh(t1);
    let t2_left = left.fresh(t2);
    let b = left.source(l1);
    let c = left.source(l2);
    left.push_face(submesh, [t1_left, b, c])?;
    left.push_face(submesh, [t1_left, c, t2_left])?;

    Ok(true)
}
