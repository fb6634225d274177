//! Mesh and Geometry
//!
//! Minimal indexed mesh representation shared by every stage of the tiler.
//!
//! A [`MinMesh`] is a flat vertex list, a flat triangle index list and one
//! [`SubMeshDescriptor`] per material slot. Slots are never dropped: a material
//! without triangles keeps a zero-length descriptor at its position so the
//! descriptor list stays aligned with the material list.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::math::{Aabb, DVec2, DVec3};
use crate::{GeometryError, GeometryResult};

/// Mesh vertex: position and a single UV channel
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vertex {
    pub position: DVec3,
    pub uv: DVec2,
}

impl Vertex {
    /// Create a new vertex
    pub fn new(position: DVec3, uv: DVec2) -> Self {
        Self { position, uv }
    }

    /// True when every component is finite
    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.uv.is_finite()
    }
}

/// Primitive topology of a submesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Topology {
    #[default]
    Triangles,
}

/// Contiguous run of triangle indices belonging to one material slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubMeshDescriptor {
    /// First entry in the triangle index list
    pub index_start: usize,
    /// Number of entries, always a multiple of three
    pub index_count: usize,
    pub topology: Topology,
}

impl SubMeshDescriptor {
    /// Create a triangle descriptor
    pub fn new(index_start: usize, index_count: usize) -> Self {
        Self {
            index_start,
            index_count,
            topology: Topology::Triangles,
        }
    }

    /// One past the last index entry
    pub fn end(&self) -> usize {
        self.index_start + self.index_count
    }

    pub fn range(&self) -> Range<usize> {
        self.index_start..self.end()
    }

    pub fn is_empty(&self) -> bool {
        self.index_count == 0
    }

    pub fn triangle_count(&self) -> usize {
        self.index_count / 3
    }
}

/// Rebuilds submesh descriptors while triangles are appended to a new mesh
///
/// Faces must be added in non-decreasing submesh order. Moving on to a later
/// submesh flushes every slot in between, empty ones included, and
/// [`build`](Self::build) pads the trailing slots so the result always has
/// exactly `submesh_count` descriptors.
#[derive(Debug, Clone)]
pub struct SubMeshDescriptorBuilder {
    submesh_count: usize,
    descriptors: Vec<SubMeshDescriptor>,
    current: Option<Range<usize>>,
    running_end: usize,
}

impl SubMeshDescriptorBuilder {
    /// Create a builder for `submesh_count` slots
    pub fn new(submesh_count: usize) -> Self {
        Self {
            submesh_count,
            descriptors: Vec::with_capacity(submesh_count),
            current: None,
            running_end: 0,
        }
    }

    /// Record a triangle whose three indices start at `first_index`
    ///
    /// A face for a submesh whose descriptor was already flushed is rejected.
    pub fn add_face(&mut self, submesh: usize, first_index: usize) -> GeometryResult<()> {
        if submesh < self.descriptors.len() {
            return Err(GeometryError::SubmeshOrder {
                submesh,
                current: self.descriptors.len(),
            });
        }
        while self.descriptors.len() < submesh {
            self.flush();
        }

        let range = self.current.get_or_insert(first_index..first_index);
        range.start = range.start.min(first_index);
        range.end = range.end.max(first_index + 3);
        Ok(())
    }

    fn flush(&mut self) {
        let descriptor = match self.current.take() {
            Some(range) => SubMeshDescriptor::new(range.start, range.end - range.start),
            None => SubMeshDescriptor::new(self.running_end, 0),
        };
        self.running_end = descriptor.end();
        self.descriptors.push(descriptor);
    }

    /// Finish the descriptor list, padding unused trailing slots
    pub fn build(mut self) -> Vec<SubMeshDescriptor> {
        while self.descriptors.len() < self.submesh_count || self.current.is_some() {
            self.flush();
        }
        self.descriptors
    }
}

/// Minimal indexed triangle mesh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinMesh {
    pub vertices: Vec<Vertex>,
    /// Flat triangle list, three entries per triangle
    pub triangles: Vec<u32>,
    pub submeshes: Vec<SubMeshDescriptor>,
}

impl MinMesh {
    /// Create a mesh from its parts
    pub fn new(vertices: Vec<Vertex>, triangles: Vec<u32>, submeshes: Vec<SubMeshDescriptor>) -> Self {
        Self {
            vertices,
            triangles,
            submeshes,
        }
    }

    /// Create a mesh with one submesh covering every triangle
    pub fn with_single_submesh(vertices: Vec<Vertex>, triangles: Vec<u32>) -> Self {
        let submeshes = vec![SubMeshDescriptor::new(0, triangles.len())];
        Self::new(vertices, triangles, submeshes)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len() / 3
    }

    pub fn submesh_count(&self) -> usize {
        self.submeshes.len()
    }

    /// A mesh without vertices, as produced for octants nothing falls into
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Triangle indices of one submesh
    pub fn submesh_indices(&self, submesh: usize) -> &[u32] {
        match self.submeshes.get(submesh) {
            Some(descriptor) if descriptor.end() <= self.triangles.len() => {
                &self.triangles[descriptor.range()]
            }
            _ => &[],
        }
    }

    /// The three vertices of a triangle given by its first index entry
    pub fn triangle_vertices(&self, first_index: usize) -> [Vertex; 3] {
        [
            self.vertices[self.triangles[first_index] as usize],
            self.vertices[self.triangles[first_index + 1] as usize],
            self.vertices[self.triangles[first_index + 2] as usize],
        ]
    }

    /// Bounds of all vertex positions
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.vertices.iter().map(|v| v.position))
    }

    /// Check the structural invariants the splitter relies on
    pub fn validate(&self) -> GeometryResult<()> {
        if let Some(index) = self.vertices.iter().position(|v| !v.is_finite()) {
            return Err(GeometryError::NonFiniteVertex { index });
        }

        if self.triangles.len() % 3 != 0 {
            return Err(GeometryError::TriangleListNotMultipleOfThree(self.triangles.len()));
        }

        let vertex_count = self.vertices.len();
        if let Some(&index) = self.triangles.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(GeometryError::IndexOutOfBounds { index, vertex_count });
        }

        let len = self.triangles.len();
        let mut cursor = 0;
        for (submesh, descriptor) in self.submeshes.iter().enumerate() {
            let out_of_range = descriptor.end() > len
                || descriptor.index_count % 3 != 0
                || (!descriptor.is_empty() && descriptor.index_start != cursor);
            if out_of_range {
                return Err(GeometryError::SubmeshOutOfRange {
                    submesh,
                    start: descriptor.index_start,
                    end: descriptor.end(),
                    len,
                });
            }
            if !descriptor.is_empty() {
                cursor = descriptor.end();
            }
        }

        if cursor != len {
            return Err(GeometryError::SubmeshOutOfRange {
                submesh: self.submeshes.len(),
                start: cursor,
                end: len,
                len,
            });
        }

        Ok(())
    }
}
