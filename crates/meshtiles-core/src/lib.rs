//! # Meshtiles Core
//!
//! Geometry core of the meshtiles tiler.
//!
//! This crate holds everything that works on plain mesh data:
//! - **Mesh**: minimal indexed mesh with slot-preserving submesh descriptors
//! - **Split**: exact axis-aligned plane clipping with UV interpolation
//! - **Octree**: three successive splits producing eight spatial octants
//! - **Atlas**: UV rectangle clustering, shelf packing and UV remapping
//! - **Memory**: keyed object pool for scratch buffers
//! - **Time**: named step measurements for build reports

pub mod atlas;
pub mod math;
pub mod memory;
pub mod mesh;
pub mod octree;
pub mod split;
pub mod time;

#[cfg(test)]
pub(crate) mod test_support;

use thiserror::Error;

pub use atlas::{AtlasLayout, UvRect};
pub use math::Aabb;
pub use memory::Pool;
pub use mesh::{MinMesh, SubMeshDescriptor, SubMeshDescriptorBuilder, Topology, Vertex};
pub use octree::{Octant, octree_split, split_point};
pub use split::{Axis, SplitOutcome, split};
pub use time::TimeMeasure;

/// Geometry errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Non-finite interpolation slope cutting {axis:?} at {q}")]
    NonFiniteSlope { axis: Axis, q: f64 },

    #[error("Vertex {index} has a non-finite component")]
    NonFiniteVertex { index: usize },

    #[error("Triangle index {index} out of bounds for {vertex_count} vertices")]
    IndexOutOfBounds { index: u32, vertex_count: usize },

    #[error("Triangle list length {0} is not a multiple of three")]
    TriangleListNotMultipleOfThree(usize),

    #[error("Face for submesh {submesh} added after submesh {current} was opened")]
    SubmeshOrder { submesh: usize, current: usize },

    #[error("Submesh {submesh} range {start}..{end} is not contiguous with the previous one or exceeds {len} indices")]
    SubmeshOutOfRange {
        submesh: usize,
        start: usize,
        end: usize,
        len: usize,
    },
}

/// Result type for geometry operations
pub type GeometryResult<T> = Result<T, GeometryError>;
