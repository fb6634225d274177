//! Geometric Error Estimation
//!
//! Error components attached to every tile. Only the pixel size error feeds
//! the tile's `geometricError`; the others are written alongside for analysis.

use meshtiles_core::MinMesh;
use serde::{Deserialize, Serialize};

/// Error components of one tile
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeometricErrors {
    /// Mean world size of a texel
    pub pixel_size: f64,
    /// Fraction of texture resolution lost to atlas downscaling
    pub texture_downscale: f64,
    pub tile_depth: f64,
    /// Always zero, the metric is not computed
    pub hausdorff: f64,
    pub threshold: f64,
}

impl GeometricErrors {
    /// Errors of a tile that meets every target
    pub const NONE: Self = Self {
        pixel_size: 0.0,
        texture_downscale: 0.0,
        tile_depth: 0.0,
        hausdorff: 0.0,
        threshold: 0.0,
    };

    /// Value used as the tile's `geometricError`
    pub fn geometric_error(&self) -> f64 {
        self.pixel_size
    }
}

/// Everything the estimator needs to know about an exported tile
#[derive(Debug, Clone, Copy)]
pub struct ErrorInputs<'a> {
    pub mesh: &'a MinMesh,
    /// Size of the exported texture, `None` when untextured
    pub texture_size: Option<(u32, u32)>,
    pub texture_scaling: f64,
    pub depth: u32,
    pub most_detailed: bool,
}

pub fn estimate(inputs: &ErrorInputs<'_>) -> GeometricErrors {
    if inputs.most_detailed {
        return GeometricErrors::NONE;
    }

    let pixel_size = pixel_size_error(inputs.mesh, inputs.texture_size).unwrap_or_else(|| {
        log::warn!(
            "pixel size error not measurable ({} submeshes, texture {:?}), using 1",
            inputs.mesh.submesh_count(),
            inputs.texture_size
        );
        1.0
    });

    GeometricErrors {
        pixel_size,
        texture_downscale: texture_downscale_error(inputs.texture_scaling, false),
        tile_depth: tile_depth_error(inputs.depth, false),
        hausdorff: 0.0,
        threshold: 0.0,
    }
}

/// Mean of `world_length / (uv_length * texture_size)` over every edge with a
/// non-zero UV length
///
/// `None` when the mesh has several submeshes, no texture or no measurable edge.
pub fn pixel_size_error(mesh: &MinMesh, texture_size: Option<(u32, u32)>) -> Option<f64> {
    if mesh.submesh_count() > 1 {
        return None;
    }
    let (width, height) = texture_size?;
    let texels = f64::from(width.min(height));
    if texels <= 0.0 {
        return None;
    }

    let mut sum = 0.0;
    let mut edges = 0usize;
    for first in (0..mesh.triangles.len()).step_by(3) {
        let [a, b, c] = mesh.triangle_vertices(first);
        for (p, q) in [(a, b), (b, c), (c, a)] {
            let uv_length = p.uv.distance(q.uv);
            if uv_length > 0.0 {
                sum += p.position.distance(q.position) / (uv_length * texels);
                edges += 1;
            }
        }
    }

    (edges > 0).then(|| sum / edges as f64)
}

pub fn texture_downscale_error(scaling: f64, most_detailed: bool) -> f64 {
    if most_detailed || (scaling - 1.0).abs() < 1e-5 {
        0.0
    } else {
        1.0 - scaling
    }
}

pub fn tile_depth_error(depth: u32, most_detailed: bool) -> f64 {
    if most_detailed {
        0.0
    } else if depth == 0 {
        1.0
    } else {
        let d = f64::from(depth);
        1.0 / (2.0 * d * d)
    }
}
