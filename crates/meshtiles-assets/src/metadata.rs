//! Tile Metadata
//!
//! Sidecar document written next to every exported chunk. It carries what the
//! manifest needs, so `tileset.json` can be regenerated without re-exporting
//! geometry.

use std::fs;
use std::path::Path;

use meshtiles_core::Aabb;
use meshtiles_core::math::DVec3;
use serde::{Deserialize, Serialize};

use crate::AssetResult;
use crate::estimator::GeometricErrors;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TilePoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<DVec3> for TilePoint {
    fn from(v: DVec3) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

impl From<TilePoint> for DVec3 {
    fn from(p: TilePoint) -> Self {
        DVec3::new(p.x, p.y, p.z)
    }
}

/// Axis aligned bounds in model space (Y up)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TileBoundingBox {
    pub min: TilePoint,
    pub max: TilePoint,
}

impl TileBoundingBox {
    pub fn to_aabb(&self) -> Aabb {
        Aabb::new(self.min.into(), self.max.into())
    }

    /// 3D Tiles oriented box: center then the three half axes, converted
    /// from Y up to Z up
    pub fn box_values(&self) -> [f64; 12] {
        let aabb = self.to_aabb();
        let c = aabb.center();
        let h = aabb.half_extents();
        [
            -c.x, -c.z, c.y, //
            -h.x, 0.0, 0.0, //
            0.0, -h.z, 0.0, //
            0.0, 0.0, h.y,
        ]
    }
}

impl From<Aabb> for TileBoundingBox {
    fn from(aabb: Aabb) -> Self {
        Self {
            min: aabb.min.into(),
            max: aabb.max.into(),
        }
    }
}

/// Per tile sidecar
///
/// Error fields missing from a document read as 1, the most pessimistic value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TileMetadata {
    pub geometric_error_pixel_size: f64,
    pub geometric_error_texture_downscale: f64,
    pub geometric_error_tile_depth: f64,
    pub geometric_error_hausdorff: f64,
    pub geometric_error_threshold: f64,
    pub triangle_counts: usize,
    pub bounding_box: TileBoundingBox,
}

impl Default for TileMetadata {
    fn default() -> Self {
        Self {
            geometric_error_pixel_size: 1.0,
            geometric_error_texture_downscale: 1.0,
            geometric_error_tile_depth: 1.0,
            geometric_error_hausdorff: 1.0,
            geometric_error_threshold: 1.0,
            triangle_counts: 0,
            bounding_box: TileBoundingBox::default(),
        }
    }
}

impl TileMetadata {
    pub fn new(errors: &GeometricErrors, triangle_count: usize, bounds: Aabb) -> Self {
        Self {
            geometric_error_pixel_size: errors.pixel_size,
            geometric_error_texture_downscale: errors.texture_downscale,
            geometric_error_tile_depth: errors.tile_depth,
            geometric_error_hausdorff: errors.hausdorff,
            geometric_error_threshold: errors.threshold,
            triangle_counts: triangle_count,
            bounding_box: bounds.into(),
        }
    }

    pub fn errors(&self) -> GeometricErrors {
        GeometricErrors {
            pixel_size: self.geometric_error_pixel_size,
            texture_downscale: self.geometric_error_texture_downscale,
            tile_depth: self.geometric_error_tile_depth,
            hausdorff: self.geometric_error_hausdorff,
            threshold: self.geometric_error_threshold,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> AssetResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> AssetResult<()> {
        fs::write(path.as_ref(), serde_json::to_vec(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names() {
        let metadata = TileMetadata::new(
            &GeometricErrors::NONE,
            12,
            Aabb::new(DVec3::ZERO, DVec3::ONE),
        );
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["geometricErrorPixelSize"], 0.0);
        assert_eq!(json["geometricErrorTextureDownscale"], 0.0);
        assert_eq!(json["triangleCounts"], 12);
        assert_eq!(json["boundingBox"]["max"]["y"], 1.0);
    }

    #[test]
    fn test_missing_errors_read_as_one() {
        let metadata: TileMetadata = serde_json::from_str(r#"{ "triangleCounts": 3 }"#).unwrap();
        assert_eq!(metadata.triangle_counts, 3);
        assert_eq!(metadata.errors().tile_depth, 1.0);
    }

    #[test]
    fn test_box_values_are_z_up() {
        let bounds = TileBoundingBox::from(Aabb::new(
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(2.0, 4.0, 6.0),
        ));
        assert_eq!(
            bounds.box_values(),
            [-1.0, -3.0, 2.0, -1.0, 0.0, 0.0, 0.0, -3.0, 0.0, 0.0, 0.0, 2.0]
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("root.json");
        let metadata = TileMetadata::new(
            &GeometricErrors {
                pixel_size: 0.25,
                ..GeometricErrors::NONE
            },
            7,
            Aabb::new(DVec3::splat(-1.0), DVec3::ONE),
        );
        metadata.save(&path).unwrap();
        assert_eq!(TileMetadata::load(&path).unwrap(), metadata);
    }
}
