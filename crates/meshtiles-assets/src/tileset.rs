//! 3D Tiles Manifest
//!
//! Tile tree model serialized as `tileset.json`.

use std::fs;
use std::path::{Path, PathBuf};

use meshtiles_core::Aabb;
use meshtiles_core::math::{DMat4, DVec4};
use serde::{Deserialize, Serialize};

use crate::AssetResult;
use crate::metadata::TileMetadata;

/// Model space (Y up, left handed) to 3D Tiles (Z up, right handed)
pub const BASIS_SWAP: DMat4 = DMat4::from_cols(
    DVec4::new(1.0, 0.0, 0.0, 0.0),
    DVec4::new(0.0, 0.0, -1.0, 0.0),
    DVec4::new(0.0, 1.0, 0.0, 0.0),
    DVec4::new(0.0, 0.0, 0.0, 1.0),
);

/// Column-major tile transform for a model placed with `local_to_world`
pub fn tiles_transform(local_to_world: &DMat4) -> [f64; 16] {
    (BASIS_SWAP * *local_to_world).to_cols_array()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingVolume {
    #[serde(rename = "box")]
    pub values: [f64; 12],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub uri: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Refine {
    #[default]
    #[serde(rename = "REPLACE")]
    Replace,
    #[serde(rename = "ADD")]
    Add,
}

/// Node of the tile tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    pub bounding_volume: BoundingVolume,
    pub geometric_error: f64,
    pub geometric_error_pixel_size: f64,
    pub geometric_error_texture_downscale: f64,
    pub geometric_error_tile_depth: f64,
    pub geometric_error_hausdorff: f64,
    pub geometric_error_threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default)]
    pub children: Vec<Tile>,
    #[serde(default)]
    pub refine: Refine,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<[f64; 16]>,
}

impl Tile {
    /// Leaf tile for an exported chunk
    pub fn from_metadata(metadata: &TileMetadata, uri: impl Into<String>, local_to_world: &DMat4) -> Self {
        let errors = metadata.errors();
        Self {
            bounding_volume: BoundingVolume {
                values: metadata.bounding_box.box_values(),
            },
            geometric_error: errors.geometric_error(),
            geometric_error_pixel_size: errors.pixel_size,
            geometric_error_texture_downscale: errors.texture_downscale,
            geometric_error_tile_depth: errors.tile_depth,
            geometric_error_hausdorff: errors.hausdorff,
            geometric_error_threshold: errors.threshold,
            content: Some(Content { uri: uri.into() }),
            children: Vec::new(),
            refine: Refine::Replace,
            transform: Some(tiles_transform(local_to_world)),
        }
    }

    /// Number of tiles in this subtree
    pub fn tile_count(&self) -> usize {
        1 + self.children.iter().map(Tile::tile_count).sum::<usize>()
    }

    /// Levels below this tile, 0 for a leaf
    pub fn depth(&self) -> usize {
        self.children.iter().map(|c| c.depth() + 1).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub version: String,
}

impl Default for Asset {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
        }
    }
}

/// `tileset.json` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tileset {
    pub asset: Asset,
    pub geometric_error: f64,
    pub root: Tile,
}

impl Tileset {
    /// Wrap `root`; the dataset error is the diagonal of the cube spanned by
    /// the largest extent of `bounds`
    pub fn new(root: Tile, bounds: &Aabb) -> Self {
        Self {
            asset: Asset::default(),
            geometric_error: bounds.enclosing_cube().diagonal(),
            root,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> AssetResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Write `dir/tileset.json` and return its path
pub fn write_tileset(dir: impl AsRef<Path>, root: &Tile, bounds: &Aabb) -> AssetResult<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let path = dir.join("tileset.json");
    let tileset = Tileset::new(root.clone(), bounds);
    fs::write(&path, serde_json::to_vec(&tileset)?)?;
    log::info!(
        "wrote {} ({} tiles, geometric error {:.3})",
        path.display(),
        root.tile_count(),
        tileset.geometric_error
    );
    Ok(path)
}
