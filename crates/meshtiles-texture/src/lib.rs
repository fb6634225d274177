//! # Meshtiles Texture
//!
//! Texture side of the meshtiles tiler.
//!
//! ## Features
//! - RGBA8 textures and materials with UV scale/offset
//! - Region compositing with point or bilinear sampling
//! - Atlas merging of multi-material meshes into one texture
//! - Texture buffer pooling by resolution

pub mod compositor;
pub mod merge;
pub mod pool;
pub mod texture;

use thiserror::Error;

pub use compositor::{CpuCompositor, FilterMode, TextureCompositor, TextureTransform};
pub use merge::{merge_submeshes, AtlasSettings, MergedAtlas};
pub use pool::TexturePool;
pub use texture::{Material, Texture};

/// Texture errors
#[derive(Error, Debug)]
pub enum TextureError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{materials} materials for {submeshes} submeshes")]
    MaterialMismatch { materials: usize, submeshes: usize },

    #[error("Cannot build an atlas for a mesh without triangles")]
    EmptyAtlas,
}

/// Result type for texture operations
pub type TextureResult<T> = Result<T, TextureError>;
