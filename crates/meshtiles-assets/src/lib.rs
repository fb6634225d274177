//! # Meshtiles Assets
//!
//! Asset pipeline of the meshtiles tiler.
//!
//! ## Features
//! - Wavefront OBJ/MTL import
//! - Vertex clustering simplification behind the [`Simplifier`] trait
//! - Recursive tile tree building with geometric error estimation
//! - Binary glTF chunk export with sidecar tile metadata
//! - 3D Tiles `tileset.json` writing and regeneration from sidecars

pub mod builder;
pub mod config;
pub mod estimator;
pub mod export;
pub mod metadata;
pub mod obj;
pub mod observer;
pub mod rebuild;
pub mod simplify;
pub mod tileset;

use meshtiles_core::GeometryError;
use meshtiles_texture::TextureError;
use thiserror::Error;

pub use builder::{BuildOutput, BuildReport, SubtreeFailure, TileBuilder};
pub use config::TilerConfig;
pub use estimator::GeometricErrors;
pub use export::{
    ChunkExporter, ExportEntry, ExportSummary, GlbExporter, content_uri, encode_glb, export_chunks,
    export_entry,
};
pub use metadata::{TileBoundingBox, TileMetadata};
pub use obj::{ObjModel, import_obj};
pub use observer::{BuildObserver, CancelFlag, LogObserver, RecordingObserver};
pub use rebuild::rebuild_tileset;
pub use simplify::{Simplifier, VertexClusterSimplifier};
pub use tileset::{Tile, Tileset, write_tileset};

/// Asset errors
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Texture error: {0}")]
    Texture(#[from] TextureError),

    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("{materials} materials for {submeshes} submeshes")]
    MaterialMismatch { materials: usize, submeshes: usize },

    #[error("Input mesh has no triangles")]
    EmptyMesh,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Build cancelled")]
    Cancelled,

    #[error("Export of {name} failed: {reason}")]
    ExportFailed { name: String, reason: String },
}

/// Result type for asset operations
pub type AssetResult<T> = Result<T, AssetError>;
