//! Atlas Merging
//!
//! Turns a multi-material mesh into a single-material mesh: builds the atlas
//! layout, composites every source region into one texture and remaps the
//! mesh UVs into it.

use meshtiles_core::atlas::{triangle_uv_rects, AtlasLayout, SourceSpace};
use meshtiles_core::MinMesh;

use crate::compositor::{FilterMode, TextureCompositor, TextureTransform};
use crate::pool::TexturePool;
use crate::texture::{Material, Texture};
use crate::{TextureError, TextureResult};

/// Atlas tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtlasSettings {
    /// Margin around every region, in target pixels, for bilinear filtering
    pub margin_pixels: f64,
    /// Tolerance for treating the packing scale as exactly one
    pub scale_epsilon: f64,
}

impl Default for AtlasSettings {
    fn default() -> Self {
        Self {
            margin_pixels: 2.0,
            scale_epsilon: 1e-5,
        }
    }
}

/// Single-submesh mesh with its atlas texture
#[derive(Debug, Clone)]
pub struct MergedAtlas {
    pub mesh: MinMesh,
    pub texture: Texture,
    /// Downscale applied to the source texels, in `(0, 1]`
    pub scaling: f64,
}

/// Merge every submesh of `mesh` into one atlas of at most `target_size` pixels
///
/// `materials` must hold exactly one entry per submesh. Untextured materials
/// keep their UV space in the layout but leave their cells transparent.
pub fn merge_submeshes(
    mesh: &MinMesh,
    materials: &[Material],
    target_size: u32,
    settings: &AtlasSettings,
    compositor: &dyn TextureCompositor,
    pool: &TexturePool,
) -> TextureResult<MergedAtlas> {
    if materials.len() != mesh.submesh_count() {
        return Err(TextureError::MaterialMismatch {
            materials: materials.len(),
            submeshes: mesh.submesh_count(),
        });
    }
    if mesh.triangle_count() == 0 {
        return Err(TextureError::EmptyAtlas);
    }

    let spaces: Vec<SourceSpace> = materials
        .iter()
        .map(|material| SourceSpace::new(material.texture_size(), target_size))
        .collect();

    let rects = triangle_uv_rects(mesh, &spaces, settings.margin_pixels);
    let layout = AtlasLayout::build(&rects, &spaces, target_size);

    let filter = if layout.is_passthrough(settings.scale_epsilon) {
        FilterMode::Point
    } else {
        FilterMode::Bilinear
    };

    let mut texture = pool.acquire(layout.width, layout.height);
    for (i, source_rect) in layout.sources.iter().enumerate() {
        let material = &materials[source_rect.submesh];
        let Some(source) = material.texture.as_deref() else {
            continue;
        };
        let transform = TextureTransform {
            scale: material.scale,
            offset: material.offset,
        };
        compositor.copy_region(
            source,
            transform,
            source_rect,
            &mut texture,
            layout.pixel_rect(i),
            filter,
        )?;
    }

    log::debug!(
        "merged {} submeshes into a {}x{} atlas ({:?}, scale {:.4})",
        materials.len(),
        layout.width,
        layout.height,
        filter,
        layout.scale
    );

    Ok(MergedAtlas {
        mesh: layout.remap_mesh(mesh),
        texture,
        scaling: layout.scale,
    })
}
