//! Tile Tree Builder
//!
//! Depth-first construction of the tile tree. For every node:
//!
//! 1. simplify the node mesh down to the triangle budget,
//! 2. merge its materials into one atlas when needed,
//! 3. estimate the geometric errors and emit the tile,
//! 4. unless the node already meets every target or the depth limit is
//!    reached, split the *unsimplified* node mesh into octants and recurse.
//!
//! A parent is always exported before its children. A failure below a node
//! only drops that node's children; the failure is logged and kept in the
//! build report.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use meshtiles_core::{Aabb, MinMesh, Octant, TimeMeasure, octree_split, split_point};
use meshtiles_texture::{AtlasSettings, Material, TextureCompositor, TexturePool, merge_submeshes};

use crate::config::TilerConfig;
use crate::estimator::{ErrorInputs, estimate};
use crate::export::{ChunkExporter, ExportEntry, ExportSummary, content_uri, export_chunks, export_entry};
use crate::metadata::TileMetadata;
use crate::observer::BuildObserver;
use crate::simplify::Simplifier;
use crate::tileset::{Tile, write_tileset};
use crate::{AssetError, AssetResult};

/// A subtree that could not be built
#[derive(Debug, Clone, PartialEq)]
pub struct SubtreeFailure {
    /// Tile whose children were dropped
    pub name: String,
    pub error: String,
}

/// What happened during a build
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub tiles: usize,
    /// Quality shortfalls of tiles at the depth limit
    pub warnings: Vec<String>,
    pub failures: Vec<SubtreeFailure>,
    pub export: ExportSummary,
    /// Per step timings
    pub timings: String,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.export.is_success()
    }
}

/// Result of [`TileBuilder::build`]
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub root: Tile,
    /// Bounds of the input mesh
    pub bounds: Aabb,
    pub report: BuildReport,
}

impl BuildOutput {
    /// Write `dir/tileset.json` for the built tree
    pub fn write_tileset(&self, dir: impl AsRef<Path>) -> AssetResult<PathBuf> {
        write_tileset(dir, &self.root, &self.bounds)
    }
}

struct BuildState {
    chunks: IndexMap<String, ExportEntry>,
    report: BuildReport,
    time: TimeMeasure,
}

/// Recursive tile tree builder
///
/// Collaborators are borrowed for the builder's lifetime; the texture pool is
/// owned and reused across nodes.
pub struct TileBuilder<'a> {
    config: TilerConfig,
    atlas: AtlasSettings,
    output_dir: PathBuf,
    simplifier: &'a dyn Simplifier,
    compositor: &'a dyn TextureCompositor,
    exporter: &'a dyn ChunkExporter,
    observer: &'a dyn BuildObserver,
    pool: TexturePool,
}

impl<'a> TileBuilder<'a> {
    pub fn new(
        config: TilerConfig,
        output_dir: impl Into<PathBuf>,
        simplifier: &'a dyn Simplifier,
        compositor: &'a dyn TextureCompositor,
        exporter: &'a dyn ChunkExporter,
        observer: &'a dyn BuildObserver,
    ) -> Self {
        Self {
            config,
            atlas: AtlasSettings::default(),
            output_dir: output_dir.into(),
            simplifier,
            compositor,
            exporter,
            observer,
            pool: TexturePool::default(),
        }
    }

    pub fn with_atlas_settings(mut self, atlas: AtlasSettings) -> Self {
        self.atlas = atlas;
        self
    }

    pub fn config(&self) -> &TilerConfig {
        &self.config
    }

    pub fn pool(&self) -> &TexturePool {
        &self.pool
    }

    /// Build and export the tile tree of `mesh`, naming the root tile `name`
    ///
    /// `materials` holds one material per submesh.
    pub fn build(&self, mesh: &MinMesh, materials: &[Material], name: &str) -> AssetResult<BuildOutput> {
        self.config.validate()?;
        mesh.validate()?;
        if materials.len() != mesh.submesh_count() {
            return Err(AssetError::MaterialMismatch {
                materials: materials.len(),
                submeshes: mesh.submesh_count(),
            });
        }
        if mesh.triangle_count() == 0 {
            return Err(AssetError::EmptyMesh);
        }

        log::info!(
            "Building tiles for {} ({} triangles, target {}, max depth {})",
            name,
            mesh.triangle_count(),
            self.config.triangles_target,
            self.config.max_depth
        );

        let mut state = BuildState {
            chunks: IndexMap::new(),
            report: BuildReport::default(),
            time: TimeMeasure::new(),
        };

        let root = self.build_node(mesh, materials, name, 0, (0.0, 1.0), &mut state)?;

        if !self.config.blind_export {
            state.time.start("export");
            state.report.export =
                export_chunks(&state.chunks, self.exporter, &self.output_dir, self.observer);
            state.time.stop("export");
        }
        self.observer.on_progress(1.0, "Done");

        state.report.tiles = root.tile_count();
        state.report.timings = state.time.report();
        log::debug!("Build timings:\n{}", state.report.timings);
        log::info!(
            "Built {} tiles, {} warnings, {} failed subtrees",
            state.report.tiles,
            state.report.warnings.len(),
            state.report.failures.len()
        );

        Ok(BuildOutput {
            root,
            bounds: mesh.bounds(),
            report: state.report,
        })
    }

    fn build_node(
        &self,
        mesh: &MinMesh,
        materials: &[Material],
        name: &str,
        depth: u32,
        span: (f64, f64),
        state: &mut BuildState,
    ) -> AssetResult<Tile> {
        if self.observer.is_cancelled() {
            return Err(AssetError::Cancelled);
        }
        self.observer.on_progress(span.0, &format!("Building tile {}", name));

        let target = self.config.triangles_target;
        let triangle_count = mesh.triangle_count();
        let triangle_count_reached = triangle_count <= target;
        let lod = if triangle_count_reached {
            mesh.clone()
        } else {
            let ratio = target as f64 / triangle_count as f64;
            let simplified = state
                .time
                .measure("simplify", || self.simplifier.simplify(mesh, ratio));
            if simplified.triangle_count() == 0 {
                self.observer
                    .on_warning(&format!("Simplification emptied tile {}, keeping full mesh", name));
                mesh.clone()
            } else {
                simplified
            }
        };

        let (lod, lod_materials, scaling) = self.consolidate_textures(lod, materials, state)?;
        let texture_size_reached = (scaling - 1.0).abs() < self.atlas.scale_epsilon;
        let most_detailed = triangle_count_reached && texture_size_reached;

        let texture_size = match lod_materials.as_slice() {
            [material] => material.texture_size(),
            _ => None,
        };
        let errors = estimate(&ErrorInputs {
            mesh: &lod,
            texture_size,
            texture_scaling: scaling,
            depth,
            most_detailed,
        });

        let metadata = TileMetadata::new(&errors, lod.triangle_count(), lod.bounds());
        let mut tile = Tile::from_metadata(
            &metadata,
            content_uri(depth, name),
            &self.config.local_to_world,
        );
        log::debug!(
            "tile {}: {} -> {} triangles, scaling {:.4}, error {:.6}{}",
            name,
            triangle_count,
            lod.triangle_count(),
            scaling,
            errors.geometric_error(),
            if most_detailed { " (most detailed)" } else { "" }
        );

        let entry = ExportEntry {
            name: name.to_string(),
            depth,
            metadata,
            mesh: lod,
            materials: lod_materials,
        };
        if self.config.blind_export {
            state.time.start("export");
            let result = export_entry(self.exporter, &self.output_dir, &entry);
            state.time.stop("export");
            state.report.export.record(name, result);
            self.release_textures(entry.materials);
        } else {
            state.chunks.insert(entry.name.clone(), entry);
        }

        if depth + 1 > self.config.max_depth {
            if !most_detailed {
                let mut unmet = Vec::new();
                if !triangle_count_reached {
                    unmet.push(format!("{} triangles over a target of {}", triangle_count, target));
                }
                if !texture_size_reached {
                    unmet.push(format!("texture downscaled by {:.4}", scaling));
                }
                let message = format!(
                    "Tile {} reached the maximum depth {}: {}",
                    name,
                    self.config.max_depth,
                    unmet.join(", ")
                );
                self.observer.on_warning(&message);
                state.report.warnings.push(message);
            }
            return Ok(tile);
        }
        if most_detailed {
            return Ok(tile);
        }

        let point = split_point(mesh);
        let octants = match state.time.measure("split", || octree_split(mesh, point)) {
            Ok(octants) => octants,
            Err(e) => {
                log::error!("Cannot split tile {}: {}", name, e);
                state.report.failures.push(SubtreeFailure {
                    name: name.to_string(),
                    error: e.to_string(),
                });
                return Ok(tile);
            }
        };

        let children: Vec<(Octant, MinMesh)> = Octant::ALL
            .into_iter()
            .zip(octants)
            .filter(|(_, child)| child.triangle_count() > 0)
            .collect();
        let step = (span.1 - span.0) / children.len().max(1) as f64;

        for (i, (octant, child)) in children.iter().enumerate() {
            let child_name = octant.child_name(name);
            let start = span.0 + step * i as f64;
            let child_span = (start, start + step);
            match self.build_node(child, materials, &child_name, depth + 1, child_span, state) {
                Ok(child_tile) => tile.children.push(child_tile),
                Err(AssetError::Cancelled) => return Err(AssetError::Cancelled),
                Err(e) => {
                    log::error!("Tile {} failed: {}", child_name, e);
                    state.report.failures.push(SubtreeFailure {
                        name: child_name,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(tile)
    }

    /// Merge the node's materials into one atlas when several submeshes carry
    /// at least one texture or any texture is oversized
    fn consolidate_textures(
        &self,
        lod: MinMesh,
        materials: &[Material],
        state: &mut BuildState,
    ) -> AssetResult<(MinMesh, Vec<Material>, f64)> {
        let target_size = self.config.target_texture_size;
        let textured: Vec<(u32, u32)> = materials.iter().filter_map(Material::texture_size).collect();
        let oversized = textured
            .iter()
            .any(|&(w, h)| w > target_size || h > target_size);
        // Untextured-only meshes keep one primitive per material
        let needs_merge = (lod.submesh_count() > 1 && !textured.is_empty()) || oversized;

        if !needs_merge || lod.triangle_count() == 0 {
            return Ok((lod, materials.to_vec(), 1.0));
        }

        let merged = state.time.measure("atlas", || {
            merge_submeshes(
                &lod,
                materials,
                target_size,
                &self.atlas,
                self.compositor,
                &self.pool,
            )
        })?;
        let material = Material::new("atlas").with_texture(Arc::new(merged.texture));
        Ok((merged.mesh, vec![material], merged.scaling))
    }

    fn release_textures(&self, materials: Vec<Material>) {
        for material in materials {
            if let Some(texture) = material.texture.and_then(|t| Arc::try_unwrap(t).ok()) {
                self.pool.release(texture);
            }
        }
    }
}
