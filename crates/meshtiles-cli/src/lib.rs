//! # meshtiles CLI
//!
//! Command-line interface for the meshtiles tiler.
//!
//! ## Commands
//! - `tile` - Tile an OBJ model into a 3D Tiles dataset
//! - `manifest` - Regenerate `tileset.json` from exported tile metadata
//! - `inspect` - Summarize an OBJ model or a tileset

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use meshtiles_assets::{
    BuildOutput, GlbExporter, LogObserver, TileBuilder, TilerConfig, Tileset,
    VertexClusterSimplifier, import_obj, rebuild_tileset,
};
use meshtiles_texture::CpuCompositor;

/// meshtiles: hierarchical 3D Tiles from a single mesh
#[derive(Parser)]
#[command(name = "meshtiles")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Tile an OBJ model into a 3D Tiles dataset
    Tile {
        /// Input OBJ file
        input: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "tiles")]
        output: PathBuf,

        /// JSON tiler configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Name of the root tile
        #[arg(short, long, default_value = "root")]
        name: String,

        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Regenerate tileset.json from exported tile metadata
    Manifest {
        /// Output directory of a previous `tile` run
        dir: PathBuf,

        /// JSON tiler configuration, for the model transform
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Summarize an OBJ model or a tileset.json
    Inspect {
        /// File to inspect
        path: PathBuf,
    },
}

/// Flags taking precedence over the configuration file
#[derive(clap::Args, Debug, Default, Clone, PartialEq)]
pub struct ConfigOverrides {
    /// Triangle budget per tile
    #[arg(long)]
    pub triangles_target: Option<usize>,

    /// Deepest octree level
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Largest atlas side in pixels
    #[arg(long)]
    pub texture_size: Option<u32>,

    /// Export every tile as soon as it is built
    #[arg(long)]
    pub blind: bool,

    /// Let the simplifier move border vertices
    #[arg(long)]
    pub no_border_lock: bool,
}

/// Load the configuration file if any, then apply the flags
pub fn resolve_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<TilerConfig> {
    let mut config = match path {
        Some(path) => TilerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TilerConfig::default(),
    };

    if let Some(triangles_target) = overrides.triangles_target {
        config.triangles_target = triangles_target;
    }
    if let Some(max_depth) = overrides.max_depth {
        config.max_depth = max_depth;
    }
    if let Some(texture_size) = overrides.texture_size {
        config.target_texture_size = texture_size;
    }
    if overrides.blind {
        config.blind_export = true;
    }
    if overrides.no_border_lock {
        config.preserve_border_edges = false;
    }

    config.validate()?;
    Ok(config)
}

/// Import, tile and export `input` into `output`
pub fn run_tile(input: &Path, output: &Path, config: TilerConfig, name: &str) -> Result<BuildOutput> {
    let model = import_obj(input).with_context(|| format!("Failed to import {}", input.display()))?;

    let simplifier = VertexClusterSimplifier::new(config.preserve_border_edges);
    let observer = LogObserver::new();
    let builder = TileBuilder::new(
        config,
        output,
        &simplifier,
        &CpuCompositor,
        &GlbExporter,
        &observer,
    );

    let result = builder
        .build(&model.mesh, &model.materials, name)
        .context("Tile build failed")?;
    let tileset = result.write_tileset(output)?;
    log::info!("Tileset written to {}", tileset.display());

    let report = &result.report;
    if !report.is_success() {
        bail!(
            "{} subtrees failed and {} chunks could not be exported",
            report.failures.len(),
            report.export.failed.len()
        );
    }
    Ok(result)
}

fn inspect(path: &Path) -> Result<()> {
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        let tileset =
            Tileset::load(path).with_context(|| format!("Failed to read {}", path.display()))?;
        log::info!("Tileset {}", path.display());
        log::info!("  Version: {}", tileset.asset.version);
        log::info!("  Geometric error: {:.4}", tileset.geometric_error);
        log::info!("  Tiles: {}", tileset.root.tile_count());
        log::info!("  Levels: {}", tileset.root.depth() + 1);
        log::info!("  Root error: {:.6}", tileset.root.geometric_error);
        return Ok(());
    }

    let model = import_obj(path).with_context(|| format!("Failed to import {}", path.display()))?;
    let bounds = model.mesh.bounds();
    log::info!("Model {}", path.display());
    log::info!("  Vertices: {}", model.mesh.vertex_count());
    log::info!("  Triangles: {}", model.mesh.triangle_count());
    log::info!("  Bounds: {:?} .. {:?}", bounds.min, bounds.max);
    for (material, submesh) in model.materials.iter().zip(&model.mesh.submeshes) {
        match material.texture_size() {
            Some((w, h)) => log::info!(
                "  {}: {} triangles, {}x{} texture",
                material.name,
                submesh.triangle_count(),
                w,
                h
            ),
            None => log::info!(
                "  {}: {} triangles, untextured",
                material.name,
                submesh.triangle_count()
            ),
        }
    }
    Ok(())
}

/// Execute the CLI command
pub fn execute(cli: Cli) -> Result<()> {
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    match cli.command {
        Commands::Tile {
            input,
            output,
            config,
            name,
            overrides,
        } => {
            let config = resolve_config(config.as_deref(), &overrides)?;
            log::info!("Tiling {}...", input.display());
            log::info!("  Output: {}", output.display());
            log::info!("  Triangles per tile: {}", config.triangles_target);
            log::info!("  Max depth: {}", config.max_depth);
            log::info!("  Texture size: {}", config.target_texture_size);
            let result = run_tile(&input, &output, config, &name)?;
            log::info!("Tiling complete! {} tiles", result.report.tiles);
        }

        Commands::Manifest { dir, config } => {
            let config = resolve_config(config.as_deref(), &ConfigOverrides::default())?;
            let tileset = rebuild_tileset(&dir, &config.local_to_world)
                .with_context(|| format!("Failed to rebuild the manifest of {}", dir.display()))?;
            log::info!("Manifest rebuilt with {} tiles", tileset.root.tile_count());
        }

        Commands::Inspect { path } => inspect(&path)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLES: &str = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
v 0 0 1
f 1 2 3
f 1 3 4
f 1 4 5
f 1 5 2
";

    #[test]
    fn test_cli_parse() {
        let cli = Cli::parse_from(["meshtiles", "inspect", "model.obj"]);
        assert!(matches!(cli.command, Commands::Inspect { .. }));
    }

    #[test]
    fn test_tile_command() {
        let cli = Cli::parse_from([
            "meshtiles",
            "-v",
            "tile",
            "model.obj",
            "-o",
            "out",
            "--max-depth",
            "3",
            "--blind",
        ]);
        assert!(cli.verbose);
        if let Commands::Tile {
            input,
            output,
            config,
            name,
            overrides,
        } = cli.command
        {
            assert_eq!(input, PathBuf::from("model.obj"));
            assert_eq!(output, PathBuf::from("out"));
            assert_eq!(config, None);
            assert_eq!(name, "root");
            assert_eq!(overrides.max_depth, Some(3));
            assert!(overrides.blind);
            assert!(!overrides.no_border_lock);
        } else {
            panic!("Expected Tile command");
        }
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiler.json");
        std::fs::write(&path, r#"{ "triangles_target": 500, "max_depth": 2 }"#).unwrap();

        let overrides = ConfigOverrides {
            max_depth: Some(4),
            no_border_lock: true,
            ..Default::default()
        };
        let config = resolve_config(Some(path.as_path()), &overrides).unwrap();
        assert_eq!(config.triangles_target, 500);
        assert_eq!(config.max_depth, 4);
        assert!(!config.preserve_border_edges);
        assert_eq!(config.target_texture_size, 1024);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let overrides = ConfigOverrides {
            texture_size: Some(0),
            ..Default::default()
        };
        assert!(resolve_config(None, &overrides).is_err());
    }

    #[test]
    fn test_tile_then_rebuild_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("fan.obj");
        std::fs::write(&input, TRIANGLES).unwrap();
        let output = dir.path().join("tiles");

        let config = TilerConfig {
            triangles_target: 2,
            max_depth: 1,
            ..Default::default()
        };
        let result = run_tile(&input, &output, config, "fan").unwrap();
        assert!(result.report.tiles > 1);
        assert!(output.join("tileset.json").is_file());
        assert!(output.join("lod0/fan.glb").is_file());

        let written = Tileset::load(output.join("tileset.json")).unwrap();
        let rebuilt = rebuild_tileset(&output, &TilerConfig::default().local_to_world).unwrap();
        assert_eq!(rebuilt.root.tile_count(), written.root.tile_count());
    }
}
