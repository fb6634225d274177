//! Tiler configuration

use std::fs;
use std::path::Path;

use meshtiles_core::math::DMat4;
use serde::{Deserialize, Serialize};

use crate::{AssetError, AssetResult};

/// Settings of a tiling run
///
/// Missing fields fall back to their defaults when loaded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilerConfig {
    /// Triangle budget of a single tile
    pub triangles_target: usize,
    /// Deepest level the octree may reach, the root being level 0
    pub max_depth: u32,
    /// Largest atlas side in pixels
    pub target_texture_size: u32,
    /// Export each tile as soon as it is built instead of after the whole tree
    pub blind_export: bool,
    /// Keep submesh and tile border vertices fixed while simplifying
    pub preserve_border_edges: bool,
    /// Model to world transform, column-major
    pub local_to_world: DMat4,
}

impl Default for TilerConfig {
    fn default() -> Self {
        Self {
            triangles_target: 20_000,
            max_depth: 5,
            target_texture_size: 1024,
            blind_export: false,
            preserve_border_edges: true,
            local_to_world: DMat4::IDENTITY,
        }
    }
}

impl TilerConfig {
    /// Load a configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> AssetResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: TilerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> AssetResult<()> {
        fs::write(path.as_ref(), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> AssetResult<()> {
        if self.triangles_target == 0 {
            return Err(AssetError::InvalidConfig(
                "triangles_target must be positive".to_string(),
            ));
        }
        if self.target_texture_size == 0 {
            return Err(AssetError::InvalidConfig(
                "target_texture_size must be positive".to_string(),
            ));
        }
        if !self.local_to_world.is_finite() {
            return Err(AssetError::InvalidConfig(
                "local_to_world has non-finite entries".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TilerConfig::default();
        assert_eq!(config.triangles_target, 20_000);
        assert_eq!(config.max_depth, 5);
        assert_eq!(config.target_texture_size, 1024);
        assert!(!config.blind_export);
        assert!(config.preserve_border_edges);
        assert_eq!(config.local_to_world, DMat4::IDENTITY);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TilerConfig =
            serde_json::from_str(r#"{ "max_depth": 2, "blind_export": true }"#).unwrap();
        assert_eq!(config.max_depth, 2);
        assert!(config.blind_export);
        assert_eq!(config.triangles_target, 20_000);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiler.json");
        let config = TilerConfig {
            triangles_target: 500,
            local_to_world: DMat4::from_translation(meshtiles_core::math::DVec3::new(1.0, 2.0, 3.0)),
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(TilerConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiler.json");
        std::fs::write(&path, r#"{ "triangles_target": 0 }"#).unwrap();
        assert!(matches!(
            TilerConfig::load(&path),
            Err(AssetError::InvalidConfig(_))
        ));
    }
}
