//! Manifest Regeneration
//!
//! Rebuilds `tileset.json` from the sidecar metadata files of an output
//! directory. Parent/child links come from the tile names: the children of
//! `name` at level `d` are the `name_{CODE}` tiles at level `d + 1`.

use std::fs;
use std::path::Path;

use ahash::AHashMap;
use meshtiles_core::Octant;
use meshtiles_core::math::DMat4;

use crate::export::content_uri;
use crate::metadata::TileMetadata;
use crate::tileset::{Tile, Tileset, write_tileset};
use crate::{AssetError, AssetResult};

type Sidecars = AHashMap<(u32, String), TileMetadata>;

fn lod_level(dir_name: &str) -> Option<u32> {
    dir_name.strip_prefix("lod")?.parse().ok()
}

fn collect_sidecars(dir: &Path) -> AssetResult<Sidecars> {
    let mut sidecars = Sidecars::new();
    for lod_dir in fs::read_dir(dir)? {
        let lod_dir = lod_dir?;
        let Some(depth) = lod_dir.file_name().to_str().and_then(lod_level) else {
            continue;
        };
        if !lod_dir.file_type()?.is_dir() {
            continue;
        }
        for file in fs::read_dir(lod_dir.path())? {
            let path = file?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            sidecars.insert((depth, name.to_string()), TileMetadata::load(&path)?);
        }
    }
    Ok(sidecars)
}

fn assemble(
    name: &str,
    depth: u32,
    metadata: &TileMetadata,
    sidecars: &Sidecars,
    local_to_world: &DMat4,
    used: &mut usize,
) -> Tile {
    *used += 1;
    let mut tile = Tile::from_metadata(metadata, content_uri(depth, name), local_to_world);
    for octant in Octant::ALL {
        let child = octant.child_name(name);
        if let Some(child_metadata) = sidecars.get(&(depth + 1, child.clone())) {
            tile.children.push(assemble(
                &child,
                depth + 1,
                child_metadata,
                sidecars,
                local_to_world,
                used,
            ));
        }
    }
    tile
}

/// Re-derive the tile tree of `dir` and write `dir/tileset.json`
pub fn rebuild_tileset(dir: impl AsRef<Path>, local_to_world: &DMat4) -> AssetResult<Tileset> {
    let dir = dir.as_ref();
    let sidecars = collect_sidecars(dir)?;

    let mut roots: Vec<&String> = sidecars
        .keys()
        .filter(|(depth, _)| *depth == 0)
        .map(|(_, name)| name)
        .collect();
    roots.sort();
    let Some(&root_name) = roots.first() else {
        return Err(AssetError::NotFound(format!(
            "no lod0 tile metadata in {}",
            dir.display()
        )));
    };
    if roots.len() > 1 {
        log::warn!("{} root tiles found, using {}", roots.len(), root_name);
    }

    let root_metadata = &sidecars[&(0, root_name.clone())];
    let mut used = 0;
    let root = assemble(root_name, 0, root_metadata, &sidecars, local_to_world, &mut used);
    if used < sidecars.len() {
        log::warn!(
            "{} tile metadata files are not linked to {}",
            sidecars.len() - used,
            root_name
        );
    }

    let bounds = root_metadata.bounding_box.to_aabb();
    write_tileset(dir, &root, &bounds)?;
    Ok(Tileset::new(root, &bounds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::GeometricErrors;
    use meshtiles_core::Aabb;
    use meshtiles_core::math::DVec3;

    fn save(dir: &Path, depth: u32, name: &str, triangles: usize) {
        let lod = dir.join(format!("lod{}", depth));
        fs::create_dir_all(&lod).unwrap();
        let metadata = TileMetadata::new(
            &GeometricErrors::NONE,
            triangles,
            Aabb::new(DVec3::ZERO, DVec3::splat(4.0)),
        );
        metadata.save(lod.join(format!("{}.json", name))).unwrap();
    }

    #[test]
    fn test_lod_level() {
        assert_eq!(lod_level("lod0"), Some(0));
        assert_eq!(lod_level("lod12"), Some(12));
        assert_eq!(lod_level("textures"), None);
    }

    #[test]
    fn test_rebuild_links_octant_children() {
        let dir = tempfile::tempdir().unwrap();
        save(dir.path(), 0, "root", 100);
        save(dir.path(), 1, "root_BRF", 50);
        save(dir.path(), 1, "root_TLN", 50);
        save(dir.path(), 2, "root_TLN_TRF", 25);
        save(dir.path(), 1, "stray", 1);
        fs::write(dir.path().join("lod1").join("root_TLN.glb"), b"glTF").unwrap();

        let tileset = rebuild_tileset(dir.path(), &DMat4::IDENTITY).unwrap();
        let root = &tileset.root;
        assert_eq!(root.tile_count(), 4);
        assert_eq!(root.children[0].content.as_ref().unwrap().uri, "lod1/root_TLN.glb");
        assert_eq!(root.children[1].content.as_ref().unwrap().uri, "lod1/root_BRF.glb");
        assert_eq!(
            root.children[0].children[0].content.as_ref().unwrap().uri,
            "lod2/root_TLN_TRF.glb"
        );
        assert!((tileset.geometric_error - 48f64.sqrt()).abs() < 1e-12);

        let written = Tileset::load(dir.path().join("tileset.json")).unwrap();
        assert_eq!(written, tileset);
    }

    #[test]
    fn test_rebuild_without_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        save(dir.path(), 1, "root_TLN", 5);
        assert!(matches!(
            rebuild_tileset(dir.path(), &DMat4::IDENTITY),
            Err(AssetError::NotFound(_))
        ));
    }
}
