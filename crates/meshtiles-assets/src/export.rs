//! Chunk Export
//!
//! Every tile is written as a binary glTF model plus a sidecar metadata JSON.
//! Paths are relative to the output directory: `lod{depth}/{name}.glb` and
//! `lod{depth}/{name}.json`.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use meshtiles_core::MinMesh;
use meshtiles_texture::Material;
use serde_json::{Value, json};

use crate::metadata::TileMetadata;
use crate::observer::BuildObserver;
use crate::{AssetError, AssetResult};

const GLB_MAGIC: &[u8; 4] = b"glTF";
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

const ARRAY_BUFFER: u32 = 34962;
const ELEMENT_ARRAY_BUFFER: u32 = 34963;
const FLOAT: u32 = 5126;
const UNSIGNED_INT: u32 = 5125;
const LINEAR: u32 = 9729;
const CLAMP_TO_EDGE: u32 = 33071;
const TRIANGLES: u32 = 4;

/// Content URI of a tile
pub fn content_uri(depth: u32, name: &str) -> String {
    format!("lod{}/{}.glb", depth, name)
}

/// Everything needed to write one tile
#[derive(Debug, Clone)]
pub struct ExportEntry {
    pub name: String,
    pub depth: u32,
    pub metadata: TileMetadata,
    pub mesh: MinMesh,
    /// One material per submesh
    pub materials: Vec<Material>,
}

impl ExportEntry {
    pub fn model_path(&self) -> PathBuf {
        PathBuf::from(format!("lod{}", self.depth)).join(format!("{}.glb", self.name))
    }

    pub fn metadata_path(&self) -> PathBuf {
        PathBuf::from(format!("lod{}", self.depth)).join(format!("{}.json", self.name))
    }

    pub fn content_uri(&self) -> String {
        content_uri(self.depth, &self.name)
    }
}

/// Writes a tile's model and sidecar metadata
pub trait ChunkExporter {
    fn export_chunk(&self, entry: &ExportEntry, model_path: &Path, metadata_path: &Path) -> AssetResult<()>;
}

/// Binary glTF 2.0 exporter with embedded PNG textures
#[derive(Debug, Clone, Copy, Default)]
pub struct GlbExporter;

impl ChunkExporter for GlbExporter {
    fn export_chunk(&self, entry: &ExportEntry, model_path: &Path, metadata_path: &Path) -> AssetResult<()> {
        for path in [model_path, metadata_path] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }

        // The sidecar goes first so the manifest can be rebuilt from what exists.
        entry.metadata.save(metadata_path)?;
        let glb = encode_glb(entry)?;
        fs::write(model_path, glb)?;

        log::debug!(
            "exported {} ({} triangles) to {}",
            entry.name,
            entry.mesh.triangle_count(),
            model_path.display()
        );
        Ok(())
    }
}

#[derive(Default)]
struct BinaryBuffer {
    bytes: Vec<u8>,
    views: Vec<Value>,
}

impl BinaryBuffer {
    fn align(&mut self) {
        while self.bytes.len() % 4 != 0 {
            self.bytes.push(0);
        }
    }

    fn push_view(&mut self, data: &[u8], target: Option<u32>) -> usize {
        self.align();
        let mut view = json!({
            "buffer": 0,
            "byteOffset": self.bytes.len(),
            "byteLength": data.len(),
        });
        if let Some(target) = target {
            view["target"] = json!(target);
        }
        self.bytes.extend_from_slice(data);
        self.views.push(view);
        self.views.len() - 1
    }
}

fn f32_bytes(values: impl Iterator<Item = f32>) -> Vec<u8> {
    values.flat_map(f32::to_le_bytes).collect()
}

/// Encode an entry as a GLB file
pub fn encode_glb(entry: &ExportEntry) -> AssetResult<Vec<u8>> {
    let mesh = &entry.mesh;
    if mesh.triangle_count() == 0 {
        return Err(AssetError::ExportFailed {
            name: entry.name.clone(),
            reason: "mesh has no triangles".to_string(),
        });
    }
    if entry.materials.len() != mesh.submesh_count() {
        return Err(AssetError::MaterialMismatch {
            materials: entry.materials.len(),
            submeshes: mesh.submesh_count(),
        });
    }

    let mut buffer = BinaryBuffer::default();
    let mut accessors = Vec::new();
    let vertex_count = mesh.vertex_count();

    let bounds = mesh.bounds();
    let positions = f32_bytes(
        mesh.vertices
            .iter()
            .flat_map(|v| v.position.as_vec3().to_array()),
    );
    let position_view = buffer.push_view(&positions, Some(ARRAY_BUFFER));
    accessors.push(json!({
        "bufferView": position_view,
        "componentType": FLOAT,
        "count": vertex_count,
        "type": "VEC3",
        "min": bounds.min.as_vec3().to_array(),
        "max": bounds.max.as_vec3().to_array(),
    }));

    let uvs = f32_bytes(mesh.vertices.iter().flat_map(|v| v.uv.as_vec2().to_array()));
    let uv_view = buffer.push_view(&uvs, Some(ARRAY_BUFFER));
    accessors.push(json!({
        "bufferView": uv_view,
        "componentType": FLOAT,
        "count": vertex_count,
        "type": "VEC2",
    }));

    let indices: Vec<u8> = mesh.triangles.iter().flat_map(|i| i.to_le_bytes()).collect();
    let index_view = buffer.push_view(&indices, Some(ELEMENT_ARRAY_BUFFER));

    let mut images = Vec::new();
    let mut textures = Vec::new();
    let mut materials = Vec::new();
    for material in &entry.materials {
        let mut pbr = json!({ "metallicFactor": 0.0, "roughnessFactor": 1.0 });
        if let Some(texture) = material.texture.as_deref() {
            let png = texture.encode_png()?;
            let view = buffer.push_view(&png, None);
            images.push(json!({ "bufferView": view, "mimeType": "image/png" }));
            textures.push(json!({ "sampler": 0, "source": images.len() - 1 }));
            pbr["baseColorTexture"] = json!({ "index": textures.len() - 1 });
        }
        materials.push(json!({
            "name": material.name,
            "pbrMetallicRoughness": pbr,
            "extensions": { "KHR_materials_unlit": {} },
        }));
    }

    let mut primitives = Vec::new();
    for (submesh, descriptor) in mesh.submeshes.iter().enumerate() {
        if descriptor.is_empty() {
            continue;
        }
        accessors.push(json!({
            "bufferView": index_view,
            "byteOffset": descriptor.index_start * 4,
            "componentType": UNSIGNED_INT,
            "count": descriptor.index_count,
            "type": "SCALAR",
        }));
        primitives.push(json!({
            "attributes": { "POSITION": 0, "TEXCOORD_0": 1 },
            "indices": accessors.len() - 1,
            "material": submesh,
            "mode": TRIANGLES,
        }));
    }

    buffer.align();
    let mut document = json!({
        "asset": { "version": "2.0", "generator": "meshtiles" },
        "extensionsUsed": ["KHR_materials_unlit"],
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": entry.name, "mesh": 0 }],
        "meshes": [{ "name": entry.name, "primitives": primitives }],
        "materials": materials,
        "accessors": accessors,
        "bufferViews": buffer.views,
        "buffers": [{ "byteLength": buffer.bytes.len() }],
    });
    if !images.is_empty() {
        document["images"] = Value::Array(images);
        document["textures"] = Value::Array(textures);
        document["samplers"] = json!([{
            "magFilter": LINEAR,
            "minFilter": LINEAR,
            "wrapS": CLAMP_TO_EDGE,
            "wrapT": CLAMP_TO_EDGE,
        }]);
    }

    let mut json_chunk = serde_json::to_vec(&document)?;
    while json_chunk.len() % 4 != 0 {
        json_chunk.push(b' ');
    }

    let total = 12 + 8 + json_chunk.len() + 8 + buffer.bytes.len();
    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(GLB_MAGIC);
    glb.extend_from_slice(&GLB_VERSION.to_le_bytes());
    glb.extend_from_slice(&(total as u32).to_le_bytes());
    glb.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
    glb.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    glb.extend_from_slice(&json_chunk);
    glb.extend_from_slice(&(buffer.bytes.len() as u32).to_le_bytes());
    glb.extend_from_slice(&CHUNK_BIN.to_le_bytes());
    glb.extend_from_slice(&buffer.bytes);
    Ok(glb)
}

/// Outcome of exporting a set of chunks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportSummary {
    pub exported: Vec<String>,
    /// Chunk name and failure message
    pub failed: Vec<(String, String)>,
}

impl ExportSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn record(&mut self, name: &str, result: AssetResult<()>) {
        match result {
            Ok(()) => self.exported.push(name.to_string()),
            Err(e) => {
                log::error!("Failed to export chunk {}: {}", name, e);
                self.failed.push((name.to_string(), e.to_string()));
            }
        }
    }
}

/// Export one entry below `dir`
pub fn export_entry(exporter: &dyn ChunkExporter, dir: &Path, entry: &ExportEntry) -> AssetResult<()> {
    exporter.export_chunk(
        entry,
        &dir.join(entry.model_path()),
        &dir.join(entry.metadata_path()),
    )
}

/// Export every entry, carrying on past failures
pub fn export_chunks(
    entries: &IndexMap<String, ExportEntry>,
    exporter: &dyn ChunkExporter,
    dir: &Path,
    observer: &dyn BuildObserver,
) -> ExportSummary {
    let mut summary = ExportSummary::default();
    let total = entries.len();

    for (i, entry) in entries.values().enumerate() {
        observer.on_progress(
            i as f64 / total as f64,
            &format!("Exporting chunk ({}/{})", i + 1, total),
        );
        summary.record(&entry.name, export_entry(exporter, dir, entry));
    }

    if summary.is_success() {
        log::info!("Exported all {} tile chunks to {}", total, dir.display());
    } else {
        log::error!(
            "{} of {} tile chunks failed to export",
            summary.failed.len(),
            total
        );
    }
    summary
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use meshtiles_core::math::{DVec2, DVec3};
    use meshtiles_core::{Aabb, SubMeshDescriptor, Vertex};
    use meshtiles_texture::Texture;

    use super::*;
    use crate::estimator::GeometricErrors;
    use crate::observer::RecordingObserver;

    fn entry(name: &str, depth: u32) -> ExportEntry {
        let vertices = vec![
            Vertex::new(DVec3::ZERO, DVec2::new(0.0, 0.0)),
            Vertex::new(DVec3::X, DVec2::new(1.0, 0.0)),
            Vertex::new(DVec3::Y, DVec2::new(0.0, 1.0)),
        ];
        let mesh = MinMesh::with_single_submesh(vertices, vec![0, 1, 2]);
        let metadata = TileMetadata::new(&GeometricErrors::NONE, 1, mesh.bounds());
        ExportEntry {
            name: name.to_string(),
            depth,
            metadata,
            mesh,
            materials: vec![Material::new(name).with_texture(Arc::new(Texture::new(4, 4)))],
        }
    }

    fn json_chunk(glb: &[u8]) -> Value {
        let length = u32::from_le_bytes(glb[12..16].try_into().unwrap()) as usize;
        serde_json::from_slice(&glb[20..20 + length]).unwrap()
    }

    #[test]
    fn test_paths() {
        let entry = entry("root_TLN", 1);
        assert_eq!(entry.model_path(), Path::new("lod1").join("root_TLN.glb"));
        assert_eq!(entry.metadata_path(), Path::new("lod1").join("root_TLN.json"));
        assert_eq!(entry.content_uri(), "lod1/root_TLN.glb");
    }

    #[test]
    fn test_glb_layout() {
        let glb = encode_glb(&entry("root", 0)).unwrap();
        assert_eq!(&glb[0..4], b"glTF");
        assert_eq!(u32::from_le_bytes(glb[4..8].try_into().unwrap()), 2);
        assert_eq!(u32::from_le_bytes(glb[8..12].try_into().unwrap()) as usize, glb.len());
        assert_eq!(glb.len() % 4, 0);

        let document = json_chunk(&glb);
        assert_eq!(document["asset"]["version"], "2.0");
        assert_eq!(document["accessors"][0]["count"], 3);
        assert_eq!(document["accessors"][0]["type"], "VEC3");
        assert_eq!(document["images"][0]["mimeType"], "image/png");
        assert_eq!(
            document["meshes"][0]["primitives"][0]["attributes"]["TEXCOORD_0"],
            1
        );
        assert!(document["materials"][0]["extensions"]["KHR_materials_unlit"].is_object());
    }

    #[test]
    fn test_one_primitive_per_non_empty_submesh() {
        let mut entry = entry("multi", 0);
        entry.mesh.vertices.push(Vertex::new(DVec3::ONE, DVec2::ONE));
        entry.mesh.triangles.extend([1, 3, 2]);
        entry.mesh.submeshes = vec![
            SubMeshDescriptor::new(0, 3),
            SubMeshDescriptor::new(3, 0),
            SubMeshDescriptor::new(3, 3),
        ];
        entry.materials = vec![Material::new("a"), Material::new("b"), Material::new("c")];

        let document = json_chunk(&encode_glb(&entry).unwrap());
        let primitives = document["meshes"][0]["primitives"].as_array().unwrap();
        assert_eq!(primitives.len(), 2);
        assert_eq!(primitives[1]["material"], 2);
        assert_eq!(document["accessors"][3]["byteOffset"], 12);
        assert!(document.get("images").is_none());
    }

    #[test]
    fn test_empty_mesh_fails() {
        let mut entry = entry("empty", 0);
        entry.mesh = MinMesh::default();
        entry.materials.clear();
        assert!(matches!(
            encode_glb(&entry),
            Err(AssetError::ExportFailed { .. })
        ));
    }

    #[test]
    fn test_export_writes_model_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let entry = entry("root", 0);
        export_entry(&GlbExporter, dir.path(), &entry).unwrap();

        assert!(dir.path().join("lod0/root.glb").is_file());
        let metadata = TileMetadata::load(dir.path().join("lod0/root.json")).unwrap();
        assert_eq!(metadata, entry.metadata);
        assert_eq!(
            metadata.bounding_box.to_aabb(),
            Aabb::new(DVec3::ZERO, DVec3::new(1.0, 1.0, 0.0))
        );
    }

    struct FailingExporter;

    impl ChunkExporter for FailingExporter {
        fn export_chunk(&self, entry: &ExportEntry, model_path: &Path, metadata_path: &Path) -> AssetResult<()> {
            if entry.name.ends_with("_BAD") {
                return Err(AssetError::ExportFailed {
                    name: entry.name.clone(),
                    reason: "disk full".to_string(),
                });
            }
            GlbExporter.export_chunk(entry, model_path, metadata_path)
        }
    }

    #[test]
    fn test_export_chunks_continues_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut entries = IndexMap::new();
        for (name, depth) in [("root", 0), ("root_BAD", 1), ("root_TRF", 1)] {
            entries.insert(name.to_string(), entry(name, depth));
        }
        let observer = RecordingObserver::new();

        let summary = export_chunks(&entries, &FailingExporter, dir.path(), &observer);
        assert!(!summary.is_success());
        assert_eq!(summary.exported, vec!["root".to_string(), "root_TRF".to_string()]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "root_BAD");
        assert!(dir.path().join("lod1/root_TRF.glb").is_file());
        assert_eq!(observer.progress().len(), 3);
    }
}
