//! Wavefront OBJ Import
//!
//! Reads positions, texture coordinates and faces. Every `usemtl` material
//! becomes a submesh, in the order materials are first used. Material
//! libraries provide the diffuse texture (`map_Kd`) of each material.
//!
//! OBJ texture coordinates have v = 0 on the bottom image row; they are
//! flipped on import so every UV in the tiler has v = 0 on the first row.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use indexmap::IndexMap;
use meshtiles_core::math::{DVec2, DVec3};
use meshtiles_core::{MinMesh, SubMeshDescriptor, Vertex};
use meshtiles_texture::{Material, Texture};

use crate::{AssetError, AssetResult};

const DEFAULT_MATERIAL: &str = "default";

/// Mesh and one material per submesh
#[derive(Debug, Clone)]
pub struct ObjModel {
    pub mesh: MinMesh,
    pub materials: Vec<Material>,
}

/// Diffuse map of an MTL material
#[derive(Debug, Clone, PartialEq)]
struct MapKd {
    path: PathBuf,
    scale: DVec2,
    offset: DVec2,
}

/// Import an OBJ file and the materials it references
pub fn import_obj(path: impl AsRef<Path>) -> AssetResult<ObjModel> {
    let path = path.as_ref();
    let file = fs::File::open(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let parsed = parse_obj(BufReader::new(file))?;

    let mut libraries = AHashMap::new();
    for library in &parsed.material_libraries {
        let library_path = base_dir.join(library);
        match fs::File::open(&library_path) {
            Ok(file) => {
                let library_dir = library_path.parent().unwrap_or(base_dir);
                libraries.extend(parse_mtl(BufReader::new(file), library_dir)?);
            }
            Err(e) => log::warn!("Cannot open material library {}: {}", library_path.display(), e),
        }
    }

    let mut textures: AHashMap<PathBuf, Arc<Texture>> = AHashMap::new();
    let mut materials = Vec::with_capacity(parsed.material_names.len());
    for name in &parsed.material_names {
        let mut material = Material::new(name.as_str());
        if let Some(map) = libraries.get(name) {
            let texture = match textures.get(&map.path) {
                Some(texture) => Some(Arc::clone(texture)),
                None => match Texture::load(&map.path) {
                    Ok(texture) => {
                        let texture = Arc::new(texture);
                        textures.insert(map.path.clone(), Arc::clone(&texture));
                        Some(texture)
                    }
                    Err(e) => {
                        log::warn!("Cannot load texture {}: {}", map.path.display(), e);
                        None
                    }
                },
            };
            if let Some(texture) = texture {
                material = material.with_texture(texture).with_transform(map.scale, map.offset);
            }
        }
        materials.push(material);
    }

    log::info!(
        "Imported {}: {} vertices, {} triangles, {} materials ({} textures)",
        path.display(),
        parsed.mesh.vertex_count(),
        parsed.mesh.triangle_count(),
        materials.len(),
        textures.len()
    );

    Ok(ObjModel {
        mesh: parsed.mesh,
        materials,
    })
}

/// Geometry part of an OBJ document
#[derive(Debug, Clone)]
pub struct ParsedObj {
    pub mesh: MinMesh,
    /// Submesh material names
    pub material_names: Vec<String>,
    pub material_libraries: Vec<String>,
}

fn parse_error(line: usize, message: impl Into<String>) -> AssetError {
    AssetError::Parse {
        line,
        message: message.into(),
    }
}

fn parse_floats<const N: usize>(fields: &[&str], line: usize) -> AssetResult<[f64; N]> {
    let mut values = [0.0; N];
    for (i, value) in values.iter_mut().enumerate() {
        let field = fields
            .get(i)
            .ok_or_else(|| parse_error(line, format!("expected {} numbers", N)))?;
        *value = field
            .parse()
            .map_err(|_| parse_error(line, format!("invalid number '{}'", field)))?;
    }
    Ok(values)
}

/// Resolve a 1-based or negative (relative) OBJ index
fn resolve_index(field: &str, count: usize, line: usize) -> AssetResult<usize> {
    let index: i64 = field
        .parse()
        .map_err(|_| parse_error(line, format!("invalid index '{}'", field)))?;
    let resolved = match index {
        i if i > 0 => i - 1,
        i if i < 0 => count as i64 + i,
        _ => return Err(parse_error(line, "index 0 is not valid")),
    };
    if resolved < 0 || resolved as usize >= count {
        return Err(parse_error(
            line,
            format!("index {} out of range ({} defined)", index, count),
        ));
    }
    Ok(resolved as usize)
}

/// Parse OBJ geometry
pub fn parse_obj(reader: impl BufRead) -> AssetResult<ParsedObj> {
    let mut positions: Vec<DVec3> = Vec::new();
    let mut uvs: Vec<DVec2> = Vec::new();
    let mut vertices: Vec<Vertex> = Vec::new();
    let mut vertex_ids: AHashMap<(usize, Option<usize>), u32> = AHashMap::new();
    let mut groups: IndexMap<String, Vec<u32>> = IndexMap::new();
    let mut libraries = Vec::new();
    let mut current = DEFAULT_MATERIAL.to_string();

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let number = number + 1;
        let line = line.split('#').next().unwrap_or("").trim();
        let mut fields = line.split_whitespace();
        let Some(keyword) = fields.next() else {
            continue;
        };
        let fields: Vec<&str> = fields.collect();

        match keyword {
            "v" => {
                let [x, y, z] = parse_floats::<3>(&fields, number)?;
                positions.push(DVec3::new(x, y, z));
            }
            "vt" => {
                let [u, v] = parse_floats::<2>(&fields, number)?;
                uvs.push(DVec2::new(u, 1.0 - v));
            }
            "f" => {
                if fields.len() < 3 {
                    return Err(parse_error(number, "face needs at least three vertices"));
                }
                let mut corners = Vec::with_capacity(fields.len());
                for field in &fields {
                    let mut parts = field.split('/');
                    let position = resolve_index(parts.next().unwrap_or(""), positions.len(), number)?;
                    let uv = match parts.next() {
                        Some(uv) if !uv.is_empty() => Some(resolve_index(uv, uvs.len(), number)?),
                        _ => None,
                    };
                    let next = vertices.len() as u32;
                    let id = *vertex_ids.entry((position, uv)).or_insert_with(|| {
                        let uv = uv.map_or(DVec2::ZERO, |i| uvs[i]);
                        vertices.push(Vertex::new(positions[position], uv));
                        next
                    });
                    corners.push(id);
                }

                let triangles = groups.entry(current.clone()).or_default();
                for i in 1..corners.len() - 1 {
                    triangles.extend_from_slice(&[corners[0], corners[i], corners[i + 1]]);
                }
            }
            "usemtl" => {
                current = fields.join(" ");
                if current.is_empty() {
                    current = DEFAULT_MATERIAL.to_string();
                }
            }
            "mtllib" => libraries.extend(fields.iter().map(|f| f.to_string())),
            _ => {}
        }
    }

    let mut triangles = Vec::new();
    let mut submeshes = Vec::with_capacity(groups.len());
    for group in groups.values() {
        submeshes.push(SubMeshDescriptor::new(triangles.len(), group.len()));
        triangles.extend_from_slice(group);
    }

    Ok(ParsedObj {
        mesh: MinMesh::new(vertices, triangles, submeshes),
        material_names: groups.into_keys().collect(),
        material_libraries: libraries,
    })
}

/// Parse the diffuse maps of an MTL library
///
/// Texture paths are resolved against `base_dir`. The `-s` and `-o` options
/// are converted to the flipped UV convention.
fn parse_mtl(reader: impl BufRead, base_dir: &Path) -> AssetResult<AHashMap<String, MapKd>> {
    let mut maps = AHashMap::new();
    let mut current: Option<String> = None;

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let number = number + 1;
        let line = line.split('#').next().unwrap_or("").trim();
        let mut fields = line.split_whitespace();
        let Some(keyword) = fields.next() else {
            continue;
        };
        let fields: Vec<&str> = fields.collect();

        match keyword {
            "newmtl" => current = Some(fields.join(" ")),
            "map_Kd" => {
                let Some(name) = current.clone() else {
                    return Err(parse_error(number, "map_Kd before newmtl"));
                };
                let mut scale = DVec2::ONE;
                let mut offset = DVec2::ZERO;
                let mut rest = fields.as_slice();
                while let Some((&option, tail)) = rest.split_first() {
                    match option {
                        "-s" | "-o" => {
                            let [u, v] = parse_floats::<2>(tail, number)?;
                            if option == "-s" {
                                scale = DVec2::new(u, v);
                            } else {
                                offset = DVec2::new(u, v);
                            }
                            // Skip the optional third component
                            let used = if tail.get(2).is_some_and(|w| w.parse::<f64>().is_ok()) { 3 } else { 2 };
                            rest = &tail[used..];
                        }
                        _ => break,
                    }
                }
                if rest.is_empty() {
                    return Err(parse_error(number, "map_Kd without a file name"));
                }
                // Sampling at `s * v_obj + o` is sampling at `s * v + (1 - s - o)`
                // once v is flipped.
                let offset = DVec2::new(offset.x, 1.0 - scale.y - offset.y);
                maps.insert(
                    name,
                    MapKd {
                        path: base_dir.join(rest.join(" ")),
                        scale,
                        offset,
                    },
                );
            }
            _ => {}
        }
    }
    Ok(maps)
}
