//! Shared mesh fixtures for unit tests

use crate::math::{DVec2, DVec3};
use crate::mesh::{MinMesh, Vertex};

/// Unit cube with 12 triangles, every face mapped to the full UV square
pub(crate) fn unit_cube() -> MinMesh {
    let faces: [[DVec3; 4]; 6] = [
        [DVec3::new(0.0, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0), DVec3::new(1.0, 1.0, 0.0), DVec3::new(0.0, 1.0, 0.0)],
        [DVec3::new(1.0, 0.0, 1.0), DVec3::new(0.0, 0.0, 1.0), DVec3::new(0.0, 1.0, 1.0), DVec3::new(1.0, 1.0, 1.0)],
        [DVec3::new(0.0, 0.0, 1.0), DVec3::new(0.0, 0.0, 0.0), DVec3::new(0.0, 1.0, 0.0), DVec3::new(0.0, 1.0, 1.0)],
        [DVec3::new(1.0, 0.0, 0.0), DVec3::new(1.0, 0.0, 1.0), DVec3::new(1.0, 1.0, 1.0), DVec3::new(1.0, 1.0, 0.0)],
        [DVec3::new(0.0, 1.0, 0.0), DVec3::new(1.0, 1.0, 0.0), DVec3::new(1.0, 1.0, 1.0), DVec3::new(0.0, 1.0, 1.0)],
        [DVec3::new(0.0, 0.0, 1.0), DVec3::new(1.0, 0.0, 1.0), DVec3::new(1.0, 0.0, 0.0), DVec3::new(0.0, 0.0, 0.0)],
    ];
    let uvs = [
        DVec2::new(0.0, 0.0),
        DVec2::new(1.0, 0.0),
        DVec2::new(1.0, 1.0),
        DVec2::new(0.0, 1.0),
    ];

    let mut vertices = Vec::new();
    let mut triangles = Vec::new();
    for face in faces {
        let base = vertices.len() as u32;
        for (position, uv) in face.into_iter().zip(uvs) {
            vertices.push(Vertex::new(position, uv));
        }
        triangles.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    MinMesh::with_single_submesh(vertices, triangles)
}

/// A single small triangle centered on `center`
pub(crate) fn triangle_at(center: DVec3, size: f64) -> MinMesh {
    let vertices = vec![
        Vertex::new(center + DVec3::new(-size, -size, -size), DVec2::new(0.0, 0.0)),
        Vertex::new(center + DVec3::new(size, -size, size), DVec2::new(1.0, 0.0)),
        Vertex::new(center + DVec3::new(0.0, size, 0.0), DVec2::new(0.5, 1.0)),
    ];
    MinMesh::with_single_submesh(vertices, vec![0, 1, 2])
}

/// Concatenate meshes into one single-submesh mesh
pub(crate) fn concat(meshes: &[MinMesh]) -> MinMesh {
    let mut vertices = Vec::new();
    let mut triangles = Vec::new();
    for mesh in meshes {
        let base = vertices.len() as u32;
        vertices.extend_from_slice(&mesh.vertices);
        triangles.extend(mesh.triangles.iter().map(|i| i + base));
    }
    MinMesh::with_single_submesh(vertices, triangles)
}
