//! Mesh Simplification
//!
//! The tile builder only needs `simplify(mesh, ratio) -> mesh`. The default
//! implementation is a vertex clustering simplifier: vertices are snapped to a
//! uniform grid and triangles that collapse are dropped. The grid resolution is
//! searched so the triangle count lands close to the requested ratio.

use ahash::AHashMap;
use meshtiles_core::math::DVec3;
use meshtiles_core::{MinMesh, SubMeshDescriptor};

/// Reduces the triangle count of a mesh
///
/// Implementations keep the submesh list (length and order) and the vertex
/// UVs, and should leave submesh boundary edges in place.
pub trait Simplifier {
    /// `ratio` is the wanted fraction of the input triangles, in `(0, 1]`
    fn simplify(&self, mesh: &MinMesh, ratio: f64) -> MinMesh;
}

impl<F> Simplifier for F
where
    F: Fn(&MinMesh, f64) -> MinMesh,
{
    fn simplify(&self, mesh: &MinMesh, ratio: f64) -> MinMesh {
        self(mesh, ratio)
    }
}

/// Grid based vertex clustering
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexClusterSimplifier {
    /// Never move vertices lying on an edge used by a single triangle of its
    /// submesh (mesh borders, material seams and tile cuts)
    pub preserve_border_edges: bool,
    /// Grid resolutions tried by the search
    pub search_steps: u32,
}

impl VertexClusterSimplifier {
    pub fn new(preserve_border_edges: bool) -> Self {
        Self {
            preserve_border_edges,
            search_steps: 16,
        }
    }
}

impl Default for VertexClusterSimplifier {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Welded position id of every vertex
fn weld(mesh: &MinMesh) -> Vec<u32> {
    let mut ids: AHashMap<[u64; 3], u32> = AHashMap::new();
    mesh.vertices
        .iter()
        .map(|vertex| {
            // `+ 0.0` folds -0.0 into 0.0
            let p = vertex.position + DVec3::ZERO;
            let key = [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()];
            let next = ids.len() as u32;
            *ids.entry(key).or_insert(next)
        })
        .collect()
}

/// Welded ids touching an edge used by exactly one triangle of its submesh
fn border_vertices(mesh: &MinMesh, welded: &[u32]) -> Vec<bool> {
    let weld_count = welded.iter().max().map_or(0, |&max| max as usize + 1);
    let mut locked = vec![false; weld_count];

    for submesh in 0..mesh.submesh_count() {
        let mut edges: AHashMap<(u32, u32), u32> = AHashMap::new();
        for tri in mesh.submesh_indices(submesh).chunks_exact(3) {
            let w = [
                welded[tri[0] as usize],
                welded[tri[1] as usize],
                welded[tri[2] as usize],
            ];
            for (a, b) in [(w[0], w[1]), (w[1], w[2]), (w[2], w[0])] {
                if a != b {
                    *edges.entry((a.min(b), a.max(b))).or_insert(0) += 1;
                }
            }
        }
        for ((a, b), count) in edges {
            if count == 1 {
                locked[a as usize] = true;
                locked[b as usize] = true;
            }
        }
    }
    locked
}

struct Clustering<'a> {
    mesh: &'a MinMesh,
    welded: Vec<u32>,
    locked: Vec<bool>,
    origin: DVec3,
}

impl Clustering<'_> {
    fn is_locked(&self, vertex: u32) -> bool {
        self.locked
            .get(self.welded[vertex as usize] as usize)
            .copied()
            .unwrap_or(false)
    }

    /// Snap with cells of side `cell` and drop collapsed triangles
    fn run(&self, cell: f64) -> MinMesh {
        let mesh = self.mesh;
        let mut vertices = Vec::new();
        let mut output_index = vec![u32::MAX; mesh.vertex_count()];
        let mut triangles = Vec::with_capacity(mesh.triangles.len());
        let mut submeshes = Vec::with_capacity(mesh.submesh_count());

        for submesh in 0..mesh.submesh_count() {
            let start = triangles.len();
            let mut representatives: AHashMap<[i64; 3], u32> = AHashMap::new();

            for tri in mesh.submesh_indices(submesh).chunks_exact(3) {
                let snapped = [
                    self.representative(&mut representatives, tri[0], cell),
                    self.representative(&mut representatives, tri[1], cell),
                    self.representative(&mut representatives, tri[2], cell),
                ];
                let w = snapped.map(|i| self.welded[i as usize]);
                if w[0] == w[1] || w[1] == w[2] || w[2] == w[0] {
                    continue;
                }
                for source in snapped {
                    let slot = &mut output_index[source as usize];
                    if *slot == u32::MAX {
                        *slot = vertices.len() as u32;
                        vertices.push(mesh.vertices[source as usize]);
                    }
                    triangles.push(*slot);
                }
            }

            submeshes.push(SubMeshDescriptor::new(start, triangles.len() - start));
        }

        MinMesh::new(vertices, triangles, submeshes)
    }

    fn representative(&self, cells: &mut AHashMap<[i64; 3], u32>, vertex: u32, cell: f64) -> u32 {
        if self.is_locked(vertex) {
            return vertex;
        }
        let p = (self.mesh.vertices[vertex as usize].position - self.origin) / cell;
        let key = [p.x.floor() as i64, p.y.floor() as i64, p.z.floor() as i64];
        *cells.entry(key).or_insert(vertex)
    }
}

impl Simplifier for VertexClusterSimplifier {
    fn simplify(&self, mesh: &MinMesh, ratio: f64) -> MinMesh {
        let triangle_count = mesh.triangle_count();
        let bounds = mesh.bounds();
        let extent = bounds.max_extent();
        if triangle_count == 0 || ratio >= 1.0 || !(extent > 0.0) {
            return mesh.clone();
        }
        let target = (triangle_count as f64 * ratio.max(0.0)).ceil() as usize;

        let welded = weld(mesh);
        let locked = if self.preserve_border_edges {
            border_vertices(mesh, &welded)
        } else {
            Vec::new()
        };
        let clustering = Clustering {
            mesh,
            welded,
            locked,
            origin: bounds.min,
        };

        // A cell twice the extent puts every unlocked vertex of a submesh together.
        let mut coarse = extent * 2.0;
        let coarsest = clustering.run(coarse);
        if coarsest.triangle_count() > target {
            log::debug!(
                "simplify: {} -> {} triangles, target {} not reachable",
                triangle_count,
                coarsest.triangle_count(),
                target
            );
            return coarsest;
        }

        // Geometric bisection between a near-lossless and the coarsest grid.
        // Results that collapse every triangle are never kept.
        let mut fine = extent * 1e-6;
        let mut best = (coarsest.triangle_count() > 0).then_some(coarsest);
        let mut closest_above: Option<MinMesh> = None;
        for _ in 0..self.search_steps {
            let cell = (fine * coarse).sqrt();
            let candidate = clustering.run(cell);
            let count = candidate.triangle_count();
            if count > target {
                fine = cell;
                if closest_above.as_ref().is_none_or(|c| count < c.triangle_count()) {
                    closest_above = Some(candidate);
                }
            } else {
                coarse = cell;
                if count > 0 {
                    best = Some(candidate);
                }
            }
        }

        let best = best.or(closest_above).unwrap_or_else(|| mesh.clone());
        log::debug!(
            "simplify: {} -> {} triangles (target {}, cell {:.6})",
            triangle_count,
            best.triangle_count(),
            target,
            coarse
        );
        best
    }
}
