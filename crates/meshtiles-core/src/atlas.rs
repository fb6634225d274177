//! UV Atlas Layout
//!
//! Consolidates the texture regions used by a mesh into one atlas:
//! - One pixel-snapped, margin-expanded rectangle per triangle
//! - Fixed-point clustering of overlapping rectangles of the same submesh
//! - Shelf packing with a search over first-row widths for a near-square result
//! - Resolution halving while the packed layout leaves half the atlas unused
//! - Linear UV remapping from source clusters to atlas cells
//!
//! Pixel compositing lives with the texture code; this module only decides
//! where every region goes.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::math::DVec2;
use crate::mesh::{MinMesh, Vertex};

/// Bounding rectangle of texture usage inside one submesh's UV space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UvRect {
    pub submesh: usize,
    pub min: DVec2,
    pub max: DVec2,
}

impl UvRect {
    pub fn new(submesh: usize, min: DVec2, max: DVec2) -> Self {
        Self { submesh, min, max }
    }

    pub fn size(&self) -> DVec2 {
        self.max - self.min
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Same submesh and inclusive bounds intersect
    pub fn overlaps(&self, other: &UvRect) -> bool {
        self.submesh == other.submesh
            && self.min.x <= other.max.x
            && self.min.y <= other.max.y
            && other.min.x <= self.max.x
            && other.min.y <= self.max.y
    }

    /// Bounding union, keeping this rect's submesh
    pub fn union(&self, other: &UvRect) -> UvRect {
        UvRect::new(self.submesh, self.min.min(other.min), self.max.max(other.max))
    }

    /// Inclusive containment of a UV of the given submesh
    pub fn contains(&self, submesh: usize, uv: DVec2) -> bool {
        self.submesh == submesh
            && uv.x >= self.min.x
            && uv.y >= self.min.y
            && uv.x <= self.max.x
            && uv.y <= self.max.y
    }

    /// Squared distance from `uv` to the rect, zero inside
    pub fn distance_squared(&self, uv: DVec2) -> f64 {
        uv.distance_squared(uv.clamp(self.min, self.max))
    }

    fn scaled(&self, factor: f64) -> UvRect {
        UvRect::new(self.submesh, self.min * factor, self.max * factor)
    }
}

/// Resolution of one submesh's source texture relative to the atlas target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceSpace {
    /// Source size in pixels
    pub pixels: DVec2,
    /// Source size divided by the target atlas size
    pub ratio: DVec2,
}

impl SourceSpace {
    /// Describe a source texture of `texture_size` pixels, or an untextured slot
    pub fn new(texture_size: Option<(u32, u32)>, target_size: u32) -> Self {
        let target = f64::from(target_size.max(1));
        let ratio = match texture_size {
            Some((width, height)) => DVec2::new(f64::from(width) / target, f64::from(height) / target),
            None => DVec2::ONE,
        };
        Self {
            pixels: (ratio * target).round(),
            ratio,
        }
    }

    /// Rect size expressed in target pixels-per-unit
    pub fn weighted_size(&self, rect: &UvRect) -> DVec2 {
        rect.size() * self.ratio
    }
}

/// Build one rect per triangle, snapped to source pixels and expanded by a
/// margin of `margin_pixels` target pixels (converted to source pixels)
pub fn triangle_uv_rects(mesh: &MinMesh, spaces: &[SourceSpace], margin_pixels: f64) -> Vec<UvRect> {
    let mut rects = Vec::with_capacity(mesh.triangle_count());

    for (submesh, descriptor) in mesh.submeshes.iter().enumerate() {
        let space = spaces
            .get(submesh)
            .copied()
            .unwrap_or_else(|| SourceSpace::new(None, 1));
        let margin = (space.ratio * margin_pixels).ceil();

        for face in mesh.triangles[descriptor.range()].chunks_exact(3) {
            let mut px_min = DVec2::splat(f64::INFINITY);
            let mut px_max = DVec2::splat(f64::NEG_INFINITY);
            for &index in face {
                let px = mesh.vertices[index as usize].uv * space.pixels;
                px_min = px_min.min(px.floor());
                px_max = px_max.max(px.ceil());
            }

            rects.push(UvRect::new(
                submesh,
                (px_min - margin) / space.pixels,
                (px_max + margin) / space.pixels,
            ));
        }
    }

    rects
}

fn cluster_pass(rects: &[UvRect]) -> (Vec<UvRect>, bool) {
    let mut clusters: Vec<UvRect> = Vec::with_capacity(rects.len());
    let mut merged = false;
    for rect in rects {
        match clusters.iter_mut().find(|cluster| cluster.overlaps(rect)) {
            Some(cluster) => {
                *cluster = cluster.union(rect);
                merged = true;
            }
            None => clusters.push(*rect),
        }
    }
    (clusters, merged)
}

/// Merge overlapping rects until no two clusters overlap
pub fn cluster_uv_rects(rects: &[UvRect]) -> Vec<UvRect> {
    let (mut clusters, mut merged) = cluster_pass(rects);
    while merged {
        (clusters, merged) = cluster_pass(&clusters);
    }
    clusters
}

/// Shelf placement of `sizes` with `first_row` items on the first row
///
/// Returns the placed rects in unit space, the packed extent and the scale
/// that was applied to fit the unit square.
fn shelf_place(sizes: &[(usize, DVec2)], first_row: usize) -> (Vec<UvRect>, DVec2, f64) {
    let mut placed = Vec::with_capacity(sizes.len());
    let first_row = first_row.min(sizes.len());

    let mut first_line_width = 0.0;
    let mut y: f64 = 0.0;
    for &(submesh, size) in &sizes[..first_row] {
        placed.push(UvRect::new(
            submesh,
            DVec2::new(first_line_width, 0.0),
            DVec2::new(first_line_width + size.x, size.y),
        ));
        first_line_width += size.x;
        y = y.max(size.y);
    }

    let mut line_width = 0.0;
    let mut line_height: f64 = 0.0;
    for &(submesh, size) in &sizes[first_row..] {
        if line_width + size.x > first_line_width {
            y += line_height;
            placed.push(UvRect::new(submesh, DVec2::new(0.0, y), DVec2::new(size.x, y + size.y)));
            line_width = size.x;
            line_height = size.y;
        } else {
            placed.push(UvRect::new(
                submesh,
                DVec2::new(line_width, y),
                DVec2::new(line_width + size.x, y + size.y),
            ));
            line_width += size.x;
            line_height = line_height.max(size.y);
        }
    }
    y += line_height;

    let scale = (1.0 / first_line_width.max(y)).clamp(0.0, 1.0);
    for rect in &mut placed {
        *rect = rect.scaled(scale);
    }
    (placed, DVec2::new(first_line_width, y) * scale, scale)
}

/// Where every source cluster lands in the atlas
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasLayout {
    /// Source clusters, sorted by descending weighted height
    pub sources: Vec<UvRect>,
    /// Atlas cells in unit space, parallel to `sources`
    pub destinations: Vec<UvRect>,
    /// Downscale applied to fit the unit square, in `(0, 1]`
    pub scale: f64,
    pub width: u32,
    pub height: u32,
}

/// Destination pixel rectangle of one atlas cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl AtlasLayout {
    /// Cluster, sort, pack and shrink `rects` for an atlas of `target_size` pixels
    pub fn build(rects: &[UvRect], spaces: &[SourceSpace], target_size: u32) -> Self {
        let weight = |rect: &UvRect| {
            spaces
                .get(rect.submesh)
                .map_or(rect.size(), |space| space.weighted_size(rect))
        };

        let mut sources = cluster_uv_rects(rects);
        sources.sort_by(|a, b| weight(b).y.total_cmp(&weight(a).y));
        let sizes: Vec<(usize, DVec2)> = sources.iter().map(|r| (r.submesh, weight(r))).collect();

        let mut best_aspect = 0.0f64;
        let mut best_width = 1;
        for first_row in 1..=sizes.len() {
            let (_, extent, _) = shelf_place(&sizes, first_row);
            let aspect = extent.x / extent.y;
            if (aspect - 1.0).abs() < (best_aspect - 1.0).abs() {
                best_aspect = aspect;
                best_width = first_row;
            }
        }
        let (mut destinations, _, scale) = shelf_place(&sizes, best_width);

        let mut width = target_size.max(1);
        let mut height = target_size.max(1);
        while !destinations.is_empty() && width > 1 && height > 1 {
            let used = destinations
                .iter()
                .fold(0.0f64, |acc, r| acc.max(r.max.x).max(r.max.y));
            if used > 0.5 {
                break;
            }
            width /= 2;
            height /= 2;
            for rect in &mut destinations {
                *rect = rect.scaled(2.0);
            }
        }

        log::debug!(
            "atlas: {} rects -> {} clusters, first row {}, scale {:.4}, {}x{}",
            rects.len(),
            sources.len(),
            best_width,
            scale,
            width,
            height
        );

        Self {
            sources,
            destinations,
            scale,
            width,
            height,
        }
    }

    /// True when no resampling is needed and regions can be copied exactly
    pub fn is_passthrough(&self, epsilon: f64) -> bool {
        (self.scale - 1.0).abs() < epsilon
    }

    /// Pixel rectangle of cell `i` in the atlas texture
    pub fn pixel_rect(&self, i: usize) -> PixelRect {
        let rect = &self.destinations[i];
        let width = f64::from(self.width);
        let height = f64::from(self.height);
        PixelRect {
            x: (width * rect.min.x).floor().max(0.0) as u32,
            y: (height * rect.min.y).floor().max(0.0) as u32,
            width: (width * rect.width()).round().max(1.0) as u32,
            height: (height * rect.height()).round().max(1.0) as u32,
        }
    }

    /// Map a UV drawn with `submesh` into the atlas
    ///
    /// A UV outside every cluster of its submesh is clamped into the nearest
    /// one first. UVs of a submesh without clusters are returned unchanged.
    pub fn remap_uv(&self, submesh: usize, uv: DVec2) -> DVec2 {
        let found = self
            .sources
            .iter()
            .position(|source| source.contains(submesh, uv))
            .or_else(|| {
                self.sources
                    .iter()
                    .enumerate()
                    .filter(|(_, source)| source.submesh == submesh)
                    .min_by(|(_, a), (_, b)| a.distance_squared(uv).total_cmp(&b.distance_squared(uv)))
                    .map(|(k, _)| k)
            });

        let Some(k) = found else {
            return uv;
        };
        let source = &self.sources[k];
        let destination = &self.destinations[k];
        let local = (uv.clamp(source.min, source.max) - source.min) / source.size();
        destination.min + local * destination.size()
    }

    /// Remap every vertex and collapse all submeshes into one
    ///
    /// A vertex used by several submeshes is emitted once per submesh, since
    /// each submesh maps it into a different atlas cell. Unreferenced vertices
    /// are dropped.
    pub fn remap_mesh(&self, mesh: &MinMesh) -> MinMesh {
        let mut vertices = Vec::with_capacity(mesh.vertex_count());
        let mut triangles = Vec::with_capacity(mesh.triangles.len());
        let mut emitted: AHashMap<(u32, usize), u32> = AHashMap::with_capacity(mesh.vertex_count());

        for (submesh, descriptor) in mesh.submeshes.iter().enumerate() {
            for &index in &mesh.triangles[descriptor.range()] {
                let mapped = *emitted.entry((index, submesh)).or_insert_with(|| {
                    let vertex = &mesh.vertices[index as usize];
                    vertices.push(Vertex::new(vertex.position, self.remap_uv(submesh, vertex.uv)));
                    (vertices.len() - 1) as u32
                });
                triangles.push(mapped);
            }
        }

        MinMesh::with_single_submesh(vertices, triangles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::DVec3;
    use crate::mesh::SubMeshDescriptor;

    fn rect(submesh: usize, min: (f64, f64), max: (f64, f64)) -> UvRect {
        UvRect::new(submesh, DVec2::new(min.0, min.1), DVec2::new(max.0, max.1))
    }

    #[test]
    fn test_overlapping_rects_cluster() {
        let rects = [
            rect(0, (0.0, 0.0), (0.2, 0.2)),
            rect(0, (0.15, 0.15), (0.4, 0.4)),
            rect(1, (0.1, 0.1), (0.3, 0.3)),
        ];
        let clusters = cluster_uv_rects(&rects);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0], rect(0, (0.0, 0.0), (0.4, 0.4)));
        assert_eq!(clusters[1], rects[2]);
    }

    #[test]
    fn test_transitive_overlaps_are_merged() {
        // The third rect bridges the first two only after they are placed.
        let rects = [
            rect(0, (0.0, 0.0), (0.1, 0.1)),
            rect(0, (0.5, 0.5), (0.6, 0.6)),
            rect(0, (0.05, 0.05), (0.55, 0.55)),
        ];
        let clusters = cluster_uv_rects(&rects);
        assert_eq!(clusters, vec![rect(0, (0.0, 0.0), (0.6, 0.6))]);
    }

    #[test]
    fn test_clustering_is_idempotent() {
        let rects: Vec<UvRect> = (0..20)
            .map(|i| {
                let x = (i % 5) as f64 * 0.17;
                let y = (i / 5) as f64 * 0.23;
                rect(i % 2, (x, y), (x + 0.2, y + 0.1))
            })
            .collect();
        let clusters = cluster_uv_rects(&rects);
        assert_eq!(cluster_uv_rects(&clusters), clusters);
        for (i, a) in clusters.iter().enumerate() {
            for b in &clusters[i + 1..] {
                assert!(!a.overlaps(b));
            }
        }
    }

    #[test]
    fn test_triangle_rects_use_pixel_margin() {
        let vertices = vec![
            Vertex::new(DVec3::ZERO, DVec2::new(0.25, 0.25)),
            Vertex::new(DVec3::X, DVec2::new(0.5, 0.25)),
            Vertex::new(DVec3::Y, DVec2::new(0.25, 0.5)),
        ];
        let mesh = MinMesh::with_single_submesh(vertices, vec![0, 1, 2]);
        let spaces = [SourceSpace::new(Some((64, 64)), 32)];
        let rects = triangle_uv_rects(&mesh, &spaces, 2.0);

        // Ratio 2 turns the 2 target pixel margin into 4 source pixels.
        assert_eq!(rects, vec![rect(0, (12.0 / 64.0, 12.0 / 64.0), (36.0 / 64.0, 36.0 / 64.0))]);
    }

    #[test]
    fn test_packing_stays_in_unit_square() {
        let rects: Vec<UvRect> = (0..12)
            .map(|i| {
                let x = i as f64 * 0.3;
                rect(i % 3, (x, 0.0), (x + 0.05 + 0.01 * i as f64, 0.1 + 0.02 * i as f64))
            })
            .collect();
        let spaces = [
            SourceSpace::new(Some((1024, 1024)), 256),
            SourceSpace::new(Some((512, 256)), 256),
            SourceSpace::new(None, 256),
        ];
        let layout = AtlasLayout::build(&rects, &spaces, 256);

        assert_eq!(layout.sources.len(), layout.destinations.len());
        assert!(layout.scale > 0.0 && layout.scale <= 1.0);
        for destination in &layout.destinations {
            assert!(destination.min.x >= 0.0 && destination.min.y >= 0.0);
            assert!(destination.max.x <= 1.0 + 1e-12 && destination.max.y <= 1.0 + 1e-12);
        }
    }

    #[test]
    fn test_sources_sorted_by_weighted_height() {
        let rects = [
            rect(0, (0.0, 0.0), (0.1, 0.1)),
            rect(1, (0.0, 0.0), (0.1, 0.1)),
            rect(0, (0.5, 0.5), (0.6, 0.9)),
        ];
        let spaces = [SourceSpace::new(None, 64), SourceSpace::new(Some((256, 256)), 64)];
        let layout = AtlasLayout::build(&rects, &spaces, 64);
        let heights: Vec<f64> = layout
            .sources
            .iter()
            .map(|r| spaces[r.submesh].weighted_size(r).y)
            .collect();
        assert!(heights.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_small_layout_halves_resolution() {
        let rects = [rect(0, (0.0, 0.0), (0.2, 0.2))];
        let layout = AtlasLayout::build(&rects, &[SourceSpace::new(None, 512)], 512);
        assert_eq!(layout.scale, 1.0);
        assert!(layout.is_passthrough(1e-9));
        // 0.2 of 512 fits in 128 pixels but not in 64.
        assert_eq!((layout.width, layout.height), (128, 128));
        assert!((layout.destinations[0].max.x - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_oversized_layout_is_downscaled() {
        let rects = [rect(0, (0.0, 0.0), (1.0, 1.0))];
        let layout = AtlasLayout::build(&rects, &[SourceSpace::new(Some((2048, 2048)), 1024)], 1024);
        assert_eq!(layout.scale, 0.5);
        assert!(!layout.is_passthrough(1e-5));
        assert_eq!((layout.width, layout.height), (1024, 1024));
    }

    #[test]
    fn test_remap_inside_and_outside_clusters() {
        let layout = AtlasLayout {
            sources: vec![rect(0, (0.5, 0.5), (1.0, 1.0))],
            destinations: vec![rect(0, (0.0, 0.0), (0.5, 0.5))],
            scale: 1.0,
            width: 8,
            height: 8,
        };
        assert_eq!(layout.remap_uv(0, DVec2::new(0.75, 0.75)), DVec2::new(0.25, 0.25));
        // Clamped into the nearest cluster of the same submesh.
        assert_eq!(layout.remap_uv(0, DVec2::new(0.25, 1.0)), DVec2::new(0.0, 0.5));
        // No cluster for the submesh at all.
        assert_eq!(layout.remap_uv(3, DVec2::new(0.25, 1.0)), DVec2::new(0.25, 1.0));
    }

    #[test]
    fn test_remap_mesh_collapses_submeshes() {
        let vertices = vec![
            Vertex::new(DVec3::ZERO, DVec2::new(0.1, 0.1)),
            Vertex::new(DVec3::X, DVec2::new(0.2, 0.1)),
            Vertex::new(DVec3::Y, DVec2::new(0.1, 0.2)),
            Vertex::new(DVec3::Z, DVec2::new(0.1, 0.1)),
            Vertex::new(DVec3::ONE, DVec2::new(0.2, 0.1)),
            Vertex::new(DVec3::NEG_ONE, DVec2::new(0.1, 0.2)),
        ];
        let mesh = MinMesh::new(
            vertices,
            vec![0, 1, 2, 3, 4, 5],
            vec![SubMeshDescriptor::new(0, 3), SubMeshDescriptor::new(3, 3)],
        );
        let spaces = [SourceSpace::new(None, 64), SourceSpace::new(None, 64)];
        let rects = triangle_uv_rects(&mesh, &spaces, 2.0);
        let layout = AtlasLayout::build(&rects, &spaces, 64);
        let merged = layout.remap_mesh(&mesh);

        assert_eq!(merged.submesh_count(), 1);
        assert_eq!(merged.triangles, mesh.triangles);
        // Both submeshes share UVs but end up in different atlas cells.
        assert_ne!(merged.vertices[0].uv, merged.vertices[3].uv);
        for vertex in &merged.vertices {
            assert!(vertex.uv.x >= 0.0 && vertex.uv.x <= 1.0);
            assert!(vertex.uv.y >= 0.0 && vertex.uv.y <= 1.0);
        }
    }

    #[test]
    fn test_vertex_shared_by_two_submeshes_is_split() {
        let vertices = vec![
            Vertex::new(DVec3::ZERO, DVec2::new(0.0, 0.0)),
            Vertex::new(DVec3::X, DVec2::new(1.0, 0.0)),
            Vertex::new(DVec3::ONE, DVec2::new(1.0, 1.0)),
            Vertex::new(DVec3::Y, DVec2::new(0.0, 1.0)),
        ];
        let mesh = MinMesh::new(
            vertices,
            vec![0, 1, 2, 0, 2, 3],
            vec![SubMeshDescriptor::new(0, 3), SubMeshDescriptor::new(3, 3)],
        );
        let spaces = [SourceSpace::new(None, 32), SourceSpace::new(None, 32)];
        let layout = AtlasLayout::build(&triangle_uv_rects(&mesh, &spaces, 2.0), &spaces, 32);
        let merged = layout.remap_mesh(&mesh);

        assert_eq!(merged.vertex_count(), 6);
        assert_eq!(merged.triangles, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(merged.vertices[0].position, merged.vertices[3].position);
        assert_ne!(merged.vertices[0].uv, merged.vertices[3].uv);
    }
}
