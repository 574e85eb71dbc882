//! Voxelization of closed meshes into binary stencils
//!
//! The mesh is moved into the target grid's continuous index space and each
//! voxel row along `i` is classified by ray parity: the crossings of the row
//! with the surface are sorted and voxel centers between pairs of crossings
//! are inside.

use crate::grid::VoxelGrid;
use crate::mesh::Mesh;
use crate::types::Extent;
use nalgebra::{Matrix4, Vector3};

/// Sub-voxel offsets of the sampling rays, chosen to avoid hitting mesh
/// edges and vertices that sit on integer coordinates
const RAY_OFFSET_J: f64 = 1.234_567e-5;
const RAY_OFFSET_K: f64 = 2.345_678e-5;

/// Voxel extent touched by a mesh, padded by one voxel
pub fn stencil_extent(mesh: &Mesh, world_to_ijk: &Matrix4<f64>) -> Extent {
    mesh.bounding_box().transformed(world_to_ijk).to_extent(1)
}

struct RayTriangle {
    a: Vector3<f64>,
    b: Vector3<f64>,
    c: Vector3<f64>,
    min_j: f64,
    max_j: f64,
    min_k: f64,
    max_k: f64,
}

impl RayTriangle {
    fn new(a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>) -> Self {
        Self {
            a,
            b,
            c,
            min_j: a.y.min(b.y).min(c.y),
            max_j: a.y.max(b.y).max(c.y),
            min_k: a.z.min(b.z).min(c.z),
            max_k: a.z.max(b.z).max(c.z),
        }
    }

    /// `i` coordinate where the row `(j, k)` crosses the triangle
    fn crossing(&self, j: f64, k: f64) -> Option<f64> {
        let (a, b, c) = (self.a, self.b, self.c);
        let det = (b.y - a.y) * (c.z - a.z) - (c.y - a.y) * (b.z - a.z);
        if det.abs() <= 1e-14 {
            return None;
        }
        let s = ((j - a.y) * (c.z - a.z) - (c.y - a.y) * (k - a.z)) / det;
        let t = ((b.y - a.y) * (k - a.z) - (j - a.y) * (b.z - a.z)) / det;
        if s < 0.0 || t < 0.0 || s + t > 1.0 {
            return None;
        }
        Some(a.x + s * (b.x - a.x) + t * (c.x - a.x))
    }
}

/// Write `value` into every voxel of `grid` whose center lies inside `mesh`.
///
/// `world_to_ijk` maps the mesh's coordinates to the grid's continuous
/// indices. Only voxels inside `limit` (when given) are written. Returns the
/// number of voxels inside the mesh.
pub fn rasterize_mesh(
    grid: &mut VoxelGrid<u8>,
    mesh: &Mesh,
    world_to_ijk: &Matrix4<f64>,
    value: u8,
    limit: Option<&Extent>,
) -> usize {
    let mesh_ijk = mesh.transformed(world_to_ijk);
    let mut region = mesh_ijk
        .bounding_box()
        .to_extent(1)
        .intersect(&grid.extent());
    if let Some(limit) = limit {
        region = region.intersect(limit);
    }
    if region.is_empty() {
        return 0;
    }

    let triangles: Vec<RayTriangle> = mesh_ijk
        .triangles()
        .map(|[a, b, c]| RayTriangle::new(a, b, c))
        .collect();

    let mut inside = 0;
    let mut crossings: Vec<f64> = Vec::new();
    for k in region.min[2]..=region.max[2] {
        let kz = k as f64 + RAY_OFFSET_K;
        let layer: Vec<&RayTriangle> = triangles
            .iter()
            .filter(|t| t.min_k <= kz && kz <= t.max_k)
            .collect();
        if layer.is_empty() {
            continue;
        }
        for j in region.min[1]..=region.max[1] {
            let jy = j as f64 + RAY_OFFSET_J;
            crossings.clear();
            crossings.extend(
                layer
                    .iter()
                    .filter(|t| t.min_j <= jy && jy <= t.max_j)
                    .filter_map(|t| t.crossing(jy, kz)),
            );
            if crossings.len() < 2 {
                continue;
            }
            crossings.sort_by(f64::total_cmp);
            for pair in crossings.chunks_exact(2) {
                let first = (pair[0].ceil() as i32).max(region.min[0]);
                let last = (pair[1].floor() as i32).min(region.max[0]);
                for i in first..=last {
                    grid.set([i, j, k], value);
                    inside += 1;
                }
            }
        }
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::ImageGeometry;
    use crate::types::BBox3;
    use std::f64::consts::PI;

    fn grid(dims: [usize; 3], spacing: f64) -> VoxelGrid<u8> {
        let origin = Vector3::repeat(-(dims[0] as f64 - 1.0) * 0.5 * spacing);
        VoxelGrid::new(ImageGeometry::axis_aligned(origin, Vector3::repeat(spacing), dims))
    }

    #[test]
    fn test_box_fills_exact_voxels() {
        let mut target = grid([21, 21, 21], 1.0);
        let world_to_ijk = target.geometry().world_to_image().expect("invertible");
        let mesh = Mesh::from_bbox(&BBox3::new(Vector3::repeat(-2.5), Vector3::repeat(2.5)));
        let count = rasterize_mesh(&mut target, &mesh, &world_to_ijk, 1, None);
        assert_eq!(count, 125);
        assert_eq!(target.count_set(), 125);
        assert_eq!(target.effective_extent(), Extent::new([8, 8, 8], [12, 12, 12]));
    }

    #[test]
    fn test_sphere_volume_matches() {
        let mut target = grid([41, 41, 41], 0.5);
        let world_to_ijk = target.geometry().world_to_image().expect("invertible");
        let mesh = Mesh::sphere(Vector3::zeros(), 8.0, 48).expect("valid sphere");
        rasterize_mesh(&mut target, &mesh, &world_to_ijk, 1, None);
        let expected = 4.0 / 3.0 * PI * 512.0 / 0.125;
        let actual = target.count_set() as f64;
        assert!(
            (actual - expected).abs() / expected < 0.05,
            "sphere voxel count {} too far from {}",
            actual,
            expected
        );
    }

    #[test]
    fn test_limit_restricts_writes() {
        let mut target = grid([11, 11, 11], 1.0);
        let world_to_ijk = target.geometry().world_to_image().expect("invertible");
        let mesh = Mesh::from_bbox(&BBox3::new(Vector3::repeat(-5.5), Vector3::repeat(5.5)));
        let limit = Extent::new([0, 0, 0], [10, 10, 0]);
        rasterize_mesh(&mut target, &mesh, &world_to_ijk, 1, Some(&limit));
        assert_eq!(target.count_set(), 121);
    }

    #[test]
    fn test_stencil_extent_is_padded() {
        let target = grid([11, 11, 11], 1.0);
        let world_to_ijk = target.geometry().world_to_image().expect("invertible");
        let mesh = Mesh::from_bbox(&BBox3::new(Vector3::repeat(-1.0), Vector3::repeat(1.0)));
        assert_eq!(
            stencil_extent(&mesh, &world_to_ijk),
            Extent::new([3, 3, 3], [7, 7, 7])
        );
    }
}
