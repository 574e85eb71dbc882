//! Primitive mesh builders: box, sphere, cylinder and extruded prism

use super::{Mesh, Outline};
use crate::types::BBox3;
use crate::{Error, Result};
use nalgebra::{Vector2, Vector3};
use std::f64::consts::PI;

/// Two unit vectors `(u, v)` with `u x v = axis`
pub(crate) fn plane_basis(axis: Vector3<f64>) -> Result<(Vector3<f64>, Vector3<f64>, Vector3<f64>)> {
    let norm = axis.norm();
    if norm <= f64::EPSILON {
        return Err(Error::DegenerateGeometry("zero-length axis".to_string()));
    }
    let axis = axis / norm;
    let seed = if axis.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let u = seed.cross(&axis).normalize();
    let v = axis.cross(&u);
    Ok((u, v, axis))
}

impl Mesh {
    /// Create a box mesh from a bounding box
    pub fn from_bbox(bbox: &BBox3) -> Mesh {
        let mut mesh = Mesh::new();
        if bbox.is_empty() {
            return mesh;
        }
        let n = mesh.add_vertices(bbox.corners());
        mesh.add_quad(n[0], n[2], n[3], n[1], false);
        mesh.add_quad(n[4], n[5], n[7], n[6], false);
        mesh.add_quad(n[0], n[1], n[5], n[4], false);
        mesh.add_quad(n[2], n[6], n[7], n[3], false);
        mesh.add_quad(n[0], n[4], n[6], n[2], false);
        mesh.add_quad(n[1], n[3], n[7], n[5], false);
        mesh
    }

    /// UV sphere with `resolution` segments around and `resolution / 2` rings
    pub fn sphere(center: Vector3<f64>, radius: f64, resolution: usize) -> Result<Mesh> {
        if radius <= 0.0 {
            return Err(Error::DegenerateGeometry(
                "sphere radius must be positive".to_string(),
            ));
        }
        let segments = resolution.max(3);
        let rings = (resolution / 2).max(2);

        let mut mesh = Mesh::new();
        let north = mesh.add_vertex(center + Vector3::z() * radius);
        let mut ring_start = Vec::with_capacity(rings - 1);
        for ring in 1..rings {
            let theta = PI * ring as f64 / rings as f64;
            ring_start.push(mesh.vertex_count() as u32);
            for segment in 0..segments {
                let phi = 2.0 * PI * segment as f64 / segments as f64;
                let dir = Vector3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos());
                mesh.add_vertex(center + dir * radius);
            }
        }
        let south = mesh.add_vertex(center - Vector3::z() * radius);

        let index = |ring: usize, segment: usize| ring_start[ring] + (segment % segments) as u32;
        for s in 0..segments {
            mesh.add_triangle_indices(north, index(0, s), index(0, s + 1));
        }
        for ring in 0..rings - 2 {
            for s in 0..segments {
                mesh.add_quad(
                    index(ring, s),
                    index(ring + 1, s),
                    index(ring + 1, s + 1),
                    index(ring, s + 1),
                    false,
                );
            }
        }
        for s in 0..segments {
            mesh.add_triangle_indices(south, index(rings - 2, s + 1), index(rings - 2, s));
        }
        Ok(mesh)
    }

    /// Flat cylinder (disk) of `height` centered at `center`, aligned with `axis`
    pub fn cylinder(
        center: Vector3<f64>,
        axis: Vector3<f64>,
        radius: f64,
        height: f64,
        resolution: usize,
    ) -> Result<Mesh> {
        if radius <= 0.0 || height <= 0.0 {
            return Err(Error::DegenerateGeometry(
                "cylinder radius and height must be positive".to_string(),
            ));
        }
        let (u, v, _) = plane_basis(axis)?;
        let segments = resolution.max(3);
        let base: Vec<Vector3<f64>> = (0..segments)
            .map(|s| {
                let phi = 2.0 * PI * s as f64 / segments as f64;
                center + (u * phi.cos() + v * phi.sin()) * radius
            })
            .collect();
        Mesh::prism(&base, axis, -0.5 * height, 0.5 * height)
    }

    /// Extrude a planar outline along `direction` into a closed prism.
    ///
    /// The outline is projected onto the plane through `points[0]`
    /// perpendicular to `direction`; the prism spans `[near, far]` along the
    /// direction measured from that plane. Side walls form the skirt, the
    /// triangulated outline closes both ends.
    pub fn prism(points: &[Vector3<f64>], direction: Vector3<f64>, near: f64, far: f64) -> Result<Mesh> {
        if points.is_empty() {
            return Err(Error::DegenerateGeometry("prism outline is empty".to_string()));
        }
        if far <= near {
            return Err(Error::DegenerateGeometry(format!(
                "prism depth range [{}, {}] is empty",
                near, far
            )));
        }
        let (u, v, axis) = plane_basis(direction)?;
        let plane = points[0].dot(&axis);

        let projected: Vec<Vector2<f64>> = points
            .iter()
            .map(|p| Vector2::new(p.dot(&u), p.dot(&v)))
            .collect();
        let outline = Outline::new(&projected)?.into_counter_clockwise();

        let lift = |p: &Vector2<f64>, depth: f64| u * p.x + v * p.y + axis * (plane + depth);
        let mut mesh = Mesh::new();
        let bottom = mesh.add_vertices(outline.vertices().iter().map(|p| lift(p, near)));
        let top = mesh.add_vertices(outline.vertices().iter().map(|p| lift(p, far)));

        let n = bottom.len();
        for i in 0..n {
            let j = (i + 1) % n;
            mesh.add_quad(bottom[i], bottom[j], top[j], top[i], false);
        }
        for [a, b, c] in outline.triangulate() {
            mesh.add_triangle_indices(top[a], top[b], top[c]);
            mesh.add_triangle_indices(bottom[a], bottom[c], bottom[b]);
        }
        Ok(mesh)
    }

    /// Close two matching rings into a solid.
    ///
    /// `near` and `far` hold the same outline at two depths (possibly scaled,
    /// as in a view frustum); `caps` triangulates that outline and must wind
    /// the same way as the rings. The result faces outward.
    pub fn loft(near: &[Vector3<f64>], far: &[Vector3<f64>], caps: &[[usize; 3]]) -> Result<Mesh> {
        if near.len() < 3 || near.len() != far.len() {
            return Err(Error::DegenerateGeometry(format!(
                "cannot loft rings of {} and {} points",
                near.len(),
                far.len()
            )));
        }
        let mut mesh = Mesh::new();
        let bottom = mesh.add_vertices(near.iter().copied());
        let top = mesh.add_vertices(far.iter().copied());
        let n = bottom.len();
        for i in 0..n {
            let j = (i + 1) % n;
            mesh.add_quad(bottom[i], bottom[j], top[j], top[i], false);
        }
        for &[a, b, c] in caps {
            if a >= n || b >= n || c >= n {
                return Err(Error::InvalidParameter(format!(
                    "cap triangle [{}, {}, {}] outside ring of {} points",
                    a, b, c, n
                )));
            }
            mesh.add_triangle_indices(top[a], top[b], top[c]);
            mesh.add_triangle_indices(bottom[a], bottom[c], bottom[b]);
        }
        if mesh.signed_volume() < 0.0 {
            for triangle in &mut mesh.triangles {
                triangle.swap(1, 2);
            }
        }
        Ok(mesh)
    }
}
