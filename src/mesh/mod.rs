//! Closed triangle meshes used as brush and cut shapes

use crate::types::{transform_point, BBox3};
use crate::{Error, Result};
use nalgebra::{Matrix4, Vector3};
use std::collections::HashMap;

mod outline; // Planar outlines and cap triangulation
mod shapes; // Primitive builders
pub use outline::{Outline, Winding};

/// Triangle mesh
///
/// Vertices are shared between triangles; triangles are stored as index
/// triples with counter-clockwise winding seen from outside.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    vertices: Vec<Vector3<f64>>,
    triangles: Vec<[u32; 3]>,
}

impl Mesh {
    /// Create an empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex and return its index
    pub fn add_vertex(&mut self, pos: Vector3<f64>) -> u32 {
        self.vertices.push(pos);
        (self.vertices.len() - 1) as u32
    }

    /// Add several vertices and return their indices
    pub fn add_vertices<I>(&mut self, vertices: I) -> Vec<u32>
    where
        I: IntoIterator<Item = Vector3<f64>>,
    {
        vertices.into_iter().map(|v| self.add_vertex(v)).collect()
    }

    /// Add a triangle by vertex indices
    pub fn add_triangle_indices(&mut self, a: u32, b: u32, c: u32) {
        self.triangles.push([a, b, c]);
    }

    /// Add a quad by vertex indices
    pub fn add_quad(&mut self, n0: u32, n1: u32, n2: u32, n3: u32, flipped: bool) {
        if flipped {
            self.add_triangle_indices(n0, n2, n1);
            self.add_triangle_indices(n0, n3, n2);
        } else {
            self.add_triangle_indices(n0, n1, n2);
            self.add_triangle_indices(n0, n2, n3);
        }
    }

    /// Append all triangles of another mesh
    pub fn append(&mut self, other: &Mesh) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.triangles
            .extend(other.triangles.iter().map(|t| t.map(|n| n + base)));
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn vertex(&self, index: usize) -> Option<Vector3<f64>> {
        self.vertices.get(index).copied()
    }

    /// Get the vertices of a triangle by index
    pub fn triangle_vertices(
        &self,
        index: usize,
    ) -> Result<(Vector3<f64>, Vector3<f64>, Vector3<f64>)> {
        let [a, b, c] = *self.triangles.get(index).ok_or_else(|| {
            Error::InvalidParameter(format!("Triangle index {} out of range", index))
        })?;
        Ok((
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ))
    }

    /// Iterate over triangle corner positions
    pub fn triangles(&self) -> impl Iterator<Item = [Vector3<f64>; 3]> + '_ {
        self.triangles.iter().map(move |t| t.map(|n| self.vertices[n as usize]))
    }

    pub fn bounding_box(&self) -> BBox3 {
        let mut bounds = BBox3::empty();
        for vertex in &self.vertices {
            bounds.include_point(*vertex);
        }
        bounds
    }

    /// Create a transformed copy of the mesh.
    ///
    /// Matrices with a negative determinant flip the winding back so the
    /// result stays outward-facing.
    pub fn transformed(&self, matrix: &Matrix4<f64>) -> Mesh {
        let flip = matrix.fixed_view::<3, 3>(0, 0).determinant() < 0.0;
        Mesh {
            vertices: self
                .vertices
                .iter()
                .map(|v| transform_point(matrix, *v))
                .collect(),
            triangles: self
                .triangles
                .iter()
                .map(|&[a, b, c]| if flip { [a, c, b] } else { [a, b, c] })
                .collect(),
        }
    }

    /// Get the normal of a triangle by index (normalized)
    pub fn triangle_normal(&self, index: usize) -> Result<Vector3<f64>> {
        let (a, b, c) = self.triangle_vertices(index)?;
        let normal = (b - a).cross(&(c - a));
        let norm = normal.norm();
        if norm <= f64::EPSILON {
            Ok(Vector3::zeros())
        } else {
            Ok(normal / norm)
        }
    }

    /// Compute total surface area of the mesh
    pub fn surface_area(&self) -> f64 {
        self.triangles()
            .map(|[a, b, c]| 0.5 * (b - a).cross(&(c - a)).norm())
            .sum()
    }

    /// Signed volume of a closed, consistently oriented mesh.
    ///
    /// Positive for outward-facing triangles.
    pub fn signed_volume(&self) -> f64 {
        self.triangles()
            .map(|[a, b, c]| a.dot(&b.cross(&c)))
            .sum::<f64>()
            / 6.0
    }

    /// Check that every edge is shared by exactly two triangles in opposite directions
    pub fn is_closed(&self) -> bool {
        if self.triangles.is_empty() {
            return false;
        }
        let mut edges: HashMap<(u32, u32), i32> = HashMap::new();
        for &[a, b, c] in &self.triangles {
            for (from, to) in [(a, b), (b, c), (c, a)] {
                *edges.entry((from, to)).or_insert(0) += 1;
            }
        }
        edges
            .iter()
            .all(|(&(from, to), &count)| count == 1 && edges.get(&(to, from)) == Some(&1))
    }
}
