//! Planar closed outlines (scissors contours) and their triangulation

use crate::{Error, Result};
use nalgebra::Vector2;

/// Outline orientation in its own plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winding {
    Unknown,
    Clockwise,
    CounterClockwise,
}

/// Closed planar polygon
#[derive(Debug, Clone)]
pub struct Outline {
    vertices: Vec<Vector2<f64>>,
    winding: Winding,
}

impl Outline {
    /// Shoelace area, positive for counter-clockwise outlines
    pub fn signed_area(vertices: &[Vector2<f64>]) -> f64 {
        let n = vertices.len();
        (0..n)
            .map(|i| {
                let (a, b) = (vertices[i], vertices[(i + 1) % n]);
                a.x * b.y - b.x * a.y
            })
            .sum::<f64>()
            * 0.5
    }

    pub fn detect_winding(vertices: &[Vector2<f64>]) -> Winding {
        if vertices.len() < 3 {
            return Winding::Unknown;
        }
        let area = Self::signed_area(vertices);
        if area > 0.0 {
            Winding::CounterClockwise
        } else if area < 0.0 {
            Winding::Clockwise
        } else {
            Winding::Unknown
        }
    }

    /// Build an outline, dropping repeated consecutive points.
    ///
    /// Fails with [`Error::DegenerateGeometry`] below three distinct points or
    /// when all points are collinear.
    pub fn new(points: &[Vector2<f64>]) -> Result<Self> {
        let mut vertices: Vec<Vector2<f64>> = Vec::with_capacity(points.len());
        for point in points {
            if vertices
                .last()
                .is_some_and(|last| (last - point).norm() <= f64::EPSILON)
            {
                continue;
            }
            vertices.push(*point);
        }
        while vertices.len() > 1 && (vertices[0] - vertices[vertices.len() - 1]).norm() <= f64::EPSILON {
            vertices.pop();
        }

        if vertices.len() < 3 {
            return Err(Error::DegenerateGeometry(
                "Outline with less than 3 points makes no sense".to_string(),
            ));
        }

        let winding = Self::detect_winding(&vertices);
        if winding == Winding::Unknown {
            return Err(Error::DegenerateGeometry(
                "Outline encloses no area".to_string(),
            ));
        }
        Ok(Self { vertices, winding })
    }

    pub fn vertices(&self) -> &[Vector2<f64>] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn winding(&self) -> Winding {
        self.winding
    }

    /// Same outline with counter-clockwise vertex order
    pub fn into_counter_clockwise(mut self) -> Self {
        if self.winding == Winding::Clockwise {
            self.vertices.reverse();
            self.winding = Winding::CounterClockwise;
        }
        self
    }

    /// Triangulate the polygon by ear clipping.
    ///
    /// Returned triangles are counter-clockwise in the outline plane. Falls
    /// back to a fan when no ear can be found (self-intersecting input).
    pub fn triangulate(&self) -> Vec<[usize; 3]> {
        let ccw = self.winding == Winding::CounterClockwise;
        let mut remaining: Vec<usize> = if ccw {
            (0..self.vertices.len()).collect()
        } else {
            (0..self.vertices.len()).rev().collect()
        };
        let mut triangles = Vec::with_capacity(self.vertices.len() - 2);

        while remaining.len() > 3 {
            let n = remaining.len();
            let ear = (0..n).find(|&i| {
                let prev = remaining[(i + n - 1) % n];
                let curr = remaining[i];
                let next = remaining[(i + 1) % n];
                self.is_ear(prev, curr, next, &remaining)
            });
            match ear {
                Some(i) => {
                    let prev = remaining[(i + n - 1) % n];
                    let next = remaining[(i + 1) % n];
                    triangles.push([prev, remaining[i], next]);
                    remaining.remove(i);
                }
                None => {
                    for i in 1..n - 1 {
                        triangles.push([remaining[0], remaining[i], remaining[i + 1]]);
                    }
                    return triangles;
                }
            }
        }
        triangles.push([remaining[0], remaining[1], remaining[2]]);
        triangles
    }

    fn is_ear(&self, prev: usize, curr: usize, next: usize, remaining: &[usize]) -> bool {
        let (a, b, c) = (self.vertices[prev], self.vertices[curr], self.vertices[next]);
        if cross(b - a, c - b) <= 0.0 {
            return false;
        }
        remaining
            .iter()
            .filter(|&&n| n != prev && n != curr && n != next)
            .all(|&n| !point_in_triangle(self.vertices[n], a, b, c))
    }
}

fn cross(a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

fn point_in_triangle(p: Vector2<f64>, a: Vector2<f64>, b: Vector2<f64>, c: Vector2<f64>) -> bool {
    cross(b - a, p - a) >= 0.0 && cross(c - b, p - b) >= 0.0 && cross(a - c, p - c) >= 0.0
}
