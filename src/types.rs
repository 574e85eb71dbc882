//! Core geometric types: integer voxel extents and world-space bounding boxes

use nalgebra::{Matrix4, Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Inclusive integer voxel extent `[min, max]` per axis.
///
/// An extent is empty when `min > max` on any axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Extent {
    pub min: [i32; 3],
    pub max: [i32; 3],
}

impl Extent {
    /// Create a new extent
    pub fn new(min: [i32; 3], max: [i32; 3]) -> Self {
        Self { min, max }
    }

    /// Create an empty extent
    pub fn empty() -> Self {
        Self {
            min: [0; 3],
            max: [-1; 3],
        }
    }

    /// Extent `[0, dims - 1]` on each axis
    pub fn from_dimensions(dims: [usize; 3]) -> Self {
        Self {
            min: [0; 3],
            max: [
                dims[0] as i32 - 1,
                dims[1] as i32 - 1,
                dims[2] as i32 - 1,
            ],
        }
    }

    /// Check if the extent contains no voxels
    pub fn is_empty(&self) -> bool {
        (0..3).any(|axis| self.min[axis] > self.max[axis])
    }

    /// Check if `min <= max` on all three axes
    pub fn is_valid(&self) -> bool {
        !self.is_empty()
    }

    /// Number of voxels along each axis
    pub fn dimensions(&self) -> [usize; 3] {
        if self.is_empty() {
            return [0; 3];
        }
        [
            (self.max[0] - self.min[0] + 1) as usize,
            (self.max[1] - self.min[1] + 1) as usize,
            (self.max[2] - self.min[2] + 1) as usize,
        ]
    }

    /// Total number of voxels
    pub fn voxel_count(&self) -> usize {
        let dims = self.dimensions();
        dims[0] * dims[1] * dims[2]
    }

    /// Check if a voxel index lies inside the extent
    pub fn contains(&self, ijk: [i32; 3]) -> bool {
        (0..3).all(|axis| ijk[axis] >= self.min[axis] && ijk[axis] <= self.max[axis])
    }

    /// Check if `other` lies completely inside this extent
    pub fn contains_extent(&self, other: &Extent) -> bool {
        other.is_empty() || (self.contains(other.min) && self.contains(other.max))
    }

    /// Intersection of two extents (possibly empty)
    pub fn intersect(&self, other: &Extent) -> Extent {
        if self.is_empty() || other.is_empty() {
            return Extent::empty();
        }
        let mut result = *self;
        for axis in 0..3 {
            result.min[axis] = self.min[axis].max(other.min[axis]);
            result.max[axis] = self.max[axis].min(other.max[axis]);
        }
        if result.is_empty() {
            Extent::empty()
        } else {
            result
        }
    }

    /// Smallest extent containing both extents
    pub fn union(&self, other: &Extent) -> Extent {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let mut result = *self;
        for axis in 0..3 {
            result.min[axis] = self.min[axis].min(other.min[axis]);
            result.max[axis] = self.max[axis].max(other.max[axis]);
        }
        result
    }

    /// Expand the extent to include a voxel index
    pub fn include_index(&mut self, ijk: [i32; 3]) {
        if self.is_empty() {
            self.min = ijk;
            self.max = ijk;
            return;
        }
        for (axis, &value) in ijk.iter().enumerate() {
            self.min[axis] = self.min[axis].min(value);
            self.max[axis] = self.max[axis].max(value);
        }
    }

    /// Iterate over all voxel indices, `i` fastest
    pub fn iter(&self) -> impl Iterator<Item = [i32; 3]> {
        let extent = *self;
        let count = extent.voxel_count();
        let dims = extent.dimensions();
        (0..count).map(move |n| {
            let i = n % dims[0];
            let j = (n / dims[0]) % dims[1];
            let k = n / (dims[0] * dims[1]);
            [
                extent.min[0] + i as i32,
                extent.min[1] + j as i32,
                extent.min[2] + k as i32,
            ]
        })
    }
}

impl Default for Extent {
    fn default() -> Self {
        Self::empty()
    }
}

/// Axis-aligned bounding box in world (or continuous index) coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BBox3 {
    min: Vector3<f64>,
    max: Vector3<f64>,
}

impl BBox3 {
    /// Create a new bounding box
    pub fn new(min: Vector3<f64>, max: Vector3<f64>) -> Self {
        debug_assert!(min.x <= max.x);
        debug_assert!(min.y <= max.y);
        debug_assert!(min.z <= max.z);
        Self { min, max }
    }

    /// Create an empty bounding box
    pub fn empty() -> Self {
        Self {
            min: Vector3::repeat(f64::MAX),
            max: Vector3::repeat(f64::MIN),
        }
    }

    /// Get minimum corner
    pub fn min(&self) -> Vector3<f64> {
        self.min
    }

    /// Get maximum corner
    pub fn max(&self) -> Vector3<f64> {
        self.max
    }

    /// Get the size of the bounding box
    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Get the center of the bounding box
    pub fn center(&self) -> Vector3<f64> {
        (self.min + self.max) * 0.5
    }

    /// Check if the bounding box is empty
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Check if a point is inside the bounding box
    pub fn contains(&self, point: Vector3<f64>) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Expand the bounding box to include a point
    pub fn include_point(&mut self, point: Vector3<f64>) {
        self.min = self.min.inf(&point);
        self.max = self.max.sup(&point);
    }

    /// The eight corner points
    pub fn corners(&self) -> [Vector3<f64>; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vector3::new(a.x, a.y, a.z),
            Vector3::new(b.x, a.y, a.z),
            Vector3::new(a.x, b.y, a.z),
            Vector3::new(b.x, b.y, a.z),
            Vector3::new(a.x, a.y, b.z),
            Vector3::new(b.x, a.y, b.z),
            Vector3::new(a.x, b.y, b.z),
            Vector3::new(b.x, b.y, b.z),
        ]
    }

    /// Bounding box of this box's corners after an affine transform
    pub fn transformed(&self, matrix: &Matrix4<f64>) -> BBox3 {
        let mut result = BBox3::empty();
        if self.is_empty() {
            return result;
        }
        for corner in self.corners() {
            result.include_point(transform_point(matrix, corner));
        }
        result
    }

    /// Smallest voxel extent covering the box, padded by `padding` voxels.
    ///
    /// The box must be expressed in continuous index coordinates.
    pub fn to_extent(&self, padding: i32) -> Extent {
        if self.is_empty() {
            return Extent::empty();
        }
        Extent::new(
            [
                self.min.x.floor() as i32 - padding,
                self.min.y.floor() as i32 - padding,
                self.min.z.floor() as i32 - padding,
            ],
            [
                self.max.x.ceil() as i32 + padding,
                self.max.y.ceil() as i32 + padding,
                self.max.z.ceil() as i32 + padding,
            ],
        )
    }
}

impl Default for BBox3 {
    fn default() -> Self {
        Self::empty()
    }
}

/// Apply a homogeneous affine matrix to a point
pub fn transform_point(matrix: &Matrix4<f64>, point: Vector3<f64>) -> Vector3<f64> {
    matrix.transform_point(&Point3::from(point)).coords
}

/// Apply the linear part of a homogeneous matrix to a direction
pub fn transform_vector(matrix: &Matrix4<f64>, vector: Vector3<f64>) -> Vector3<f64> {
    matrix.transform_vector(&vector)
}

/// Round a continuous index to the nearest voxel index
pub fn round_index(point: Vector3<f64>) -> [i32; 3] {
    [
        (point.x + 0.5).floor() as i32,
        (point.y + 0.5).floor() as i32,
        (point.z + 0.5).floor() as i32,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_basics() {
        let extent = Extent::from_dimensions([4, 3, 2]);
        assert_eq!(extent.voxel_count(), 24);
        assert!(extent.contains([3, 2, 1]));
        assert!(!extent.contains([4, 0, 0]));
        assert_eq!(extent.iter().count(), 24);
        assert_eq!(extent.iter().next(), Some([0, 0, 0]));
        assert_eq!(extent.iter().nth(1), Some([1, 0, 0]));
    }

    #[test]
    fn test_extent_intersect_union() {
        let a = Extent::new([0, 0, 0], [5, 5, 5]);
        let b = Extent::new([3, 4, -2], [9, 9, 1]);
        assert_eq!(a.intersect(&b), Extent::new([3, 4, 0], [5, 5, 1]));
        assert_eq!(a.union(&b), Extent::new([0, 0, -2], [9, 9, 5]));

        let far = Extent::new([10, 10, 10], [12, 12, 12]);
        assert!(a.intersect(&far).is_empty());
        assert_eq!(Extent::empty().union(&a), a);
    }

    #[test]
    fn test_bbox_to_extent() {
        let mut bbox = BBox3::empty();
        assert!(bbox.is_empty());
        bbox.include_point(Vector3::new(0.2, -1.5, 3.0));
        bbox.include_point(Vector3::new(2.7, 1.0, 3.0));
        let extent = bbox.to_extent(1);
        assert_eq!(extent, Extent::new([-1, -3, 2], [4, 2, 4]));
    }

    #[test]
    fn test_round_index() {
        assert_eq!(round_index(Vector3::new(0.49, -0.51, 2.5)), [0, -1, 3]);
    }
}
