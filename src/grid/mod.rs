//! Oriented dense voxel grids
//!
//! A [`VoxelGrid`] is a dense scalar buffer covering an integer [`Extent`],
//! placed in world space by an [`ImageGeometry`] (origin, spacing and
//! direction cosines folded into one voxel-to-world matrix).

use crate::types::{round_index, transform_point, BBox3, Extent};
use crate::{Error, Result};
use nalgebra::{Matrix3, Matrix4, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod ops; // Voxel algebra
mod resample; // Lattice alignment and resampling

pub use resample::Interpolation;

/// Tolerance used when comparing voxel lattices
const LATTICE_TOLERANCE: f64 = 1e-6;

/// Scalar types that can be stored in a [`VoxelGrid`]
pub trait Voxel: Copy + Default + PartialEq + PartialOrd + std::fmt::Debug + 'static {
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;

    /// Non-zero voxels count as occupied
    fn is_set(self) -> bool {
        self != Self::default()
    }
}

macro_rules! impl_voxel_int {
    ($($t:ty),*) => {
        $(impl Voxel for $t {
            fn to_f64(self) -> f64 {
                self as f64
            }
            fn from_f64(value: f64) -> Self {
                value.round().clamp(<$t>::MIN as f64, <$t>::MAX as f64) as $t
            }
        })*
    };
}

impl_voxel_int!(u8, i16, u16, i32);

impl Voxel for f32 {
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl Voxel for f64 {
    fn to_f64(self) -> f64 {
        self
    }
    fn from_f64(value: f64) -> Self {
        value
    }
}

/// Voxel lattice placement plus the extent covered by a grid
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImageGeometry {
    image_to_world: Matrix4<f64>,
    extent: Extent,
}

impl ImageGeometry {
    /// Geometry from origin, spacing and direction cosines (columns = I, J, K axes)
    pub fn new(
        origin: Vector3<f64>,
        spacing: Vector3<f64>,
        directions: Matrix3<f64>,
        extent: Extent,
    ) -> Self {
        let mut image_to_world = Matrix4::identity();
        for axis in 0..3 {
            let column = directions.column(axis) * spacing[axis];
            image_to_world.fixed_view_mut::<3, 1>(0, axis).copy_from(&column);
        }
        image_to_world
            .fixed_view_mut::<3, 1>(0, 3)
            .copy_from(&origin);
        Self {
            image_to_world,
            extent,
        }
    }

    /// Axis-aligned geometry with identity directions
    pub fn axis_aligned(origin: Vector3<f64>, spacing: Vector3<f64>, dims: [usize; 3]) -> Self {
        Self::new(
            origin,
            spacing,
            Matrix3::identity(),
            Extent::from_dimensions(dims),
        )
    }

    /// Geometry from an explicit voxel-to-world matrix
    pub fn from_matrix(image_to_world: Matrix4<f64>, extent: Extent) -> Self {
        Self {
            image_to_world,
            extent,
        }
    }

    /// The voxel-to-world matrix
    pub fn image_to_world(&self) -> &Matrix4<f64> {
        &self.image_to_world
    }

    /// The world-to-voxel matrix
    pub fn world_to_image(&self) -> Result<Matrix4<f64>> {
        self.image_to_world.try_inverse().ok_or_else(|| {
            Error::DegenerateGeometry("voxel-to-world matrix is singular".to_string())
        })
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Same lattice, different extent
    pub fn with_extent(&self, extent: Extent) -> Self {
        Self {
            image_to_world: self.image_to_world,
            extent,
        }
    }

    pub fn origin(&self) -> Vector3<f64> {
        self.image_to_world.fixed_view::<3, 1>(0, 3).into_owned()
    }

    /// Voxel spacing along I, J, K
    pub fn spacing(&self) -> Vector3<f64> {
        Vector3::from_fn(|axis, _| self.image_to_world.fixed_view::<3, 1>(0, axis).norm())
    }

    /// Unit direction cosines as columns
    pub fn directions(&self) -> Matrix3<f64> {
        let spacing = self.spacing();
        Matrix3::from_fn(|row, col| {
            if spacing[col] > 0.0 {
                self.image_to_world[(row, col)] / spacing[col]
            } else {
                0.0
            }
        })
    }

    /// World position of a voxel center
    pub fn voxel_to_world(&self, ijk: [i32; 3]) -> Vector3<f64> {
        let point = Vector3::new(ijk[0] as f64, ijk[1] as f64, ijk[2] as f64);
        transform_point(&self.image_to_world, point)
    }

    /// Nearest voxel index of a world position
    pub fn world_to_voxel(&self, point: Vector3<f64>) -> Result<[i32; 3]> {
        let world_to_image = self.world_to_image()?;
        Ok(round_index(transform_point(&world_to_image, point)))
    }

    /// World bounds of the extent, including half-voxel borders
    pub fn world_bounds(&self) -> BBox3 {
        if self.extent.is_empty() {
            return BBox3::empty();
        }
        let min = self.extent.min.map(|v| v as f64 - 0.5);
        let max = self.extent.max.map(|v| v as f64 + 0.5);
        BBox3::new(Vector3::from(min), Vector3::from(max)).transformed(&self.image_to_world)
    }

    /// Check if two geometries share the same voxel lattice (extents may differ)
    pub fn same_lattice(&self, other: &ImageGeometry) -> bool {
        self.image_to_world
            .iter()
            .zip(other.image_to_world.iter())
            .all(|(a, b)| (a - b).abs() <= LATTICE_TOLERANCE)
    }
}

/// Dense 3D scalar image over an oriented voxel lattice
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid<T: Voxel> {
    geometry: ImageGeometry,
    data: Vec<T>,
}

impl<T: Voxel> VoxelGrid<T> {
    /// Create a grid filled with the default value (zero)
    pub fn new(geometry: ImageGeometry) -> Self {
        Self::filled(geometry, T::default())
    }

    /// Create a grid filled with `value`
    pub fn filled(geometry: ImageGeometry, value: T) -> Self {
        let count = geometry.extent().voxel_count();
        Self {
            geometry,
            data: vec![value; count],
        }
    }

    /// Create a grid from a buffer laid out with `i` fastest
    pub fn from_data(geometry: ImageGeometry, data: Vec<T>) -> Result<Self> {
        let expected = geometry.extent().voxel_count();
        if data.len() != expected {
            return Err(Error::InvalidParameter(format!(
                "buffer holds {} voxels, extent needs {}",
                data.len(),
                expected
            )));
        }
        Ok(Self { geometry, data })
    }

    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    pub fn extent(&self) -> Extent {
        self.geometry.extent()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Check if the grid has no voxels at all
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Reset to a new geometry and clear all voxels, reusing the buffer
    pub fn reset(&mut self, geometry: ImageGeometry) {
        self.geometry = geometry;
        self.data.clear();
        self.data.resize(geometry.extent().voxel_count(), T::default());
    }

    /// Buffer offset of a voxel index inside the extent
    #[inline]
    pub fn offset(&self, ijk: [i32; 3]) -> Option<usize> {
        let extent = self.geometry.extent();
        if !extent.contains(ijk) {
            return None;
        }
        let dims = extent.dimensions();
        let i = (ijk[0] - extent.min[0]) as usize;
        let j = (ijk[1] - extent.min[1]) as usize;
        let k = (ijk[2] - extent.min[2]) as usize;
        Some((k * dims[1] + j) * dims[0] + i)
    }

    /// Value at a voxel index, `None` outside the extent
    pub fn get(&self, ijk: [i32; 3]) -> Option<T> {
        self.offset(ijk).map(|offset| self.data[offset])
    }

    /// Value at a voxel index, zero outside the extent
    pub fn value(&self, ijk: [i32; 3]) -> T {
        self.get(ijk).unwrap_or_default()
    }

    /// Set a voxel; returns false if the index lies outside the extent
    pub fn set(&mut self, ijk: [i32; 3], value: T) -> bool {
        match self.offset(ijk) {
            Some(offset) => {
                self.data[offset] = value;
                true
            }
            None => false,
        }
    }

    /// Fill every voxel with `value`
    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    /// Fill every voxel inside `extent` with `value`
    pub fn fill_extent(&mut self, extent: &Extent, value: T) {
        for ijk in extent.intersect(&self.extent()).iter() {
            self.set(ijk, value);
        }
    }

    /// Number of non-zero voxels
    pub fn count_set(&self) -> usize {
        self.data.iter().filter(|v| v.is_set()).count()
    }

    /// Check if any voxel is non-zero
    pub fn any_set(&self) -> bool {
        self.data.iter().any(|v| v.is_set())
    }

    /// Indices of all non-zero voxels
    pub fn set_voxels(&self) -> impl Iterator<Item = [i32; 3]> + '_ {
        self.extent()
            .iter()
            .zip(self.data.iter())
            .filter(|(_, v)| v.is_set())
            .map(|(ijk, _)| ijk)
    }

    /// Smallest extent containing every voxel with `predicate(value)`
    pub fn effective_extent_by(&self, predicate: impl Fn(T) -> bool) -> Extent {
        let mut result = Extent::empty();
        for (ijk, value) in self.extent().iter().zip(self.data.iter()) {
            if predicate(*value) {
                result.include_index(ijk);
            }
        }
        result
    }

    /// Smallest extent containing every non-zero voxel
    pub fn effective_extent(&self) -> Extent {
        self.effective_extent_by(|v| v.is_set())
    }

    /// Copy of the grid restricted to `extent` (intersected with the grid's own extent)
    pub fn cropped(&self, extent: &Extent) -> Self {
        let target = extent.intersect(&self.extent());
        let mut result = Self::new(self.geometry.with_extent(target));
        for ijk in target.iter() {
            result.set(ijk, self.value(ijk));
        }
        result
    }

    /// Convert voxel values into another scalar type
    pub fn map<U: Voxel>(&self, f: impl Fn(T) -> U) -> VoxelGrid<U> {
        VoxelGrid {
            geometry: self.geometry,
            data: self.data.iter().map(|v| f(*v)).collect(),
        }
    }

    /// Minimum and maximum scalar value, `None` for an empty grid
    pub fn scalar_range(&self) -> Option<(T, T)> {
        let mut iter = self.data.iter().copied();
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), v| {
            (
                if v < lo { v } else { lo },
                if v > hi { v } else { hi },
            )
        }))
    }
}
