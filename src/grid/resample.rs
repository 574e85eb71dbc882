//! Resampling grids onto another voxel lattice

use super::{ImageGeometry, Voxel, VoxelGrid};
use crate::types::{round_index, transform_point};
use crate::Result;
use nalgebra::{Matrix4, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Sampling scheme used when resampling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Interpolation {
    Nearest,
    Linear,
}

impl<T: Voxel> VoxelGrid<T> {
    /// Sample at a continuous index with trilinear interpolation.
    ///
    /// Voxels outside the extent contribute zero.
    pub fn sample_linear(&self, index: Vector3<f64>) -> f64 {
        let base = index.map(f64::floor);
        let frac = index - base;
        let (bi, bj, bk) = (base.x as i32, base.y as i32, base.z as i32);

        let mut result = 0.0;
        for corner in 0..8 {
            let di = corner & 1;
            let dj = (corner >> 1) & 1;
            let dk = (corner >> 2) & 1;
            let weight = (if di == 1 { frac.x } else { 1.0 - frac.x })
                * (if dj == 1 { frac.y } else { 1.0 - frac.y })
                * (if dk == 1 { frac.z } else { 1.0 - frac.z });
            if weight == 0.0 {
                continue;
            }
            let value = self.value([bi + di, bj + dj, bk + dk]);
            result += weight * value.to_f64();
        }
        result
    }

    /// Resample onto `target`.
    ///
    /// `target_to_source_world` maps the target's world frame into this
    /// grid's world frame (identity when both live in the same frame).
    pub fn resample(
        &self,
        target: &ImageGeometry,
        target_to_source_world: &Matrix4<f64>,
        interpolation: Interpolation,
    ) -> Result<VoxelGrid<T>> {
        let to_source_index =
            self.geometry().world_to_image()? * target_to_source_world * target.image_to_world();

        let mut result = VoxelGrid::new(*target);
        let extent = target.extent();
        for (ijk, value) in extent.iter().zip(result.data.iter_mut()) {
            let point = Vector3::new(ijk[0] as f64, ijk[1] as f64, ijk[2] as f64);
            let source = transform_point(&to_source_index, point);
            *value = match interpolation {
                Interpolation::Nearest => self.value(round_index(source)),
                Interpolation::Linear => T::from_f64(self.sample_linear(source)),
            };
        }
        Ok(result)
    }

    /// Nearest-neighbour copy of this grid onto `lattice`.
    ///
    /// The result covers this grid's world bounds clipped to the lattice's
    /// extent. Grids already on the lattice are cropped without resampling.
    pub fn aligned_to(&self, lattice: &ImageGeometry) -> Result<VoxelGrid<T>> {
        if self.geometry().same_lattice(lattice) {
            return Ok(self.cropped(&lattice.extent()));
        }
        let world_to_lattice = lattice.world_to_image()?;
        let extent = self
            .geometry()
            .world_bounds()
            .transformed(&world_to_lattice)
            .to_extent(0)
            .intersect(&lattice.extent());
        self.resample(
            &lattice.with_extent(extent),
            &Matrix4::identity(),
            Interpolation::Nearest,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Extent;

    #[test]
    fn test_linear_sample_midpoint() {
        let geom = ImageGeometry::axis_aligned(Vector3::zeros(), Vector3::repeat(1.0), [2, 1, 1]);
        let grid = VoxelGrid::from_data(geom, vec![0.0f32, 10.0]).expect("valid buffer");
        let value = grid.sample_linear(Vector3::new(0.5, 0.0, 0.0));
        assert!((value - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_resample_to_coarser_grid() {
        let fine = ImageGeometry::axis_aligned(Vector3::zeros(), Vector3::repeat(1.0), [4, 4, 4]);
        let grid = VoxelGrid::filled(fine, 7u8);
        let coarse = ImageGeometry::axis_aligned(Vector3::repeat(0.5), Vector3::repeat(2.0), [2, 2, 2]);
        let result = grid
            .resample(&coarse, &Matrix4::identity(), Interpolation::Nearest)
            .expect("resample");
        assert!(result.data().iter().all(|&v| v == 7));
    }

    #[test]
    fn test_aligned_to_shifted_lattice() {
        let lattice = ImageGeometry::axis_aligned(Vector3::zeros(), Vector3::repeat(1.0), [10, 10, 10]);
        let shifted = ImageGeometry::axis_aligned(Vector3::new(3.0, 3.0, 3.0), Vector3::repeat(1.0), [2, 2, 2]);
        let grid = VoxelGrid::filled(shifted, 1u8);
        let aligned = grid.aligned_to(&lattice).expect("aligned");
        assert!(aligned.geometry().same_lattice(&lattice));
        assert_eq!(aligned.count_set(), 8);
        assert!(aligned.extent().contains_extent(&Extent::new([3, 3, 3], [4, 4, 4])));
    }
}
