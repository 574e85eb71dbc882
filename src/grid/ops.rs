//! Voxel algebra on grids sharing one lattice

use super::{Voxel, VoxelGrid};
use crate::types::Extent;
use crate::{Error, Result};

impl<T: Voxel> VoxelGrid<T> {
    /// Binary image: 1 where `lower <= value <= upper`, 0 elsewhere
    pub fn threshold(&self, lower: f64, upper: f64) -> VoxelGrid<u8> {
        self.map(|v| {
            let value = v.to_f64();
            u8::from(value >= lower && value <= upper)
        })
    }

    /// Binary image: 1 where the voxel equals `label`
    pub fn binary_of_label(&self, label: T) -> VoxelGrid<u8> {
        self.map(|v| u8::from(v == label))
    }

    fn require_same_lattice<U: Voxel>(&self, other: &VoxelGrid<U>) -> Result<()> {
        if self.geometry().same_lattice(other.geometry()) {
            Ok(())
        } else {
            Err(Error::GeometryMismatch(
                "grids do not share a voxel lattice".to_string(),
            ))
        }
    }

    /// Write `value` wherever `stencil` is set, restricted to `extent`.
    ///
    /// Returns the number of voxels whose value changed.
    pub fn paint(&mut self, stencil: &VoxelGrid<u8>, value: T, extent: &Extent) -> Result<usize> {
        self.require_same_lattice(stencil)?;
        let region = extent
            .intersect(&self.extent())
            .intersect(&stencil.extent());
        let mut changed = 0;
        for ijk in region.iter() {
            if stencil.value(ijk) == 0 {
                continue;
            }
            if let Some(offset) = self.offset(ijk) {
                if self.data[offset] != value {
                    self.data[offset] = value;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    /// Replace `from` by `to` wherever `stencil` is set, restricted to `extent`.
    ///
    /// Returns the number of voxels whose value changed.
    pub fn replace_where(
        &mut self,
        stencil: &VoxelGrid<u8>,
        from: T,
        to: T,
        extent: &Extent,
    ) -> Result<usize> {
        self.require_same_lattice(stencil)?;
        let region = extent
            .intersect(&self.extent())
            .intersect(&stencil.extent());
        let mut changed = 0;
        for ijk in region.iter() {
            if stencil.value(ijk) == 0 {
                continue;
            }
            if let Some(offset) = self.offset(ijk) {
                if self.data[offset] == from && from != to {
                    self.data[offset] = to;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }
}

impl VoxelGrid<u8> {
    /// Logical OR with `other` over the overlapping region
    pub fn union_with(&mut self, other: &VoxelGrid<u8>) -> Result<()> {
        self.require_same_lattice(other)?;
        let region = self.extent().intersect(&other.extent());
        for ijk in region.iter() {
            if other.value(ijk) != 0 {
                self.set(ijk, 1);
            }
        }
        Ok(())
    }

    /// Logical AND with `other`; voxels outside `other`'s extent are cleared
    pub fn intersect_with(&mut self, other: &VoxelGrid<u8>) -> Result<()> {
        self.require_same_lattice(other)?;
        let extent = self.extent();
        for (ijk, value) in extent.iter().zip(self.data.iter_mut()) {
            if *value != 0 && other.value(ijk) == 0 {
                *value = 0;
            }
        }
        Ok(())
    }

    /// Clear every voxel set in `other`
    pub fn subtract(&mut self, other: &VoxelGrid<u8>) -> Result<()> {
        self.require_same_lattice(other)?;
        let region = self.extent().intersect(&other.extent());
        for ijk in region.iter() {
            if other.value(ijk) != 0 {
                self.set(ijk, 0);
            }
        }
        Ok(())
    }

    /// Swap set and unset voxels
    pub fn invert(&mut self) {
        self.data.iter_mut().for_each(|v| *v = u8::from(*v == 0));
    }

    /// Check if every set voxel is also set in `other`
    pub fn is_subset_of(&self, other: &VoxelGrid<u8>) -> bool {
        self.set_voxels().all(|ijk| other.value(ijk) != 0)
    }
}
