//! Modifier stencils from interaction points
//!
//! A brush turns points picked in a view into a closed surface in RAS world
//! space and rasterizes it onto the segmentation's reference lattice:
//!
//! - [`PaintBrush`]: sphere or slice-thick cylinder stamped along a stroke
//! - [`ScissorsCut`]: free-form, circle or rectangle outline extruded along
//!   the view direction

mod paint;
mod scissors;

pub use paint::PaintBrush;
pub use scissors::{ScissorsCut, ScissorsEdit, ScissorsOperation, ScissorsShape, SliceCutMode};

use crate::geometry::{world_to_ijk_matrix, CameraView, SliceView};
use crate::grid::ImageGeometry;
use crate::segmentation::Segmentation;
use crate::types::BBox3;
use crate::Result;
use nalgebra::Matrix4;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// View the interaction happens in
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum View {
    Slice(SliceView),
    Camera(CameraView),
}

/// Reference lattice of a segmentation as seen from RAS world
pub(crate) struct TargetFrame {
    pub geometry: ImageGeometry,
    pub world_to_ijk: Matrix4<f64>,
    pub ijk_to_world: Matrix4<f64>,
    /// Bounds of the full lattice in RAS
    pub world_bounds: BBox3,
}

impl TargetFrame {
    pub fn of(segmentation: &Segmentation) -> Result<Self> {
        let geometry = *segmentation.reference_geometry();
        let to_world = segmentation.parent_transform().to_world()?;
        Ok(Self {
            geometry,
            world_to_ijk: world_to_ijk_matrix(&geometry, segmentation.parent_transform())?,
            ijk_to_world: to_world * geometry.image_to_world(),
            world_bounds: geometry.world_bounds().transformed(&to_world),
        })
    }
}
