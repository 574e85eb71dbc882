//! Per-session editor selections

use crate::geometry::ParentTransform;
use crate::grid::VoxelGrid;
use crate::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

static NEXT_SOURCE_UID: AtomicU64 = AtomicU64::new(1);

/// Region in which edits are allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MaskMode {
    #[default]
    Everywhere,
    InsideAllSegments,
    InsideVisibleSegments,
    OutsideAllSegments,
    OutsideVisibleSegments,
    /// Inside the segment selected with [`EditorState::set_mask_segment`]
    InsideSingleSegment,
}

/// Which other segments lose voxels claimed by the edited segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OverwriteMode {
    #[default]
    AllSegments,
    VisibleSegments,
    NoneSegments,
}

/// Read-only intensity volume the segmentation is drawn on.
///
/// A clone is a new volume with its own identity.
#[derive(Debug)]
pub struct SourceVolume {
    uid: u64,
    revision: u64,
    image: VoxelGrid<f32>,
    parent_transform: ParentTransform,
    hierarchy_parent: Option<String>,
}

impl Clone for SourceVolume {
    fn clone(&self) -> Self {
        Self {
            uid: NEXT_SOURCE_UID.fetch_add(1, Ordering::Relaxed),
            revision: self.revision,
            image: self.image.clone(),
            parent_transform: self.parent_transform.clone(),
            hierarchy_parent: self.hierarchy_parent.clone(),
        }
    }
}

impl SourceVolume {
    pub fn new(image: VoxelGrid<f32>) -> Self {
        Self {
            uid: NEXT_SOURCE_UID.fetch_add(1, Ordering::Relaxed),
            revision: 0,
            image,
            parent_transform: ParentTransform::Identity,
            hierarchy_parent: None,
        }
    }

    pub fn with_parent_transform(mut self, transform: ParentTransform) -> Self {
        self.parent_transform = transform;
        self
    }

    pub fn with_hierarchy_parent(mut self, parent: impl Into<String>) -> Self {
        self.hierarchy_parent = Some(parent.into());
        self
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn image(&self) -> &VoxelGrid<f32> {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut VoxelGrid<f32> {
        self.revision += 1;
        &mut self.image
    }

    pub fn parent_transform(&self) -> &ParentTransform {
        &self.parent_transform
    }

    pub fn hierarchy_parent(&self) -> Option<&str> {
        self.hierarchy_parent.as_deref()
    }
}

/// Source volume resampled onto a segmentation's reference lattice
#[derive(Debug, Clone)]
pub struct AlignedSource {
    pub source_uid: u64,
    pub source_revision: u64,
    pub grid: VoxelGrid<f32>,
}

/// Selections of one editing session.
///
/// Every setter bumps [`EditorState::revision`].
#[derive(Debug, Clone, Default)]
pub struct EditorState {
    revision: u64,
    selected_segment: Option<String>,
    source_volume: Option<Arc<SourceVolume>>,
    mask_mode: MaskMode,
    mask_segment: Option<String>,
    overwrite_mode: OverwriteMode,
    intensity_mask_enabled: bool,
    intensity_range: [f64; 2],
}

impl EditorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn selected_segment(&self) -> Option<&str> {
        self.selected_segment.as_deref()
    }

    pub fn set_selected_segment(&mut self, id: Option<String>) {
        self.selected_segment = id;
        self.revision += 1;
    }

    pub fn source_volume(&self) -> Option<&Arc<SourceVolume>> {
        self.source_volume.as_ref()
    }

    pub fn set_source_volume(&mut self, volume: Option<Arc<SourceVolume>>) {
        self.source_volume = volume;
        self.revision += 1;
    }

    pub fn mask_mode(&self) -> MaskMode {
        self.mask_mode
    }

    pub fn set_mask_mode(&mut self, mode: MaskMode) {
        self.mask_mode = mode;
        self.revision += 1;
    }

    pub fn mask_segment(&self) -> Option<&str> {
        self.mask_segment.as_deref()
    }

    pub fn set_mask_segment(&mut self, id: Option<String>) {
        self.mask_segment = id;
        self.revision += 1;
    }

    pub fn overwrite_mode(&self) -> OverwriteMode {
        self.overwrite_mode
    }

    pub fn set_overwrite_mode(&mut self, mode: OverwriteMode) {
        self.overwrite_mode = mode;
        self.revision += 1;
    }

    pub fn intensity_mask_enabled(&self) -> bool {
        self.intensity_mask_enabled
    }

    pub fn set_intensity_mask_enabled(&mut self, enabled: bool) {
        self.intensity_mask_enabled = enabled;
        self.revision += 1;
    }

    pub fn toggle_intensity_mask(&mut self) {
        self.set_intensity_mask_enabled(!self.intensity_mask_enabled);
    }

    /// Inclusive `[min, max]` intensity range
    pub fn intensity_range(&self) -> [f64; 2] {
        self.intensity_range
    }

    pub fn set_intensity_range(&mut self, min: f64, max: f64) -> Result<()> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(Error::InvalidParameter(format!(
                "intensity range [{}, {}] is empty",
                min, max
            )));
        }
        self.intensity_range = [min, max];
        self.revision += 1;
        Ok(())
    }
}
