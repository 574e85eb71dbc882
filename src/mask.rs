//! Edit-allowed region for one modification
//!
//! The composer produces a 0/1 grid (1 = editable) on the modifier's
//! geometry:
//!
//! ```text
//! allowed = spatial(mask mode) AND intensity(source in [min, max])
//! ```
//!
//! Each factor is all-ones when its setting is disabled. When both are
//! disabled no mask is produced and the engine skips masking.

use crate::engine::ModificationMode;
use crate::grid::{ImageGeometry, VoxelGrid};
use crate::segmentation::Segmentation;
use crate::state::{AlignedSource, EditorState, MaskMode};
use crate::{Error, Result};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Everything the composer reads for one request
pub struct MaskContext<'a> {
    pub segmentation: &'a Segmentation,
    pub state: &'a EditorState,
    /// Segment being edited
    pub segment_id: &'a str,
    pub mode: ModificationMode,
    /// Grid the mask must align with
    pub geometry: &'a ImageGeometry,
    /// Source volume on the reference lattice, when one is selected
    pub source: Option<&'a AlignedSource>,
}

#[derive(Debug, Clone, PartialEq)]
struct MaskKey {
    segmentation_uid: u64,
    segmentation_revision: u64,
    mask_mode: MaskMode,
    mask_segment: Option<String>,
    /// Source identity and intensity range, only when intensity masking applies
    source: Option<(u64, u64, [f64; 2])>,
    geometry: ImageGeometry,
    segment_id: String,
    mode: ModificationMode,
}

/// Lazily recomputed, cached edit mask
#[derive(Debug, Default)]
pub struct MaskComposer {
    cache: RefCell<Option<(MaskKey, Rc<VoxelGrid<u8>>)>>,
    computations: Cell<u64>,
}

impl MaskComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the mask was actually computed
    pub fn computation_count(&self) -> u64 {
        self.computations.get()
    }

    /// Drop the cached mask
    pub fn invalidate(&self) {
        self.cache.borrow_mut().take();
    }

    /// Allowed region for a request, `None` when editing is unrestricted.
    ///
    /// Without a context there is nothing to restrict against and no mask
    /// is returned.
    pub fn compose(&self, context: Option<&MaskContext<'_>>) -> Result<Option<Rc<VoxelGrid<u8>>>> {
        let Some(ctx) = context else {
            return Ok(None);
        };
        if !ctx.segmentation.parent_transform().is_linear() {
            return Err(Error::UnsupportedTransform(
                "edit masks cannot be aligned through a non-linear segmentation transform"
                    .to_string(),
            ));
        }

        let mask_mode = ctx.state.mask_mode();
        let source = if ctx.state.intensity_mask_enabled() {
            if ctx.source.is_none() {
                log::warn!("intensity masking is enabled but no source volume is selected");
            }
            ctx.source
        } else {
            None
        };
        if mask_mode == MaskMode::Everywhere && source.is_none() {
            return Ok(None);
        }

        let key = MaskKey {
            segmentation_uid: ctx.segmentation.uid(),
            segmentation_revision: ctx.segmentation.revision(),
            mask_mode,
            mask_segment: ctx.state.mask_segment().map(String::from),
            source: source.map(|s| (s.source_uid, s.source_revision, ctx.state.intensity_range())),
            geometry: *ctx.geometry,
            segment_id: ctx.segment_id.to_string(),
            mode: ctx.mode,
        };
        if let Some((cached_key, mask)) = self.cache.borrow().as_ref() {
            if *cached_key == key {
                return Ok(Some(Rc::clone(mask)));
            }
        }

        let mut mask = self.spatial_region(ctx)?;
        if let Some(source) = source {
            let [min, max] = ctx.state.intensity_range();
            let extent = mask.extent();
            for (ijk, allowed) in extent.iter().zip(mask.data_mut().iter_mut()) {
                if *allowed == 0 {
                    continue;
                }
                let value = source.grid.value(ijk) as f64;
                if value < min || value > max {
                    *allowed = 0;
                }
            }
        }

        let mask = Rc::new(mask);
        self.computations.set(self.computations.get() + 1);
        *self.cache.borrow_mut() = Some((key, Rc::clone(&mask)));
        Ok(Some(mask))
    }

    fn spatial_region(&self, ctx: &MaskContext<'_>) -> Result<VoxelGrid<u8>> {
        let segmentation = ctx.segmentation;
        let others = |ids: Vec<String>| -> Vec<String> {
            ids.into_iter().filter(|id| id != ctx.segment_id).collect()
        };

        let mut region = match ctx.state.mask_mode() {
            MaskMode::Everywhere => VoxelGrid::filled(*ctx.geometry, 1),
            MaskMode::InsideAllSegments => {
                segmentation.union_mask(&segmentation.segment_ids(), ctx.geometry)?
            }
            MaskMode::InsideVisibleSegments => {
                segmentation.union_mask(&segmentation.visible_segment_ids(), ctx.geometry)?
            }
            MaskMode::OutsideAllSegments => {
                let mut mask =
                    segmentation.union_mask(&others(segmentation.segment_ids()), ctx.geometry)?;
                mask.invert();
                mask
            }
            MaskMode::OutsideVisibleSegments => {
                let mut mask = segmentation
                    .union_mask(&others(segmentation.visible_segment_ids()), ctx.geometry)?;
                mask.invert();
                mask
            }
            MaskMode::InsideSingleSegment => {
                let mask_segment = ctx
                    .state
                    .mask_segment()
                    .filter(|id| segmentation.contains_segment(id))
                    .ok_or_else(|| {
                        Error::InvalidParameter(
                            "mask mode is 'inside single segment' but no valid mask segment is selected"
                                .to_string(),
                        )
                    })?;
                segmentation.union_mask(&[mask_segment], ctx.geometry)?
            }
        };

        // Erasing with a single-segment mask may also clear the edited
        // segment's own voxels outside the mask segment.
        if ctx.state.mask_mode() == MaskMode::InsideSingleSegment
            && ctx.mode == ModificationMode::Remove
        {
            let own = segmentation.union_mask(&[ctx.segment_id], ctx.geometry)?;
            region.union_with(&own)?;
        }
        Ok(region)
    }
}
