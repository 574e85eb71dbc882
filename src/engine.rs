//! Segment modification engine
//!
//! Merges a modifier stencil into one segment's labelmap layer, honoring
//! the edit mask and the overwrite policy, and keeps segments stored in
//! different layers from overlapping.
//!
//! All writes go through "claim" and "release":
//!
//! * claim: write the segment's label where the (masked) modifier is set.
//!   Peers sharing the layer are overwritten implicitly; when one of them is
//!   protected by the overwrite policy and would be hit, the edited segment
//!   is first moved into a layer of its own.
//! * release: in every other layer, clear the labels of the segments
//!   selected for overwrite where the segment claimed voxels. Segments not
//!   selected keep their voxels even inside the claimed region.

use crate::events::{RenderCoordinator, RenderPause};
use crate::geometry::ParentTransform;
use crate::grid::{ImageGeometry, Interpolation, VoxelGrid};
use crate::mask::{MaskComposer, MaskContext};
use crate::segmentation::{LabelmapId, SegmentStatus, Segmentation};
use crate::state::{AlignedSource, EditorState, MaskMode, OverwriteMode, SourceVolume};
use crate::types::Extent;
use crate::{Error, Result};
use nalgebra::Matrix4;
use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a modifier is merged into the edited segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ModificationMode {
    /// Modifier becomes the segment's content inside the modifier's extent
    Set,
    /// Modifier voxels are added to the segment
    Add,
    /// Modifier voxels are removed from the segment
    Remove,
    /// Modifier voxels are removed from every segment
    RemoveAll,
}

/// Optional arguments of [`ModificationEngine::modify`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModifyOptions {
    /// Restrict buffer writes to this extent; ignored when invalid
    pub extent: Option<Extent>,
    /// Skip the edit mask and (except for `RemoveAll`) the overwrite policy
    pub bypass_masking: bool,
}

impl ModifyOptions {
    pub fn with_extent(extent: Extent) -> Self {
        Self {
            extent: Some(extent),
            bypass_masking: false,
        }
    }

    pub fn bypass_masking() -> Self {
        Self {
            extent: None,
            bypass_masking: true,
        }
    }
}

/// Voxel counts changed by one modification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifyOutcome {
    /// Voxels newly written with the edited segment's label
    pub claimed: usize,
    /// Voxels cleared from the edited segment (or from all segments for `RemoveAll`)
    pub removed: usize,
    /// Voxels taken away from other segments
    pub released: usize,
}

impl ModifyOutcome {
    pub fn changed(&self) -> bool {
        self.claimed + self.removed + self.released > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SourceKey {
    source_uid: u64,
    source_revision: u64,
    segmentation_to_world: Matrix4<f64>,
    world_to_source: Matrix4<f64>,
    reference: ImageGeometry,
}

/// Marks the engine busy for the duration of one `modify()` call
struct BusyGuard<'a> {
    busy: &'a Cell<bool>,
}

impl<'a> BusyGuard<'a> {
    fn enter(busy: &'a Cell<bool>) -> Result<Self> {
        if busy.replace(true) {
            log::warn!("re-entrant modify() call rejected");
            return Err(Error::Reentrant);
        }
        Ok(Self { busy })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy.set(false);
    }
}

/// Applies modifier stencils to segments.
///
/// The engine owns the reusable modifier buffer, the edit-mask cache and
/// the aligned source-volume cache. It is single-threaded; calling
/// [`modify`](Self::modify) again from inside a render callback fails with
/// [`Error::Reentrant`].
pub struct ModificationEngine {
    composer: MaskComposer,
    modifier_pool: RefCell<Option<VoxelGrid<u8>>>,
    source_cache: RefCell<Option<(SourceKey, Rc<AlignedSource>)>>,
    coordinator: RefCell<Option<Rc<dyn RenderCoordinator>>>,
    busy: Cell<bool>,
}

impl Default for ModificationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ModificationEngine {
    pub fn new() -> Self {
        Self {
            composer: MaskComposer::new(),
            modifier_pool: RefCell::new(None),
            source_cache: RefCell::new(None),
            coordinator: RefCell::new(None),
            busy: Cell::new(false),
        }
    }

    /// Observer notified before and after every modification
    pub fn set_render_coordinator(&self, coordinator: Option<Rc<dyn RenderCoordinator>>) {
        *self.coordinator.borrow_mut() = coordinator;
    }

    pub fn mask_composer(&self) -> &MaskComposer {
        &self.composer
    }

    /// Cleared modifier buffer on `geometry`, reusing the previous allocation
    pub fn take_modifier(&self, geometry: &ImageGeometry) -> VoxelGrid<u8> {
        match self.modifier_pool.borrow_mut().take() {
            Some(mut modifier) => {
                modifier.reset(*geometry);
                modifier
            }
            None => VoxelGrid::new(*geometry),
        }
    }

    /// Hand a modifier buffer back for reuse by the next gesture
    pub fn recycle_modifier(&self, modifier: VoxelGrid<u8>) {
        *self.modifier_pool.borrow_mut() = Some(modifier);
    }

    /// Source volume resampled (trilinear) onto the segmentation's reference lattice
    pub fn aligned_source_volume(
        &self,
        segmentation: &Segmentation,
        source: &SourceVolume,
    ) -> Result<Rc<AlignedSource>> {
        let key = SourceKey {
            source_uid: source.uid(),
            source_revision: source.revision(),
            segmentation_to_world: segmentation.parent_transform().to_world()?,
            world_to_source: source.parent_transform().from_world()?,
            reference: *segmentation.reference_geometry(),
        };
        if let Some((cached_key, aligned)) = self.source_cache.borrow().as_ref() {
            if *cached_key == key {
                return Ok(Rc::clone(aligned));
            }
        }

        let grid = source.image().resample(
            &key.reference,
            &(key.world_to_source * key.segmentation_to_world),
            Interpolation::Linear,
        )?;
        let aligned = Rc::new(AlignedSource {
            source_uid: source.uid(),
            source_revision: source.revision(),
            grid,
        });
        *self.source_cache.borrow_mut() = Some((key, Rc::clone(&aligned)));
        Ok(aligned)
    }

    /// Edit mask that `modify()` would use for a modifier covering `geometry`
    pub fn edit_mask(
        &self,
        segmentation: &Segmentation,
        state: &EditorState,
        segment_id: &str,
        mode: ModificationMode,
        geometry: &ImageGeometry,
    ) -> Result<Option<Rc<VoxelGrid<u8>>>> {
        let source = match state.source_volume() {
            Some(volume) if state.intensity_mask_enabled() => {
                Some(self.aligned_source_volume(segmentation, volume)?)
            }
            _ => None,
        };
        let context = MaskContext {
            segmentation,
            state,
            segment_id,
            mode,
            geometry,
            source: source.as_deref(),
        };
        self.composer.compose(Some(&context))
    }

    /// Apply `modifier` to segment `segment_id`.
    ///
    /// Fails with [`Error::InvalidTarget`] for an unknown segment and with
    /// [`Error::MissingModifier`] when no modifier is given; in both cases
    /// nothing is changed. A modifier with an empty extent is a successful
    /// no-op.
    pub fn modify(
        &self,
        segmentation: &mut Segmentation,
        state: &EditorState,
        segment_id: &str,
        modifier: Option<&VoxelGrid<u8>>,
        mode: ModificationMode,
        options: ModifyOptions,
    ) -> Result<ModifyOutcome> {
        let _busy = BusyGuard::enter(&self.busy)?;
        let coordinator = self.coordinator.borrow().clone();
        let _pause = RenderPause::new(coordinator);

        let result = self.apply(segmentation, state, segment_id, modifier, mode, options);
        match &result {
            Ok(outcome) => log::debug!(
                "{:?} on segment '{}': claimed {}, removed {}, released {}",
                mode,
                segment_id,
                outcome.claimed,
                outcome.removed,
                outcome.released
            ),
            Err(err) => log::error!("{:?} on segment '{}' failed: {}", mode, segment_id, err),
        }
        result
    }

    fn apply(
        &self,
        segmentation: &mut Segmentation,
        state: &EditorState,
        segment_id: &str,
        modifier: Option<&VoxelGrid<u8>>,
        mode: ModificationMode,
        options: ModifyOptions,
    ) -> Result<ModifyOutcome> {
        if !segmentation.contains_segment(segment_id) {
            return Err(Error::InvalidTarget(format!(
                "segment '{}' not found",
                segment_id
            )));
        }
        let modifier = modifier.ok_or(Error::MissingModifier)?;
        if modifier.extent().is_empty() {
            return Ok(ModifyOutcome::default());
        }
        if let ParentTransform::NonLinear(name) = segmentation.parent_transform() {
            return Err(Error::UnsupportedTransform(format!(
                "segmentation is under non-linear transform '{}'",
                name
            )));
        }

        let reference = *segmentation.reference_geometry();
        let modifier: Cow<'_, VoxelGrid<u8>> = if modifier.geometry().same_lattice(&reference) {
            Cow::Borrowed(modifier)
        } else {
            Cow::Owned(modifier.aligned_to(&reference)?)
        };
        let mut region = modifier.extent().intersect(&reference.extent());
        if let Some(extent) = options.extent.filter(Extent::is_valid) {
            region = region.intersect(&extent);
        }
        if region.is_empty() {
            return Ok(ModifyOutcome::default());
        }
        let region_geometry = reference.with_extent(region);

        let mask = if options.bypass_masking {
            None
        } else {
            self.edit_mask(segmentation, state, segment_id, mode, &region_geometry)?
        };
        let allowed = |ijk: [i32; 3]| mask.as_ref().map_or(true, |m| m.value(ijk) != 0);

        let mut claim = VoxelGrid::new(region_geometry);
        for (ijk, value) in region.iter().zip(claim.data_mut().iter_mut()) {
            *value = u8::from(modifier.value(ijk) != 0 && allowed(ijk));
        }

        let overwrite = overwrite_targets(segmentation, state, segment_id, mode, options);
        let mut outcome = ModifyOutcome::default();
        match mode {
            ModificationMode::Add => {
                let (claimed, released) =
                    claim_for_segment(segmentation, segment_id, &claim, &overwrite)?;
                outcome.claimed = claimed;
                outcome.released = released;
            }
            ModificationMode::Set => {
                // Clear the segment inside the modifier's extent, except
                // where the mask protects it or the claim re-adds it.
                let mut clear = VoxelGrid::new(region_geometry);
                for (ijk, value) in region.iter().zip(clear.data_mut().iter_mut()) {
                    *value = u8::from(claim.value(ijk) == 0 && allowed(ijk));
                }
                outcome.removed = remove_from_segments(segmentation, &[segment_id], &clear)?;
                let (claimed, released) =
                    claim_for_segment(segmentation, segment_id, &claim, &overwrite)?;
                outcome.claimed = claimed;
                outcome.released = released;
            }
            ModificationMode::Remove => {
                let handoff = self.handoff_target(segmentation, state, segment_id, options);
                let removed_voxels = match handoff {
                    Some(_) => Some(occupied_within(segmentation, segment_id, &claim)?),
                    None => None,
                };
                outcome.removed = remove_from_segments(segmentation, &[segment_id], &claim)?;
                if let (Some(mask_segment), Some(voxels)) = (handoff, removed_voxels) {
                    let (claimed, _) = claim_for_segment(segmentation, &mask_segment, &voxels, &[])?;
                    log::debug!(
                        "handed {} voxels from '{}' to mask segment '{}'",
                        claimed,
                        segment_id,
                        mask_segment
                    );
                }
            }
            ModificationMode::RemoveAll => {
                let mut targets: Vec<&str> = vec![segment_id];
                targets.extend(overwrite.iter().map(String::as_str));
                outcome.removed = remove_from_segments(segmentation, &targets, &claim)?;
            }
        }

        if matches!(mode, ModificationMode::Add | ModificationMode::Set)
            && claim.any_set()
            && segmentation.segment(segment_id).map(|s| s.status()) == Some(SegmentStatus::NotStarted)
        {
            segmentation.set_segment_status(segment_id, SegmentStatus::InProgress)?;
        }

        if let Some(source) = state.source_volume() {
            if segmentation.hierarchy_parent() != source.hierarchy_parent() {
                segmentation.set_hierarchy_parent(source.hierarchy_parent().map(String::from));
            }
        }
        Ok(outcome)
    }

    /// Segment that receives voxels erased under the single-segment mask
    fn handoff_target(
        &self,
        segmentation: &Segmentation,
        state: &EditorState,
        segment_id: &str,
        options: ModifyOptions,
    ) -> Option<String> {
        if options.bypass_masking || state.mask_mode() != MaskMode::InsideSingleSegment {
            return None;
        }
        state
            .mask_segment()
            .filter(|id| *id != segment_id && segmentation.contains_segment(id))
            .map(String::from)
    }
}

/// Segments that lose voxels claimed by `segment_id`
fn overwrite_targets(
    segmentation: &Segmentation,
    state: &EditorState,
    segment_id: &str,
    mode: ModificationMode,
    options: ModifyOptions,
) -> Vec<String> {
    let others = |ids: Vec<String>| -> Vec<String> {
        ids.into_iter().filter(|id| id != segment_id).collect()
    };
    if mode == ModificationMode::RemoveAll {
        return others(segmentation.segment_ids());
    }
    if options.bypass_masking {
        return Vec::new();
    }
    match state.overwrite_mode() {
        OverwriteMode::AllSegments => others(segmentation.segment_ids()),
        OverwriteMode::VisibleSegments => others(segmentation.visible_segment_ids()),
        OverwriteMode::NoneSegments => Vec::new(),
    }
}

/// Stencil of the voxels of `segment_id` that are set in `stencil`
fn occupied_within(
    segmentation: &Segmentation,
    segment_id: &str,
    stencil: &VoxelGrid<u8>,
) -> Result<VoxelGrid<u8>> {
    let mut result = stencil.clone();
    let extent = result.extent();
    for (ijk, value) in extent.iter().zip(result.data_mut().iter_mut()) {
        if *value != 0 && !segmentation.is_voxel_set(segment_id, ijk) {
            *value = 0;
        }
    }
    Ok(result)
}

/// Label values per layer for a set of segments
fn labels_by_layer<S: AsRef<str>>(
    segmentation: &Segmentation,
    ids: &[S],
) -> Result<BTreeMap<LabelmapId, Vec<u8>>> {
    let mut layers: BTreeMap<LabelmapId, Vec<u8>> = BTreeMap::new();
    for id in ids {
        let segment = segmentation.segment(id.as_ref()).ok_or_else(|| {
            Error::InvalidTarget(format!("segment '{}' not found", id.as_ref()))
        })?;
        layers
            .entry(segment.layer())
            .or_default()
            .push(segment.label_value());
    }
    Ok(layers)
}

/// Clear the labels of `ids` wherever `stencil` is set; returns cleared voxel count
fn clear_labels(
    segmentation: &mut Segmentation,
    layers: &BTreeMap<LabelmapId, Vec<u8>>,
    stencil: &VoxelGrid<u8>,
) -> Result<usize> {
    let region = stencil.extent();
    let mut cleared = 0;
    for (layer_id, labels) in layers {
        let touches = stencil.set_voxels().any(|ijk| {
            segmentation
                .layer(*layer_id)
                .is_some_and(|layer| labels.contains(&layer.value(ijk)))
        });
        if !touches {
            continue;
        }
        let layer = segmentation.layer_mut(*layer_id).ok_or_else(|| {
            Error::OperationFailed(format!("labelmap layer {:?} is missing", layer_id))
        })?;
        for ijk in region.iter() {
            if stencil.value(ijk) == 0 {
                continue;
            }
            if let Some(value) = layer.get(ijk) {
                if value != 0 && labels.contains(&value) {
                    layer.set(ijk, 0);
                    cleared += 1;
                }
            }
        }
    }
    Ok(cleared)
}

fn remove_from_segments<S: AsRef<str>>(
    segmentation: &mut Segmentation,
    ids: &[S],
    stencil: &VoxelGrid<u8>,
) -> Result<usize> {
    let layers = labels_by_layer(segmentation, ids)?;
    clear_labels(segmentation, &layers, stencil)
}

/// Write `segment_id`'s label where `stencil` is set and release the
/// `overwrite` segments stored in other layers.
///
/// Returns `(claimed, released)` voxel counts.
fn claim_for_segment(
    segmentation: &mut Segmentation,
    segment_id: &str,
    stencil: &VoxelGrid<u8>,
    overwrite: &[String],
) -> Result<(usize, usize)> {
    if !stencil.any_set() {
        return Ok((0, 0));
    }
    let segment = segmentation
        .segment(segment_id)
        .ok_or_else(|| Error::InvalidTarget(format!("segment '{}' not found", segment_id)))?;
    let (mut layer_id, mut label) = (segment.layer(), segment.label_value());

    let protected: Vec<u8> = segmentation
        .segments()
        .iter()
        .filter(|s| s.layer() == layer_id && s.id() != segment_id)
        .filter(|s| !overwrite.iter().any(|id| id == s.id()))
        .map(|s| s.label_value())
        .collect();
    if !protected.is_empty() {
        let collides = segmentation.layer(layer_id).is_some_and(|layer| {
            stencil
                .set_voxels()
                .any(|ijk| protected.contains(&layer.value(ijk)))
        });
        if collides {
            layer_id = segmentation.separate_segment(segment_id)?;
            label = 1;
        }
    }

    let region = stencil.extent();
    let layer = segmentation.layer_mut(layer_id).ok_or_else(|| {
        Error::OperationFailed(format!("labelmap layer of '{}' is missing", segment_id))
    })?;
    let claimed = layer.paint(stencil, label, &region)?;

    let mut release = labels_by_layer(segmentation, overwrite)?;
    release.remove(&layer_id);
    let released = clear_labels(segmentation, &release, stencil)?;
    Ok((claimed, released))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn setup() -> Segmentation {
        let geometry = ImageGeometry::axis_aligned(Vector3::zeros(), Vector3::repeat(1.0), [10, 10, 10]);
        let mut seg = Segmentation::new(geometry).expect("valid geometry");
        seg.add_segment("a", "A").expect("add a");
        seg.add_segment("b", "B").expect("add b");
        seg
    }

    fn box_modifier(seg: &Segmentation, min: [i32; 3], max: [i32; 3]) -> VoxelGrid<u8> {
        let geometry = seg.reference_geometry().with_extent(Extent::new(min, max));
        VoxelGrid::filled(geometry, 1)
    }

    #[test]
    fn test_unknown_segment_is_invalid_target() {
        let engine = ModificationEngine::new();
        let mut seg = setup();
        let modifier = box_modifier(&seg, [0, 0, 0], [1, 1, 1]);
        let result = engine.modify(
            &mut seg,
            &EditorState::new(),
            "missing",
            Some(&modifier),
            ModificationMode::Add,
            ModifyOptions::default(),
        );
        assert!(matches!(result, Err(Error::InvalidTarget(_))));
    }

    #[test]
    fn test_missing_modifier_leaves_state_untouched() {
        let engine = ModificationEngine::new();
        let mut seg = setup();
        let before = seg.revision();
        let result = engine.modify(
            &mut seg,
            &EditorState::new(),
            "a",
            None,
            ModificationMode::Add,
            ModifyOptions::default(),
        );
        assert!(matches!(result, Err(Error::MissingModifier)));
        assert_eq!(seg.revision(), before);
    }

    #[test]
    fn test_add_takes_voxels_from_other_layers() {
        let engine = ModificationEngine::new();
        let mut seg = setup();
        let state = EditorState::new();
        let first = box_modifier(&seg, [0, 0, 0], [4, 4, 4]);
        engine
            .modify(&mut seg, &state, "b", Some(&first), ModificationMode::Add, ModifyOptions::default())
            .expect("add b");

        let second = box_modifier(&seg, [3, 3, 3], [6, 6, 6]);
        let outcome = engine
            .modify(&mut seg, &state, "a", Some(&second), ModificationMode::Add, ModifyOptions::default())
            .expect("add a");
        assert_eq!(outcome.claimed, 64);
        assert_eq!(outcome.released, 8);
        assert!(!seg.is_voxel_set("b", [3, 3, 3]));
        assert_eq!(seg.segment("a").map(|s| s.status()), Some(SegmentStatus::InProgress));
    }

    #[test]
    fn test_none_overwrite_keeps_overlap() {
        let engine = ModificationEngine::new();
        let mut seg = setup();
        let mut state = EditorState::new();
        state.set_overwrite_mode(OverwriteMode::NoneSegments);
        let modifier = box_modifier(&seg, [0, 0, 0], [2, 2, 2]);
        for id in ["a", "b"] {
            engine
                .modify(&mut seg, &state, id, Some(&modifier), ModificationMode::Add, ModifyOptions::default())
                .expect("add");
        }
        assert!(seg.is_voxel_set("a", [1, 1, 1]) && seg.is_voxel_set("b", [1, 1, 1]));
    }

    #[test]
    fn test_protected_shared_peer_forces_separation() {
        let engine = ModificationEngine::new();
        let geometry = ImageGeometry::axis_aligned(Vector3::zeros(), Vector3::repeat(1.0), [6, 6, 6]);
        let mut seg = Segmentation::new(geometry).expect("valid geometry");
        seg.add_shared_segments(&[("x", "X"), ("y", "Y")]).expect("batch");
        let mut state = EditorState::new();
        let modifier = box_modifier(&seg, [0, 0, 0], [2, 2, 2]);
        engine
            .modify(&mut seg, &state, "y", Some(&modifier), ModificationMode::Add, ModifyOptions::default())
            .expect("add y");

        state.set_overwrite_mode(OverwriteMode::NoneSegments);
        engine
            .modify(&mut seg, &state, "x", Some(&modifier), ModificationMode::Add, ModifyOptions::default())
            .expect("add x");
        assert_eq!(seg.layer_count(), 2, "x moved to its own layer");
        assert!(seg.is_voxel_set("x", [1, 1, 1]) && seg.is_voxel_set("y", [1, 1, 1]));
    }

    #[test]
    fn test_shared_peer_overwritten_in_place() {
        let engine = ModificationEngine::new();
        let geometry = ImageGeometry::axis_aligned(Vector3::zeros(), Vector3::repeat(1.0), [6, 6, 6]);
        let mut seg = Segmentation::new(geometry).expect("valid geometry");
        seg.add_shared_segments(&[("x", "X"), ("y", "Y")]).expect("batch");
        let state = EditorState::new();
        let modifier = box_modifier(&seg, [0, 0, 0], [2, 2, 2]);
        for id in ["y", "x"] {
            engine
                .modify(&mut seg, &state, id, Some(&modifier), ModificationMode::Add, ModifyOptions::default())
                .expect("add");
        }
        assert_eq!(seg.layer_count(), 1);
        assert!(seg.is_voxel_set("x", [1, 1, 1]));
        assert!(!seg.is_voxel_set("y", [1, 1, 1]));
    }

    #[test]
    fn test_remove_all_clears_every_segment() {
        let engine = ModificationEngine::new();
        let mut seg = setup();
        let mut state = EditorState::new();
        state.set_overwrite_mode(OverwriteMode::NoneSegments);
        let modifier = box_modifier(&seg, [0, 0, 0], [3, 3, 3]);
        for id in ["a", "b"] {
            engine
                .modify(&mut seg, &state, id, Some(&modifier), ModificationMode::Add, ModifyOptions::default())
                .expect("add");
        }
        let eraser = box_modifier(&seg, [0, 0, 0], [1, 1, 1]);
        let outcome = engine
            .modify(&mut seg, &state, "a", Some(&eraser), ModificationMode::RemoveAll, ModifyOptions::default())
            .expect("remove all");
        assert_eq!(outcome.removed, 16);
        assert!(!seg.is_voxel_set("b", [0, 0, 0]));
        assert!(seg.is_voxel_set("b", [2, 2, 2]));
    }

    #[test]
    fn test_single_segment_erase_hands_voxels_to_mask_segment() {
        let engine = ModificationEngine::new();
        let mut seg = setup();
        let mut state = EditorState::new();
        let modifier = box_modifier(&seg, [0, 0, 0], [3, 3, 3]);
        engine
            .modify(&mut seg, &state, "a", Some(&modifier), ModificationMode::Add, ModifyOptions::default())
            .expect("add a");

        state.set_mask_mode(MaskMode::InsideSingleSegment);
        state.set_mask_segment(Some("b".to_string()));
        let eraser = box_modifier(&seg, [0, 0, 0], [1, 1, 1]);
        engine
            .modify(&mut seg, &state, "a", Some(&eraser), ModificationMode::Remove, ModifyOptions::default())
            .expect("split");
        assert!(!seg.is_voxel_set("a", [0, 0, 0]));
        assert!(seg.is_voxel_set("b", [0, 0, 0]), "erased voxels move to the mask segment");
        assert!(seg.is_voxel_set("a", [3, 3, 3]));
    }

    #[test]
    fn test_explicit_extent_limits_writes() {
        let engine = ModificationEngine::new();
        let mut seg = setup();
        let modifier = box_modifier(&seg, [0, 0, 0], [9, 9, 9]);
        let options = ModifyOptions::with_extent(Extent::new([0, 0, 0], [1, 1, 1]));
        let outcome = engine
            .modify(&mut seg, &EditorState::new(), "a", Some(&modifier), ModificationMode::Add, options)
            .expect("add");
        assert_eq!(outcome.claimed, 8);

        let invalid = ModifyOptions::with_extent(Extent::empty());
        let outcome = engine
            .modify(&mut seg, &EditorState::new(), "a", Some(&modifier), ModificationMode::Add, invalid)
            .expect("add");
        assert_eq!(outcome.claimed, 992, "invalid extent falls back to the whole modifier");
    }

    #[test]
    fn test_modifier_pool_reuses_buffer() {
        let engine = ModificationEngine::new();
        let seg = setup();
        let mut modifier = engine.take_modifier(seg.reference_geometry());
        modifier.fill(1);
        engine.recycle_modifier(modifier);
        let modifier = engine.take_modifier(seg.reference_geometry());
        assert!(!modifier.any_set(), "recycled modifier is cleared");
    }

    #[test]
    fn test_reparents_under_source_volume() {
        let engine = ModificationEngine::new();
        let mut seg = setup();
        let mut state = EditorState::new();
        let image = VoxelGrid::new(*seg.reference_geometry());
        let source = SourceVolume::new(image).with_hierarchy_parent("Patient 1 / Study 2");
        state.set_source_volume(Some(std::sync::Arc::new(source)));
        let modifier = box_modifier(&seg, [0, 0, 0], [0, 0, 0]);
        engine
            .modify(&mut seg, &state, "a", Some(&modifier), ModificationMode::Add, ModifyOptions::default())
            .expect("add");
        assert_eq!(seg.hierarchy_parent(), Some("Patient 1 / Study 2"));
    }
}
