//! Segments and their binary labelmap layers
//!
//! Every segment stores its voxels in a labelmap *layer*: a `u8` grid on the
//! segmentation's reference lattice where the segment owns one label value.
//! Segments created as a batch share one layer with distinct label values.
//! Layers live in an arena keyed by [`LabelmapId`], so "same representation"
//! means "same id", never pointer identity.
//!
//! Layers are reference counted and copied on write, which makes cloning a
//! whole [`Segmentation`] (an undo snapshot) cheap.

use crate::geometry::ParentTransform;
use crate::grid::{ImageGeometry, VoxelGrid};
use crate::types::Extent;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

static NEXT_SEGMENTATION_UID: AtomicU64 = AtomicU64::new(1);

/// Handle of a labelmap layer inside one segmentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LabelmapId(u32);

/// Editing progress of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SegmentStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Flagged,
}

/// A named editable region
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Segment {
    id: String,
    pub name: String,
    /// Display color, RGB in [0, 1]
    pub color: [f32; 3],
    /// Free-form terminology / display metadata
    pub tags: BTreeMap<String, String>,
    status: SegmentStatus,
    label_value: u8,
    layer: LabelmapId,
    visible: bool,
}

impl Segment {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> SegmentStatus {
        self.status
    }

    pub fn label_value(&self) -> u8 {
        self.label_value
    }

    pub fn layer(&self) -> LabelmapId {
        self.layer
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

/// Ordered set of segments sharing one reference geometry
#[derive(Debug, Clone)]
pub struct Segmentation {
    uid: u64,
    revision: u64,
    reference_geometry: ImageGeometry,
    segments: Vec<Segment>,
    layers: BTreeMap<LabelmapId, Arc<VoxelGrid<u8>>>,
    next_layer: u32,
    parent_transform: ParentTransform,
    hierarchy_parent: Option<String>,
}

/// Palette cycled through for new segments
const SEGMENT_COLORS: [[f32; 3]; 6] = [
    [0.50, 0.68, 0.50],
    [0.95, 0.84, 0.57],
    [0.69, 0.48, 0.39],
    [0.44, 0.55, 0.84],
    [0.85, 0.40, 0.40],
    [0.86, 0.71, 0.92],
];

impl Segmentation {
    /// Create an empty segmentation on `reference_geometry`
    pub fn new(reference_geometry: ImageGeometry) -> Result<Self> {
        if reference_geometry.extent().is_empty() {
            return Err(Error::InvalidParameter(
                "reference geometry has an empty extent".to_string(),
            ));
        }
        reference_geometry.world_to_image()?;
        Ok(Self {
            uid: NEXT_SEGMENTATION_UID.fetch_add(1, Ordering::Relaxed),
            revision: 0,
            reference_geometry,
            segments: Vec::new(),
            layers: BTreeMap::new(),
            next_layer: 0,
            parent_transform: ParentTransform::Identity,
            hierarchy_parent: None,
        })
    }

    /// Identity of this segmentation, shared by its snapshots
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Content revision, bumped by every mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    pub fn reference_geometry(&self) -> &ImageGeometry {
        &self.reference_geometry
    }

    pub fn parent_transform(&self) -> &ParentTransform {
        &self.parent_transform
    }

    pub fn set_parent_transform(&mut self, transform: ParentTransform) {
        self.parent_transform = transform;
        self.touch();
    }

    /// Location of the segmentation in the owning document's hierarchy
    pub fn hierarchy_parent(&self) -> Option<&str> {
        self.hierarchy_parent.as_deref()
    }

    pub fn set_hierarchy_parent(&mut self, parent: Option<String>) {
        self.hierarchy_parent = parent;
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segment(&self, id: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id == id)
    }

    pub fn contains_segment(&self, id: &str) -> bool {
        self.segment(id).is_some()
    }

    fn segment_index(&self, id: &str) -> Result<usize> {
        self.segments
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| Error::InvalidTarget(format!("segment '{}' not found", id)))
    }

    /// Segment IDs in display order
    pub fn segment_ids(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.id.clone()).collect()
    }

    /// IDs of visible segments in display order
    pub fn visible_segment_ids(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter(|s| s.visible)
            .map(|s| s.id.clone())
            .collect()
    }

    /// IDs of all segments stored in the same layer as `id` (including `id`)
    pub fn segments_sharing_layer(&self, id: &str) -> Result<Vec<String>> {
        let layer = self.segments[self.segment_index(id)?].layer;
        Ok(self
            .segments
            .iter()
            .filter(|s| s.layer == layer)
            .map(|s| s.id.clone())
            .collect())
    }

    /// First `{prefix}_{n}` not used as a segment ID
    pub fn generate_unique_segment_id(&self, prefix: &str) -> String {
        (1..)
            .map(|n| format!("{}_{}", prefix, n))
            .find(|id| !self.contains_segment(id))
            .unwrap_or_else(|| prefix.to_string())
    }

    fn allocate_layer(&mut self) -> LabelmapId {
        let id = LabelmapId(self.next_layer);
        self.next_layer += 1;
        self.layers
            .insert(id, Arc::new(VoxelGrid::new(self.reference_geometry)));
        id
    }

    fn new_segment(&self, id: &str, name: &str, label_value: u8, layer: LabelmapId) -> Segment {
        Segment {
            id: id.to_string(),
            name: name.to_string(),
            color: SEGMENT_COLORS[self.segments.len() % SEGMENT_COLORS.len()],
            tags: BTreeMap::new(),
            status: SegmentStatus::NotStarted,
            label_value,
            layer,
            visible: true,
        }
    }

    /// Add an empty segment stored in its own layer
    pub fn add_segment(&mut self, id: &str, name: &str) -> Result<&Segment> {
        if id.is_empty() || self.contains_segment(id) {
            return Err(Error::InvalidParameter(format!(
                "segment ID '{}' is empty or already in use",
                id
            )));
        }
        let layer = self.allocate_layer();
        let segment = self.new_segment(id, name, 1, layer);
        self.segments.push(segment);
        self.touch();
        Ok(&self.segments[self.segments.len() - 1])
    }

    /// Add a batch of empty segments sharing one layer (label values 1, 2, ...)
    pub fn add_shared_segments(&mut self, ids: &[(&str, &str)]) -> Result<LabelmapId> {
        if ids.is_empty() || ids.len() > u8::MAX as usize {
            return Err(Error::InvalidParameter(format!(
                "a shared layer holds 1 to 255 segments, got {}",
                ids.len()
            )));
        }
        for (n, (id, _)) in ids.iter().enumerate() {
            if id.is_empty()
                || self.contains_segment(id)
                || ids[..n].iter().any(|(other, _)| other == id)
            {
                return Err(Error::InvalidParameter(format!(
                    "segment ID '{}' is empty or already in use",
                    id
                )));
            }
        }
        let layer = self.allocate_layer();
        for (n, (id, name)) in ids.iter().enumerate() {
            let segment = self.new_segment(id, name, (n + 1) as u8, layer);
            self.segments.push(segment);
        }
        self.touch();
        Ok(layer)
    }

    /// Remove a segment, clearing its voxels and dropping its layer once unused
    pub fn remove_segment(&mut self, id: &str) -> Result<Segment> {
        let index = self.segment_index(id)?;
        let segment = self.segments.remove(index);
        if self.segments.iter().any(|s| s.layer == segment.layer) {
            if let Some(layer) = self.layers.get_mut(&segment.layer) {
                let grid = Arc::make_mut(layer);
                grid.data_mut()
                    .iter_mut()
                    .filter(|v| **v == segment.label_value)
                    .for_each(|v| *v = 0);
            }
        } else {
            self.layers.remove(&segment.layer);
        }
        self.touch();
        Ok(segment)
    }

    pub fn set_segment_status(&mut self, id: &str, status: SegmentStatus) -> Result<()> {
        let index = self.segment_index(id)?;
        if self.segments[index].status != status {
            self.segments[index].status = status;
            self.touch();
        }
        Ok(())
    }

    pub fn set_segment_visibility(&mut self, id: &str, visible: bool) -> Result<()> {
        let index = self.segment_index(id)?;
        if self.segments[index].visible != visible {
            self.segments[index].visible = visible;
            self.touch();
        }
        Ok(())
    }

    pub fn rename_segment(&mut self, id: &str, name: &str) -> Result<()> {
        let index = self.segment_index(id)?;
        self.segments[index].name = name.to_string();
        self.touch();
        Ok(())
    }

    /// Layer IDs in use
    pub fn layer_ids(&self) -> Vec<LabelmapId> {
        self.layers.keys().copied().collect()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, id: LabelmapId) -> Option<&VoxelGrid<u8>> {
        self.layers.get(&id).map(|grid| grid.as_ref())
    }

    /// Mutable layer access; copies the layer if a snapshot still shares it
    pub fn layer_mut(&mut self, id: LabelmapId) -> Option<&mut VoxelGrid<u8>> {
        if !self.layers.contains_key(&id) {
            return None;
        }
        self.touch();
        self.layers.get_mut(&id).map(Arc::make_mut)
    }

    /// Check if a voxel belongs to a segment
    pub fn is_voxel_set(&self, id: &str, ijk: [i32; 3]) -> bool {
        self.segment(id)
            .and_then(|s| Some(self.layer(s.layer)?.value(ijk) == s.label_value))
            .unwrap_or(false)
    }

    /// Binary (0/1) labelmap of one segment on the full reference extent
    pub fn binary_labelmap(&self, id: &str) -> Result<VoxelGrid<u8>> {
        let segment = &self.segments[self.segment_index(id)?];
        let layer = self.layer(segment.layer).ok_or_else(|| {
            Error::OperationFailed(format!("layer of segment '{}' is missing", id))
        })?;
        Ok(layer.binary_of_label(segment.label_value))
    }

    /// Union (0/1) of the given segments over `geometry`'s extent.
    ///
    /// `geometry` must lie on the reference lattice.
    pub fn union_mask<S: AsRef<str>>(&self, ids: &[S], geometry: &ImageGeometry) -> Result<VoxelGrid<u8>> {
        if !geometry.same_lattice(&self.reference_geometry) {
            return Err(Error::GeometryMismatch(
                "mask geometry is not on the segmentation's reference lattice".to_string(),
            ));
        }
        let mut members: BTreeMap<LabelmapId, Vec<u8>> = BTreeMap::new();
        for id in ids {
            let segment = &self.segments[self.segment_index(id.as_ref())?];
            members
                .entry(segment.layer)
                .or_default()
                .push(segment.label_value);
        }

        let mut mask = VoxelGrid::new(*geometry);
        let extent = geometry.extent();
        for (layer_id, labels) in &members {
            let Some(layer) = self.layer(*layer_id) else {
                continue;
            };
            for (ijk, value) in extent.iter().zip(mask.data_mut().iter_mut()) {
                if *value == 0 && labels.contains(&layer.value(ijk)) {
                    *value = 1;
                }
            }
        }
        Ok(mask)
    }

    /// Bounding extent of a segment's voxels
    pub fn segment_extent(&self, id: &str) -> Result<Extent> {
        let segment = &self.segments[self.segment_index(id)?];
        Ok(self
            .layer(segment.layer)
            .map(|layer| layer.effective_extent_by(|v| v == segment.label_value))
            .unwrap_or_default())
    }

    /// Move a segment out of a shared layer into a layer of its own.
    ///
    /// Returns the segment's (possibly unchanged) layer.
    pub fn separate_segment(&mut self, id: &str) -> Result<LabelmapId> {
        let index = self.segment_index(id)?;
        let (old_layer, label) = (self.segments[index].layer, self.segments[index].label_value);
        if self.segments.iter().filter(|s| s.layer == old_layer).count() == 1 {
            return Ok(old_layer);
        }

        let voxels = self.binary_labelmap(id)?;
        if let Some(layer) = self.layer_mut(old_layer) {
            layer
                .data_mut()
                .iter_mut()
                .filter(|v| **v == label)
                .for_each(|v| *v = 0);
        }
        let new_layer = self.allocate_layer();
        if let Some(layer) = self.layer_mut(new_layer) {
            layer.data_mut().copy_from_slice(voxels.data());
        }
        self.segments[index].layer = new_layer;
        self.segments[index].label_value = 1;
        self.touch();
        log::debug!("separated segment '{}' into its own layer", id);
        Ok(new_layer)
    }

    /// Replace this segmentation's content with a snapshot.
    ///
    /// Identity and revision keep counting forward so caches keyed on the
    /// revision see the change.
    pub fn restore_from(&mut self, snapshot: &Segmentation) {
        let revision = self.revision.max(snapshot.revision) + 1;
        let uid = self.uid;
        *self = snapshot.clone();
        self.uid = uid;
        self.revision = revision;
    }

    /// Check that two segmentations hold identical segments and voxels
    pub fn same_content(&self, other: &Segmentation) -> bool {
        self.segments == other.segments
            && self.layers.len() == other.layers.len()
            && self
                .layers
                .iter()
                .zip(other.layers.iter())
                .all(|((a_id, a), (b_id, b))| a_id == b_id && (Arc::ptr_eq(a, b) || a == b))
    }
}
