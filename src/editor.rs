//! Editing session facade
//!
//! [`SegmentEditor`] owns one segmentation together with the session state,
//! the modification engine, the undo history and the tool registry. Methods
//! meant to be called straight from interaction handlers return `bool` and
//! log failures; the `try_*` variants return the error instead.

use crate::brush::View;
use crate::config::EditorConfig;
use crate::engine::{ModificationEngine, ModificationMode, ModifyOptions, ModifyOutcome};
use crate::events::{HistoryObserver, RenderCoordinator};
use crate::grid::VoxelGrid;
use crate::history::UndoHistory;
use crate::segmentation::{Segment, SegmentStatus, Segmentation};
use crate::state::{AlignedSource, EditorState, SourceVolume};
use crate::tools::{ToolContext, ToolKind, ToolRegistry};
use crate::{Error, Result};
use std::rc::Rc;
use std::sync::Arc;

/// Prefix of generated segment IDs
pub const SEGMENT_ID_PREFIX: &str = "Segment";

pub struct SegmentEditor {
    config: EditorConfig,
    segmentation: Segmentation,
    state: EditorState,
    engine: ModificationEngine,
    history: UndoHistory,
    tools: ToolRegistry,
}

impl SegmentEditor {
    /// Start a session on `segmentation`
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use nalgebra::Vector3;
    /// use segedit::{EditorConfig, ImageGeometry, SegmentEditor, SegmentStatus, Segmentation};
    ///
    /// let geometry = ImageGeometry::axis_aligned(Vector3::zeros(), Vector3::repeat(1.0), [64, 64, 32]);
    /// let mut editor = SegmentEditor::new(Segmentation::new(geometry)?, EditorConfig::default())?;
    /// let id = editor.add_empty_segment(None, SegmentStatus::InProgress)?;
    /// assert_eq!(editor.state().selected_segment(), Some(id.as_str()));
    /// # Ok::<(), segedit::Error>(())
    /// ```
    pub fn new(segmentation: Segmentation, config: EditorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            history: UndoHistory::new(config.undo_capacity),
            tools: ToolRegistry::new(&config),
            config,
            segmentation,
            state: EditorState::new(),
            engine: ModificationEngine::new(),
        })
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn segmentation(&self) -> &Segmentation {
        &self.segmentation
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut EditorState {
        &mut self.state
    }

    pub fn engine(&self) -> &ModificationEngine {
        &self.engine
    }

    pub fn history(&self) -> &UndoHistory {
        &self.history
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn tools_mut(&mut self) -> &mut ToolRegistry {
        &mut self.tools
    }

    pub fn set_render_coordinator(&self, coordinator: Option<Rc<dyn RenderCoordinator>>) {
        self.engine.set_render_coordinator(coordinator);
    }

    pub fn add_history_observer(&mut self, observer: Rc<dyn HistoryObserver>) {
        self.history.add_observer(observer);
    }

    // ---------------------------------------------------------------
    // Segments
    // ---------------------------------------------------------------

    /// Add an empty segment in its own layer and select it.
    ///
    /// Without an ID the first free `Segment_N` is used.
    pub fn add_empty_segment(&mut self, id: Option<&str>, status: SegmentStatus) -> Result<String> {
        let id = match id {
            Some(id) => id.to_string(),
            None => self.segmentation.generate_unique_segment_id(SEGMENT_ID_PREFIX),
        };
        if self.segmentation.contains_segment(&id) {
            return Err(Error::InvalidParameter(format!(
                "segment ID '{}' is already in use",
                id
            )));
        }
        let snapshot = self.segmentation.clone();
        self.segmentation.add_segment(&id, &id)?;
        self.segmentation.set_segment_status(&id, status)?;
        self.history.push_snapshot(snapshot);
        self.state.set_selected_segment(Some(id.clone()));
        log::debug!("added segment '{}'", id);
        Ok(id)
    }

    /// Add segments sharing one labelmap layer; returns their IDs
    pub fn add_shared_segments(&mut self, names: &[&str]) -> Result<Vec<String>> {
        let mut ids: Vec<String> = Vec::with_capacity(names.len());
        for _ in names {
            let id = (1..)
                .map(|n| format!("{}_{}", SEGMENT_ID_PREFIX, n))
                .find(|id| !self.segmentation.contains_segment(id) && !ids.contains(id))
                .unwrap_or_default();
            ids.push(id);
        }
        let pairs: Vec<(&str, &str)> = ids
            .iter()
            .zip(names)
            .map(|(id, name)| (id.as_str(), *name))
            .collect();
        let snapshot = self.segmentation.clone();
        self.segmentation.add_shared_segments(&pairs)?;
        self.history.push_snapshot(snapshot);
        Ok(ids)
    }

    /// Remove the selected segment and select its neighbour.
    ///
    /// Returns the newly selected segment, if any.
    pub fn remove_selected_segment(&mut self) -> Result<Option<String>> {
        let selected = self.selected_segment_id()?;
        let neighbour = self
            .segment_at_offset(1, false)
            .or_else(|| self.segment_at_offset(-1, false));
        let snapshot = self.segmentation.clone();
        self.segmentation.remove_segment(&selected)?;
        self.history.push_snapshot(snapshot);
        self.state.set_selected_segment(neighbour.clone());
        log::debug!("removed segment '{}'", selected);
        Ok(neighbour)
    }

    pub fn segment_ids(&self) -> Vec<String> {
        self.segmentation.segment_ids()
    }

    pub fn visible_segment_ids(&self) -> Vec<String> {
        self.segmentation.visible_segment_ids()
    }

    pub fn set_segment_visibility(&mut self, id: &str, visible: bool) -> Result<()> {
        self.segmentation.set_segment_visibility(id, visible)
    }

    /// Select a segment by ID, or clear the selection
    pub fn select_segment(&mut self, id: Option<&str>) -> Result<()> {
        if let Some(id) = id {
            if !self.segmentation.contains_segment(id) {
                return Err(Error::InvalidTarget(format!("segment '{}' not found", id)));
            }
        }
        self.state.set_selected_segment(id.map(String::from));
        Ok(())
    }

    pub fn select_first_segment(&mut self, visible_only: bool) -> Option<String> {
        let first = if visible_only {
            self.segmentation.visible_segment_ids().into_iter().next()
        } else {
            self.segmentation.segment_ids().into_iter().next()
        };
        if first.is_some() {
            self.state.set_selected_segment(first.clone());
        }
        first
    }

    pub fn select_next_segment(&mut self, visible_only: bool) -> Option<String> {
        self.select_segment_at_offset(1, visible_only)
    }

    pub fn select_previous_segment(&mut self, visible_only: bool) -> Option<String> {
        self.select_segment_at_offset(-1, visible_only)
    }

    /// Move the selection; stays put when there is no segment at `offset`
    fn select_segment_at_offset(&mut self, offset: isize, visible_only: bool) -> Option<String> {
        let id = self.segment_at_offset(offset, visible_only)?;
        self.state.set_selected_segment(Some(id.clone()));
        Some(id)
    }

    /// Segment `offset` steps away from the selected one, counting only
    /// visible segments when asked
    fn segment_at_offset(&self, offset: isize, visible_only: bool) -> Option<String> {
        let selected = self.state.selected_segment()?;
        let segments = self.segmentation.segments();
        let current = segments.iter().position(|s| s.id() == selected)?;
        if offset == 0 {
            return Some(selected.to_string());
        }
        let candidates: Box<dyn Iterator<Item = &Segment> + '_> = if offset > 0 {
            Box::new(segments[current + 1..].iter())
        } else {
            Box::new(segments[..current].iter().rev())
        };
        candidates
            .filter(|s| !visible_only || s.is_visible())
            .nth(offset.unsigned_abs() - 1)
            .map(|s| s.id().to_string())
    }

    /// Move a segment out of a shared layer into a layer of its own
    pub fn separate_segment(&mut self, id: &str) -> Result<()> {
        let snapshot = self.segmentation.clone();
        self.segmentation.separate_segment(id)?;
        self.history.push_snapshot(snapshot);
        Ok(())
    }

    /// Binary (0/1) labelmap of the selected segment on the reference lattice
    pub fn selected_segment_labelmap(&self) -> Result<VoxelGrid<u8>> {
        let id = self.selected_segment_id()?;
        self.segmentation.binary_labelmap(&id)
    }

    fn selected_segment_id(&self) -> Result<String> {
        let id = self
            .state
            .selected_segment()
            .ok_or_else(|| Error::InvalidTarget("no segment selected".to_string()))?;
        if !self.segmentation.contains_segment(id) {
            return Err(Error::InvalidTarget(format!(
                "selected segment '{}' not found",
                id
            )));
        }
        Ok(id.to_string())
    }

    // ---------------------------------------------------------------
    // Source volume
    // ---------------------------------------------------------------

    /// Select a zero-filled source volume on the segmentation's reference
    /// geometry unless one is already selected
    pub fn create_blank_source_volume(&mut self) -> Result<Arc<SourceVolume>> {
        if let Some(volume) = self.state.source_volume() {
            return Ok(Arc::clone(volume));
        }
        let geometry = *self.segmentation.reference_geometry();
        if geometry.extent().is_empty() {
            return Err(Error::InvalidParameter(
                "reference geometry has an empty extent".to_string(),
            ));
        }
        let mut volume = SourceVolume::new(VoxelGrid::<f32>::new(geometry))
            .with_parent_transform(self.segmentation.parent_transform().clone());
        if let Some(parent) = self.segmentation.hierarchy_parent() {
            volume = volume.with_hierarchy_parent(parent);
        }
        let volume = Arc::new(volume);
        self.state.set_source_volume(Some(Arc::clone(&volume)));
        Ok(volume)
    }

    /// Selected source volume resampled onto the reference lattice
    pub fn aligned_source_volume(&self) -> Result<Rc<AlignedSource>> {
        let volume = self
            .state
            .source_volume()
            .ok_or_else(|| Error::InvalidParameter("no source volume selected".to_string()))?;
        self.engine.aligned_source_volume(&self.segmentation, volume)
    }

    pub fn toggle_source_intensity_mask(&mut self) {
        self.state.toggle_intensity_mask();
    }

    // ---------------------------------------------------------------
    // History
    // ---------------------------------------------------------------

    /// Save the current content; false when undo is disabled
    pub fn save_state_for_undo(&mut self) -> bool {
        self.history.save_state(&self.segmentation)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        let restored = self.history.undo(&mut self.segmentation);
        if restored {
            self.drop_stale_selection();
        }
        restored
    }

    pub fn redo(&mut self) -> bool {
        let restored = self.history.redo(&mut self.segmentation);
        if restored {
            self.drop_stale_selection();
        }
        restored
    }

    pub fn clear_undo_history(&mut self) {
        self.history.clear();
    }

    pub fn set_undo_capacity(&mut self, capacity: usize) {
        self.history.set_capacity(capacity);
        self.config.undo_capacity = capacity;
    }

    fn drop_stale_selection(&mut self) {
        let stale = self
            .state
            .selected_segment()
            .is_some_and(|id| !self.segmentation.contains_segment(id));
        if stale {
            self.state.set_selected_segment(None);
        }
        let stale_mask = self
            .state
            .mask_segment()
            .is_some_and(|id| !self.segmentation.contains_segment(id));
        if stale_mask {
            self.state.set_mask_segment(None);
        }
    }

    // ---------------------------------------------------------------
    // Editing
    // ---------------------------------------------------------------

    /// Apply a modifier to one segment, recording an undo state when
    /// anything changed.
    ///
    /// On failure the segmentation and the history are left as they were.
    pub fn try_modify_segment(
        &mut self,
        segment_id: &str,
        modifier: Option<&VoxelGrid<u8>>,
        mode: ModificationMode,
        options: ModifyOptions,
    ) -> Result<ModifyOutcome> {
        let snapshot = self.segmentation.clone();
        match self.engine.modify(
            &mut self.segmentation,
            &self.state,
            segment_id,
            modifier,
            mode,
            options,
        ) {
            Ok(outcome) => {
                if outcome.changed() {
                    self.history.push_snapshot(snapshot);
                }
                Ok(outcome)
            }
            Err(err) => {
                if !self.segmentation.same_content(&snapshot) {
                    self.segmentation.restore_from(&snapshot);
                }
                Err(err)
            }
        }
    }

    /// Apply a modifier to one segment; false when the edit failed
    pub fn modify_segment(
        &mut self,
        segment_id: &str,
        modifier: Option<&VoxelGrid<u8>>,
        mode: ModificationMode,
        options: ModifyOptions,
    ) -> bool {
        self.try_modify_segment(segment_id, modifier, mode, options)
            .map_err(|err| log::error!("editing segment '{}' failed: {}", segment_id, err))
            .is_ok()
    }

    /// Apply a modifier to the selected segment; false when the edit failed
    pub fn modify_selected_segment(
        &mut self,
        modifier: Option<&VoxelGrid<u8>>,
        mode: ModificationMode,
        options: ModifyOptions,
    ) -> bool {
        match self.selected_segment_id() {
            Ok(id) => self.modify_segment(&id, modifier, mode, options),
            Err(err) => {
                log::error!("cannot edit: {}", err);
                false
            }
        }
    }

    /// Run the gesture collected by tool `kind` against the selected segment.
    ///
    /// A gesture that yields no stencil succeeds without touching anything.
    pub fn try_apply_tool(&mut self, kind: ToolKind, view: Option<&View>) -> Result<ModifyOutcome> {
        let segment_id = match self.selected_segment_id() {
            Ok(id) => id,
            Err(err) => {
                self.tools.get_mut(kind).reset();
                return Err(err);
            }
        };
        let source = if self.tools.get(kind).needs_source_volume() {
            Some(self.aligned_source_volume()?)
        } else {
            None
        };

        let mut modifier = self.engine.take_modifier(self.segmentation.reference_geometry());
        let ctx = ToolContext {
            segmentation: &self.segmentation,
            state: &self.state,
            view,
            source: source.as_deref(),
        };
        let generated = self.tools.get_mut(kind).generate_modifier(&ctx, &mut modifier);
        let result = match generated {
            Ok(Some(edit)) => {
                self.try_modify_segment(&segment_id, Some(&modifier), edit.mode, edit.options)
            }
            Ok(None) => {
                log::debug!("{} tool produced no stencil", kind.name());
                Ok(ModifyOutcome::default())
            }
            Err(err) => Err(err),
        };
        self.engine.recycle_modifier(modifier);
        result
    }

    /// Run the gesture collected by tool `kind`; false when it failed
    pub fn apply_tool(&mut self, kind: ToolKind, view: Option<&View>) -> bool {
        self.try_apply_tool(kind, view)
            .map_err(|err| log::error!("{} tool failed: {}", kind.name(), err))
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ParentTransform;
    use crate::grid::ImageGeometry;
    use crate::types::Extent;
    use nalgebra::Vector3;

    fn editor() -> SegmentEditor {
        let geometry = ImageGeometry::axis_aligned(Vector3::zeros(), Vector3::repeat(1.0), [8, 8, 4]);
        let seg = Segmentation::new(geometry).expect("valid geometry");
        SegmentEditor::new(seg, EditorConfig::default()).expect("valid config")
    }

    fn block(editor: &SegmentEditor, extent: Extent) -> VoxelGrid<u8> {
        let mut modifier = VoxelGrid::new(*editor.segmentation().reference_geometry());
        modifier.fill_extent(&extent, 1);
        modifier
    }

    #[test]
    fn test_add_empty_segment_generates_ids_and_selects() {
        let mut editor = editor();
        let a = editor.add_empty_segment(None, SegmentStatus::NotStarted).expect("add");
        let b = editor.add_empty_segment(None, SegmentStatus::InProgress).expect("add");
        assert_eq!(a, "Segment_1");
        assert_eq!(b, "Segment_2");
        assert_eq!(editor.state().selected_segment(), Some("Segment_2"));
        assert_eq!(
            editor.segmentation().segment("Segment_2").map(|s| s.status()),
            Some(SegmentStatus::InProgress)
        );
        assert!(editor.add_empty_segment(Some("Segment_1"), SegmentStatus::NotStarted).is_err());
    }

    #[test]
    fn test_select_next_skips_hidden_segments() {
        let mut editor = editor();
        for id in ["a", "b", "c"] {
            editor.add_empty_segment(Some(id), SegmentStatus::NotStarted).expect("add");
        }
        editor.set_segment_visibility("b", false).expect("known segment");
        editor.select_first_segment(false);
        assert_eq!(editor.select_next_segment(true).as_deref(), Some("c"));
        assert_eq!(editor.select_next_segment(false), None);
        assert_eq!(editor.state().selected_segment(), Some("c"));
        assert_eq!(editor.select_previous_segment(false).as_deref(), Some("b"));
    }

    #[test]
    fn test_remove_selected_selects_neighbour() {
        let mut editor = editor();
        for id in ["a", "b"] {
            editor.add_empty_segment(Some(id), SegmentStatus::NotStarted).expect("add");
        }
        let next = editor.remove_selected_segment().expect("selected");
        assert_eq!(next.as_deref(), Some("a"));
        assert_eq!(editor.segment_ids(), vec!["a".to_string()]);

        assert!(editor.undo());
        assert!(editor.segmentation().contains_segment("b"));
    }

    #[test]
    fn test_failed_edit_leaves_history_alone() {
        let mut editor = editor();
        editor.add_empty_segment(Some("a"), SegmentStatus::NotStarted).expect("add");
        let depth = editor.history().len();
        let modifier = block(&editor, Extent::new([0, 0, 0], [3, 3, 3]));

        assert!(!editor.modify_segment("missing", Some(&modifier), ModificationMode::Add, ModifyOptions::default()));
        assert!(!editor.modify_selected_segment(None, ModificationMode::Add, ModifyOptions::default()));
        assert_eq!(editor.history().len(), depth);

        editor
            .segmentation
            .set_parent_transform(ParentTransform::NonLinear("warp".to_string()));
        assert!(!editor.modify_selected_segment(Some(&modifier), ModificationMode::Add, ModifyOptions::default()));
        assert_eq!(editor.history().len(), depth);
        assert_eq!(editor.segmentation().segment_extent("a").map(|e| e.is_empty()).ok(), Some(true));
    }

    #[test]
    fn test_edit_then_undo_redo() {
        let mut editor = editor();
        editor.add_empty_segment(Some("a"), SegmentStatus::NotStarted).expect("add");
        let modifier = block(&editor, Extent::new([1, 1, 1], [2, 2, 2]));
        assert!(editor.modify_selected_segment(Some(&modifier), ModificationMode::Add, ModifyOptions::default()));
        let painted = editor.selected_segment_labelmap().expect("selected").count_set();
        assert_eq!(painted, 8);

        assert!(editor.undo());
        assert_eq!(editor.selected_segment_labelmap().expect("selected").count_set(), 0);
        assert!(editor.redo());
        assert_eq!(editor.selected_segment_labelmap().expect("selected").count_set(), 8);
    }

    #[test]
    fn test_select_unknown_segment_keeps_selection() {
        let mut editor = editor();
        editor.add_empty_segment(Some("a"), SegmentStatus::NotStarted).expect("add");
        assert!(matches!(editor.select_segment(Some("nope")), Err(Error::InvalidTarget(_))));
        assert_eq!(editor.state().selected_segment(), Some("a"));
        editor.select_segment(None).expect("clearing always works");
        assert!(!editor.modify_selected_segment(None, ModificationMode::Add, ModifyOptions::default()));
    }

    #[test]
    fn test_shrinking_capacity_limits_undo() {
        let mut editor = editor();
        for id in ["a", "b", "c", "d"] {
            editor.add_empty_segment(Some(id), SegmentStatus::NotStarted).expect("add");
        }
        editor.set_undo_capacity(2);
        assert_eq!(editor.config().undo_capacity, 2);
        let mut undos = 0;
        while editor.undo() {
            undos += 1;
        }
        assert_eq!(undos, 2);
        assert_eq!(editor.segment_ids(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_undo_past_creation_clears_selection() {
        let mut editor = editor();
        editor.add_empty_segment(Some("a"), SegmentStatus::NotStarted).expect("add");
        assert!(editor.undo());
        assert_eq!(editor.state().selected_segment(), None);
        assert!(editor.selected_segment_labelmap().is_err());
    }

    #[test]
    fn test_blank_source_volume_matches_reference() {
        let mut editor = editor();
        let volume = editor.create_blank_source_volume().expect("non-empty geometry");
        assert!(volume.image().geometry().same_lattice(editor.segmentation().reference_geometry()));
        assert!(volume.image().data().iter().all(|&v| v == 0.0));
        let again = editor.create_blank_source_volume().expect("already set");
        assert!(Arc::ptr_eq(&volume, &again));
        assert_eq!(editor.aligned_source_volume().expect("aligned").grid.data().len(), 256);
    }

    #[test]
    fn test_tool_without_selection_fails() {
        let mut editor = editor();
        assert!(!editor.apply_tool(ToolKind::Threshold, None));
        editor.add_empty_segment(Some("a"), SegmentStatus::NotStarted).expect("add");
        // threshold needs a source volume
        assert!(!editor.apply_tool(ToolKind::Threshold, None));
        editor.create_blank_source_volume().expect("blank");
        editor.tools_mut().threshold_mut().set_range(-1.0, 1.0).expect("valid range");
        assert!(editor.apply_tool(ToolKind::Threshold, None));
        assert_eq!(editor.selected_segment_labelmap().expect("selected").count_set(), 256);
    }
}
