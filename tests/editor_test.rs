use nalgebra::Vector3;
use segedit::{
    AutoThresholdMode, EditorConfig, EditorState, Error, Extent, HistoryObserver, ImageGeometry,
    ModificationEngine, ModificationMode, ModifyOptions, RenderCoordinator, SegmentEditor,
    SegmentStatus, Segmentation, SourceVolume, ToolKind, UndoHistory, VoxelGrid,
};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::Arc;

fn geometry() -> ImageGeometry {
    ImageGeometry::axis_aligned(Vector3::zeros(), Vector3::repeat(1.0), [10, 10, 5])
}

fn editor(config: EditorConfig) -> SegmentEditor {
    let seg = Segmentation::new(geometry()).expect("Failed to create segmentation");
    SegmentEditor::new(seg, config).expect("Failed to create editor")
}

fn block(editor: &SegmentEditor, min: [i32; 3], max: [i32; 3]) -> VoxelGrid<u8> {
    let geometry = editor
        .segmentation()
        .reference_geometry()
        .with_extent(Extent::new(min, max));
    VoxelGrid::filled(geometry, 1)
}

#[test]
fn test_undo_redo_round_trip() {
    let mut editor = editor(EditorConfig::default());
    editor
        .add_empty_segment(Some("liver"), SegmentStatus::NotStarted)
        .expect("Failed to add segment");
    editor
        .add_empty_segment(Some("kidney"), SegmentStatus::NotStarted)
        .expect("Failed to add segment");
    editor.clear_undo_history();

    let edits: [(&str, [i32; 3], [i32; 3], ModificationMode); 5] = [
        ("liver", [0, 0, 0], [4, 4, 4], ModificationMode::Add),
        ("kidney", [3, 3, 0], [8, 8, 2], ModificationMode::Add),
        ("liver", [1, 1, 1], [2, 2, 2], ModificationMode::Remove),
        ("kidney", [0, 5, 0], [9, 9, 4], ModificationMode::Set),
        ("liver", [0, 0, 0], [9, 9, 4], ModificationMode::RemoveAll),
    ];
    for (id, min, max, mode) in edits {
        let modifier = block(&editor, min, max);
        assert!(
            editor.modify_segment(id, Some(&modifier), mode, ModifyOptions::default()),
            "{:?} on '{}' failed",
            mode,
            id
        );
    }
    let edited = editor.segmentation().clone();

    for step in 0..edits.len() {
        assert!(editor.undo(), "Undo {} should succeed", step);
    }
    assert!(!editor.can_undo());
    assert!(editor
        .segmentation()
        .binary_labelmap("liver")
        .expect("Known segment")
        .data()
        .iter()
        .all(|&v| v == 0));

    for step in 0..edits.len() {
        assert!(editor.redo(), "Redo {} should succeed", step);
    }
    assert!(!editor.can_redo());
    assert!(
        editor.segmentation().same_content(&edited),
        "Redo should return to the edited content"
    );
}

#[test]
fn test_capacity_bounds_undo_depth() {
    let capacity = 3;
    let mut history = UndoHistory::new(capacity);
    let mut seg = Segmentation::new(geometry()).expect("Failed to create segmentation");
    for n in 0..7 {
        seg.add_segment(&format!("s{}", n), "S").expect("Failed to add segment");
        assert!(history.save_state(&seg));
    }
    assert_eq!(history.len(), capacity);

    let mut undos = 0;
    while history.undo(&mut seg) {
        undos += 1;
    }
    assert_eq!(undos, capacity);
    // oldest surviving state is the fifth save
    assert_eq!(seg.segment_count(), 5);
}

#[test]
fn test_zero_capacity_disables_undo() {
    let config = EditorConfig {
        undo_capacity: 0,
        ..EditorConfig::default()
    };
    let mut editor = editor(config);
    editor
        .add_empty_segment(Some("a"), SegmentStatus::NotStarted)
        .expect("Failed to add segment");
    assert!(!editor.save_state_for_undo());
    assert!(!editor.can_undo());
    assert!(!editor.undo());
}

#[derive(Default)]
struct HistoryCounter {
    changes: Cell<usize>,
    displays: Cell<usize>,
}

impl HistoryObserver for HistoryCounter {
    fn history_changed(&self) {
        self.changes.set(self.changes.get() + 1);
    }
    fn display_changed(&self) {
        self.displays.set(self.displays.get() + 1);
    }
}

#[test]
fn test_history_observer_sees_edits_and_undo() {
    let mut editor = editor(EditorConfig::default());
    let observer = Rc::new(HistoryCounter::default());
    editor.add_history_observer(observer.clone() as Rc<dyn HistoryObserver>);

    editor
        .add_empty_segment(Some("a"), SegmentStatus::NotStarted)
        .expect("Failed to add segment");
    let modifier = block(&editor, [0, 0, 0], [1, 1, 1]);
    assert!(editor.modify_selected_segment(Some(&modifier), ModificationMode::Add, ModifyOptions::default()));
    assert_eq!(observer.changes.get(), 2);

    assert!(editor.undo());
    assert_eq!(observer.displays.get(), 1);
    assert_eq!(observer.changes.get(), 3);
}

/// Tries to modify a second segmentation while the engine is busy
struct NestedEditor {
    engine: RefCell<Weak<ModificationEngine>>,
    segmentation: RefCell<Segmentation>,
    result: RefCell<Option<Result<(), String>>>,
}

impl RenderCoordinator for NestedEditor {
    fn pause_render(&self) {
        let Some(engine) = self.engine.borrow().upgrade() else {
            return;
        };
        let mut seg = self.segmentation.borrow_mut();
        let modifier = VoxelGrid::filled(*seg.reference_geometry(), 1);
        let outcome = engine.modify(
            &mut seg,
            &EditorState::new(),
            "inner",
            Some(&modifier),
            ModificationMode::Add,
            ModifyOptions::default(),
        );
        *self.result.borrow_mut() = Some(match outcome {
            Ok(_) => Ok(()),
            Err(Error::Reentrant) => Err("reentrant".to_string()),
            Err(err) => Err(err.to_string()),
        });
    }
    fn resume_render(&self) {}
}

#[test]
fn test_reentrant_modify_is_rejected() {
    let engine = Rc::new(ModificationEngine::new());
    let mut inner = Segmentation::new(geometry()).expect("Failed to create segmentation");
    inner.add_segment("inner", "Inner").expect("Failed to add segment");
    let nested = Rc::new(NestedEditor {
        engine: RefCell::new(Weak::new()),
        segmentation: RefCell::new(inner),
        result: RefCell::new(None),
    });
    *nested.engine.borrow_mut() = Rc::downgrade(&engine);
    engine.set_render_coordinator(Some(nested.clone() as Rc<dyn RenderCoordinator>));

    let mut seg = Segmentation::new(geometry()).expect("Failed to create segmentation");
    seg.add_segment("outer", "Outer").expect("Failed to add segment");
    let modifier = VoxelGrid::filled(seg.reference_geometry().with_extent(Extent::new([0, 0, 0], [2, 2, 2])), 1);
    let outcome = engine
        .modify(&mut seg, &EditorState::new(), "outer", Some(&modifier), ModificationMode::Add, ModifyOptions::default())
        .expect("Outer modification should succeed");

    assert_eq!(outcome.claimed, 27);
    assert_eq!(*nested.result.borrow(), Some(Err("reentrant".to_string())));
    assert!(
        !nested.segmentation.borrow().binary_labelmap("inner").expect("Known segment").any_set(),
        "Rejected nested call must not write"
    );

    // the busy flag is released afterwards
    engine.set_render_coordinator(None);
    assert!(engine
        .modify(&mut seg, &EditorState::new(), "outer", Some(&modifier), ModificationMode::Remove, ModifyOptions::default())
        .is_ok());
}

#[test]
fn test_shared_segments_and_separation() {
    let mut editor = editor(EditorConfig::default());
    let ids = editor
        .add_shared_segments(&["left lung", "right lung"])
        .expect("Failed to add shared segments");
    assert_eq!(ids, vec!["Segment_1".to_string(), "Segment_2".to_string()]);
    let layer = |editor: &SegmentEditor, id: &str| {
        editor.segmentation().segment(id).map(|s| s.layer())
    };
    assert_eq!(layer(&editor, &ids[0]), layer(&editor, &ids[1]));

    editor.separate_segment(&ids[1]).expect("Known segment");
    assert_ne!(layer(&editor, &ids[0]), layer(&editor, &ids[1]));
    assert!(editor.undo());
    assert_eq!(layer(&editor, &ids[0]), layer(&editor, &ids[1]));
}

#[test]
fn test_threshold_tool_with_auto_range() {
    let mut editor = editor(EditorConfig::default());
    editor
        .add_empty_segment(Some("bone"), SegmentStatus::NotStarted)
        .expect("Failed to add segment");

    let reference = *editor.segmentation().reference_geometry();
    let data: Vec<f32> = reference
        .extent()
        .iter()
        .map(|[i, _, _]| if i >= 6 { 1000.0 } else { 0.0 })
        .collect();
    let image = VoxelGrid::from_data(reference, data).expect("Matching buffer size");
    editor
        .state_mut()
        .set_source_volume(Some(Arc::new(SourceVolume::new(image.clone()))));

    let [lower, upper] = editor
        .tools_mut()
        .threshold_mut()
        .auto_threshold(&image, AutoThresholdMode::SetLowerMax)
        .expect("Non-empty volume");
    assert!(lower > 0.0 && lower <= 1000.0);
    assert_eq!(upper, 1000.0);

    assert!(editor.apply_tool(ToolKind::Threshold, None));
    let labelmap = editor.selected_segment_labelmap().expect("Selected segment");
    assert_eq!(labelmap.count_set(), 4 * 10 * 5);
    assert!(labelmap.set_voxels().all(|[i, _, _]| i >= 6));
}

#[test]
fn test_intensity_mask_toggle_restricts_paint() {
    let mut editor = editor(EditorConfig::default());
    editor
        .add_empty_segment(Some("a"), SegmentStatus::NotStarted)
        .expect("Failed to add segment");
    editor.create_blank_source_volume().expect("Failed to create blank volume");
    editor
        .state_mut()
        .set_intensity_range(5.0, 10.0)
        .expect("Valid range");
    editor.toggle_source_intensity_mask();
    assert!(editor.state().intensity_mask_enabled());

    let modifier = block(&editor, [0, 0, 0], [3, 3, 3]);
    assert!(editor.modify_selected_segment(Some(&modifier), ModificationMode::Add, ModifyOptions::default()));
    assert!(
        !editor.selected_segment_labelmap().expect("Selected").any_set(),
        "Blank volume lies outside the intensity range"
    );

    editor.toggle_source_intensity_mask();
    assert!(editor.modify_selected_segment(Some(&modifier), ModificationMode::Add, ModifyOptions::default()));
    assert_eq!(editor.selected_segment_labelmap().expect("Selected").count_set(), 64);
}
