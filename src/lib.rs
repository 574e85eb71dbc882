//! # segedit
//!
//! Core of an interactive voxel segmentation editor.
//!
//! ## Features
//!
//! - **Modification engine**: merges tool stencils into segment labelmaps
//!   under edit masks and overwrite policies
//! - **Shared layers**: several segments can live in one labelmap buffer
//! - **Brushes**: paint (circle/sphere), scissors (free-form, circle,
//!   rectangle) with slice-depth limits, threshold
//! - **Undo/redo**: bounded snapshot history with copy-on-write layers
//!
//! ## Example
//!
//! ```rust,no_run
//! use nalgebra::{Vector2, Vector3};
//! use segedit::{
//!     EditorConfig, ImageGeometry, SegmentEditor, SegmentStatus, Segmentation, SliceView,
//!     ToolKind, View,
//! };
//!
//! let geometry = ImageGeometry::axis_aligned(Vector3::zeros(), Vector3::repeat(1.0), [64, 64, 32]);
//! let mut editor = SegmentEditor::new(Segmentation::new(geometry)?, EditorConfig::default())?;
//! editor.add_empty_segment(None, SegmentStatus::InProgress)?;
//!
//! // Paint a short stroke on an axial slice
//! let view = View::Slice(SliceView::axial(Vector3::new(0.0, 0.0, 10.0), 0.25, [256, 256]));
//! let paint = editor.tools_mut().paint_mut();
//! paint.brush_mut().set_absolute_diameter(6.0)?;
//! paint.add_point(Vector3::new(20.0, 20.0, 10.0));
//! paint.add_point(Vector3::new(30.0, 24.0, 10.0));
//! assert!(editor.apply_tool(ToolKind::Paint, Some(&view)));
//!
//! // Cut a rectangle through the whole volume
//! let rectangle = editor.tools_mut().rectangle_mut();
//! rectangle.begin(Vector2::new(10.0, 10.0));
//! rectangle.add_point(Vector2::new(60.0, 60.0));
//! assert!(editor.apply_tool(ToolKind::Rectangle, Some(&view)));
//!
//! assert!(editor.undo());
//! # Ok::<(), segedit::Error>(())
//! ```

pub mod brush;
pub mod config;
pub mod editor;
pub mod engine;
pub mod error;
pub mod events;
pub mod geometry;
pub mod grid;
pub mod history;
pub mod log;
pub mod mask;
pub mod mesh;
pub mod segmentation;
pub mod state;
pub mod stencil;
pub mod tools;
pub mod types;

/// Convenience imports for hosting an editing session.
pub mod prelude {
    pub use crate::{
        EditTool, EditorConfig, ModificationMode, ModifyOptions, SegmentEditor, ToolKind, View,
    };
}

// Re-exports
pub use brush::{
    PaintBrush, ScissorsCut, ScissorsEdit, ScissorsOperation, ScissorsShape, SliceCutMode, View,
};
pub use config::{BrushConfig, EditorConfig, ScissorsConfig};
pub use editor::SegmentEditor;
pub use engine::{ModificationEngine, ModificationMode, ModifyOptions, ModifyOutcome};
pub use error::{Error, Result};
pub use events::{HistoryObserver, RenderCoordinator, RenderPause};
pub use geometry::{CameraView, ParentTransform, SliceView};
pub use grid::{ImageGeometry, Interpolation, Voxel, VoxelGrid};
pub use history::{UndoHistory, DEFAULT_UNDO_CAPACITY};
pub use crate::log::LogFile;
pub use mask::{MaskComposer, MaskContext};
pub use mesh::{Mesh, Outline, Winding};
pub use segmentation::{LabelmapId, Segment, SegmentStatus, Segmentation};
pub use state::{AlignedSource, EditorState, MaskMode, OverwriteMode, SourceVolume};
pub use tools::{
    AutoThresholdMode, EditTool, PaintTool, ScissorsTool, ThresholdTool, ToolContext, ToolEdit,
    ToolKind, ToolRegistry,
};
pub use types::{BBox3, Extent};
