//! Observer interfaces towards the hosting application

use std::rc::Rc;

/// Receives the render pause/resume bracket around every modification
pub trait RenderCoordinator {
    fn pause_render(&self);
    fn resume_render(&self);
}

/// Receives undo history notifications
pub trait HistoryObserver {
    /// The stack of saved states or the cursor changed
    fn history_changed(&self);

    /// Segmentation content was replaced by undo or redo
    fn display_changed(&self) {}
}

/// Scoped render pause: pauses on creation, resumes when dropped
pub struct RenderPause {
    coordinator: Option<Rc<dyn RenderCoordinator>>,
}

impl RenderPause {
    pub fn new(coordinator: Option<Rc<dyn RenderCoordinator>>) -> Self {
        if let Some(coordinator) = &coordinator {
            coordinator.pause_render();
        }
        Self { coordinator }
    }
}

impl Drop for RenderPause {
    fn drop(&mut self) {
        if let Some(coordinator) = &self.coordinator {
            coordinator.resume_render();
        }
    }
}
