//! Bounded undo/redo history of whole-segmentation snapshots

use crate::events::HistoryObserver;
use crate::segmentation::Segmentation;
use std::collections::VecDeque;
use std::rc::Rc;

/// Default number of undo steps
pub const DEFAULT_UNDO_CAPACITY: usize = 10;

/// Linear undo/redo stack.
///
/// `states[cursor]` is the content currently displayed while navigating;
/// `cursor == len` means the live segmentation is newer than every saved
/// state. Snapshots share unchanged layers with the live segmentation, so
/// saving is cheap.
pub struct UndoHistory {
    states: VecDeque<Segmentation>,
    cursor: usize,
    capacity: usize,
    observers: Vec<Rc<dyn HistoryObserver>>,
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_CAPACITY)
    }
}

impl UndoHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            states: VecDeque::new(),
            cursor: 0,
            capacity,
            observers: Vec::new(),
        }
    }

    pub fn add_observer(&mut self, observer: Rc<dyn HistoryObserver>) {
        self.observers.push(observer);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the capacity, evicting the oldest states beyond it
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        if capacity == 0 {
            self.states.clear();
            self.cursor = 0;
        } else {
            // Never evict the state being displayed; drop redo states instead.
            let excess = self.states.len().saturating_sub(capacity);
            self.evict(excess.min(self.cursor));
            let limit = if self.cursor < self.states.len() {
                capacity + 1
            } else {
                capacity
            };
            self.states.truncate(limit);
        }
        self.notify_history_changed();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn evict(&mut self, count: usize) {
        for _ in 0..count {
            self.states.pop_front();
        }
        self.cursor = self.cursor.saturating_sub(count);
    }

    /// Save the current content before an edit.
    ///
    /// Drops any redo states and evicts the oldest states beyond capacity.
    /// Returns false (and saves nothing) when the capacity is zero.
    pub fn save_state(&mut self, segmentation: &Segmentation) -> bool {
        self.push_snapshot(segmentation.clone())
    }

    /// Save a snapshot taken earlier (e.g. just before a modification that
    /// has since succeeded)
    pub fn push_snapshot(&mut self, snapshot: Segmentation) -> bool {
        if self.capacity == 0 {
            return false;
        }
        self.states.truncate(self.cursor);
        self.states.push_back(snapshot);
        let excess = self.states.len().saturating_sub(self.capacity);
        self.cursor = self.states.len();
        self.evict(excess);
        self.notify_history_changed();
        true
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.states.len()
    }

    /// Restore the previous state into `segmentation`
    pub fn undo(&mut self, segmentation: &mut Segmentation) -> bool {
        if !self.can_undo() {
            return false;
        }
        if self.cursor == self.states.len() {
            // Keep the live content so redo can return to it.
            self.states.push_back(segmentation.clone());
        }
        self.cursor -= 1;
        segmentation.restore_from(&self.states[self.cursor]);
        log::debug!("undo: restored state {} of {}", self.cursor, self.states.len());
        self.notify_display_changed();
        self.notify_history_changed();
        true
    }

    /// Restore the next state into `segmentation`
    pub fn redo(&mut self, segmentation: &mut Segmentation) -> bool {
        if !self.can_redo() {
            return false;
        }
        self.cursor += 1;
        segmentation.restore_from(&self.states[self.cursor]);
        log::debug!("redo: restored state {} of {}", self.cursor, self.states.len());
        self.notify_display_changed();
        self.notify_history_changed();
        true
    }

    /// Forget all saved states
    pub fn clear(&mut self) {
        self.states.clear();
        self.cursor = 0;
        self.notify_history_changed();
    }

    fn notify_history_changed(&self) {
        for observer in &self.observers {
            observer.history_changed();
        }
    }

    fn notify_display_changed(&self) {
        for observer in &self.observers {
            observer.display_changed();
        }
    }
}
