//! Listener completion barrier.
//!
//! The waiting set is captured before any listener is notified, so an
//! acknowledgement arriving during the broadcast can never observe a partially
//! built set.

use super::listeners::ListenerHandle;
use std::collections::HashSet;

/// Set of completion listeners a transition is waiting for.
#[derive(Debug, Default)]
pub struct CompletionBarrier {
    waiting: HashSet<ListenerHandle>,
    open: bool,
}

impl CompletionBarrier {
    /// Create a closed barrier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start waiting for `handles`, replacing any previous wait.
    ///
    /// Returns `true` if there is nobody to wait for.
    pub fn open<I>(&mut self, handles: I) -> bool
    where
        I: IntoIterator<Item = ListenerHandle>,
    {
        self.waiting = handles.into_iter().collect();
        self.open = !self.waiting.is_empty();
        !self.open
    }

    /// Record that `handle` finished.
    ///
    /// Returns `true` only for the acknowledgement that empties the set.
    pub fn acknowledge(&mut self, handle: ListenerHandle) -> bool {
        if !self.open || !self.waiting.remove(&handle) {
            return false;
        }
        if self.waiting.is_empty() {
            self.open = false;
            return true;
        }
        false
    }

    /// Listeners still outstanding.
    #[must_use]
    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    /// Abandon the current wait.
    pub fn clear(&mut self) {
        self.waiting.clear();
        self.open = false;
    }
}
