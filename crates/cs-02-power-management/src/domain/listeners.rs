//! Registry of power state listeners.
//!
//! Listeners live in one of two pools: plain listeners are notified and
//! forgotten, completion listeners must call `finished` after SHUTDOWN_PREPARE.

use super::state::ListenerState;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The remote side of a listener is gone.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Listener unreachable: {reason}")]
pub struct ListenerGone {
    pub reason: String,
}

/// Receiver of power state changes.
pub trait PowerStateListener: Send + Sync {
    /// Called on every state change. An error marks the listener dead.
    fn on_state_changed(&self, state: ListenerState) -> Result<(), ListenerGone>;
}

/// Stable identity of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    /// Raw id, for logs and errors.
    #[must_use]
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

struct Registration {
    listener: Arc<dyn PowerStateListener>,
    requires_completion: bool,
}

/// Listeners keyed by handle, iterated in registration order.
pub struct ListenerRegistry {
    next_id: u64,
    entries: BTreeMap<ListenerHandle, Registration>,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: BTreeMap::new(),
        }
    }

    /// Register a listener in the given pool.
    pub fn register(
        &mut self,
        listener: Arc<dyn PowerStateListener>,
        requires_completion: bool,
    ) -> ListenerHandle {
        let handle = ListenerHandle(self.next_id);
        self.next_id += 1;
        self.entries.insert(
            handle,
            Registration {
                listener,
                requires_completion,
            },
        );
        handle
    }

    /// Remove a registration. Returns whether it was a completion listener.
    pub fn unregister(&mut self, handle: ListenerHandle) -> Option<bool> {
        self.entries
            .remove(&handle)
            .map(|registration| registration.requires_completion)
    }

    /// Whether `handle` is registered.
    #[must_use]
    pub fn contains(&self, handle: ListenerHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Copy of one pool, to be invoked outside the lock.
    #[must_use]
    pub fn snapshot(
        &self,
        requires_completion: bool,
    ) -> Vec<(ListenerHandle, Arc<dyn PowerStateListener>)> {
        self.entries
            .iter()
            .filter(|(_, r)| r.requires_completion == requires_completion)
            .map(|(handle, r)| (*handle, Arc::clone(&r.listener)))
            .collect()
    }

    /// Number of registrations in both pools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet;

    impl PowerStateListener for Quiet {
        fn on_state_changed(&self, _state: ListenerState) -> Result<(), ListenerGone> {
            Ok(())
        }
    }

    #[test]
    fn test_pools_are_separate() {
        let mut registry = ListenerRegistry::new();
        let plain = registry.register(Arc::new(Quiet), false);
        let completer = registry.register(Arc::new(Quiet), true);

        let completers: Vec<_> = registry.snapshot(true).into_iter().map(|(h, _)| h).collect();
        let plains: Vec<_> = registry.snapshot(false).into_iter().map(|(h, _)| h).collect();
        assert_eq!(completers, vec![completer]);
        assert_eq!(plains, vec![plain]);
    }

    #[test]
    fn test_unregister_reports_pool() {
        let mut registry = ListenerRegistry::new();
        let completer = registry.register(Arc::new(Quiet), true);

        assert_eq!(registry.unregister(completer), Some(true));
        assert_eq!(registry.unregister(completer), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_handles_never_reused() {
        let mut registry = ListenerRegistry::new();
        let first = registry.register(Arc::new(Quiet), false);
        registry.unregister(first);
        let second = registry.register(Arc::new(Quiet), false);
        assert_ne!(first, second);
    }
}
