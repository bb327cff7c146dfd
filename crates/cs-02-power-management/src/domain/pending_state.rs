//! Latest requested power state.
//!
//! Bursty vehicle notifications collapse into the most recent request; older
//! unprocessed requests are superseded, not queued.

use super::state::CpmsState;

/// Single-slot holder for the next power state to apply.
#[derive(Debug, Default)]
pub struct PendingStateSlot {
    latest: Option<CpmsState>,
    version: u64,
    superseded: u64,
}

impl PendingStateSlot {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request, replacing any unprocessed one. Returns its version.
    pub fn push(&mut self, state: CpmsState) -> u64 {
        self.version += 1;
        if self.latest.replace(state).is_some() {
            self.superseded += 1;
        }
        self.version
    }

    /// Take the latest request, leaving the slot empty.
    pub fn take_latest(&mut self) -> Option<CpmsState> {
        self.latest.take()
    }

    /// The waiting request, left in place.
    #[must_use]
    pub fn peek(&self) -> Option<&CpmsState> {
        self.latest.as_ref()
    }

    /// Requests pushed but superseded before they were taken.
    #[must_use]
    pub fn superseded(&self) -> u64 {
        self.superseded
    }

    /// Drop any waiting request.
    pub fn clear(&mut self) {
        self.latest = None;
    }
}
