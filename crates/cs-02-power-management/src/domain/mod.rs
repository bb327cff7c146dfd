//! Domain layer of car power management.
//!
//! Pure state: no tasks, no I/O.

pub mod barrier;
pub mod listeners;
pub mod pending_state;
pub mod state;

pub use barrier::CompletionBarrier;
pub use listeners::{ListenerGone, ListenerHandle, ListenerRegistry, PowerStateListener};
pub use pending_state::PendingStateSlot;
pub use state::{check_transition, CpmsState, ListenerState, PowerStateKind, TransitionCheck};
