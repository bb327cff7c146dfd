//! Power state record and transition rules.
//!
//! State Machine:
//! ```text
//! [WAIT_FOR_VHAL] ──→ [ON] ──→ [SHUTDOWN_PREPARE] ──→ [WAIT_FOR_FINISH] ──→ [SUSPEND]
//!       ↑  │            │              │  ↺ (not postponable)    │               │
//!       │  └────────────┼──────────────┘                         │               │
//!       │               └──→ [SIMULATE_SLEEP] ──→ (anything)     │               │
//!       └────────────────────────────────────────────────────────┴───────────────┘
//! ```

use car_types::{hal_code_enum, PowerState, VehicleApPowerStateReq};
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the power state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerStateKind {
    /// Waiting for the vehicle to tell us what to do.
    WaitForVhal,
    /// Fully on.
    On,
    /// Listeners are preparing for shutdown or suspend.
    ShutdownPrepare,
    /// Waiting for the vehicle to acknowledge shutdown/sleep entry.
    WaitForFinish,
    /// Entering deep sleep or shutting down.
    Suspend,
    /// Diagnostic suspend that never reaches the hardware.
    SimulateSleep,
}

impl PowerStateKind {
    /// Name used in logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::WaitForVhal => "WAIT_FOR_VHAL",
            Self::On => "ON",
            Self::ShutdownPrepare => "SHUTDOWN_PREPARE",
            Self::WaitForFinish => "WAIT_FOR_FINISH",
            Self::Suspend => "SUSPEND",
            Self::SimulateSleep => "SIMULATE_SLEEP",
        }
    }
}

/// State pushed to registered power state listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ListenerState {
    Invalid = 0,
    WaitForVhal = 1,
    SuspendEnter = 2,
    SuspendExit = 3,
    ShutdownEnter = 5,
    On = 6,
    ShutdownPrepare = 7,
    ShutdownCancelled = 8,
}

hal_code_enum!(ListenerState {
    Invalid = 0,
    WaitForVhal = 1,
    SuspendEnter = 2,
    SuspendExit = 3,
    ShutdownEnter = 5,
    On = 6,
    ShutdownPrepare = 7,
    ShutdownCancelled = 8,
});

/// A requested or current power state.
///
/// Two records are the same transition when every field matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpmsState {
    pub state: PowerStateKind,
    /// Listeners may postpone the shutdown.
    pub can_postpone: bool,
    /// Deep sleep is an option.
    pub can_sleep: bool,
    pub listener_state: ListenerState,
}

impl CpmsState {
    /// Internally requested state. Only simulated sleep may postpone or sleep.
    #[must_use]
    pub fn new(state: PowerStateKind, listener_state: ListenerState) -> Self {
        let simulated = state == PowerStateKind::SimulateSleep;
        Self {
            state,
            can_postpone: simulated,
            can_sleep: simulated,
            listener_state,
        }
    }

    /// State requested by the vehicle.
    #[must_use]
    pub fn from_hal(request: PowerState) -> Self {
        match request.state {
            VehicleApPowerStateReq::On => Self::new(PowerStateKind::On, ListenerState::On),
            VehicleApPowerStateReq::ShutdownPrepare => Self {
                state: PowerStateKind::ShutdownPrepare,
                can_postpone: request.can_postpone_shutdown(),
                can_sleep: request.can_enter_deep_sleep(),
                listener_state: ListenerState::ShutdownPrepare,
            },
            VehicleApPowerStateReq::CancelShutdown => Self::new(
                PowerStateKind::WaitForVhal,
                ListenerState::ShutdownCancelled,
            ),
            VehicleApPowerStateReq::Finished => {
                Self::new(PowerStateKind::Suspend, ListenerState::SuspendEnter)
            }
        }
    }
}

impl fmt::Display for CpmsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (postpone={}, sleep={}, listener={:?})",
            self.state.name(),
            self.can_postpone,
            self.can_sleep,
            self.listener_state
        )
    }
}

/// Outcome of checking a requested transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCheck {
    Apply,
    /// Value-equal to the current state.
    AlreadyInEffect,
    NotAllowed,
}

/// Whether `next` may be applied on top of `current`.
///
/// With `refresh_postponable` a postponable SHUTDOWN_PREPARE repeat is
/// accepted (and restarts shutdown processing) instead of being dropped.
#[must_use]
pub fn check_transition(
    current: Option<&CpmsState>,
    next: &CpmsState,
    refresh_postponable: bool,
) -> TransitionCheck {
    let Some(current) = current else {
        return TransitionCheck::Apply;
    };
    let refresh = refresh_postponable
        && current.state == PowerStateKind::ShutdownPrepare
        && next.state == PowerStateKind::ShutdownPrepare
        && next.can_postpone;
    if refresh {
        return TransitionCheck::Apply;
    }
    if current == next {
        return TransitionCheck::AlreadyInEffect;
    }

    use PowerStateKind::*;
    let allowed = match current.state {
        WaitForVhal => matches!(next.state, On | ShutdownPrepare),
        Suspend => next.state == WaitForVhal,
        On => matches!(next.state, ShutdownPrepare | SimulateSleep),
        ShutdownPrepare => {
            (next.state == ShutdownPrepare && !next.can_postpone)
                || matches!(next.state, WaitForFinish | WaitForVhal)
        }
        SimulateSleep => true,
        WaitForFinish => matches!(next.state, Suspend | WaitForVhal),
    };
    if allowed {
        TransitionCheck::Apply
    } else {
        TransitionCheck::NotAllowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use car_types::shutdown_param;

    fn state(kind: PowerStateKind) -> CpmsState {
        let listener_state = match kind {
            PowerStateKind::WaitForVhal => ListenerState::WaitForVhal,
            PowerStateKind::On => ListenerState::On,
            PowerStateKind::ShutdownPrepare => ListenerState::ShutdownPrepare,
            PowerStateKind::WaitForFinish | PowerStateKind::Suspend => ListenerState::SuspendEnter,
            PowerStateKind::SimulateSleep => ListenerState::Invalid,
        };
        CpmsState::new(kind, listener_state)
    }

    fn shutdown_prepare(param: i32) -> CpmsState {
        CpmsState::from_hal(PowerState::new(VehicleApPowerStateReq::ShutdownPrepare, param))
    }

    #[test]
    fn test_first_state_always_applies() {
        assert_eq!(
            check_transition(None, &state(PowerStateKind::Suspend), false),
            TransitionCheck::Apply
        );
    }

    #[test]
    fn test_same_state_is_noop() {
        let on = state(PowerStateKind::On);
        assert_eq!(
            check_transition(Some(&on), &on, false),
            TransitionCheck::AlreadyInEffect
        );
    }

    #[test]
    fn test_listed_edges() {
        use PowerStateKind::*;
        let legal = [
            (WaitForVhal, On),
            (WaitForVhal, ShutdownPrepare),
            (On, ShutdownPrepare),
            (On, SimulateSleep),
            (ShutdownPrepare, WaitForFinish),
            (ShutdownPrepare, WaitForVhal),
            (SimulateSleep, On),
            (SimulateSleep, WaitForFinish),
            (WaitForFinish, Suspend),
            (WaitForFinish, WaitForVhal),
            (Suspend, WaitForVhal),
        ];
        for (from, to) in legal {
            assert_eq!(
                check_transition(Some(&state(from)), &state(to), false),
                TransitionCheck::Apply,
                "{from:?} -> {to:?}"
            );
        }

        let illegal = [
            (WaitForVhal, Suspend),
            (On, WaitForVhal),
            (On, Suspend),
            (ShutdownPrepare, On),
            (WaitForFinish, On),
            (Suspend, On),
            (Suspend, ShutdownPrepare),
        ];
        for (from, to) in illegal {
            assert_eq!(
                check_transition(Some(&state(from)), &state(to), false),
                TransitionCheck::NotAllowed,
                "{from:?} -> {to:?}"
            );
        }
    }

    #[test]
    fn test_shutdown_prepare_repeat_only_when_immediate() {
        let postponable = shutdown_prepare(shutdown_param::CAN_SLEEP);
        let shutdown_only = shutdown_prepare(shutdown_param::SHUTDOWN_ONLY);
        let immediate = shutdown_prepare(shutdown_param::SHUTDOWN_IMMEDIATELY);

        assert_eq!(
            check_transition(Some(&postponable), &shutdown_only, false),
            TransitionCheck::NotAllowed
        );
        assert_eq!(
            check_transition(Some(&postponable), &immediate, false),
            TransitionCheck::Apply
        );
    }

    #[test]
    fn test_postponable_repeat_refreshes_when_configured() {
        let postponable = shutdown_prepare(shutdown_param::CAN_SLEEP);
        assert_eq!(
            check_transition(Some(&postponable), &postponable, false),
            TransitionCheck::AlreadyInEffect
        );
        assert_eq!(
            check_transition(Some(&postponable), &postponable, true),
            TransitionCheck::Apply
        );
    }

    #[test]
    fn test_hal_request_mapping() {
        let cancel = CpmsState::from_hal(PowerState::new(VehicleApPowerStateReq::CancelShutdown, 0));
        assert_eq!(cancel.state, PowerStateKind::WaitForVhal);
        assert_eq!(cancel.listener_state, ListenerState::ShutdownCancelled);

        let finished = CpmsState::from_hal(PowerState::new(VehicleApPowerStateReq::Finished, 0));
        assert_eq!(finished.state, PowerStateKind::Suspend);

        let prepare = shutdown_prepare(shutdown_param::SLEEP_IMMEDIATELY);
        assert!(prepare.can_sleep);
        assert!(!prepare.can_postpone);

        assert_eq!(
            CpmsState::from_hal(PowerState::new(VehicleApPowerStateReq::On, 0)),
            state(PowerStateKind::On)
        );
    }

    #[test]
    fn test_listener_state_codes() {
        assert_eq!(i32::from(ListenerState::ShutdownEnter), 5);
        assert!(ListenerState::try_from(4).is_err());
    }
}
