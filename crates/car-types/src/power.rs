//! # Power Vocabulary
//!
//! Codes carried by `AP_POWER_STATE_REQ` (vehicle to head unit) and
//! `AP_POWER_STATE_REPORT` (head unit to vehicle).

use crate::hal_code_enum;
use serde::{Deserialize, Serialize};

/// State requested by the vehicle in `AP_POWER_STATE_REQ[0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum VehicleApPowerStateReq {
    /// Head unit should be fully on.
    On = 0,
    /// Head unit should prepare for shutdown or sleep.
    ShutdownPrepare = 1,
    /// A pending shutdown was cancelled.
    CancelShutdown = 2,
    /// Vehicle acknowledged the final report; finish the transition.
    Finished = 3,
}

hal_code_enum!(VehicleApPowerStateReq {
    On = 0,
    ShutdownPrepare = 1,
    CancelShutdown = 2,
    Finished = 3,
});

/// Parameter of `ShutdownPrepare` in `AP_POWER_STATE_REQ[1]`.
pub mod shutdown_param {
    /// Shut down now, no postponing.
    pub const SHUTDOWN_IMMEDIATELY: i32 = 1;
    /// Postponable; deep sleep allowed.
    pub const CAN_SLEEP: i32 = 2;
    /// Postponable; shutdown only.
    pub const SHUTDOWN_ONLY: i32 = 3;
    /// Enter deep sleep now, no postponing.
    pub const SLEEP_IMMEDIATELY: i32 = 4;
}

/// Report sent by the head unit in `AP_POWER_STATE_REPORT[0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum VehicleApPowerStateReport {
    /// Head unit booted and waits for the vehicle.
    WaitForVhal = 1,
    /// Head unit is entering deep sleep.
    DeepSleepEntry = 2,
    /// Head unit left deep sleep.
    DeepSleepExit = 3,
    /// Head unit asks for more time before shutdown.
    ShutdownPostpone = 4,
    /// Head unit is shutting down.
    ShutdownStart = 5,
    /// Head unit is fully on.
    On = 6,
    /// Head unit started shutdown preparation.
    ShutdownPrepare = 7,
    /// Head unit cancelled shutdown.
    ShutdownCancelled = 8,
}

hal_code_enum!(VehicleApPowerStateReport {
    WaitForVhal = 1,
    DeepSleepEntry = 2,
    DeepSleepExit = 3,
    ShutdownPostpone = 4,
    ShutdownStart = 5,
    On = 6,
    ShutdownPrepare = 7,
    ShutdownCancelled = 8,
});

/// Flags in `AP_POWER_STATE_REQ` config word 0.
pub mod power_config_flag {
    /// Deep sleep is supported by the vehicle.
    pub const ENABLE_DEEP_SLEEP: i32 = 0x1;
    /// Vehicle can wake the head unit on a timer.
    pub const SUPPORT_TIMER_POWER_ON: i32 = 0x2;
}

/// A decoded power request from the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerState {
    /// Requested state.
    pub state: VehicleApPowerStateReq,
    /// State specific parameter (see [`shutdown_param`]).
    pub param: i32,
}

impl PowerState {
    /// Create a power request.
    #[must_use]
    pub fn new(state: VehicleApPowerStateReq, param: i32) -> Self {
        Self { state, param }
    }

    /// Whether a shutdown request allows deep sleep. `false` for other states.
    #[must_use]
    pub fn can_enter_deep_sleep(&self) -> bool {
        self.state == VehicleApPowerStateReq::ShutdownPrepare
            && (self.param == shutdown_param::CAN_SLEEP
                || self.param == shutdown_param::SLEEP_IMMEDIATELY)
    }

    /// Whether a shutdown request may be postponed. `false` for other states.
    #[must_use]
    pub fn can_postpone_shutdown(&self) -> bool {
        self.state == VehicleApPowerStateReq::ShutdownPrepare
            && self.param != shutdown_param::SHUTDOWN_IMMEDIATELY
            && self.param != shutdown_param::SLEEP_IMMEDIATELY
    }
}
