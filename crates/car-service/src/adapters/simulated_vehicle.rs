//! # Simulated Vehicle
//!
//! Vehicle side of the in-memory property bus. Answers what the head unit
//! writes the way a cooperative vehicle would:
//!
//! ```text
//! head unit writes                         vehicle answers
//! ─────────────────────────────────────    ────────────────────────────────
//! REPORT WAIT_FOR_VHAL / DEEP_SLEEP_EXIT   REQ ON
//! REPORT SHUTDOWN_CANCELLED                REQ ON
//! REPORT SHUTDOWN_START / DEEP_SLEEP_ENTRY REQ FINISHED
//! INITIAL_USER_INFO [id, type, ...]        [id, DEFAULT] or [id, SWITCH, user]
//! SWITCH_USER [id, ANDROID_SWITCH, ...]    [id, VEHICLE_RESPONSE, status]
//! CREATE_USER [id, ...]                    [id, SUCCESS]
//! ```

use std::sync::{Arc, Weak};

use car_types::vehicle_property::{
    AP_POWER_STATE_REPORT, AP_POWER_STATE_REQ, CREATE_USER, DISPLAY_BRIGHTNESS,
    INITIAL_USER_INFO, REMOVE_USER, SWITCH_USER, USER_IDENTIFICATION_ASSOCIATION,
};
use car_types::{
    power_config_flag, AreaConfig, HalPropValue, InitialUserInfoResponseAction,
    SwitchUserMessageType, UserOperationStatus, VehicleApPowerStateReport, VehicleApPowerStateReq,
    VehiclePropConfig, AREA_GLOBAL,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use vhal_bus::{BusResponder, InMemoryPropertyBus};

use crate::container::config::VehicleConfig;

/// Property configs advertised by the simulated vehicle.
#[must_use]
pub fn vehicle_prop_configs(config: &VehicleConfig) -> Vec<VehiclePropConfig> {
    let mut flags = 0;
    if config.deep_sleep_allowed {
        flags |= power_config_flag::ENABLE_DEEP_SLEEP;
    }
    if config.timed_wakeup_allowed {
        flags |= power_config_flag::SUPPORT_TIMER_POWER_ON;
    }
    let mut brightness = VehiclePropConfig::new(DISPLAY_BRIGHTNESS);
    brightness.area_configs.push(AreaConfig {
        area_id: AREA_GLOBAL,
        min_int32: 0,
        max_int32: config.max_display_brightness,
    });

    let mut configs = vec![
        VehiclePropConfig::with_config_array(AP_POWER_STATE_REQ, vec![flags]),
        VehiclePropConfig::new(AP_POWER_STATE_REPORT),
        brightness,
    ];
    if config.user_hal_supported {
        configs.extend(
            [
                INITIAL_USER_INFO,
                SWITCH_USER,
                CREATE_USER,
                REMOVE_USER,
                USER_IDENTIFICATION_ASSOCIATION,
            ]
            .into_iter()
            .map(VehiclePropConfig::new),
        );
    }
    configs
}

/// Vehicle stand-in plugged into an [`InMemoryPropertyBus`].
pub struct SimulatedVehicle {
    config: VehicleConfig,
    bus: Weak<InMemoryPropertyBus>,
    reports: Mutex<Vec<(VehicleApPowerStateReport, i32)>>,
}

impl SimulatedVehicle {
    /// Create the vehicle and install it as the responder of `bus`.
    pub fn attach(bus: &Arc<InMemoryPropertyBus>, config: VehicleConfig) -> Arc<Self> {
        let vehicle = Arc::new(Self {
            config,
            bus: Arc::downgrade(bus),
            reports: Mutex::new(Vec::new()),
        });
        bus.set_responder(vehicle.clone());
        vehicle
    }

    /// Ask the head unit to change power state.
    ///
    /// Returns the number of deliveries; 0 if nobody listens or the bus is gone.
    pub fn request_power_state(&self, state: VehicleApPowerStateReq, param: i32) -> usize {
        let Some(bus) = self.bus.upgrade() else {
            warn!(?state, "Bus gone, power request dropped");
            return 0;
        };
        info!(?state, param, "Vehicle requests power state");
        bus.inject_event(vec![HalPropValue::with_int32_values(
            AP_POWER_STATE_REQ,
            vec![state.into(), param],
        )])
    }

    /// Report the raw display brightness as if the driver changed it.
    pub fn change_display_brightness(&self, raw: i32) -> usize {
        let Some(bus) = self.bus.upgrade() else {
            return 0;
        };
        bus.inject_event(vec![HalPropValue::with_int32_values(
            DISPLAY_BRIGHTNESS,
            vec![raw],
        )])
    }

    /// Power state reports received so far, oldest first.
    #[must_use]
    pub fn reports(&self) -> Vec<(VehicleApPowerStateReport, i32)> {
        self.reports.lock().clone()
    }

    fn on_power_report(&self, value: &HalPropValue) -> Vec<HalPropValue> {
        let Some(report) = value
            .int32_at(0)
            .and_then(|raw| VehicleApPowerStateReport::try_from(raw).ok())
        else {
            warn!(value = %value, "Unreadable power state report");
            return Vec::new();
        };
        let param = value.int32_at(1).unwrap_or(0);
        self.reports.lock().push((report, param));
        debug!(?report, param, "Power state report");

        use VehicleApPowerStateReport::*;
        let answer = match report {
            WaitForVhal | DeepSleepExit | ShutdownCancelled => VehicleApPowerStateReq::On,
            ShutdownStart | DeepSleepEntry => VehicleApPowerStateReq::Finished,
            ShutdownPostpone | On | ShutdownPrepare => return Vec::new(),
        };
        vec![HalPropValue::with_int32_values(
            AP_POWER_STATE_REQ,
            vec![answer.into(), 0],
        )]
    }

    fn on_initial_user_info(&self, request_id: i32) -> HalPropValue {
        match self.config.resume_user_id {
            Some(user_id) => HalPropValue::with_int32_values(
                INITIAL_USER_INFO,
                vec![
                    request_id,
                    InitialUserInfoResponseAction::Switch.into(),
                    user_id,
                    0,
                ],
            ),
            None => HalPropValue::with_int32_values(
                INITIAL_USER_INFO,
                vec![request_id, InitialUserInfoResponseAction::Default.into()],
            ),
        }
    }

    fn on_switch_user(&self, value: &HalPropValue, request_id: i32) -> Vec<HalPropValue> {
        let message = value
            .int32_at(1)
            .and_then(|raw| SwitchUserMessageType::try_from(raw).ok());
        if message != Some(SwitchUserMessageType::AndroidSwitch) {
            return Vec::new();
        }
        let status = if self.config.approve_user_switch {
            UserOperationStatus::Success
        } else {
            UserOperationStatus::Failure
        };
        vec![HalPropValue::with_int32_values(
            SWITCH_USER,
            vec![
                request_id,
                SwitchUserMessageType::VehicleResponse.into(),
                status.into(),
            ],
        )]
    }
}

impl BusResponder for SimulatedVehicle {
    fn on_set(&self, value: &HalPropValue) -> Vec<HalPropValue> {
        if value.prop == AP_POWER_STATE_REPORT {
            return self.on_power_report(value);
        }
        let Some(request_id) = value.int32_at(0) else {
            return Vec::new();
        };
        match value.prop {
            INITIAL_USER_INFO => vec![self.on_initial_user_info(request_id)],
            SWITCH_USER => self.on_switch_user(value, request_id),
            CREATE_USER => vec![HalPropValue::with_int32_values(
                CREATE_USER,
                vec![request_id, UserOperationStatus::Success.into()],
            )],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle(config: VehicleConfig) -> (Arc<InMemoryPropertyBus>, Arc<SimulatedVehicle>) {
        let bus = Arc::new(InMemoryPropertyBus::new(vehicle_prop_configs(&config)));
        let vehicle = SimulatedVehicle::attach(&bus, config);
        (bus, vehicle)
    }

    fn report(report: VehicleApPowerStateReport, param: i32) -> HalPropValue {
        HalPropValue::with_int32_values(AP_POWER_STATE_REPORT, vec![report.into(), param])
    }

    #[test]
    fn test_configs_follow_vehicle_config() {
        let config = VehicleConfig {
            deep_sleep_allowed: false,
            user_hal_supported: false,
            ..VehicleConfig::default()
        };
        let configs = vehicle_prop_configs(&config);
        assert_eq!(configs.len(), 3);
        assert_eq!(
            configs[0].config_array,
            vec![power_config_flag::SUPPORT_TIMER_POWER_ON]
        );
        assert_eq!(configs[2].max_int32(), Some(255));
    }

    #[test]
    fn test_power_reports_answered() {
        let (_bus, vehicle) = vehicle(VehicleConfig::default());

        let on = vehicle.on_set(&report(VehicleApPowerStateReport::WaitForVhal, 0));
        assert_eq!(on[0].int32_values, vec![i32::from(VehicleApPowerStateReq::On), 0]);

        let finished = vehicle.on_set(&report(VehicleApPowerStateReport::DeepSleepEntry, 30));
        assert_eq!(
            finished[0].int32_values,
            vec![i32::from(VehicleApPowerStateReq::Finished), 0]
        );

        assert!(vehicle
            .on_set(&report(VehicleApPowerStateReport::ShutdownPostpone, 5000))
            .is_empty());
        assert_eq!(vehicle.reports().len(), 3);
        assert_eq!(
            vehicle.reports()[1],
            (VehicleApPowerStateReport::DeepSleepEntry, 30)
        );
    }

    #[test]
    fn test_initial_user_info_answer() {
        let (_bus, default_vehicle) = vehicle(VehicleConfig::default());
        let request = HalPropValue::with_int32_values(INITIAL_USER_INFO, vec![7, 4, 10, 0, 0]);
        let answer = default_vehicle.on_set(&request);
        assert_eq!(answer[0].int32_values, vec![7, 0]);

        let (_bus, switching) = vehicle(VehicleConfig {
            resume_user_id: Some(11),
            ..VehicleConfig::default()
        });
        let answer = switching.on_set(&request);
        assert_eq!(answer[0].int32_values, vec![7, 1, 11, 0]);
    }

    #[test]
    fn test_switch_user_only_answers_android_switch() {
        let (_bus, vehicle) = vehicle(VehicleConfig {
            approve_user_switch: false,
            ..VehicleConfig::default()
        });
        let switch = HalPropValue::with_int32_values(
            SWITCH_USER,
            vec![3, i32::from(SwitchUserMessageType::AndroidSwitch), 11, 0],
        );
        let answer = vehicle.on_set(&switch);
        assert_eq!(
            answer[0].int32_values,
            vec![
                3,
                i32::from(SwitchUserMessageType::VehicleResponse),
                i32::from(UserOperationStatus::Failure)
            ]
        );

        let post = HalPropValue::with_int32_values(
            SWITCH_USER,
            vec![4, i32::from(SwitchUserMessageType::AndroidPostSwitch)],
        );
        assert!(vehicle.on_set(&post).is_empty());
    }

    #[test]
    fn test_request_after_bus_dropped_is_noop() {
        let (bus, vehicle) = vehicle(VehicleConfig::default());
        drop(bus);
        assert_eq!(
            vehicle.request_power_state(VehicleApPowerStateReq::ShutdownPrepare, 1),
            0
        );
    }
}
