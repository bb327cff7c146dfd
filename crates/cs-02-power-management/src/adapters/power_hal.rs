//! Power HAL Adapter
//!
//! Implements the `PowerHal` port over the `AP_POWER_STATE_*` and
//! `DISPLAY_BRIGHTNESS` properties.
//!
//! ```text
//! AP_POWER_STATE_REQ     [state, param]        vehicle ──→ PowerEventListener
//! AP_POWER_STATE_REPORT  [report, param]       head unit ──→ vehicle
//! DISPLAY_BRIGHTNESS     [raw]                 both ways, percent at the port
//! ```

use crate::error::{PowerError, PowerResult};
use crate::ports::{PowerEventListener, PowerHal};
use async_trait::async_trait;
use car_types::vehicle_property::{AP_POWER_STATE_REPORT, AP_POWER_STATE_REQ, DISPLAY_BRIGHTNESS};
use car_types::{
    power_config_flag, HalPropValue, PowerState, PropertyId, VehicleApPowerStateReport,
    VehicleApPowerStateReq, VehiclePropConfig,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};
use vhal_bus::{supported_subset, HalServiceBase, PropertyChannel};

const SUPPORTED_PROPERTIES: [PropertyId; 3] =
    [AP_POWER_STATE_REQ, AP_POWER_STATE_REPORT, DISPLAY_BRIGHTNESS];

/// Used when the vehicle does not advertise a brightness range.
const DEFAULT_MAX_DISPLAY_BRIGHTNESS: i32 = 100;

enum PowerEvent {
    State(PowerState),
    Brightness(i32),
}

struct PowerHalState {
    configs: HashMap<PropertyId, VehiclePropConfig>,
    listener: Option<Weak<dyn PowerEventListener>>,
    /// Events received before a listener was installed, or while the
    /// backlog is being replayed.
    queued: Vec<HalPropValue>,
    /// The backlog is being delivered; new events join the queue.
    replaying: bool,
    max_display_brightness: i32,
}

/// Vehicle power properties behind the [`PowerHal`] port.
pub struct PowerHalService {
    channel: Arc<dyn PropertyChannel>,
    state: Mutex<PowerHalState>,
}

impl PowerHalService {
    /// Create the adapter. Properties are claimed by `take_properties`.
    pub fn new(channel: Arc<dyn PropertyChannel>) -> Self {
        Self {
            channel,
            state: Mutex::new(PowerHalState {
                configs: HashMap::new(),
                listener: None,
                queued: Vec::new(),
                replaying: false,
                max_display_brightness: DEFAULT_MAX_DISPLAY_BRIGHTNESS,
            }),
        }
    }

    fn config_flag(&self, flag: i32) -> bool {
        self.state
            .lock()
            .configs
            .get(&AP_POWER_STATE_REQ)
            .and_then(|config| config.config_array.first())
            .is_some_and(|word| word & flag != 0)
    }

    async fn publish(&self, report: VehicleApPowerStateReport, param: i32) {
        let value =
            HalPropValue::with_int32_values(AP_POWER_STATE_REPORT, vec![report.into(), param]);
        debug!(?report, param, "Reporting power state");
        if let Err(err) = self.channel.set_value(value).await {
            error!(?report, param, error = %err, "Failed to report power state");
        }
    }

    fn decode_event(&self, value: &HalPropValue) -> Option<PowerEvent> {
        match value.prop {
            AP_POWER_STATE_REQ => match decode_power_state(value) {
                Ok(state) => Some(PowerEvent::State(state)),
                Err(err) => {
                    warn!(value = %value, error = %err, "Dropping power state request");
                    None
                }
            },
            DISPLAY_BRIGHTNESS => {
                let Some(raw) = value.int32_at(0) else {
                    warn!(value = %value, "Dropping brightness without a value");
                    return None;
                };
                let max = self.state.lock().max_display_brightness;
                Some(PowerEvent::Brightness(to_percent(raw, max)))
            }
            other => {
                debug!(prop_id = format_args!("0x{other:x}"), "Ignoring property event");
                None
            }
        }
    }

    fn dispatch(&self, listener: &dyn PowerEventListener, values: &[HalPropValue]) {
        for value in values {
            match self.decode_event(value) {
                Some(PowerEvent::State(state)) => listener.on_ap_power_state_change(state),
                Some(PowerEvent::Brightness(percent)) => {
                    listener.on_display_brightness_change(percent);
                }
                None => {}
            }
        }
    }
}

fn decode_power_state(value: &HalPropValue) -> PowerResult<PowerState> {
    let raw = value.int32_at(0).ok_or_else(|| PowerError::WrongHalResponse {
        reason: "empty AP_POWER_STATE_REQ".into(),
    })?;
    let state = VehicleApPowerStateReq::try_from(raw).map_err(|err| PowerError::WrongHalResponse {
        reason: err.to_string(),
    })?;
    Ok(PowerState::new(state, value.int32_at(1).unwrap_or(0)))
}

fn to_percent(raw: i32, max: i32) -> i32 {
    let percent = (i64::from(raw) * 100 / i64::from(max)).clamp(0, 100);
    percent as i32
}

fn from_percent(percent: i32, max: i32) -> i32 {
    let raw = i64::from(percent.clamp(0, 100)) * i64::from(max) / 100;
    raw as i32
}

impl HalServiceBase for PowerHalService {
    fn name(&self) -> &'static str {
        "power"
    }

    fn supported_properties(&self) -> &'static [PropertyId] {
        &SUPPORTED_PROPERTIES
    }

    fn take_properties(&self, configs: &[VehiclePropConfig]) -> Vec<PropertyId> {
        let taken = supported_subset(&SUPPORTED_PROPERTIES, configs);
        let mut state = self.state.lock();
        for config in taken {
            if config.prop == DISPLAY_BRIGHTNESS {
                match config.max_int32() {
                    Some(max) if max > 0 => state.max_display_brightness = max,
                    _ => warn!("Brightness range missing, assuming 0..100"),
                }
            }
            state.configs.insert(config.prop, config.clone());
        }
        info!(properties = state.configs.len(), "Power HAL properties taken");
        [AP_POWER_STATE_REQ, DISPLAY_BRIGHTNESS]
            .into_iter()
            .filter(|prop| state.configs.contains_key(prop))
            .collect()
    }

    fn on_hal_events(&self, values: Vec<HalPropValue>) {
        let listener = {
            let mut state = self.state.lock();
            match state.listener.as_ref() {
                Some(listener) if !state.replaying => listener.upgrade(),
                _ => {
                    debug!(count = values.len(), "Queueing power events");
                    state.queued.extend(values);
                    return;
                }
            }
        };
        match listener {
            Some(listener) => self.dispatch(listener.as_ref(), &values),
            None => debug!(count = values.len(), "Power listener gone, events dropped"),
        }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.listener = None;
        state.queued.clear();
        state.replaying = false;
    }
}

#[async_trait]
impl PowerHal for PowerHalService {
    /// Install the listener and deliver the backlog in arrival order.
    ///
    /// Events arriving during the replay are appended to the backlog, so the
    /// listener never sees a newer event before an older one.
    fn set_listener(&self, listener: Weak<dyn PowerEventListener>) {
        let target = listener.upgrade();
        {
            let mut state = self.state.lock();
            state.listener = Some(listener);
            state.replaying = true;
        }
        loop {
            let batch = {
                let mut state = self.state.lock();
                if state.queued.is_empty() || target.is_none() {
                    state.queued.clear();
                    state.replaying = false;
                    return;
                }
                std::mem::take(&mut state.queued)
            };
            if let Some(target) = target.as_ref() {
                debug!(count = batch.len(), "Replaying queued power events");
                self.dispatch(target.as_ref(), &batch);
            }
        }
    }

    fn is_power_state_supported(&self) -> bool {
        let state = self.state.lock();
        state.configs.contains_key(&AP_POWER_STATE_REQ)
            && state.configs.contains_key(&AP_POWER_STATE_REPORT)
    }

    fn is_deep_sleep_allowed(&self) -> bool {
        self.config_flag(power_config_flag::ENABLE_DEEP_SLEEP)
    }

    fn is_timed_wakeup_allowed(&self) -> bool {
        self.config_flag(power_config_flag::SUPPORT_TIMER_POWER_ON)
    }

    async fn send_wait_for_vhal(&self) {
        self.publish(VehicleApPowerStateReport::WaitForVhal, 0).await;
    }

    async fn send_shutdown_prepare(&self) {
        self.publish(VehicleApPowerStateReport::ShutdownPrepare, 0).await;
    }

    async fn send_shutdown_postpone(&self, postpone_ms: i32) {
        self.publish(VehicleApPowerStateReport::ShutdownPostpone, postpone_ms)
            .await;
    }

    async fn send_shutdown_start(&self, wakeup_sec: i32) {
        self.publish(VehicleApPowerStateReport::ShutdownStart, wakeup_sec)
            .await;
    }

    async fn send_sleep_entry(&self, wakeup_sec: i32) {
        self.publish(VehicleApPowerStateReport::DeepSleepEntry, wakeup_sec)
            .await;
    }

    async fn send_sleep_exit(&self) {
        self.publish(VehicleApPowerStateReport::DeepSleepExit, 0).await;
    }

    async fn send_shutdown_cancel(&self) {
        self.publish(VehicleApPowerStateReport::ShutdownCancelled, 0)
            .await;
    }

    async fn send_on(&self) {
        self.publish(VehicleApPowerStateReport::On, 0).await;
    }

    async fn send_display_brightness(&self, brightness: i32) {
        let max = self.state.lock().max_display_brightness;
        let raw = from_percent(brightness, max);
        let value = HalPropValue::with_int32_values(DISPLAY_BRIGHTNESS, vec![raw]);
        if let Err(err) = self.channel.set_value(value).await {
            error!(brightness, error = %err, "Failed to report display brightness");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use car_types::{shutdown_param, AreaConfig};
    use vhal_bus::{HalError, HalResult};

    #[derive(Default)]
    struct FakeChannel {
        sets: Mutex<Vec<HalPropValue>>,
    }

    #[async_trait]
    impl PropertyChannel for FakeChannel {
        async fn set_value(&self, value: HalPropValue) -> HalResult<()> {
            self.sets.lock().push(value);
            Ok(())
        }

        async fn get_value(&self, request: HalPropValue) -> HalResult<HalPropValue> {
            Err(HalError::ServiceSpecific {
                prop: request.prop,
                status: car_types::StatusCode::NotAvailable,
            })
        }
    }

    #[derive(Default)]
    struct Recorder {
        states: Mutex<Vec<PowerState>>,
        brightness: Mutex<Vec<i32>>,
    }

    impl PowerEventListener for Recorder {
        fn on_ap_power_state_change(&self, state: PowerState) {
            self.states.lock().push(state);
        }

        fn on_display_brightness_change(&self, brightness: i32) {
            self.brightness.lock().push(brightness);
        }
    }

    fn configs(flags: i32) -> Vec<VehiclePropConfig> {
        let mut brightness = VehiclePropConfig::new(DISPLAY_BRIGHTNESS);
        brightness.area_configs.push(AreaConfig {
            area_id: 0,
            min_int32: 0,
            max_int32: 255,
        });
        vec![
            VehiclePropConfig::with_config_array(AP_POWER_STATE_REQ, vec![flags]),
            VehiclePropConfig::new(AP_POWER_STATE_REPORT),
            brightness,
        ]
    }

    fn setup(flags: i32) -> (PowerHalService, Arc<FakeChannel>) {
        let channel = Arc::new(FakeChannel::default());
        let service = PowerHalService::new(channel.clone());
        let subscribed = service.take_properties(&configs(flags));
        assert_eq!(subscribed, vec![AP_POWER_STATE_REQ, DISPLAY_BRIGHTNESS]);
        (service, channel)
    }

    fn request(state: VehicleApPowerStateReq, param: i32) -> HalPropValue {
        HalPropValue::with_int32_values(AP_POWER_STATE_REQ, vec![state.into(), param])
    }

    #[test]
    fn test_config_flags() {
        let (service, _) = setup(power_config_flag::ENABLE_DEEP_SLEEP);
        assert!(service.is_power_state_supported());
        assert!(service.is_deep_sleep_allowed());
        assert!(!service.is_timed_wakeup_allowed());
    }

    #[test]
    fn test_missing_report_property_not_supported() {
        let service = PowerHalService::new(Arc::new(FakeChannel::default()));
        service.take_properties(&[VehiclePropConfig::new(AP_POWER_STATE_REQ)]);
        assert!(!service.is_power_state_supported());
        assert!(!service.is_deep_sleep_allowed());
    }

    #[tokio::test]
    async fn test_reports_are_encoded() {
        let (service, channel) = setup(0);
        service.send_shutdown_postpone(5000).await;
        service.send_sleep_entry(30).await;

        let sets = channel.sets.lock().clone();
        assert_eq!(sets[0].prop, AP_POWER_STATE_REPORT);
        assert_eq!(sets[0].int32_values, vec![4, 5000]);
        assert_eq!(sets[1].int32_values, vec![2, 30]);
    }

    #[tokio::test]
    async fn test_brightness_scaled_to_vehicle_range() {
        let (service, channel) = setup(0);
        service.send_display_brightness(100).await;
        service.send_display_brightness(150).await;

        let sets = channel.sets.lock().clone();
        assert_eq!(sets[0].int32_values, vec![255]);
        assert_eq!(sets[1].int32_values, vec![255]);
    }

    #[test]
    fn test_events_queued_until_listener_set() {
        let (service, _) = setup(0);
        service.on_hal_events(vec![request(
            VehicleApPowerStateReq::ShutdownPrepare,
            shutdown_param::CAN_SLEEP,
        )]);

        let recorder = Arc::new(Recorder::default());
        let listener: Arc<dyn PowerEventListener> = recorder.clone();
        service.set_listener(Arc::downgrade(&listener));

        let states = recorder.states.lock().clone();
        assert_eq!(
            states,
            vec![PowerState::new(
                VehicleApPowerStateReq::ShutdownPrepare,
                shutdown_param::CAN_SLEEP
            )]
        );
    }

    #[test]
    fn test_unknown_state_and_brightness_events() {
        let (service, _) = setup(0);
        let recorder = Arc::new(Recorder::default());
        service.set_listener(Arc::downgrade(&recorder) as Weak<dyn PowerEventListener>);

        service.on_hal_events(vec![
            HalPropValue::with_int32_values(AP_POWER_STATE_REQ, vec![42, 0]),
            HalPropValue::with_int32_values(DISPLAY_BRIGHTNESS, vec![51]),
        ]);

        assert!(recorder.states.lock().is_empty());
        assert_eq!(recorder.brightness.lock().clone(), vec![20]);
    }

    /// Feeds one more vehicle event into the service from inside the first
    /// callback, the way the dispatcher can while a backlog is replayed.
    struct ReentrantRecorder {
        service: Arc<PowerHalService>,
        late_event: Mutex<Option<HalPropValue>>,
        states: Mutex<Vec<VehicleApPowerStateReq>>,
    }

    impl PowerEventListener for ReentrantRecorder {
        fn on_ap_power_state_change(&self, state: PowerState) {
            self.states.lock().push(state.state);
            let late = self.late_event.lock().take();
            if let Some(late) = late {
                self.service.on_hal_events(vec![late]);
            }
        }

        fn on_display_brightness_change(&self, _brightness: i32) {}
    }

    #[test]
    fn test_events_during_replay_keep_bus_order() {
        let channel = Arc::new(FakeChannel::default());
        let service = Arc::new(PowerHalService::new(channel));
        service.take_properties(&configs(0));
        service.on_hal_events(vec![
            request(VehicleApPowerStateReq::On, 0),
            request(VehicleApPowerStateReq::CancelShutdown, 0),
        ]);

        let recorder = Arc::new(ReentrantRecorder {
            service: service.clone(),
            late_event: Mutex::new(Some(request(
                VehicleApPowerStateReq::ShutdownPrepare,
                shutdown_param::CAN_SLEEP,
            ))),
            states: Mutex::new(Vec::new()),
        });
        let listener: Arc<dyn PowerEventListener> = recorder.clone();
        service.set_listener(Arc::downgrade(&listener));

        assert_eq!(
            recorder.states.lock().clone(),
            vec![
                VehicleApPowerStateReq::On,
                VehicleApPowerStateReq::CancelShutdown,
                VehicleApPowerStateReq::ShutdownPrepare,
            ]
        );

        // Replay finished, later events go straight through.
        service.on_hal_events(vec![request(VehicleApPowerStateReq::Finished, 0)]);
        assert_eq!(
            recorder.states.lock().last(),
            Some(&VehicleApPowerStateReq::Finished)
        );
    }

    #[test]
    fn test_brightness_conversion_with_large_range() {
        let max = i32::MAX / 10;
        assert_eq!(from_percent(50, max), max / 2);
        assert_eq!(from_percent(100, i32::MAX), i32::MAX);
        assert_eq!(to_percent(max, max), 100);
        assert_eq!(to_percent(i32::MAX, 255), 100);
        assert_eq!(to_percent(-5, 255), 0);
    }
}
