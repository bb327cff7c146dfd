//! # In-Memory Property Bus
//!
//! A process-local [`PropertyBus`]. It stores the last value written to each
//! property, fans events out to subscribed sinks, and lets a [`BusResponder`]
//! play the part of the vehicle by answering writes with events.
//!
//! Statuses can be scripted with [`InMemoryPropertyBus::push_status`] to
//! exercise busy/failure paths.

use crate::bus::{EventSink, HalEvent, PropertyBus, SubscribeOptions};
use async_trait::async_trait;
use car_types::{HalPropValue, PropertyId, StatusCode, VehiclePropConfig};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Vehicle-side behaviour plugged into an [`InMemoryPropertyBus`].
pub trait BusResponder: Send + Sync {
    /// Events to emit after `value` was written.
    fn on_set(&self, value: &HalPropValue) -> Vec<HalPropValue> {
        let _ = value;
        Vec::new()
    }

    /// Answer for a read, overriding the stored value.
    fn on_get(&self, requested: &HalPropValue) -> Option<HalPropValue> {
        let _ = requested;
        None
    }
}

/// In-memory implementation of the property bus.
pub struct InMemoryPropertyBus {
    /// Supported properties.
    configs: RwLock<HashMap<PropertyId, VehiclePropConfig>>,

    /// Last value per property.
    values: RwLock<HashMap<PropertyId, HalPropValue>>,

    /// Sinks per property.
    subscriptions: RwLock<HashMap<PropertyId, Vec<EventSink>>>,

    /// Statuses returned (in order) by the next get/set calls.
    scripted: Mutex<VecDeque<StatusCode>>,

    /// Every accepted write, in order.
    set_log: Mutex<Vec<HalPropValue>>,

    /// Vehicle-side behaviour.
    responder: RwLock<Option<Arc<dyn BusResponder>>>,

    /// Total get/set attempts, including scripted failures.
    calls: AtomicU64,

    /// Total events delivered to sinks.
    events_published: AtomicU64,
}

impl InMemoryPropertyBus {
    /// Create a bus supporting the given properties.
    #[must_use]
    pub fn new(configs: Vec<VehiclePropConfig>) -> Self {
        Self {
            configs: RwLock::new(configs.into_iter().map(|c| (c.prop, c)).collect()),
            values: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            scripted: Mutex::new(VecDeque::new()),
            set_log: Mutex::new(Vec::new()),
            responder: RwLock::new(None),
            calls: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
        }
    }

    /// Create a bus supporting the given property ids with empty configs.
    #[must_use]
    pub fn with_properties(props: &[PropertyId]) -> Self {
        Self::new(props.iter().map(|p| VehiclePropConfig::new(*p)).collect())
    }

    /// Install the vehicle-side responder.
    pub fn set_responder(&self, responder: Arc<dyn BusResponder>) {
        *self.responder.write() = Some(responder);
    }

    /// Queue a status to be returned by the next get/set call.
    pub fn push_status(&self, status: StatusCode) {
        self.scripted.lock().push_back(status);
    }

    /// Store a value without emitting events.
    pub fn put_value(&self, value: HalPropValue) {
        self.values.write().insert(value.prop, value);
    }

    /// All accepted writes so far.
    #[must_use]
    pub fn set_values(&self) -> Vec<HalPropValue> {
        self.set_log.lock().clone()
    }

    /// Accepted writes for one property.
    #[must_use]
    pub fn set_values_for(&self, prop: PropertyId) -> Vec<HalPropValue> {
        self.set_log
            .lock()
            .iter()
            .filter(|v| v.prop == prop)
            .cloned()
            .collect()
    }

    /// Total get/set attempts.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Total events delivered.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    /// Number of live sinks subscribed to `prop`.
    #[must_use]
    pub fn subscriber_count(&self, prop: PropertyId) -> usize {
        self.subscriptions
            .read()
            .get(&prop)
            .map_or(0, |sinks| sinks.iter().filter(|s| !s.is_closed()).count())
    }

    /// Emit property change events as if produced by the vehicle.
    ///
    /// Returns the number of deliveries.
    pub fn inject_event(&self, values: Vec<HalPropValue>) -> usize {
        let mut delivered = 0;
        for value in values {
            self.values.write().insert(value.prop, value.clone());
            let sinks = self.sinks_for(value.prop);
            if sinks.is_empty() {
                warn!(prop = %value, "Event dropped (no subscribers)");
                continue;
            }
            for sink in sinks {
                if sink.deliver(HalEvent::PropertyEvent(vec![value.clone()])) {
                    delivered += 1;
                }
            }
        }
        self.events_published
            .fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    /// Emit an asynchronous set error for `prop_id`.
    pub fn inject_set_error(&self, error_code: StatusCode, prop_id: PropertyId, area_id: i32) {
        for sink in self.sinks_for(prop_id) {
            sink.deliver(HalEvent::SetError {
                error_code,
                prop_id,
                area_id,
            });
        }
    }

    fn sinks_for(&self, prop: PropertyId) -> Vec<EventSink> {
        let mut subscriptions = self.subscriptions.write();
        match subscriptions.get_mut(&prop) {
            Some(sinks) => {
                sinks.retain(|s| !s.is_closed());
                sinks.clone()
            }
            None => Vec::new(),
        }
    }

    fn next_scripted(&self) -> Option<StatusCode> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.scripted.lock().pop_front()
    }

    fn is_supported(&self, prop: PropertyId) -> bool {
        self.configs.read().contains_key(&prop)
    }
}

impl Default for InMemoryPropertyBus {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl PropertyBus for InMemoryPropertyBus {
    async fn get_all_prop_configs(&self) -> Vec<VehiclePropConfig> {
        let mut configs: Vec<_> = self.configs.read().values().cloned().collect();
        configs.sort_by_key(|c| c.prop);
        configs
    }

    async fn get(&self, requested: &HalPropValue) -> Result<HalPropValue, StatusCode> {
        if let Some(status) = self.next_scripted() {
            if !status.is_ok() {
                return Err(status);
            }
        }
        if !self.is_supported(requested.prop) {
            return Err(StatusCode::InvalidArg);
        }
        let responder = self.responder.read().clone();
        if let Some(answer) = responder.and_then(|r| r.on_get(requested)) {
            return Ok(answer);
        }
        self.values
            .read()
            .get(&requested.prop)
            .cloned()
            .ok_or(StatusCode::NotAvailable)
    }

    async fn set(&self, value: &HalPropValue) -> StatusCode {
        if let Some(status) = self.next_scripted() {
            if !status.is_ok() {
                debug!(prop = %value, status = %status, "Scripted set failure");
                return status;
            }
        }
        if !self.is_supported(value.prop) {
            return StatusCode::InvalidArg;
        }

        self.set_log.lock().push(value.clone());
        self.values.write().insert(value.prop, value.clone());
        debug!(prop = %value, "Property set");

        let responder = self.responder.read().clone();
        if let Some(responder) = responder {
            let events = responder.on_set(value);
            if !events.is_empty() {
                self.inject_event(events);
            }
        }
        StatusCode::Ok
    }

    async fn subscribe(&self, sink: &EventSink, options: &[SubscribeOptions]) -> StatusCode {
        if let Some(unsupported) = options.iter().find(|o| !self.is_supported(o.prop_id)) {
            warn!(prop_id = unsupported.prop_id, "Subscribe to unsupported property");
            return StatusCode::InvalidArg;
        }
        let mut subscriptions = self.subscriptions.write();
        for option in options {
            let sinks = subscriptions.entry(option.prop_id).or_default();
            if !sinks.iter().any(|s| s.id() == sink.id()) {
                sinks.push(sink.clone());
            }
        }
        StatusCode::Ok
    }

    async fn unsubscribe(&self, sink: &EventSink, prop_id: PropertyId) -> StatusCode {
        if let Some(sinks) = self.subscriptions.write().get_mut(&prop_id) {
            sinks.retain(|s| s.id() != sink.id());
        }
        StatusCode::Ok
    }
}
