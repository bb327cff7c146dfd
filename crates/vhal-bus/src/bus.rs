//! # Property Bus
//!
//! The port through which the car service talks to vehicle hardware (or a
//! stand-in). Calls return raw [`StatusCode`]s; interpretation and retries
//! belong to [`crate::HalClient`].

use async_trait::async_trait;
use car_types::{HalPropValue, PropertyId, StatusCode, VehiclePropConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Asynchronous notification produced by the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum HalEvent {
    /// One or more subscribed properties changed.
    PropertyEvent(Vec<HalPropValue>),
    /// An earlier asynchronous set failed on the hardware side.
    SetError {
        error_code: StatusCode,
        prop_id: PropertyId,
        area_id: i32,
    },
}

/// Subscription request for one property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubscribeOptions {
    /// Property to subscribe to.
    pub prop_id: PropertyId,
    /// Sample rate for continuous properties; 0 for on-change.
    pub sample_rate: f32,
}

impl SubscribeOptions {
    /// On-change subscription.
    #[must_use]
    pub fn on_change(prop_id: PropertyId) -> Self {
        Self {
            prop_id,
            sample_rate: 0.0,
        }
    }
}

static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(1);

/// Destination for bus events, identified so it can be unsubscribed.
#[derive(Debug, Clone)]
pub struct EventSink {
    id: u64,
    sender: mpsc::UnboundedSender<HalEvent>,
}

impl EventSink {
    /// Wrap a channel sender into a sink with a fresh identity.
    #[must_use]
    pub fn new(sender: mpsc::UnboundedSender<HalEvent>) -> Self {
        Self {
            id: NEXT_SINK_ID.fetch_add(1, Ordering::Relaxed),
            sender,
        }
    }

    /// Stable identity of this sink.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Deliver an event. Returns `false` once the receiving side is gone.
    pub fn deliver(&self, event: HalEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    /// Whether the receiving side was dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Raw access to vehicle properties.
#[async_trait]
pub trait PropertyBus: Send + Sync {
    /// Configuration of every property the bus supports.
    async fn get_all_prop_configs(&self) -> Vec<VehiclePropConfig>;

    /// Read a property. `requested` may carry query parameters in its payload.
    async fn get(&self, requested: &HalPropValue) -> Result<HalPropValue, StatusCode>;

    /// Write a property.
    async fn set(&self, value: &HalPropValue) -> StatusCode;

    /// Route future events for `options` to `sink`.
    async fn subscribe(&self, sink: &EventSink, options: &[SubscribeOptions]) -> StatusCode;

    /// Stop routing events for `prop_id` to `sink`.
    async fn unsubscribe(&self, sink: &EventSink, prop_id: PropertyId) -> StatusCode;
}
