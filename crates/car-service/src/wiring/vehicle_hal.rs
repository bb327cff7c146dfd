//! # Vehicle HAL Router
//!
//! Owns the [`HalClient`] and fans bus traffic out to the HAL services.
//!
//! ```text
//!                  get_all_prop_configs()
//! PropertyBus ───────────────────────────→ VehicleHal::init
//!      │                                        │ take_properties()
//!      │                                        ▼
//!      │                         ┌──── routes: prop → service ────┐
//!      │  HalEvent               │                                │
//!      └──→ dispatcher ──→ EventRouter ──→ UserHalService   PowerHalService
//! ```
//!
//! Events of one batch are grouped per owning service; each service sees its
//! values in bus order.

use std::collections::HashMap;
use std::sync::Arc;

use car_types::vehicle_property;
use car_types::{HalPropValue, PropertyId, StatusCode};
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use vhal_bus::{
    HalClient, HalClientCallback, HalResult, HalServiceBase, PropertyBus, PropertyChannel,
    RetryPolicy, SubscribeOptions,
};

/// Routes bus callbacks to the service owning each property.
#[derive(Default)]
struct EventRouter {
    services: RwLock<Vec<Arc<dyn HalServiceBase>>>,
    routes: RwLock<HashMap<PropertyId, Arc<dyn HalServiceBase>>>,
}

impl EventRouter {
    fn owner(&self, prop: PropertyId) -> Option<Arc<dyn HalServiceBase>> {
        self.routes.read().get(&prop).cloned()
    }
}

impl HalClientCallback for EventRouter {
    fn on_property_event(&self, values: Vec<HalPropValue>) {
        let mut batches: Vec<(Arc<dyn HalServiceBase>, Vec<HalPropValue>)> = Vec::new();
        for value in values {
            let Some(owner) = self.owner(value.prop) else {
                warn!(value = %value, "No service owns property, event dropped");
                car_telemetry::metrics::HAL_EVENTS_UNROUTED.inc();
                continue;
            };
            car_telemetry::metrics::HAL_EVENTS_ROUTED
                .with_label_values(&[vehicle_property::name(value.prop)])
                .inc();
            match batches.iter_mut().find(|(s, _)| Arc::ptr_eq(s, &owner)) {
                Some((_, batch)) => batch.push(value),
                None => batches.push((owner, vec![value])),
            }
        }
        for (service, batch) in batches {
            debug!(service = service.name(), count = batch.len(), "Routing events");
            service.on_hal_events(batch);
        }
    }

    fn on_property_set_error(&self, error_code: StatusCode, prop_id: PropertyId, area_id: i32) {
        match self.owner(prop_id) {
            Some(owner) => owner.on_property_set_error(error_code, prop_id, area_id),
            None => warn!(
                prop_id = format_args!("0x{prop_id:x}"),
                error = %error_code,
                "Set error for unowned property"
            ),
        }
    }
}

/// Connection to the vehicle shared by all HAL services.
pub struct VehicleHal {
    client: Arc<HalClient>,
    router: Arc<EventRouter>,
}

impl VehicleHal {
    /// Connect to `bus`.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime (the client spawns its
    /// dispatcher).
    pub fn new(bus: Arc<dyn PropertyBus>, retry: RetryPolicy) -> Self {
        let router = Arc::new(EventRouter::default());
        let callback: Arc<dyn HalClientCallback> = router.clone();
        Self {
            client: Arc::new(HalClient::new(bus, callback, retry)),
            router,
        }
    }

    /// Channel handed to the HAL services.
    #[must_use]
    pub fn channel(&self) -> Arc<dyn PropertyChannel> {
        self.client.clone()
    }

    /// Let every service claim its properties, then subscribe to them.
    ///
    /// Returns the number of subscribed properties. A property claimed twice
    /// stays with the first service.
    pub async fn init(&self, services: Vec<Arc<dyn HalServiceBase>>) -> HalResult<usize> {
        let configs = self.client.get_all_prop_configs().await;
        info!(properties = configs.len(), "Vehicle HAL properties discovered");

        let mut subscriptions = Vec::new();
        for service in &services {
            let taken = service.take_properties(&configs);
            {
                let mut routes = self.router.routes.write();
                for prop in &taken {
                    if let Some(existing) = routes.get(prop) {
                        warn!(
                            property = vehicle_property::name(*prop),
                            owner = existing.name(),
                            claimant = service.name(),
                            "Property already owned"
                        );
                        continue;
                    }
                    routes.insert(*prop, Arc::clone(service));
                    subscriptions.push(SubscribeOptions::on_change(*prop));
                }
            }
            info!(service = service.name(), properties = taken.len(), "HAL service bound");
        }
        *self.router.services.write() = services.clone();

        for service in &services {
            service.init();
        }
        if !subscriptions.is_empty() {
            self.client.subscribe(&subscriptions).await?;
        }
        Ok(subscriptions.len())
    }

    /// Number of routed properties.
    #[must_use]
    pub fn routed_properties(&self) -> usize {
        self.router.routes.read().len()
    }

    /// Release every service and stop event delivery.
    pub fn release(&self) {
        let services = std::mem::take(&mut *self.router.services.write());
        for service in &services {
            service.release();
        }
        self.router.routes.write().clear();
        self.client.release();
        info!(services = services.len(), "Vehicle HAL released");
    }
}
