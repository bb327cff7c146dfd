//! Common shape of a HAL-facing service.

use car_types::{HalPropValue, PropertyId, StatusCode, VehiclePropConfig};
use tracing::warn;

/// A service that owns a set of vehicle properties.
///
/// The router hands each service the configs of the properties it claimed and
/// then forwards matching events to it, in bus order.
pub trait HalServiceBase: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Properties this service wants to own.
    fn supported_properties(&self) -> &'static [PropertyId];

    /// Claim the supported subset of `configs`.
    ///
    /// Returns the properties that should be subscribed to.
    fn take_properties(&self, configs: &[VehiclePropConfig]) -> Vec<PropertyId>;

    /// Handle events for properties this service owns.
    fn on_hal_events(&self, values: Vec<HalPropValue>);

    /// Handle an asynchronous write failure.
    fn on_property_set_error(&self, error_code: StatusCode, prop_id: PropertyId, area_id: i32) {
        warn!(
            service = self.name(),
            prop_id = format_args!("0x{prop_id:x}"),
            area_id,
            error = %error_code,
            "Property set error"
        );
    }

    /// Called once after properties were taken.
    fn init(&self) {}

    /// Called when the service is torn down.
    fn release(&self) {}
}

/// Filter `configs` down to those listed in `supported`.
#[must_use]
pub fn supported_subset<'a>(
    supported: &[PropertyId],
    configs: &'a [VehiclePropConfig],
) -> Vec<&'a VehiclePropConfig> {
    configs
        .iter()
        .filter(|c| supported.contains(&c.prop))
        .collect()
}
