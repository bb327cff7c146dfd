//! Driving Ports (API - Inbound)

use car_types::PowerState;

/// Receiver of power related vehicle events.
///
/// Implementations must not block: calls arrive on the HAL event dispatcher.
pub trait PowerEventListener: Send + Sync {
    /// The vehicle requested a power state.
    fn on_ap_power_state_change(&self, state: PowerState);

    /// The vehicle changed display brightness (percent, 0..=100).
    fn on_display_brightness_change(&self, brightness: i32);
}
