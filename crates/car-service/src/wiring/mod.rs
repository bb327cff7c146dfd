//! # Wiring
//!
//! Connects the HAL services to the vehicle: one [`VehicleHal`] owns the
//! property channel and routes bus events to whichever service claimed the
//! property.

mod vehicle_hal;

pub use vehicle_hal::VehicleHal;
