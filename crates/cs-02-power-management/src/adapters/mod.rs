//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements the vehicle-facing outbound port over the property channel.

mod power_hal;

pub use power_hal::PowerHalService;
