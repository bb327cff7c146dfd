//! # Car Service Runtime Library
//!
//! The modules behind the `car-service` binary, exposed for integration
//! tests.
//!
//! ## Modular Structure
//!
//! - `container/` - configuration and the service container
//! - `registry/` - typed service lookup
//! - `wiring/` - Vehicle HAL router
//! - `adapters/` - port implementations and the simulated vehicle

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod container;
pub mod registry;
pub mod wiring;

pub use container::{CarServiceConfig, CarServiceContainer, ConfigError};
pub use registry::{RegistryError, ServiceRegistry};
pub use wiring::VehicleHal;
