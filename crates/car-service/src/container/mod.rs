//! # Service Container
//!
//! Configuration plus the container holding every running service, wired
//! through constructor injection.

pub mod config;
pub mod services;

pub use config::{CarServiceConfig, ConfigError, HalConfig, UsersConfig, VehicleConfig};
pub use services::CarServiceContainer;
