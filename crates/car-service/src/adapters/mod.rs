//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implementations of the power management outbound ports, plus the
//! simulated vehicle standing in for real hardware.
//!
//! ```text
//! ┌────────────────────────────┬──────────────────────────────┐
//! │ Port                       │ Adapter                      │
//! ├────────────────────────────┼──────────────────────────────┤
//! │ UserHalGateway             │ UserHalGatewayAdapter        │
//! │ InitialUserSetter          │ LocalUserManager             │
//! │ SystemInterface            │ SimulatedSystem              │
//! │ BusResponder (vhal-bus)    │ SimulatedVehicle             │
//! └────────────────────────────┴──────────────────────────────┘
//! ```

mod simulated_vehicle;
mod system;
mod user_hal_gateway;
mod users;

pub use simulated_vehicle::{vehicle_prop_configs, SimulatedVehicle};
pub use system::{SimulatedSystem, SystemExit};
pub use user_hal_gateway::UserHalGatewayAdapter;
pub use users::LocalUserManager;
