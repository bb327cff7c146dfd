//! # cs-02-power-management
//!
//! Car power management: the power state machine, the listener completion
//! barrier and the vehicle power property adapter.
//!
//! ## State Machine
//!
//! ```text
//! [WAIT_FOR_VHAL] ──→ [ON] ──→ [SHUTDOWN_PREPARE] ──→ [WAIT_FOR_FINISH] ──→ [SUSPEND]
//!        ↑                            │                        │               │
//!        └────────────────────────────┴────────────────────────┴───────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Serialized handling**: every transition runs on one handler task.
//! - **Latest wins**: bursts of vehicle requests collapse into the newest one.
//! - **Barrier**: SHUTDOWN_PREPARE waits for every completion listener, a
//!   dead listener is removed from the wait, and the polling timer bounds
//!   the total wait.
//! - **Sleep fallback**: a deep sleep that keeps failing ends in shutdown.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cs_02_power_management::{CarPowerManagementService, PowerConfig, PowerHalService};
//!
//! let power_hal = Arc::new(PowerHalService::new(hal_client));
//! let service = CarPowerManagementService::new(
//!     PowerConfig::default(),
//!     power_hal,
//!     system,
//!     user_setter,
//!     Some(user_hal),
//! );
//! service.init()?;
//! let handle = service.register_listener_with_completion(listener);
//! // ... after SHUTDOWN_PREPARE work is done:
//! service.finished(handle)?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod ports;
pub mod service;
pub mod timer;

pub use adapters::PowerHalService;
pub use config::PowerConfig;
pub use domain::{
    CpmsState, ListenerGone, ListenerHandle, ListenerState, PowerStateKind, PowerStateListener,
};
pub use error::{PowerError, PowerResult};
pub use ports::{
    InitialUserBehavior, InitialUserSetter, PowerEventListener, PowerHal, SystemInterface,
    UserHalGateway,
};
pub use service::CarPowerManagementService;
