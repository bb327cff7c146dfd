//! # cs-01-user-hal
//!
//! User HAL service: request/response correlation over the Vehicle HAL user
//! management properties.
//!
//! ## Overview
//!
//! - **Correlation**: every request carries a fresh request id as its first
//!   field; the matching event resolves the stored callback.
//! - **Deadlines**: each request arms a timer; whichever of response and timer
//!   takes the pending entry first resolves the callback.
//! - **One per kind**: a second request of the same kind while one is pending
//!   is rejected with `STATUS_CONCURRENT_OPERATION`.
//!
//! ## Flow
//!
//! ```text
//! caller ──request──→ UserHalService ──set_value──→ PropertyChannel ──→ VHAL
//!   ↑                      │  ↑                                          │
//!   │                 pending table                                      │
//!   │                      │  └──────────── on_hal_events ←──────────────┘
//!   └──── callback(status, response) ─┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use cs_01_user_hal::{callback_channel, UserHalService};
//!
//! let service = UserHalService::new(hal_client);
//! let (callback, rx) = callback_channel();
//! service.switch_user(&request, 5000, callback).await?;
//! let (status, response) = rx.await?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod callback;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod service;

pub use callback::{callback_channel, CallbackResult};
pub use domain::{DecodeError, ResponseKind};
pub use error::{UserHalError, UserHalResult};
pub use service::UserHalService;
