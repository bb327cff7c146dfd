//! # Vehicle HAL Bus
//!
//! The property bus abstraction and the property channel built on top of it.
//!
//! ## Layers
//!
//! ```text
//! ┌──────────────────┐  set_value()/get_value()  ┌──────────────┐
//! │ HalServiceBase   │ ────────────────────────→ │  HalClient   │
//! │ (user, power)    │                           │ (retry loop) │
//! └──────────────────┘                           └──────┬───────┘
//!          ↑                                            │ set()/get()
//!          │ on_hal_events()                            ▼
//!   ┌──────┴───────┐     HalEvent (ordered)     ┌──────────────┐
//!   │  dispatcher  │ ←───────────────────────── │ PropertyBus  │
//!   │  (one task)  │                            │              │
//!   └──────────────┘                            └──────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Retry on busy:** `TRY_AGAIN` is retried within a bounded budget.
//! - **Ordered delivery:** every event for one client is delivered on a single
//!   dispatcher task, in the order the bus produced it.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod bus;
pub mod client;
pub mod error;
pub mod in_memory;
pub mod service_base;

pub use bus::{EventSink, HalEvent, PropertyBus, SubscribeOptions};
pub use client::{
    invoke_retriable, HalClient, HalClientCallback, PropertyChannel, RetryPolicy,
    DEFAULT_SLEEP_BETWEEN_RETRIABLE_INVOKES_MS, DEFAULT_WAIT_CAP_FOR_RETRIABLE_RESULT_MS,
};
pub use error::{HalError, HalResult};
pub use in_memory::{BusResponder, InMemoryPropertyBus};
pub use service_base::{supported_subset, HalServiceBase};
