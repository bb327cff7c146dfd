//! # Car Types Crate
//!
//! Value types exchanged between the car service and the Vehicle HAL.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: property identifiers, status codes and the
//!   user/power wire vocabulary are defined here and nowhere else.
//! - **Plain Values**: everything is `Clone` and comparable; no type in this
//!   crate owns a channel, a lock or a task.
//! - **Lossless Codes**: every HAL enum converts from its raw `i32` through
//!   `TryFrom`, so unknown codes surface as errors instead of silent defaults.

pub mod errors;
pub mod power;
pub mod property;
pub mod user;

pub use errors::*;
pub use power::*;
pub use property::*;
pub use user::*;
