//! Domain layer of the user HAL service.
//!
//! - `codec`: payload layout of the user management properties
//! - `pending`: request id to callback table

pub mod codec;
pub mod pending;

pub use codec::DecodeError;
pub use pending::{PendingCallback, PendingRequest, PendingRequestTable, ResponseKind};
