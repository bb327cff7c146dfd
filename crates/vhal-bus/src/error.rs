//! Errors surfaced by the property channel.

use car_types::{PropertyId, StatusCode};
use thiserror::Error;

/// Terminal failure of a property get/set.
///
/// Transient `TRY_AGAIN` results never appear here unless the retry budget
/// was exhausted, in which case they are reported as `ServiceSpecific`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HalError {
    /// The bus rejected the request as malformed. Never retried.
    #[error("Invalid argument for property 0x{prop:x}: {status}")]
    InvalidArgument { prop: PropertyId, status: StatusCode },

    /// Any other non-OK terminal status.
    #[error("Property 0x{prop:x} failed: {status}")]
    ServiceSpecific { prop: PropertyId, status: StatusCode },
}

impl HalError {
    /// Map a terminal bus status onto an error.
    #[must_use]
    pub fn from_status(prop: PropertyId, status: StatusCode) -> Self {
        match status {
            StatusCode::InvalidArg => Self::InvalidArgument { prop, status },
            _ => Self::ServiceSpecific { prop, status },
        }
    }

    /// The status code carried by this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidArgument { status, .. } | Self::ServiceSpecific { status, .. } => *status,
        }
    }

    /// The property the failed call targeted.
    #[must_use]
    pub fn prop(&self) -> PropertyId {
        match self {
            Self::InvalidArgument { prop, .. } | Self::ServiceSpecific { prop, .. } => *prop,
        }
    }
}

/// Result type for property channel operations.
pub type HalResult<T> = Result<T, HalError>;
