//! Error types for the user HAL service.
//!
//! Terminal outcomes of correlated requests are delivered through the
//! callback as a [`car_types::HalCallbackStatus`]. These errors only cover
//! preconditions checked before anything reaches the HAL, and the synchronous
//! calls.

use crate::domain::DecodeError;
use thiserror::Error;
use vhal_bus::HalError;

/// User HAL service errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UserHalError {
    /// Timeouts must be strictly positive.
    #[error("Invalid timeout: {timeout_ms}ms (must be > 0)")]
    InvalidTimeout { timeout_ms: i64 },

    /// The HAL does not expose the user management properties.
    #[error("User HAL not supported: {operation}")]
    NotSupported { operation: &'static str },

    /// The request itself is unusable.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The property channel failed.
    #[error("HAL call failed: {0}")]
    Hal(#[from] HalError),

    /// The HAL answered with a payload that does not match the request.
    #[error("Wrong HAL response: {reason}")]
    WrongResponse { reason: String },
}

impl From<DecodeError> for UserHalError {
    fn from(err: DecodeError) -> Self {
        Self::WrongResponse {
            reason: err.to_string(),
        }
    }
}

/// Result type for user HAL operations.
pub type UserHalResult<T> = Result<T, UserHalError>;
