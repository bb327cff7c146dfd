//! Error types for car power management.

use crate::domain::ListenerHandle;
use thiserror::Error;
use vhal_bus::HalError;

/// Car power management errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PowerError {
    /// The handle is not (or no longer) registered.
    #[error("Unknown listener: {handle}")]
    UnknownListener { handle: ListenerHandle },

    /// Wake-up times must not be negative.
    #[error("Invalid wakeup time: {seconds}s")]
    InvalidWakeupTime { seconds: i32 },

    /// The power handler is not running.
    #[error("Power handler stopped")]
    HandlerStopped,

    /// The user HAL refused the request.
    #[error("User HAL request failed: {reason}")]
    UserHal { reason: String },

    /// The vehicle answered with an unknown power state.
    #[error("Wrong power state from HAL: {reason}")]
    WrongHalResponse { reason: String },

    /// The property channel failed.
    #[error("HAL call failed: {0}")]
    Hal(#[from] HalError),
}

/// Result type for power management operations.
pub type PowerResult<T> = Result<T, PowerError>;
