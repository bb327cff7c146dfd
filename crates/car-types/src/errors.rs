//! Conversion errors shared by the HAL code enums.

use thiserror::Error;

/// A raw integer did not map onto a known HAL code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown {kind} code: {value}")]
pub struct UnknownCode {
    /// Name of the enum that rejected the value.
    pub kind: &'static str,
    /// The rejected raw value.
    pub value: i32,
}

impl UnknownCode {
    /// Create a new conversion error.
    #[must_use]
    pub fn new(kind: &'static str, value: i32) -> Self {
        Self { kind, value }
    }
}

/// Implements `TryFrom<i32>` and `From<Enum> for i32` for a fieldless HAL enum.
#[macro_export]
macro_rules! hal_code_enum {
    ($name:ident { $($variant:ident = $value:expr),+ $(,)? }) => {
        impl TryFrom<i32> for $name {
            type Error = $crate::errors::UnknownCode;

            fn try_from(value: i32) -> Result<Self, Self::Error> {
                match value {
                    $(v if v == $value => Ok(Self::$variant),)+
                    other => Err($crate::errors::UnknownCode::new(stringify!($name), other)),
                }
            }
        }

        impl From<$name> for i32 {
            fn from(code: $name) -> i32 {
                code as i32
            }
        }
    };
}
