//! # Vehicle Properties
//!
//! The raw property value container, property configuration and the status
//! codes returned by the property bus.

use crate::hal_code_enum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Vehicle property identifier (group | area | type | id).
pub type PropertyId = i32;

/// Area identifier for global properties.
pub const AREA_GLOBAL: i32 = 0;

/// Property identifiers used by the car service.
///
/// Encoded as `SYSTEM (0x1000_0000) | GLOBAL (0x0100_0000) | type | id`.
pub mod vehicle_property {
    use super::PropertyId;

    /// Power state requested by the vehicle (`INT32_VEC`).
    pub const AP_POWER_STATE_REQ: PropertyId = 0x1141_0A00;
    /// Power state reported to the vehicle (`INT32_VEC`).
    pub const AP_POWER_STATE_REPORT: PropertyId = 0x1141_0A01;
    /// Display brightness (`INT32`).
    pub const DISPLAY_BRIGHTNESS: PropertyId = 0x1140_0A03;
    /// Initial user selection round trip (`MIXED`).
    pub const INITIAL_USER_INFO: PropertyId = 0x11E0_0F07;
    /// User switch round trip (`MIXED`).
    pub const SWITCH_USER: PropertyId = 0x11E0_0F08;
    /// User creation round trip (`MIXED`).
    pub const CREATE_USER: PropertyId = 0x11E0_0F09;
    /// User removal notification (`MIXED`).
    pub const REMOVE_USER: PropertyId = 0x11E0_0F0A;
    /// User identification association query (`MIXED`).
    pub const USER_IDENTIFICATION_ASSOCIATION: PropertyId = 0x11E0_0F0B;

    /// Human readable name, for logs.
    #[must_use]
    pub fn name(prop: PropertyId) -> &'static str {
        match prop {
            AP_POWER_STATE_REQ => "AP_POWER_STATE_REQ",
            AP_POWER_STATE_REPORT => "AP_POWER_STATE_REPORT",
            DISPLAY_BRIGHTNESS => "DISPLAY_BRIGHTNESS",
            INITIAL_USER_INFO => "INITIAL_USER_INFO",
            SWITCH_USER => "SWITCH_USER",
            CREATE_USER => "CREATE_USER",
            REMOVE_USER => "REMOVE_USER",
            USER_IDENTIFICATION_ASSOCIATION => "USER_IDENTIFICATION_ASSOCIATION",
            _ => "UNKNOWN",
        }
    }
}

/// Status returned by the property bus for get/set calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum StatusCode {
    /// Call succeeded.
    Ok = 0,
    /// Hardware is busy; the call may be retried.
    TryAgain = 1,
    /// The request was malformed.
    InvalidArg = 2,
    /// The property is temporarily unavailable.
    NotAvailable = 3,
    /// Caller lacks access to the property.
    AccessDenied = 4,
    /// Unclassified hardware failure.
    InternalError = 5,
}

hal_code_enum!(StatusCode {
    Ok = 0,
    TryAgain = 1,
    InvalidArg = 2,
    NotAvailable = 3,
    AccessDenied = 4,
    InternalError = 5,
});

impl StatusCode {
    /// Whether this status is `Ok`.
    #[must_use]
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::TryAgain => "TRY_AGAIN",
            Self::InvalidArg => "INVALID_ARG",
            Self::NotAvailable => "NOT_AVAILABLE",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}({})", name, *self as i32)
    }
}

/// A single property value as carried by the bus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HalPropValue {
    /// Property identifier.
    pub prop: PropertyId,
    /// Area identifier (`AREA_GLOBAL` for system properties).
    pub area_id: i32,
    /// Elapsed-realtime timestamp in nanoseconds.
    pub timestamp: i64,
    /// Integer payload.
    pub int32_values: Vec<i32>,
    /// 64-bit integer payload.
    pub int64_values: Vec<i64>,
    /// Float payload.
    pub float_values: Vec<f32>,
    /// String payload.
    pub string_value: String,
    /// Raw byte payload.
    pub bytes: Vec<u8>,
}

impl HalPropValue {
    /// Create an empty value for a global property.
    #[must_use]
    pub fn new(prop: PropertyId) -> Self {
        Self {
            prop,
            area_id: AREA_GLOBAL,
            ..Self::default()
        }
    }

    /// Create a value carrying only integers.
    #[must_use]
    pub fn with_int32_values(prop: PropertyId, values: Vec<i32>) -> Self {
        Self {
            int32_values: values,
            ..Self::new(prop)
        }
    }

    /// Set the string payload.
    #[must_use]
    pub fn string(mut self, value: impl Into<String>) -> Self {
        self.string_value = value.into();
        self
    }

    /// Integer at `index`, if present.
    #[must_use]
    pub fn int32_at(&self, index: usize) -> Option<i32> {
        self.int32_values.get(index).copied()
    }
}

impl fmt::Display for HalPropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(0x{:x}) ints={:?}",
            vehicle_property::name(self.prop),
            self.prop,
            self.int32_values
        )?;
        if !self.string_value.is_empty() {
            write!(f, " str={:?}", self.string_value)?;
        }
        Ok(())
    }
}

/// Per-area limits for a property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaConfig {
    /// Area identifier.
    pub area_id: i32,
    /// Minimum integer value.
    pub min_int32: i32,
    /// Maximum integer value.
    pub max_int32: i32,
}

/// Static configuration advertised by the bus for a property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehiclePropConfig {
    /// Property identifier.
    pub prop: PropertyId,
    /// Property specific configuration words.
    pub config_array: Vec<i32>,
    /// Property specific configuration string.
    pub config_string: String,
    /// Per-area limits.
    pub area_configs: Vec<AreaConfig>,
}

impl VehiclePropConfig {
    /// Config for a property with no extra configuration.
    #[must_use]
    pub fn new(prop: PropertyId) -> Self {
        Self {
            prop,
            ..Self::default()
        }
    }

    /// Config with configuration words.
    #[must_use]
    pub fn with_config_array(prop: PropertyId, config_array: Vec<i32>) -> Self {
        Self {
            prop,
            config_array,
            ..Self::default()
        }
    }

    /// Maximum integer value of the first area, if any.
    #[must_use]
    pub fn max_int32(&self) -> Option<i32> {
        self.area_configs.first().map(|area| area.max_int32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_conversion() {
        assert_eq!(StatusCode::try_from(1), Ok(StatusCode::TryAgain));
        assert_eq!(i32::from(StatusCode::InvalidArg), 2);
        assert!(StatusCode::try_from(99).is_err());
    }

    #[test]
    fn test_status_code_display() {
        assert_eq!(StatusCode::TryAgain.to_string(), "TRY_AGAIN(1)");
    }

    #[test]
    fn test_int32_at() {
        let value = HalPropValue::with_int32_values(vehicle_property::SWITCH_USER, vec![7, 3]);
        assert_eq!(value.int32_at(0), Some(7));
        assert_eq!(value.int32_at(2), None);
        assert_eq!(value.area_id, AREA_GLOBAL);
    }

    #[test]
    fn test_property_names() {
        assert_eq!(
            vehicle_property::name(vehicle_property::AP_POWER_STATE_REQ),
            "AP_POWER_STATE_REQ"
        );
        assert_eq!(vehicle_property::name(0x1234), "UNKNOWN");
    }

    #[test]
    fn test_prop_value_serialization() {
        let value = HalPropValue::with_int32_values(vehicle_property::CREATE_USER, vec![1, 2])
            .string("driver");
        let json = serde_json::to_string(&value).unwrap();
        let parsed: HalPropValue = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn test_max_int32() {
        let mut config = VehiclePropConfig::new(vehicle_property::DISPLAY_BRIGHTNESS);
        assert_eq!(config.max_int32(), None);
        config.area_configs.push(AreaConfig {
            area_id: AREA_GLOBAL,
            min_int32: 0,
            max_int32: 255,
        });
        assert_eq!(config.max_int32(), Some(255));
    }
}
