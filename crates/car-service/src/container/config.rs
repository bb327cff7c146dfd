//! # Car Service Configuration
//!
//! Unified configuration for the runtime and every service it wires.
//!
//! ## Sources (later wins)
//!
//! 1. Built-in defaults
//! 2. JSON file (`CAR_CONFIG_FILE`), partial files allowed
//! 3. `CAR_*` environment variables

use car_telemetry::{parse_flag, TelemetryConfig};
use car_types::{user_flags, UserId, UserInfo};
use cs_02_power_management::PowerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use vhal_bus::{
    RetryPolicy, DEFAULT_SLEEP_BETWEEN_RETRIABLE_INVOKES_MS,
    DEFAULT_WAIT_CAP_FOR_RETRIABLE_RESULT_MS,
};

/// Complete car service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarServiceConfig {
    /// Logging and metrics.
    pub telemetry: TelemetryConfig,
    /// Property channel retry budget.
    pub hal: HalConfig,
    /// Power management.
    pub power: PowerConfig,
    /// Users known to the device at startup.
    pub users: UsersConfig,
    /// Behaviour of the simulated vehicle.
    pub vehicle: VehicleConfig,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for this schema.
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    /// A setting holds an unusable value.
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Property channel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HalConfig {
    /// Total time spent retrying a busy bus.
    pub retry_wait_cap_ms: u64,
    /// Pause between retries.
    pub retry_sleep_between_ms: u64,
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            retry_wait_cap_ms: DEFAULT_WAIT_CAP_FOR_RETRIABLE_RESULT_MS,
            retry_sleep_between_ms: DEFAULT_SLEEP_BETWEEN_RETRIABLE_INVOKES_MS,
        }
    }
}

impl HalConfig {
    /// Retry policy handed to the HAL client.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            wait_cap: Duration::from_millis(self.retry_wait_cap_ms),
            sleep_between: Duration::from_millis(self.retry_sleep_between_ms),
        }
    }
}

/// Users present when the service starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsersConfig {
    /// Foreground user at boot.
    pub current_user: UserInfo,
    /// Other users on the device.
    pub other_users: Vec<UserInfo>,
}

impl Default for UsersConfig {
    fn default() -> Self {
        Self {
            current_user: UserInfo::new(10, user_flags::ADMIN),
            other_users: vec![UserInfo::new(0, user_flags::SYSTEM)],
        }
    }
}

/// Simulated vehicle behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Advertise `ENABLE_DEEP_SLEEP` in the power state config.
    pub deep_sleep_allowed: bool,
    /// Advertise `SUPPORT_TIMER_POWER_ON` in the power state config.
    pub timed_wakeup_allowed: bool,
    /// Whether the host can suspend to RAM.
    pub system_supports_deep_sleep: bool,
    /// Expose the user management properties.
    pub user_hal_supported: bool,
    /// Upper end of the raw brightness range.
    pub max_display_brightness: i32,
    /// User the vehicle asks for on resume. `None` keeps the platform default.
    pub resume_user_id: Option<UserId>,
    /// Approve user switch requests.
    pub approve_user_switch: bool,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            deep_sleep_allowed: true,
            timed_wakeup_allowed: true,
            system_supports_deep_sleep: true,
            user_hal_supported: true,
            max_display_brightness: 255,
            resume_user_id: None,
            approve_user_switch: true,
        }
    }
}

impl CarServiceConfig {
    /// Defaults, then the `CAR_CONFIG_FILE` file if set, then the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("CAR_CONFIG_FILE") {
            Ok(path) => Self::from_json_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load a (possibly partial) JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Parse a (possibly partial) JSON configuration.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Apply `CAR_*` overrides read through `lookup`.
    ///
    /// # Variables
    ///
    /// - `CAR_LOG_LEVEL`, `CAR_JSON_LOGS`, `CAR_METRICS_ENABLED`
    /// - `CAR_HAL_RETRY_WAIT_CAP_MS`, `CAR_HAL_RETRY_SLEEP_MS`
    /// - `CAR_SHUTDOWN_POLLING_INTERVAL_MS`, `CAR_MAX_GARAGE_MODE_DURATION_SECS`
    /// - `CAR_GARAGE_MODE_DURATION_OVERRIDE` (seconds, debug builds only)
    /// - `CAR_DEBUG_BUILD`, `CAR_USER_HAL_TIMEOUT_MS`, `CAR_MAX_SUSPEND_WAIT_MS`
    /// - `CAR_DEEP_SLEEP_ALLOWED`, `CAR_USER_HAL_SUPPORTED`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("CAR_LOG_LEVEL") {
            self.telemetry.log_level = level;
        }
        override_flag(&lookup, "CAR_JSON_LOGS", &mut self.telemetry.json_logs);
        override_flag(&lookup, "CAR_METRICS_ENABLED", &mut self.telemetry.metrics_enabled);

        override_number(&lookup, "CAR_HAL_RETRY_WAIT_CAP_MS", &mut self.hal.retry_wait_cap_ms)?;
        override_number(&lookup, "CAR_HAL_RETRY_SLEEP_MS", &mut self.hal.retry_sleep_between_ms)?;

        let power = &mut self.power;
        override_number(
            &lookup,
            "CAR_SHUTDOWN_POLLING_INTERVAL_MS",
            &mut power.shutdown_polling_interval_ms,
        )?;
        override_number(
            &lookup,
            "CAR_MAX_GARAGE_MODE_DURATION_SECS",
            &mut power.max_garage_mode_duration_secs,
        )?;
        if lookup("CAR_GARAGE_MODE_DURATION_OVERRIDE").is_some() {
            let mut secs = 0i64;
            override_number(&lookup, "CAR_GARAGE_MODE_DURATION_OVERRIDE", &mut secs)?;
            power.garage_mode_duration_override_secs = Some(secs);
        }
        override_flag(&lookup, "CAR_DEBUG_BUILD", &mut power.debug_build);
        override_number(&lookup, "CAR_USER_HAL_TIMEOUT_MS", &mut power.user_hal_timeout_ms)?;
        override_number(&lookup, "CAR_MAX_SUSPEND_WAIT_MS", &mut power.max_suspend_wait_ms)?;

        override_flag(&lookup, "CAR_DEEP_SLEEP_ALLOWED", &mut self.vehicle.deep_sleep_allowed);
        override_flag(&lookup, "CAR_USER_HAL_SUPPORTED", &mut self.vehicle.user_hal_supported);
        Ok(())
    }

    /// Reject settings the services cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.power.user_hal_timeout_ms <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "power.user_hal_timeout_ms",
                value: self.power.user_hal_timeout_ms.to_string(),
                reason: "must be > 0",
            });
        }
        if self.hal.retry_sleep_between_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "hal.retry_sleep_between_ms",
                value: "0".into(),
                reason: "must be > 0",
            });
        }
        if self.vehicle.max_display_brightness <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "vehicle.max_display_brightness",
                value: self.vehicle.max_display_brightness.to_string(),
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

fn override_flag<F>(lookup: &F, key: &'static str, target: &mut bool)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(key) {
        *target = parse_flag(&value);
    }
}

fn override_number<F, T>(lookup: &F, key: &'static str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(value) = lookup(key) else {
        return Ok(());
    };
    *target = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value,
        reason: "not a number",
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = CarServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hal.retry_policy(), RetryPolicy::default());
        assert_eq!(config.power.polling_count(), 451);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = CarServiceConfig::from_json_str(
            r#"{"power": {"shutdown_polling_interval_ms": 500}, "vehicle": {"resume_user_id": 11}}"#,
        )
        .unwrap();
        assert_eq!(config.power.shutdown_polling_interval_ms, 500);
        assert_eq!(config.power.user_hal_timeout_ms, 5000);
        assert_eq!(config.vehicle.resume_user_id, Some(11));
        assert!(config.vehicle.deep_sleep_allowed);
        assert_eq!(config.users, UsersConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = CarServiceConfig::default();
        config
            .apply_overrides(lookup(&[
                ("CAR_GARAGE_MODE_DURATION_OVERRIDE", "10"),
                ("CAR_DEBUG_BUILD", "true"),
                ("CAR_SHUTDOWN_POLLING_INTERVAL_MS", "1000"),
                ("CAR_JSON_LOGS", "1"),
                ("CAR_DEEP_SLEEP_ALLOWED", "off"),
            ]))
            .unwrap();

        assert_eq!(config.power.garage_mode_duration_override_secs, Some(10));
        assert!(config.power.debug_build);
        assert!(config.telemetry.json_logs);
        assert!(!config.vehicle.deep_sleep_allowed);
        // 10s / 1s + 1
        assert_eq!(config.power.polling_count(), 11);
    }

    #[test]
    fn test_bad_number_is_rejected() {
        let mut config = CarServiceConfig::default();
        let err = config
            .apply_overrides(lookup(&[("CAR_USER_HAL_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "CAR_USER_HAL_TIMEOUT_MS",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_rejects_non_positive_timeout() {
        let mut config = CarServiceConfig::default();
        config.power.user_hal_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = CarServiceConfig::from_json_file("/nonexistent/car-service.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
