//! # Power Management Configuration
//!
//! All timeouts have defaults matching production vehicles. The garage mode
//! duration override is a debug aid and is ignored unless `debug_build` is set.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shortest garage mode the service will allow.
pub const MIN_MAX_GARAGE_MODE_DURATION_SECS: u64 = 15 * 60;

/// Postpone requested from the vehicle on every polling tick.
pub const SHUTDOWN_EXTEND_MAX_MS: i32 = 5000;

/// First back-off between failed suspend attempts.
pub const INITIAL_SUSPEND_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Back-off cap between failed suspend attempts.
pub const MAX_SUSPEND_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Car power management configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    /// Interval between "postpone" pings during shutdown prepare.
    pub shutdown_polling_interval_ms: u64,
    /// Maximum garage mode duration. Floored to 15 minutes.
    pub max_garage_mode_duration_secs: u64,
    /// Debug-only override of the garage mode duration.
    pub garage_mode_duration_override_secs: Option<i64>,
    /// Whether debug-only knobs are honoured.
    pub debug_build: bool,
    /// Timeout for the user HAL round trip on resume.
    pub user_hal_timeout_ms: i64,
    /// Replace a guest user before going to sleep instead of after resume.
    pub switch_guest_user_before_sleep: bool,
    /// Keep the current user when resuming from suspend.
    pub disable_user_switch_during_resume: bool,
    /// Total time spent retrying a failed suspend.
    pub max_suspend_wait_ms: u64,
    /// Accept a postponable SHUTDOWN_PREPARE while already preparing, and
    /// restart shutdown processing. Dropped otherwise.
    pub refresh_postponable_shutdown_prepare: bool,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            shutdown_polling_interval_ms: 2000,
            max_garage_mode_duration_secs: MIN_MAX_GARAGE_MODE_DURATION_SECS,
            garage_mode_duration_override_secs: None,
            debug_build: false,
            user_hal_timeout_ms: 5000,
            switch_guest_user_before_sleep: false,
            disable_user_switch_during_resume: true,
            max_suspend_wait_ms: 3 * 60 * 1000,
            refresh_postponable_shutdown_prepare: false,
        }
    }
}

impl PowerConfig {
    /// Polling interval, never zero.
    #[must_use]
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.shutdown_polling_interval_ms.max(1))
    }

    /// Garage mode duration after the floor is applied.
    #[must_use]
    pub fn shutdown_prepare_time(&self) -> Duration {
        Duration::from_secs(
            self.max_garage_mode_duration_secs
                .max(MIN_MAX_GARAGE_MODE_DURATION_SECS),
        )
    }

    /// Number of postpone ticks before shutdown processing is forced complete.
    #[must_use]
    pub fn polling_count(&self) -> u32 {
        let interval_ms = self.polling_interval().as_millis();
        let duration_ms = match self.garage_mode_duration_override_secs {
            Some(secs) if self.debug_build && secs >= 0 => u128::from(secs.unsigned_abs()) * 1000,
            _ => self.shutdown_prepare_time().as_millis(),
        };
        u32::try_from(duration_ms / interval_ms + 1).unwrap_or(u32::MAX)
    }

    /// Budget for suspend retries.
    #[must_use]
    pub fn max_suspend_wait(&self) -> Duration {
        Duration::from_millis(self.max_suspend_wait_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_polling_count() {
        // 15 minutes / 2 seconds + 1
        assert_eq!(PowerConfig::default().polling_count(), 451);
    }

    #[test]
    fn test_duration_floor() {
        let config = PowerConfig {
            max_garage_mode_duration_secs: 60,
            ..PowerConfig::default()
        };
        assert_eq!(config.shutdown_prepare_time(), Duration::from_secs(900));
    }

    #[test]
    fn test_override_needs_debug_build() {
        let mut config = PowerConfig {
            garage_mode_duration_override_secs: Some(10),
            ..PowerConfig::default()
        };
        assert_eq!(config.polling_count(), 451);

        config.debug_build = true;
        assert_eq!(config.polling_count(), 6);

        config.garage_mode_duration_override_secs = Some(-1);
        assert_eq!(config.polling_count(), 451);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PowerConfig =
            serde_json::from_str(r#"{"shutdown_polling_interval_ms": 100}"#).unwrap();
        assert_eq!(config.shutdown_polling_interval_ms, 100);
        assert_eq!(config.user_hal_timeout_ms, 5000);
    }
}
