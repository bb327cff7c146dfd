//! Driven Ports (SPI - Outbound Dependencies)

use super::inbound::PowerEventListener;
use crate::error::PowerResult;
use async_trait::async_trait;
use car_types::{HalCallback, InitialUserInfoRequestType, InitialUserInfoResponse, UserId};
use std::sync::Weak;

/// Power control channel to the vehicle.
///
/// Every `send_*` is fire-and-forget; failures are logged by the
/// implementation.
#[async_trait]
pub trait PowerHal: Send + Sync {
    /// Install the receiver of vehicle power events.
    fn set_listener(&self, listener: Weak<dyn PowerEventListener>);

    /// Whether the vehicle exposes the power state properties.
    fn is_power_state_supported(&self) -> bool;

    /// Whether the vehicle allows deep sleep.
    fn is_deep_sleep_allowed(&self) -> bool;

    /// Whether the vehicle can wake us up at a scheduled time.
    fn is_timed_wakeup_allowed(&self) -> bool;

    async fn send_wait_for_vhal(&self);

    async fn send_shutdown_prepare(&self);

    /// Ask the vehicle for `postpone_ms` more before shutting down.
    async fn send_shutdown_postpone(&self, postpone_ms: i32);

    /// Shutdown starts now; wake up after `wakeup_sec` (0 = never).
    async fn send_shutdown_start(&self, wakeup_sec: i32);

    /// Deep sleep starts now; wake up after `wakeup_sec` (0 = never).
    async fn send_sleep_entry(&self, wakeup_sec: i32);

    async fn send_sleep_exit(&self);

    async fn send_shutdown_cancel(&self);

    async fn send_on(&self);

    /// Report display brightness (percent).
    async fn send_display_brightness(&self, brightness: i32);
}

/// Operating system hooks.
#[async_trait]
pub trait SystemInterface: Send + Sync {
    /// Whether the kernel supports suspend to RAM.
    fn is_system_supporting_deep_sleep(&self) -> bool;

    /// Suspend to RAM. Returns after wake up; `false` if suspend failed.
    async fn enter_deep_sleep(&self) -> bool;

    /// Power off. Does not return on real hardware.
    fn shutdown(&self);

    /// Reboot. Does not return on real hardware.
    fn reboot(&self, reason: &str);

    fn set_display_state(&self, on: bool);

    fn set_display_brightness(&self, brightness: i32);

    /// Re-read brightness after resume.
    fn refresh_display_brightness(&self);
}

/// Local policy for selecting the foreground user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialUserBehavior {
    /// Platform default: last active user, optionally replacing a guest.
    DefaultBehavior { replace_guest: bool },
    /// Switch to an existing user.
    Switch { user_id: UserId, replace_guest: bool },
    /// Create a new user and switch to it.
    Create { name: String, flags: i32 },
    /// Replace the current user with a fresh guest if it is a guest.
    ReplaceGuestIfNeeded,
}

/// Applies an [`InitialUserBehavior`].
pub trait InitialUserSetter: Send + Sync {
    fn set(&self, behavior: InitialUserBehavior);
}

/// The user HAL as seen by power management.
#[async_trait]
pub trait UserHalGateway: Send + Sync {
    fn is_supported(&self) -> bool;

    /// Start an INITIAL_USER_INFO round trip. On `Ok` the callback is
    /// guaranteed to be resolved.
    async fn get_initial_user_info(
        &self,
        request_type: InitialUserInfoRequestType,
        timeout_ms: i64,
        callback: HalCallback<InitialUserInfoResponse>,
    ) -> PowerResult<()>;
}
