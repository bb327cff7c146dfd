//! Host side of the `SystemInterface` port.
//!
//! Suspend returns immediately as if the vehicle woke us up. Shutdown and
//! reboot are published on a watch channel so the binary can exit.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use cs_02_power_management::SystemInterface;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

/// Why the system stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemExit {
    Shutdown,
    Reboot { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Display {
    on: bool,
    brightness: i32,
}

/// Simulated operating system.
pub struct SimulatedSystem {
    supports_deep_sleep: bool,
    fail_suspend: AtomicBool,
    suspend_count: AtomicU32,
    display: Mutex<Display>,
    exit: watch::Sender<Option<SystemExit>>,
}

impl SimulatedSystem {
    #[must_use]
    pub fn new(supports_deep_sleep: bool) -> Self {
        let (exit, _) = watch::channel(None);
        Self {
            supports_deep_sleep,
            fail_suspend: AtomicBool::new(false),
            suspend_count: AtomicU32::new(0),
            display: Mutex::new(Display {
                on: true,
                brightness: 100,
            }),
            exit,
        }
    }

    /// Make every following suspend attempt fail (or succeed again).
    pub fn set_suspend_failing(&self, failing: bool) {
        self.fail_suspend.store(failing, Ordering::SeqCst);
    }

    /// Suspend attempts so far, failed ones included.
    #[must_use]
    pub fn suspend_count(&self) -> u32 {
        self.suspend_count.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_display_on(&self) -> bool {
        self.display.lock().on
    }

    #[must_use]
    pub fn display_brightness(&self) -> i32 {
        self.display.lock().brightness
    }

    /// Receiver that sees `Some(exit)` once the system went down.
    #[must_use]
    pub fn exit_signal(&self) -> watch::Receiver<Option<SystemExit>> {
        self.exit.subscribe()
    }

    /// How the system went down, if it did.
    #[must_use]
    pub fn exit_reason(&self) -> Option<SystemExit> {
        self.exit.borrow().clone()
    }
}

#[async_trait]
impl SystemInterface for SimulatedSystem {
    fn is_system_supporting_deep_sleep(&self) -> bool {
        self.supports_deep_sleep
    }

    async fn enter_deep_sleep(&self) -> bool {
        let attempt = self.suspend_count.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_suspend.load(Ordering::SeqCst) {
            warn!(attempt, "Simulated suspend to RAM failed");
            return false;
        }
        info!(attempt, "Simulated suspend to RAM, resuming");
        true
    }

    fn shutdown(&self) {
        info!("System shutdown");
        self.exit.send_replace(Some(SystemExit::Shutdown));
    }

    fn reboot(&self, reason: &str) {
        info!(reason, "System reboot");
        self.exit.send_replace(Some(SystemExit::Reboot {
            reason: reason.to_string(),
        }));
    }

    fn set_display_state(&self, on: bool) {
        self.display.lock().on = on;
    }

    fn set_display_brightness(&self, brightness: i32) {
        self.display.lock().brightness = brightness;
    }

    fn refresh_display_brightness(&self) {
        let brightness = self.display.lock().brightness;
        info!(brightness, "Display brightness refreshed");
    }
}
