//! Shutdown polling timer.
//!
//! While listeners prepare for shutdown the vehicle is pinged with
//! "postpone" at a fixed rate. After `expiration_count` ticks processing is
//! forced complete.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;
use std::time::Duration;
use tokio::task::AbortHandle;

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// What a tick should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Ask the vehicle for more time.
    Postpone,
    /// Tick budget exhausted.
    Expired,
}

/// Receiver of timer ticks. Returns `false` to stop the timer.
#[async_trait]
pub trait PollTickTarget: Send + Sync + 'static {
    async fn on_poll_tick(&self, timer_id: u64) -> bool;
}

/// Bookkeeping of a running polling timer.
#[derive(Debug)]
pub struct ShutdownPollTimer {
    id: u64,
    current_count: u32,
    expiration_count: u32,
    task: AbortHandle,
}

impl ShutdownPollTimer {
    /// Start ticking `target` every `interval`, first tick immediately.
    pub fn start<T: PollTickTarget>(target: Weak<T>, interval: Duration, expiration_count: u32) -> Self {
        let id = NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(target) = target.upgrade() else {
                    break;
                };
                if !target.on_poll_tick(id).await {
                    break;
                }
            }
        });
        Self {
            id,
            current_count: 0,
            expiration_count,
            task: task.abort_handle(),
        }
    }

    /// Identity checked by ticks, so a cancelled timer's late tick is ignored.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Count one tick.
    pub fn tick(&mut self) -> TickOutcome {
        self.current_count += 1;
        if self.current_count > self.expiration_count {
            TickOutcome::Expired
        } else {
            TickOutcome::Postpone
        }
    }

    /// Ticks counted so far.
    #[must_use]
    pub fn current_count(&self) -> u32 {
        self.current_count
    }

    /// Stop the timer task.
    pub fn cancel(self) {
        self.task.abort();
    }
}
