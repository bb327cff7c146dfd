//! # HAL Client
//!
//! Request/response wrapper around a [`PropertyBus`].
//!
//! Writes and reads are retried while the bus answers `TRY_AGAIN`, sleeping
//! between attempts, until the retry budget runs out. Bus events are funnelled
//! through one dispatcher task so a [`HalClientCallback`] sees them strictly in
//! bus order.

use crate::bus::{EventSink, HalEvent, PropertyBus, SubscribeOptions};
use crate::error::{HalError, HalResult};
use async_trait::async_trait;
use car_types::{HalPropValue, PropertyId, StatusCode, VehiclePropConfig};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default retry budget for `TRY_AGAIN` results.
pub const DEFAULT_WAIT_CAP_FOR_RETRIABLE_RESULT_MS: u64 = 2000;

/// Default pause between retries.
pub const DEFAULT_SLEEP_BETWEEN_RETRIABLE_INVOKES_MS: u64 = 50;

/// Retry budget for transient bus failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total time spent retrying before giving up.
    pub wait_cap: Duration,
    /// Pause between attempts.
    pub sleep_between: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            wait_cap: Duration::from_millis(DEFAULT_WAIT_CAP_FOR_RETRIABLE_RESULT_MS),
            sleep_between: Duration::from_millis(DEFAULT_SLEEP_BETWEEN_RETRIABLE_INVOKES_MS),
        }
    }
}

/// Receiver of bus events, called from the dispatcher task.
pub trait HalClientCallback: Send + Sync {
    /// Subscribed properties changed.
    fn on_property_event(&self, values: Vec<HalPropValue>);

    /// An asynchronous write failed on the hardware side.
    fn on_property_set_error(&self, error_code: StatusCode, prop_id: PropertyId, area_id: i32);
}

/// Synchronous property access as seen by HAL services.
#[async_trait]
pub trait PropertyChannel: Send + Sync {
    /// Write a property, retrying transient failures.
    async fn set_value(&self, value: HalPropValue) -> HalResult<()>;

    /// Read a property, retrying transient failures.
    async fn get_value(&self, request: HalPropValue) -> HalResult<HalPropValue>;
}

/// Run `action` until it stops returning `TRY_AGAIN` or the budget is spent.
///
/// The final result is returned as-is; callers decide how to map the status.
pub async fn invoke_retriable<T, F, Fut>(mut action: F, policy: &RetryPolicy) -> Result<T, StatusCode>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StatusCode>>,
{
    let start = Instant::now();
    let mut result = action().await;
    while matches!(result, Err(StatusCode::TryAgain)) && start.elapsed() < policy.wait_cap {
        debug!(
            sleep_ms = policy.sleep_between.as_millis() as u64,
            "Bus busy, retrying"
        );
        tokio::time::sleep(policy.sleep_between).await;
        result = action().await;
    }
    if matches!(result, Err(StatusCode::TryAgain)) {
        warn!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Retry budget exhausted"
        );
    }
    result
}

/// Property channel over a [`PropertyBus`].
pub struct HalClient {
    bus: Arc<dyn PropertyBus>,
    sink: EventSink,
    retry: RetryPolicy,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl HalClient {
    /// Create a client delivering events to `callback`.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime; the dispatcher task is
    /// spawned immediately.
    pub fn new(
        bus: Arc<dyn PropertyBus>,
        callback: Arc<dyn HalClientCallback>,
        retry: RetryPolicy,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(dispatch_events(receiver, callback));
        Self {
            bus,
            sink: EventSink::new(sender),
            retry,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// The retry policy in use.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Configuration of every property the bus supports.
    pub async fn get_all_prop_configs(&self) -> Vec<VehiclePropConfig> {
        self.bus.get_all_prop_configs().await
    }

    /// Subscribe this client to property events.
    pub async fn subscribe(&self, options: &[SubscribeOptions]) -> HalResult<()> {
        let status = self.bus.subscribe(&self.sink, options).await;
        if status.is_ok() {
            return Ok(());
        }
        let prop = options.first().map_or(0, |o| o.prop_id);
        Err(HalError::from_status(prop, status))
    }

    /// Unsubscribe this client from a property.
    pub async fn unsubscribe(&self, prop_id: PropertyId) -> HalResult<()> {
        match self.bus.unsubscribe(&self.sink, prop_id).await {
            StatusCode::Ok => Ok(()),
            status => Err(HalError::from_status(prop_id, status)),
        }
    }

    /// Stop the dispatcher. Events arriving afterwards are discarded.
    pub fn release(&self) {
        if let Some(handle) = self.dispatcher.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for HalClient {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl PropertyChannel for HalClient {
    async fn set_value(&self, value: HalPropValue) -> HalResult<()> {
        let bus = &self.bus;
        let value = &value;
        invoke_retriable(
            || async move {
                match bus.set(value).await {
                    StatusCode::Ok => Ok(()),
                    status => Err(status),
                }
            },
            &self.retry,
        )
        .await
        .map_err(|status| HalError::from_status(value.prop, status))
    }

    async fn get_value(&self, request: HalPropValue) -> HalResult<HalPropValue> {
        let bus = &self.bus;
        let request = &request;
        invoke_retriable(|| async move { bus.get(request).await }, &self.retry)
            .await
            .map_err(|status| HalError::from_status(request.prop, status))
    }
}

async fn dispatch_events(
    mut receiver: mpsc::UnboundedReceiver<HalEvent>,
    callback: Arc<dyn HalClientCallback>,
) {
    while let Some(event) = receiver.recv().await {
        match event {
            HalEvent::PropertyEvent(values) => callback.on_property_event(values),
            HalEvent::SetError {
                error_code,
                prop_id,
                area_id,
            } => callback.on_property_set_error(error_code, prop_id, area_id),
        }
    }
    debug!("HAL event dispatcher stopped");
}
