//! # Power Handler
//!
//! Serializes power work onto one task. Messages are processed strictly one
//! at a time in posting order, so handlers never race each other.
//!
//! ```text
//! vehicle event ─┐
//! timer expiry ──┼──→ mpsc ──→ [handler task] ──→ PowerMessageProcessor::process()
//! barrier close ─┘
//! ```

use crate::error::{PowerError, PowerResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Weak;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Work item for the power handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerHandlerMessage {
    /// Apply the latest pending power state.
    PowerStateChange,
    /// Vehicle brightness changed (percent).
    DisplayBrightness(i32),
    /// Main display turned on or off.
    MainDisplayChanged(bool),
    /// Shutdown processing finished for the given state generation.
    ProcessingComplete { generation: u64 },
}

/// Consumer of handler messages.
#[async_trait]
pub trait PowerMessageProcessor: Send + Sync + 'static {
    async fn process(&self, message: PowerHandlerMessage);
}

/// Owner of the handler queue and task.
pub struct PowerHandler {
    sender: mpsc::UnboundedSender<PowerHandlerMessage>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<PowerHandlerMessage>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for PowerHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerHandler {
    /// Create the queue. Messages posted before `start` are kept.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            task: Mutex::new(None),
        }
    }

    /// Spawn the handler task.
    ///
    /// Fails if the handler was already started or stopped.
    pub fn start<P: PowerMessageProcessor>(&self, processor: Weak<P>) -> PowerResult<()> {
        let mut receiver = self
            .receiver
            .lock()
            .take()
            .ok_or(PowerError::HandlerStopped)?;
        let task = tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                let Some(processor) = processor.upgrade() else {
                    break;
                };
                debug!(?message, "Handling power message");
                processor.process(message).await;
            }
            debug!("Power handler stopped");
        });
        *self.task.lock() = Some(task);
        Ok(())
    }

    /// Queue a message.
    pub fn post(&self, message: PowerHandlerMessage) -> PowerResult<()> {
        self.sender
            .send(message)
            .map_err(|_| PowerError::HandlerStopped)
    }

    /// Stop the task and drop queued messages.
    pub fn stop(&self) {
        self.receiver.lock().take();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<PowerHandlerMessage>>,
    }

    #[async_trait]
    impl PowerMessageProcessor for Recorder {
        async fn process(&self, message: PowerHandlerMessage) {
            tokio::task::yield_now().await;
            self.seen.lock().push(message);
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_messages_processed_in_order() {
        let recorder = Arc::new(Recorder::default());
        let handler = PowerHandler::new();
        handler.post(PowerHandlerMessage::DisplayBrightness(1)).unwrap();
        handler.start(Arc::downgrade(&recorder)).unwrap();
        handler.post(PowerHandlerMessage::PowerStateChange).unwrap();
        handler.post(PowerHandlerMessage::MainDisplayChanged(true)).unwrap();
        settle().await;

        assert_eq!(
            recorder.seen.lock().as_slice(),
            &[
                PowerHandlerMessage::DisplayBrightness(1),
                PowerHandlerMessage::PowerStateChange,
                PowerHandlerMessage::MainDisplayChanged(true),
            ]
        );
        assert!(handler.post(PowerHandlerMessage::PowerStateChange).is_ok());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let recorder = Arc::new(Recorder::default());
        let handler = PowerHandler::new();
        handler.start(Arc::downgrade(&recorder)).unwrap();
        assert_eq!(
            handler.start(Arc::downgrade(&recorder)),
            Err(PowerError::HandlerStopped)
        );
    }

    #[tokio::test]
    async fn test_post_after_stop_fails() {
        let recorder = Arc::new(Recorder::default());
        let handler = PowerHandler::new();
        handler.start(Arc::downgrade(&recorder)).unwrap();
        handler.stop();
        settle().await;

        assert_eq!(
            handler.post(PowerHandlerMessage::PowerStateChange),
            Err(PowerError::HandlerStopped)
        );
    }
}
