//! Awaitable adapter for [`HalCallback`].

use car_types::{HalCallback, HalCallbackStatus};
use tokio::sync::oneshot;

/// What a callback was resolved with.
pub type CallbackResult<R> = (HalCallbackStatus, Option<R>);

/// Build a callback whose result can be awaited on the returned receiver.
///
/// If the callback is dropped unresolved (service released), the receiver
/// yields `RecvError`.
#[must_use]
pub fn callback_channel<R: Send + 'static>(
) -> (HalCallback<R>, oneshot::Receiver<CallbackResult<R>>) {
    let (tx, rx) = oneshot::channel();
    let callback: HalCallback<R> = Box::new(move |status, response| {
        // Receiver may be gone if the caller stopped waiting
        let _ = tx.send((status, response));
    });
    (callback, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_callback_result_is_received() {
        let (callback, rx) = callback_channel::<i32>();
        callback(HalCallbackStatus::Ok, Some(7));
        assert_eq!(rx.await.unwrap(), (HalCallbackStatus::Ok, Some(7)));
    }

    #[tokio::test]
    async fn test_dropped_callback_closes_receiver() {
        let (callback, rx) = callback_channel::<i32>();
        drop(callback);
        assert!(rx.await.is_err());
    }
}
