//! # User HAL Metrics
//!
//! Prometheus metrics for the request/response correlator.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! cs-01-user-hal = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `user_hal_requests_total` - Requests issued, by kind
//! - `user_hal_responses_total` - Terminal callback statuses, by kind and status
//! - `user_hal_dropped_events_total` - Events that matched no pending request

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Requests issued, labeled by kind
    pub static ref REQUESTS: IntCounterVec = register_int_counter_vec!(
        "user_hal_requests_total",
        "Total number of correlated user HAL requests issued",
        &["kind"]
    )
    .expect("Failed to create REQUESTS metric");

    /// Terminal statuses, labeled by kind and status
    pub static ref RESPONSES: IntCounterVec = register_int_counter_vec!(
        "user_hal_responses_total",
        "Total number of user HAL callbacks resolved",
        &["kind", "status"]
    )
    .expect("Failed to create RESPONSES metric");

    /// Events dropped for lack of a pending request
    pub static ref DROPPED_EVENTS: IntCounter = register_int_counter!(
        "user_hal_dropped_events_total",
        "Total number of user HAL events with no pending request"
    )
    .expect("Failed to create DROPPED_EVENTS metric");
}

/// Record a request issued
#[cfg(feature = "metrics")]
pub fn record_request(kind: &str) {
    REQUESTS.with_label_values(&[kind]).inc();
}

/// Record a callback resolved
#[cfg(feature = "metrics")]
pub fn record_response(kind: &str, status: &str) {
    RESPONSES.with_label_values(&[kind, status]).inc();
}

/// Record an event dropped
#[cfg(feature = "metrics")]
pub fn record_dropped_event() {
    DROPPED_EVENTS.inc();
}

#[cfg(not(feature = "metrics"))]
pub fn record_request(_kind: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_response(_kind: &str, _status: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_dropped_event() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_noop_when_disabled() {
        record_request("switch_user");
        record_response("switch_user", "STATUS_OK");
        record_dropped_event();
    }
}
