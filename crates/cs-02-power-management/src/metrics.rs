//! # Power Management Metrics
//!
//! Prometheus metrics for the power state machine.
//!
//! ## Metrics Exported
//!
//! - `car_power_state_transitions_total` - Applied transitions, by target state
//! - `car_power_listener_deaths_total` - Listeners removed because they were unreachable
//! - `car_power_suspend_failures_total` - Deep sleep attempts that fell back to shutdown
//! - `car_power_shutdown_postpones_total` - Postpone requests sent while preparing
//! - `car_power_superseded_states_total` - Requests replaced before they were handled

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Applied transitions, labeled by target state
    pub static ref STATE_TRANSITIONS: IntCounterVec = register_int_counter_vec!(
        "car_power_state_transitions_total",
        "Total number of power state transitions applied",
        &["state"]
    )
    .expect("Failed to create STATE_TRANSITIONS metric");

    /// Listeners removed after a failed callback or death notice
    pub static ref LISTENER_DEATHS: IntCounter = register_int_counter!(
        "car_power_listener_deaths_total",
        "Total number of power state listeners removed as dead"
    )
    .expect("Failed to create LISTENER_DEATHS metric");

    /// Suspend attempts that ended in shutdown
    pub static ref SUSPEND_FAILURES: IntCounter = register_int_counter!(
        "car_power_suspend_failures_total",
        "Total number of failed deep sleep entries"
    )
    .expect("Failed to create SUSPEND_FAILURES metric");

    /// Postpone requests sent to the vehicle
    pub static ref SHUTDOWN_POSTPONES: IntCounter = register_int_counter!(
        "car_power_shutdown_postpones_total",
        "Total number of shutdown postpone requests sent"
    )
    .expect("Failed to create SHUTDOWN_POSTPONES metric");

    /// Requested states replaced by a newer request
    pub static ref SUPERSEDED_STATES: IntCounter = register_int_counter!(
        "car_power_superseded_states_total",
        "Total number of power state requests superseded before processing"
    )
    .expect("Failed to create SUPERSEDED_STATES metric");
}

/// Record an applied transition
#[cfg(feature = "metrics")]
pub fn record_transition(state: &str) {
    STATE_TRANSITIONS.with_label_values(&[state]).inc();
}

/// Record a dead listener
#[cfg(feature = "metrics")]
pub fn record_listener_death() {
    LISTENER_DEATHS.inc();
}

/// Record a failed suspend
#[cfg(feature = "metrics")]
pub fn record_suspend_failure() {
    SUSPEND_FAILURES.inc();
}

/// Record a polling tick that asked for more time
#[cfg(feature = "metrics")]
pub fn record_polling_tick() {
    SHUTDOWN_POSTPONES.inc();
}

/// Record a request replaced before the handler took it
#[cfg(feature = "metrics")]
pub fn record_superseded_state() {
    SUPERSEDED_STATES.inc();
}

#[cfg(not(feature = "metrics"))]
pub fn record_transition(_state: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_listener_death() {}

#[cfg(not(feature = "metrics"))]
pub fn record_suspend_failure() {}

#[cfg(not(feature = "metrics"))]
pub fn record_polling_tick() {}

#[cfg(not(feature = "metrics"))]
pub fn record_superseded_state() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_noop_when_disabled() {
        record_transition("ON");
        record_listener_death();
        record_suspend_failure();
        record_polling_tick();
        record_superseded_state();
    }
}
