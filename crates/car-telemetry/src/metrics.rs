//! Prometheus metrics for the car service runtime.
//!
//! All metrics follow the naming convention: `car_<component>_<metric>_<unit>`.
//! Component crates register their own counters behind their `metrics`
//! feature; this module owns the runtime-level ones.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Vehicle HAL events routed to services, by property name
    pub static ref HAL_EVENTS_ROUTED: IntCounterVec = IntCounterVec::new(
        Opts::new("car_vhal_events_routed_total", "Vehicle HAL events routed to services"),
        &["property"]
    ).expect("metric creation failed");

    /// Vehicle HAL events nobody owned
    pub static ref HAL_EVENTS_UNROUTED: IntCounter = IntCounter::new(
        "car_vhal_events_unrouted_total",
        "Vehicle HAL events for properties no service claimed"
    ).expect("metric creation failed");

    /// Services started by the runtime
    pub static ref SERVICES_RUNNING: IntGauge = IntGauge::new(
        "car_runtime_services_running",
        "Number of car services currently running"
    ).expect("metric creation failed");

    /// Errors by component and type
    pub static ref COMPONENT_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("car_component_errors_total", "Errors by component and type"),
        &["component", "error_type"]
    ).expect("metric creation failed");
}

/// Register the runtime metrics with the global registry.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HAL_EVENTS_ROUTED.clone()),
        Box::new(HAL_EVENTS_UNROUTED.clone()),
        Box::new(SERVICES_RUNNING.clone()),
        Box::new(COMPONENT_ERRORS.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }
    Ok(())
}

/// Encode the global registry and the default prometheus registry as text.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let mut metric_families = REGISTRY.gather();
    metric_families.extend(prometheus::gather());
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
