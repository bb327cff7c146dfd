//! # Car Telemetry
//!
//! Logging and metrics setup shared by the car service binaries.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use car_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_telemetry(&TelemetryConfig::from_env())?;
//!     // Logs and metrics are now being collected
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CAR_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter |
//! | `CAR_JSON_LOGS` | `false` | JSON formatted logs |
//! | `CAR_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `CAR_METRICS_ENABLED` | `true` | Register Prometheus metrics |

mod config;
mod logging;
pub mod metrics;

pub use config::{parse_flag, TelemetryConfig};
pub use logging::{env_filter, init_logging};
pub use metrics::{encode_metrics, register_metrics, REGISTRY};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Register metrics (when enabled) and install the logging subscriber.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    if config.metrics_enabled {
        register_metrics()?;
    }
    init_logging(config)
}

/// Create a span carrying the component name.
///
/// # Example
///
/// ```rust,ignore
/// let _span = car_telemetry::component_span!("power", state = "ON").entered();
/// ```
#[macro_export]
macro_rules! component_span {
    ($component:expr $(, $($field:tt)*)?) => {
        tracing::info_span!("component", component = $component $(, $($field)*)?)
    };
}
