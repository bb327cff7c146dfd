//! # Car Service
//!
//! Runs user HAL correlation and car power management against the simulated
//! vehicle.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (defaults, `CAR_CONFIG_FILE`, `CAR_*` variables)
//! 2. Initialize logging and metrics
//! 3. Start the service container
//! 4. Run until the system powers off or Ctrl+C
//!
//! ## Ctrl+C
//!
//! The vehicle is asked for an immediate shutdown so listeners still get
//! SHUTDOWN_PREPARE; the process exits once power management shuts the
//! system down, or after a grace period.

use std::time::Duration;

use anyhow::{Context, Result};
use car_service::adapters::SystemExit;
use car_service::{CarServiceConfig, CarServiceContainer};
use car_telemetry::{component_span, encode_metrics, init_telemetry};
use car_types::{shutdown_param, VehicleApPowerStateReq};
use tokio::sync::watch;
use tracing::{debug, info, warn, Instrument};

/// How long a Ctrl+C shutdown may take before the process just exits.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

async fn wait_for_exit(exit: &mut watch::Receiver<Option<SystemExit>>) -> Option<SystemExit> {
    loop {
        if let Some(reason) = exit.borrow_and_update().clone() {
            return Some(reason);
        }
        if exit.changed().await.is_err() {
            return None;
        }
    }
}

async fn run(config: CarServiceConfig) -> Result<()> {
    let container = CarServiceContainer::start(config).await?;
    let mut exit = container.system().exit_signal();

    info!("Car service is running. Press Ctrl+C to stop.");
    let reason = tokio::select! {
        reason = wait_for_exit(&mut exit) => reason,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Ctrl+C received, requesting shutdown from the vehicle");
            container.vehicle().request_power_state(
                VehicleApPowerStateReq::ShutdownPrepare,
                shutdown_param::SHUTDOWN_IMMEDIATELY,
            );
            match tokio::time::timeout(SHUTDOWN_GRACE, wait_for_exit(&mut exit)).await {
                Ok(reason) => reason,
                Err(_) => {
                    warn!(grace_secs = SHUTDOWN_GRACE.as_secs(), "Shutdown did not complete in time");
                    None
                }
            }
        }
    };
    info!(?reason, "System stopped");

    container.shutdown();
    match encode_metrics() {
        Ok(text) => debug!(metrics = %text, "Final metrics"),
        Err(err) => warn!(error = %err, "Failed to encode metrics"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = CarServiceConfig::from_env().context("Failed to load configuration")?;
    init_telemetry(&config.telemetry).context("Failed to initialize telemetry")?;

    let span = component_span!("car-service", service = %config.telemetry.service_name);
    run(config).instrument(span).await
}
