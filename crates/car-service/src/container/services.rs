//! # Service Container
//!
//! Builds every service, wires the ports to their adapters and owns the
//! result for the lifetime of the runtime.
//!
//! ## Startup Order
//!
//! ```text
//! Phase 1: Vehicle      InMemoryPropertyBus + SimulatedVehicle
//! Phase 2: HAL          VehicleHal → UserHalService, PowerHalService (take + subscribe)
//! Phase 3: Power        CarPowerManagementService (needs taken power properties)
//! Phase 4: Registry     typed lookup for the binary and tests
//! ```
//!
//! ## Teardown
//!
//! Power management first (stops the handler and timers), then the HAL
//! services and the client dispatcher, then the registry.

use std::sync::Arc;

use anyhow::{Context, Result};
use cs_01_user_hal::UserHalService;
use cs_02_power_management::{CarPowerManagementService, PowerHalService, UserHalGateway};
use tracing::{info, instrument};
use vhal_bus::{HalServiceBase, InMemoryPropertyBus};

use crate::adapters::{
    vehicle_prop_configs, LocalUserManager, SimulatedSystem, SimulatedVehicle,
    UserHalGatewayAdapter,
};
use crate::container::config::CarServiceConfig;
use crate::registry::ServiceRegistry;
use crate::wiring::VehicleHal;

/// Every running service, wired.
pub struct CarServiceContainer {
    /// Configuration the container was built from.
    pub config: CarServiceConfig,
    registry: ServiceRegistry,
    bus: Arc<InMemoryPropertyBus>,
    vehicle: Arc<SimulatedVehicle>,
    vehicle_hal: VehicleHal,
    system: Arc<SimulatedSystem>,
    users: Arc<LocalUserManager>,
    user_hal: UserHalService,
    power: CarPowerManagementService,
}

impl CarServiceContainer {
    /// Build and start all services against the simulated vehicle.
    #[instrument(skip_all, name = "container_start")]
    pub async fn start(config: CarServiceConfig) -> Result<Self> {
        // =====================================================================
        // PHASE 1: Vehicle
        // =====================================================================
        let bus = Arc::new(InMemoryPropertyBus::new(vehicle_prop_configs(&config.vehicle)));
        let vehicle = SimulatedVehicle::attach(&bus, config.vehicle.clone());

        // =====================================================================
        // PHASE 2: HAL services
        // =====================================================================
        let vehicle_hal = VehicleHal::new(bus.clone(), config.hal.retry_policy());
        let user_hal = UserHalService::new(vehicle_hal.channel());
        let power_hal = Arc::new(PowerHalService::new(vehicle_hal.channel()));
        let hal_services: Vec<Arc<dyn HalServiceBase>> =
            vec![Arc::new(user_hal.clone()), power_hal.clone()];
        let subscribed = vehicle_hal
            .init(hal_services)
            .await
            .context("Failed to subscribe to vehicle properties")?;
        info!(subscribed, "Phase 2: HAL services bound");

        // =====================================================================
        // PHASE 3: Power management
        // =====================================================================
        let system = Arc::new(SimulatedSystem::new(
            config.vehicle.system_supports_deep_sleep,
        ));
        let users = Arc::new(LocalUserManager::new(&config.users));
        let gateway: Arc<dyn UserHalGateway> =
            Arc::new(UserHalGatewayAdapter::new(user_hal.clone(), users.clone()));
        let power = CarPowerManagementService::new(
            config.power.clone(),
            power_hal.clone(),
            system.clone(),
            users.clone(),
            Some(gateway),
        );
        power
            .init()
            .context("Failed to start car power management")?;
        info!("Phase 3: power management started");

        // =====================================================================
        // PHASE 4: Registry
        // =====================================================================
        let registry = ServiceRegistry::new();
        registry.register(Arc::new(user_hal.clone()));
        registry.register(Arc::new(power.clone()));
        registry.register(power_hal);
        registry.register(vehicle.clone());
        registry.register(system.clone());
        registry.register(users.clone());
        car_telemetry::metrics::SERVICES_RUNNING.set(registry.len() as i64);
        info!(services = ?registry.names(), "Phase 4: services registered");

        Ok(Self {
            config,
            registry,
            bus,
            vehicle,
            vehicle_hal,
            system,
            users,
            user_hal,
            power,
        })
    }

    /// Typed lookup of the running services.
    #[must_use]
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    #[must_use]
    pub fn power(&self) -> &CarPowerManagementService {
        &self.power
    }

    #[must_use]
    pub fn user_hal(&self) -> &UserHalService {
        &self.user_hal
    }

    #[must_use]
    pub fn vehicle(&self) -> &Arc<SimulatedVehicle> {
        &self.vehicle
    }

    #[must_use]
    pub fn system(&self) -> &Arc<SimulatedSystem> {
        &self.system
    }

    #[must_use]
    pub fn users(&self) -> &Arc<LocalUserManager> {
        &self.users
    }

    /// The bus the vehicle and the head unit share.
    #[must_use]
    pub fn bus(&self) -> &Arc<InMemoryPropertyBus> {
        &self.bus
    }

    /// Stop every service. Safe to call more than once.
    pub fn shutdown(&self) {
        info!("Stopping car services");
        self.power.release();
        self.vehicle_hal.release();
        self.registry.clear();
        car_telemetry::metrics::SERVICES_RUNNING.set(0);
    }
}
