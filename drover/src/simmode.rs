//! Simulation lifecycle: spawn vehicles, begin play, end play.
//!
//! [`SimMode`] wires the pieces together. It spawns a [`SimVehicle`] per
//! configured vehicle, registers each API handle with the shared
//! [`ApiProvider`], partitions the fleet on [`begin_play`](SimMode::begin_play)
//! and hands the core-managed vehicles to a [`StepScheduler`]. Host-managed
//! vehicles stay parked here; they are never stepped.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::api::{
    ApiProvider, ProtocolRouter, RouterConfig, RouterError, RouterStopHandle, UdpTelemetrySink,
};
use crate::control::rc::InputHandle;
use crate::net::Endpoint;
use crate::partition::OwnershipPartition;
use crate::physics::create_engine;
use crate::runtime::scheduler::{SchedulerConfig, SchedulerError, StepScheduler, WorldContext};
use crate::settings::{ConfigError, Settings, VehicleSetting};
use crate::trace::{info, warn};
use crate::vehicle::api::{TelemetrySink, VehicleApi};
use crate::vehicle::class::{ClassRegistry, ProtocolClass, VehicleKind};
use crate::vehicle::kinematics::Vector3r;
use crate::vehicle::sim::{RenderHook, SimVehicle, VehicleSim};

/// Lifecycle failure.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Router(#[from] RouterError),
}

/// Owns the vehicles, the stepping scheduler and the protocol router.
pub struct SimMode {
    settings: Settings,
    provider: Arc<ApiProvider>,
    partition: OwnershipPartition,
    /// Vehicles waiting for the next `begin_play`.
    parked: Vec<Box<dyn VehicleSim>>,
    /// Host-managed vehicles of the current cycle.
    host: Vec<Box<dyn VehicleSim>>,
    inputs: BTreeMap<String, InputHandle>,
    /// Shared by every spawned vehicle when telemetry is configured.
    telemetry: Option<Arc<dyn TelemetrySink>>,
    scheduler: Option<StepScheduler>,
    router: Option<ProtocolRouter>,
}

impl SimMode {
    /// Spawns every vehicle in `settings` whose class `registry` supports.
    ///
    /// Unknown vehicle types and unsupported classes are logged and skipped,
    /// and so is a telemetry destination that cannot be set up.
    #[must_use]
    pub fn new(settings: Settings, registry: ClassRegistry) -> Self {
        let mut mode = Self {
            provider: Arc::new(ApiProvider::new(registry)),
            partition: OwnershipPartition::new(),
            parked: Vec::new(),
            host: Vec::new(),
            inputs: BTreeMap::new(),
            telemetry: telemetry_sink(&settings),
            scheduler: None,
            router: None,
            settings,
        };
        for (name, setting) in mode.settings.effective_vehicles() {
            if let Some(vehicle) = mode.spawn(&name, &setting) {
                mode.inputs.insert(name, vehicle.input());
                mode.provider.register(Arc::clone(vehicle.api()));
                mode.parked.push(Box::new(vehicle));
            }
        }
        info!(vehicles = mode.parked.len(), "vehicles spawned");
        mode
    }

    fn spawn(&self, name: &str, setting: &VehicleSetting) -> Option<SimVehicle> {
        let Some(kind) = VehicleKind::parse(&setting.vehicle_type) else {
            warn!(vehicle = name, vehicle_type = %setting.vehicle_type, "unknown vehicle type, not spawned");
            return None;
        };
        let Some(capabilities) = self.provider.registry().get(kind.class()).copied() else {
            warn!(vehicle = name, class = %kind.class(), "unsupported vehicle class, not spawned");
            return None;
        };
        let pawn_path = if setting.pawn_path.is_empty() {
            kind.default_pawn_path()
        } else {
            setting.pawn_path.as_str()
        };
        let vehicle = SimVehicle::new(
            name,
            Some(setting.vehicle_type.clone()),
            capabilities,
            setting.initial_kinematics(),
        )
        .with_pawn_path(pawn_path)
        .with_remote_control(setting.rc.remote_control_id);
        Some(match &self.telemetry {
            Some(sink) => vehicle.with_api(
                VehicleApi::new(name, capabilities.class).with_telemetry(Arc::clone(sink)),
            ),
            None => vehicle,
        })
    }

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<ApiProvider> {
        &self.provider
    }

    /// Input state of a spawned vehicle, for the keyboard/device layer.
    #[must_use]
    pub fn input(&self, name: &str) -> Option<InputHandle> {
        self.inputs.get(name).cloned()
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.scheduler.as_ref().is_some_and(StepScheduler::is_started)
    }

    /// Host-managed vehicles of the current cycle.
    #[must_use]
    pub fn host_vehicles(&self) -> &[Box<dyn VehicleSim>] {
        &self.host
    }

    #[must_use]
    pub fn scheduler(&self) -> Option<&StepScheduler> {
        self.scheduler.as_ref()
    }

    /// Builds the world on the first call of a cycle, then starts stepping.
    ///
    /// Further calls in the same cycle are no-ops once stepping runs.
    ///
    /// # Errors
    ///
    /// [`SimError::Config`] for an unrecognized physics engine and
    /// [`SimError::Scheduler`] if stepping cannot start (including an empty
    /// engine name).
    pub fn begin_play(&mut self) -> Result<(), SimError> {
        if self.scheduler.is_none() {
            let engine = create_engine(&self.settings)?;
            let split = self.partition.split(std::mem::take(&mut self.parked));
            info!(core = split.core.len(), host = split.host.len(), "vehicles partitioned");
            self.host = split.host;
            let world = WorldContext::new(split.core, engine);
            self.scheduler = Some(StepScheduler::new(
                world,
                SchedulerConfig::from_settings(&self.settings),
            ));
        }
        if let Some(scheduler) = &self.scheduler
            && !scheduler.is_started()
        {
            scheduler.start()?;
        }
        Ok(())
    }

    /// Stops the API server and stepping, drops the world and parks the
    /// vehicles for the next cycle.
    pub fn end_play(&mut self) {
        self.stop_api_server();
        self.partition.teardown();
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop();
            self.parked = scheduler.with_world(WorldContext::take_vehicles);
        }
        self.parked.append(&mut self.host);
        info!("play ended");
    }

    /// Adds a vehicle after spawning, e.g. one placed by the host.
    ///
    /// Its API becomes reachable at once. While playing, a core-managed
    /// vehicle joins the stepping world and a host-managed one is skipped.
    pub fn register_vehicle(&mut self, vehicle: Box<dyn VehicleSim>) {
        self.provider.register(Arc::clone(vehicle.api()));
        match &self.scheduler {
            Some(scheduler) => {
                if self.partition.admits(vehicle.as_ref()) {
                    scheduler.add_vehicle(vehicle);
                } else {
                    self.host.push(vehicle);
                }
            }
            None => self.parked.push(vehicle),
        }
    }

    fn running(&self) -> Result<&StepScheduler, SchedulerError> {
        self.scheduler.as_ref().ok_or(SchedulerError::NotStarted)
    }

    /// # Errors
    ///
    /// See [`StepScheduler::pause`].
    pub fn pause(&self, paused: bool) -> Result<(), SimError> {
        Ok(self.running()?.pause(paused)?)
    }

    /// # Errors
    ///
    /// See [`StepScheduler::is_paused`].
    pub fn is_paused(&self) -> Result<bool, SimError> {
        Ok(self.running()?.is_paused()?)
    }

    /// # Errors
    ///
    /// See [`StepScheduler::continue_for_time`].
    pub fn continue_for_time(&self, seconds: f64) -> Result<(), SimError> {
        Ok(self.running()?.continue_for_time(seconds)?)
    }

    /// # Errors
    ///
    /// See [`StepScheduler::continue_for_frames`].
    pub fn continue_for_frames(&self, frames: u32) -> Result<(), SimError> {
        Ok(self.running()?.continue_for_frames(frames)?)
    }

    /// Resets core-managed vehicles and the physics engine. No-op before play.
    pub fn reset(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.reset();
        }
    }

    #[must_use]
    pub fn debug_report(&self) -> String {
        self.scheduler
            .as_ref()
            .map(StepScheduler::debug_report)
            .unwrap_or_default()
    }

    pub fn set_wind(&self, wind: Vector3r) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.set_wind(wind);
        }
    }

    pub fn set_ext_force(&self, force: Vector3r) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.set_ext_force(force);
        }
    }

    /// One render-thread frame; see [`StepScheduler::render_tick`].
    pub fn render_tick(&self, dt: f32, hook: &mut dyn RenderHook) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.render_tick(dt, hook);
        }
    }

    /// Starts the protocol router, one server per supported class.
    ///
    /// With `blocking` this returns after a stop handle fires, with every
    /// server stopped.
    ///
    /// # Errors
    ///
    /// [`SimError::Router`] for a bad address or a bind failure.
    pub fn start_api_server(&mut self, blocking: bool) -> Result<(), SimError> {
        let threads = self.settings.api_server_threads;
        let router = match self.router.take() {
            Some(router) => router,
            None => ProtocolRouter::new(
                RouterConfig::from_settings(&self.settings),
                Arc::clone(&self.provider),
            )?,
        };
        let router = self.router.insert(router);
        router.start(blocking, threads)?;
        if blocking {
            router.stop();
        }
        Ok(())
    }

    /// Stops every protocol server. Idempotent.
    pub fn stop_api_server(&mut self) {
        if let Some(mut router) = self.router.take() {
            router.stop();
        }
    }

    /// Stop handle for the router; `None` until the API server is created.
    #[must_use]
    pub fn api_stop_handle(&self) -> Option<RouterStopHandle> {
        self.router.as_ref().map(ProtocolRouter::stop_handle)
    }

    /// Endpoint serving each protocol class while the API server runs.
    #[must_use]
    pub fn api_endpoints(&self) -> Vec<(ProtocolClass, Endpoint)> {
        self.router
            .as_ref()
            .map(ProtocolRouter::endpoints)
            .unwrap_or_default()
    }
}

fn telemetry_sink(settings: &Settings) -> Option<Arc<dyn TelemetrySink>> {
    let destination = match settings.telemetry_endpoint() {
        Ok(destination) => destination?,
        Err(e) => {
            warn!(address = %settings.telemetry_address, error = %e, "bad telemetry address, telemetry disabled");
            return None;
        }
    };
    match UdpTelemetrySink::connect(destination) {
        Ok(sink) => Some(Arc::new(sink)),
        Err(e) => {
            warn!(%destination, error = %e, "telemetry socket unavailable, telemetry disabled");
            None
        }
    }
}

impl Drop for SimMode {
    fn drop(&mut self) {
        self.end_play();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::class::VehicleClass;

    fn settings(json: &str) -> Settings {
        Settings::from_json_str(json).unwrap()
    }

    #[test]
    fn spawns_configured_vehicles_and_skips_unknown_types() {
        let mode = SimMode::new(
            settings(
                r#"{
                    "Vehicles": {
                        "drone": { "VehicleType": "SimpleFlight", "Z": -2.0 },
                        "husky": { "VehicleType": "CPHusky" },
                        "tractor": { "VehicleType": "Tractor" }
                    }
                }"#,
            ),
            ClassRegistry::standard(),
        );
        assert!(mode.provider().get("drone").is_some());
        assert!(mode.provider().get("husky").is_some());
        assert!(mode.provider().get("tractor").is_none());
        assert!(mode.input("drone").is_some());
    }

    #[test]
    fn unsupported_class_is_not_spawned() {
        let mut registry = ClassRegistry::standard();
        registry.unregister(VehicleClass::Car);
        let mode = SimMode::new(
            settings(r#"{ "Vehicles": { "car": { "VehicleType": "PhysXCar" } } }"#),
            registry,
        );
        assert!(mode.provider().get("car").is_none());
    }

    #[test]
    fn default_vehicle_when_none_configured() {
        let mode = SimMode::new(settings("{}"), ClassRegistry::standard());
        assert!(mode.provider().get("SimpleFlight").is_some());
    }

    #[test]
    fn begin_play_partitions_and_end_play_parks() {
        let mut mode = SimMode::new(
            settings(
                r#"{
                    "CpuPinning": "Disabled",
                    "Vehicles": {
                        "drone": { "VehicleType": "PX4Multirotor" },
                        "car": { "VehicleType": "PhysXCar" }
                    }
                }"#,
            ),
            ClassRegistry::standard(),
        );
        mode.begin_play().unwrap();
        mode.begin_play().unwrap();
        assert!(mode.is_playing());
        assert_eq!(mode.host_vehicles().len(), 1);
        let core = mode
            .scheduler()
            .unwrap()
            .with_world(|w| w.vehicles().len());
        assert_eq!(core, 1);

        mode.end_play();
        assert!(!mode.is_playing());
        assert!(mode.host_vehicles().is_empty());
        assert!(mode.pause(true).is_err());
    }

    #[test]
    fn unrecognized_engine_fails_before_start() {
        let mut mode = SimMode::new(
            settings(r#"{ "PhysicsEngineName": "Havok" }"#),
            ClassRegistry::standard(),
        );
        assert!(matches!(
            mode.begin_play(),
            Err(SimError::Config(ConfigError::UnrecognizedPhysicsEngine(_)))
        ));
        assert!(!mode.is_playing());
    }
}
