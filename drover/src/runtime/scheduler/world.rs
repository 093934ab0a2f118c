//! Everything the stepping lock protects.

use crate::physics::PhysicsEngine;
use crate::report::StateReporter;
use crate::vehicle::kinematics::Vector3r;
use crate::vehicle::sim::{RenderedState, VehicleSim};

/// Core-managed vehicles, the physics engine and the aggregated report.
pub struct WorldContext {
    vehicles: Vec<Box<dyn VehicleSim>>,
    engine: Option<Box<dyn PhysicsEngine>>,
    reporter: StateReporter,
    report_enabled: bool,
    /// Report text as of the last aggregation.
    last_report: String,
}

impl WorldContext {
    #[must_use]
    pub fn new(vehicles: Vec<Box<dyn VehicleSim>>, engine: Option<Box<dyn PhysicsEngine>>) -> Self {
        Self {
            vehicles,
            engine,
            reporter: StateReporter::new(),
            report_enabled: false,
            last_report: String::new(),
        }
    }

    #[must_use]
    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    #[must_use]
    pub fn engine_name(&self) -> Option<&'static str> {
        self.engine.as_ref().map(|e| e.name())
    }

    #[must_use]
    pub fn vehicles(&self) -> &[Box<dyn VehicleSim>] {
        &self.vehicles
    }

    pub fn add_vehicle(&mut self, vehicle: Box<dyn VehicleSim>) {
        self.vehicles.push(vehicle);
    }

    /// Moves every vehicle out, leaving the world empty.
    pub fn take_vehicles(&mut self) -> Vec<Box<dyn VehicleSim>> {
        std::mem::take(&mut self.vehicles)
    }

    pub fn set_report_enabled(&mut self, enabled: bool) {
        self.report_enabled = enabled;
    }

    /// One physics tick: arbitrate and step every vehicle, then aggregate the
    /// report.
    pub fn tick(&mut self, dt: f32) {
        if let Some(engine) = self.engine.as_deref_mut() {
            for vehicle in &mut self.vehicles {
                vehicle.update(dt, engine);
            }
        }
        self.update_state_report();
    }

    /// Rebuilds the report if reporting is enabled.
    pub fn update_state_report(&mut self) {
        if !self.report_enabled {
            return;
        }
        self.reporter.clear();
        for vehicle in &self.vehicles {
            vehicle.report_state(&mut self.reporter);
        }
        self.last_report.clear();
        self.last_report.push_str(self.reporter.output());
    }

    #[must_use]
    pub fn debug_report(&self) -> &str {
        &self.last_report
    }

    /// Resets the engine and every vehicle to its spawn state.
    pub fn reset(&mut self) {
        if let Some(engine) = self.engine.as_deref_mut() {
            engine.reset();
        }
        for vehicle in &mut self.vehicles {
            vehicle.reset();
        }
    }

    pub fn set_wind(&mut self, wind: Vector3r) {
        if let Some(engine) = self.engine.as_deref_mut() {
            engine.set_wind(wind);
        }
    }

    pub fn set_ext_force(&mut self, force: Vector3r) {
        if let Some(engine) = self.engine.as_deref_mut() {
            engine.set_ext_force(force);
        }
    }

    /// Snapshots taken for the render phase.
    pub fn rendered_states(&mut self, dt: f32) -> Vec<RenderedState> {
        self.vehicles
            .iter_mut()
            .map(|vehicle| vehicle.update_rendered_state(dt))
            .collect()
    }
}
