//! Simulated vehicles as seen by the stepping loop.

use std::sync::Arc;

use crate::control::arbiter::{Arbitration, ControlArbiter};
use crate::control::rc::{InputHandle, input_handle};
use crate::physics::{Body, PhysicsEngine};
use crate::report::StateReporter;

use super::api::{CarState, VehicleApi};
use super::class::{Capabilities, VehicleClass};
use super::controls::ControlFrame;
use super::kinematics::Kinematics;

/// Redline used for the synthetic engine readout.
pub const MAX_RPM: f32 = 7500.0;

/// A vehicle the world context can step, reset and report on.
///
/// Core-managed vehicles get [`update`](Self::update) every tick; host-managed
/// vehicles only ever see [`reset`](Self::reset).
pub trait VehicleSim: Send {
    fn name(&self) -> &str;

    /// Settings `VehicleType`, `None` for vehicles spawned outside settings.
    fn vehicle_type(&self) -> Option<&str>;

    fn class(&self) -> VehicleClass;

    fn api(&self) -> &Arc<VehicleApi>;

    fn kinematics(&self) -> Kinematics;

    /// Arbitrates this tick's controls and advances the body by `dt` seconds.
    fn update(&mut self, dt: f32, engine: &mut dyn PhysicsEngine);

    /// Restores the spawn state.
    fn reset(&mut self);

    fn report_state(&self, reporter: &mut StateReporter);

    /// Collects what the renderer needs for this frame.
    fn update_rendered_state(&mut self, dt: f32) -> RenderedState;
}

/// Snapshot taken under the world lock and consumed outside it.
#[derive(Debug, Clone)]
pub struct RenderedState {
    pub vehicle: String,
    pub kinematics: Kinematics,
    pub controls: ControlFrame,
    pub status_messages: Vec<String>,
    pub api: Arc<VehicleApi>,
    pub dt: f32,
}

/// Rendering callback run once per vehicle per render tick, outside the
/// world lock.
pub trait RenderHook {
    fn on_rendered(&mut self, state: &RenderedState);
}

impl<F> RenderHook for F
where
    F: FnMut(&RenderedState),
{
    fn on_rendered(&mut self, state: &RenderedState) {
        self(state);
    }
}

/// The built-in vehicle: arbitration plus a physics body.
#[derive(Debug)]
pub struct SimVehicle {
    name: String,
    vehicle_type: Option<String>,
    pawn_path: String,
    capabilities: Capabilities,
    api: Arc<VehicleApi>,
    input: InputHandle,
    arbiter: ControlArbiter,
    body: Body,
    applied: ControlFrame,
    remote_control_id: i32,
    last_outcome: Option<Arbitration>,
}

impl SimVehicle {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        vehicle_type: Option<String>,
        capabilities: Capabilities,
        initial: Kinematics,
    ) -> Self {
        let name = name.into();
        let api = Arc::new(VehicleApi::new(name.clone(), capabilities.class));
        api.publish_step(initial, CarState::default());
        Self {
            name,
            vehicle_type,
            pawn_path: String::new(),
            body: Body::new(initial, &capabilities),
            capabilities,
            api,
            input: input_handle(),
            arbiter: ControlArbiter::new(),
            applied: ControlFrame::default(),
            remote_control_id: -1,
            last_outcome: None,
        }
    }

    /// Replaces the API handle, e.g. one carrying a telemetry sink.
    ///
    /// The new handle starts from the published kinematics of the old one.
    #[must_use]
    pub fn with_api(mut self, api: VehicleApi) -> Self {
        api.publish_step(self.api.state().kinematics, self.api.car_state());
        self.api = Arc::new(api);
        self
    }

    /// Binds a remote-control device index; negative disables RC forwarding.
    #[must_use]
    pub const fn with_remote_control(mut self, id: i32) -> Self {
        self.remote_control_id = id;
        self
    }

    #[must_use]
    pub fn with_pawn_path(mut self, pawn_path: impl Into<String>) -> Self {
        self.pawn_path = pawn_path.into();
        self
    }

    /// Shared input state fed by the keyboard/device layer.
    #[must_use]
    pub fn input(&self) -> InputHandle {
        Arc::clone(&self.input)
    }

    #[must_use]
    pub fn pawn_path(&self) -> &str {
        &self.pawn_path
    }

    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Frame applied on the last tick.
    #[must_use]
    pub const fn applied_controls(&self) -> ControlFrame {
        self.applied
    }

    #[must_use]
    pub const fn last_arbitration(&self) -> Option<Arbitration> {
        self.last_outcome
    }

    fn car_state(&self) -> CarState {
        let speed = self.body.kinematics.ground_speed();
        let gear = if self.applied.is_manual_gear {
            self.applied.manual_gear
        } else {
            i32::from(speed > 0.0)
        };
        CarState {
            speed,
            gear,
            rpm: self.applied.throttle.abs() * MAX_RPM,
            max_rpm: MAX_RPM,
            handbrake: self.applied.handbrake,
        }
    }
}

impl VehicleSim for SimVehicle {
    fn name(&self) -> &str {
        &self.name
    }

    fn vehicle_type(&self) -> Option<&str> {
        self.vehicle_type.as_deref()
    }

    fn class(&self) -> VehicleClass {
        self.capabilities.class
    }

    fn api(&self) -> &Arc<VehicleApi> {
        &self.api
    }

    fn kinematics(&self) -> Kinematics {
        self.body.kinematics
    }

    fn update(&mut self, dt: f32, engine: &mut dyn PhysicsEngine) {
        let outcome = {
            let mut input = self.input.lock();
            self.arbiter.arbitrate(&self.api, &mut input)
        };
        self.applied = outcome.frame();
        self.last_outcome = Some(outcome);

        engine.update_body(&mut self.body, &self.applied, dt);
        self.api.publish_step(self.body.kinematics, self.car_state());
    }

    fn reset(&mut self) {
        self.body.reset();
        self.arbiter.reset();
        self.applied = ControlFrame::default();
        self.last_outcome = None;
        self.api.reset();
        self.api.publish_step(self.body.kinematics, CarState::default());
    }

    fn report_state(&self, reporter: &mut StateReporter) {
        let k = &self.body.kinematics;
        reporter.write_heading(&self.name, 0);
        reporter.write_value("class", self.capabilities.class);
        reporter.write_vector("position", &k.position);
        reporter.write_vector("velocity", &k.linear_velocity);
        reporter.write_value("yaw", format_args!("{:.3}", k.yaw));
        reporter.write_value("throttle", format_args!("{:.3}", self.applied.throttle));
        reporter.write_value("steering", format_args!("{:.3}", self.applied.steering));
        if let Some(source) = self.arbiter.last_source() {
            reporter.write_value("control", source);
        }
    }

    fn update_rendered_state(&mut self, dt: f32) -> RenderedState {
        if self.remote_control_id >= 0 {
            let rc = self.input.lock().device.clone();
            self.api.set_rc_data(rc);
        }
        RenderedState {
            vehicle: self.name.clone(),
            kinematics: self.body.kinematics,
            controls: self.applied,
            status_messages: self.api.take_status_messages(),
            api: Arc::clone(&self.api),
            dt,
        }
    }
}
