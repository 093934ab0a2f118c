//! API-visible vehicle state.
//!
//! A [`VehicleApi`] is shared between the stepping thread (which reads API
//! commands and publishes the applied controls and kinematics) and the
//! protocol server threads (which write commands and read telemetry). It has
//! its own small lock and is never guarded by the world lock, so a command
//! arriving mid-tick simply waits in here until the next tick reads it.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::control::rc::RcData;

use super::class::VehicleClass;
use super::controls::ControlFrame;
use super::kinematics::Kinematics;

/// Drive-train readout used for telemetry and force feedback.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CarState {
    /// Ground speed in metres per second.
    pub speed: f32,
    pub gear: i32,
    pub rpm: f32,
    pub max_rpm: f32,
    pub handbrake: bool,
}

/// Snapshot returned to telemetry observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub name: String,
    pub class: VehicleClass,
    pub api_control_enabled: bool,
    /// Last applied controls (API-sourced or written back by arbitration).
    pub controls: ControlFrame,
    pub car: CarState,
    pub kinematics: Kinematics,
}

/// Failure while sending telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to encode telemetry: {0}")]
    Encode(#[from] postcard::Error),
    #[error("failed to send telemetry: {0}")]
    Send(#[from] std::io::Error),
}

/// Destination for per-frame vehicle telemetry.
pub trait TelemetrySink: Send + Sync {
    /// Publishes one state sample.
    ///
    /// # Errors
    ///
    /// Implementations return [`TelemetryError`] on encode or transport
    /// failure; callers log it and carry on.
    fn send(&self, state: &VehicleState, dt: f32) -> Result<(), TelemetryError>;
}

#[derive(Debug, Default)]
struct ApiState {
    api_control_enabled: bool,
    controls: ControlFrame,
    car: CarState,
    kinematics: Kinematics,
    rc_data: Option<RcData>,
    status_messages: Vec<String>,
}

/// Shared handle to one vehicle's API-visible state.
pub struct VehicleApi {
    name: String,
    class: VehicleClass,
    state: Mutex<ApiState>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl VehicleApi {
    #[must_use]
    pub fn new(name: impl Into<String>, class: VehicleClass) -> Self {
        Self {
            name: name.into(),
            class,
            state: Mutex::new(ApiState::default()),
            telemetry: None,
        }
    }

    /// Attaches a telemetry sink.
    #[must_use]
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runtime class recorded when the vehicle was instantiated.
    #[must_use]
    pub const fn class(&self) -> VehicleClass {
        self.class
    }

    pub fn enable_api_control(&self, enabled: bool) {
        self.state.lock().api_control_enabled = enabled;
    }

    #[must_use]
    pub fn is_api_control_enabled(&self) -> bool {
        self.state.lock().api_control_enabled
    }

    pub fn set_controls(&self, controls: ControlFrame) {
        self.state.lock().controls = controls;
    }

    #[must_use]
    pub fn controls(&self) -> ControlFrame {
        self.state.lock().controls
    }

    /// Reads the API control flag and frame under one lock.
    #[must_use]
    pub fn api_command(&self) -> (bool, ControlFrame) {
        let state = self.state.lock();
        (state.api_control_enabled, state.controls)
    }

    #[must_use]
    pub fn car_state(&self) -> CarState {
        self.state.lock().car
    }

    /// Publishes the result of a physics step.
    pub fn publish_step(&self, kinematics: Kinematics, car: CarState) {
        let mut state = self.state.lock();
        state.kinematics = kinematics;
        state.car = car;
    }

    pub fn set_rc_data(&self, rc: Option<RcData>) {
        self.state.lock().rc_data = rc;
    }

    #[must_use]
    pub fn rc_data(&self) -> Option<RcData> {
        self.state.lock().rc_data.clone()
    }

    pub fn push_status_message(&self, message: impl Into<String>) {
        self.state.lock().status_messages.push(message.into());
    }

    /// Drains the status messages accumulated since the last call.
    #[must_use]
    pub fn take_status_messages(&self) -> Vec<String> {
        std::mem::take(&mut self.state.lock().status_messages)
    }

    /// Clears commands and published state back to power-on values.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.controls = ControlFrame::default();
        state.car = CarState::default();
        state.kinematics = Kinematics::default();
        state.status_messages.clear();
    }

    #[must_use]
    pub fn state(&self) -> VehicleState {
        let state = self.state.lock();
        VehicleState {
            name: self.name.clone(),
            class: self.class,
            api_control_enabled: state.api_control_enabled,
            controls: state.controls,
            car: state.car,
            kinematics: state.kinematics,
        }
    }

    /// Sends one telemetry sample if a sink is attached.
    ///
    /// # Errors
    ///
    /// Propagates the sink's [`TelemetryError`].
    pub fn send_telemetry(&self, dt: f32) -> Result<(), TelemetryError> {
        match &self.telemetry {
            Some(sink) => sink.send(&self.state(), dt),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for VehicleApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VehicleApi")
            .field("name", &self.name)
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_command_reads_flag_and_frame_together() {
        let api = VehicleApi::new("car0", VehicleClass::Car);
        api.enable_api_control(true);
        api.set_controls(ControlFrame::drive(0.4, -0.1));

        let (enabled, frame) = api.api_command();
        assert!(enabled);
        assert_eq!(frame, ControlFrame::drive(0.4, -0.1));
    }

    #[test]
    fn status_messages_drain_once() {
        let api = VehicleApi::new("drone", VehicleClass::Multirotor);
        api.push_status_message("armed");
        api.push_status_message("takeoff");

        assert_eq!(api.take_status_messages(), vec!["armed", "takeoff"]);
        assert!(api.take_status_messages().is_empty());
    }

    #[test]
    fn reset_keeps_api_control_flag() {
        let api = VehicleApi::new("car0", VehicleClass::Car);
        api.enable_api_control(true);
        api.set_controls(ControlFrame::drive(1.0, 0.0));
        api.reset();

        assert!(api.is_api_control_enabled());
        assert_eq!(api.controls(), ControlFrame::default());
    }

    #[test]
    fn telemetry_without_sink_is_a_no_op() {
        let api = VehicleApi::new("drone", VehicleClass::Multirotor);
        assert!(api.send_telemetry(0.01).is_ok());
    }
}
