//! Pass-through backend for externally driven poses.

use crate::vehicle::controls::ControlFrame;
use crate::vehicle::kinematics::Vector3r;

use super::{Body, EXTERNAL_PHYSICS_ENGINE, PhysicsEngine};

/// Leaves every body where an outside system put it. Wind and external force
/// are accepted and ignored.
#[derive(Debug, Clone, Default)]
pub struct ExternalPhysicsEngine;

impl ExternalPhysicsEngine {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl PhysicsEngine for ExternalPhysicsEngine {
    fn name(&self) -> &'static str {
        EXTERNAL_PHYSICS_ENGINE
    }

    fn update_body(&mut self, _body: &mut Body, _controls: &ControlFrame, _dt: f32) {}

    fn set_wind(&mut self, _wind: Vector3r) {}

    fn set_ext_force(&mut self, _force: Vector3r) {}
}
