//! Physics backends.
//!
//! The stepping loop owns one [`PhysicsEngine`] and hands it every
//! core-managed [`Body`] once per tick together with the applied control
//! frame. Solver internals are deliberately small: the fast engine integrates
//! the class movement model plus wind and external force, the external engine
//! leaves poses to whoever drives them.

mod external;
mod fast;

pub use external::ExternalPhysicsEngine;
pub use fast::FastPhysicsEngine;

use crate::settings::{ConfigError, Settings};
use crate::trace::{error, info};
use crate::vehicle::class::{Capabilities, MovementModel};
use crate::vehicle::controls::ControlFrame;
use crate::vehicle::kinematics::{Kinematics, Vector3r};

/// Settings name of the built-in integrating engine.
pub const FAST_PHYSICS_ENGINE: &str = "FastPhysicsEngine";
/// Settings name of the pass-through engine.
pub const EXTERNAL_PHYSICS_ENGINE: &str = "ExternalPhysicsEngine";

/// A simulated rigid body owned by one core-managed vehicle.
#[derive(Debug, Clone)]
pub struct Body {
    pub kinematics: Kinematics,
    initial: Kinematics,
    movement: MovementModel,
    mass: f32,
    /// Velocity accumulated from external force; cleared on reset.
    pub drift: Vector3r,
}

impl Body {
    #[must_use]
    pub fn new(initial: Kinematics, capabilities: &Capabilities) -> Self {
        Self {
            kinematics: initial,
            initial,
            movement: capabilities.movement,
            mass: capabilities.mass.max(f32::EPSILON),
            drift: Vector3r::zeros(),
        }
    }

    #[must_use]
    pub const fn initial(&self) -> &Kinematics {
        &self.initial
    }

    #[must_use]
    pub const fn mass(&self) -> f32 {
        self.mass
    }

    /// Applies the class movement model for `controls`.
    pub fn command(&mut self, controls: &ControlFrame) {
        (self.movement)(&mut self.kinematics, controls);
    }

    /// Restores the spawn pose and clears all motion.
    pub fn reset(&mut self) {
        self.kinematics = self.initial;
        self.drift = Vector3r::zeros();
    }
}

/// A physics backend.
pub trait PhysicsEngine: Send {
    /// Settings name of this backend.
    fn name(&self) -> &'static str;

    /// Advances `body` by `dt` seconds under `controls`.
    fn update_body(&mut self, body: &mut Body, controls: &ControlFrame, dt: f32);

    /// Sets the ambient wind velocity (NED, metres per second).
    fn set_wind(&mut self, wind: Vector3r);

    /// Sets the external force applied to every body (NED, newtons).
    fn set_ext_force(&mut self, force: Vector3r);

    /// Clears per-engine state accumulated since start.
    fn reset(&mut self) {}
}

/// A validated backend choice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhysicsBackend {
    Fast { enable_ground_lock: bool },
    External,
}

impl PhysicsBackend {
    /// Resolves a settings `PhysicsEngineName`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::EmptyPhysicsEngine`] for an empty name and
    /// [`ConfigError::UnrecognizedPhysicsEngine`] for anything unknown.
    pub fn from_name(name: &str, enable_ground_lock: bool) -> Result<Self, ConfigError> {
        match name {
            "" => Err(ConfigError::EmptyPhysicsEngine),
            FAST_PHYSICS_ENGINE => Ok(Self::Fast { enable_ground_lock }),
            EXTERNAL_PHYSICS_ENGINE => Ok(Self::External),
            other => Err(ConfigError::UnrecognizedPhysicsEngine(other.to_owned())),
        }
    }

    /// Builds the engine, seeded with the configured wind and external force.
    #[must_use]
    pub fn build(self, wind: Vector3r, ext_force: Vector3r) -> Box<dyn PhysicsEngine> {
        let mut engine: Box<dyn PhysicsEngine> = match self {
            Self::Fast { enable_ground_lock } => Box::new(FastPhysicsEngine::new(enable_ground_lock)),
            Self::External => Box::new(ExternalPhysicsEngine::new()),
        };
        engine.set_wind(wind);
        engine.set_ext_force(ext_force);
        engine
    }
}

/// Creates the engine named in `settings`.
///
/// An empty name yields `Ok(None)`: the world is built without physics and the
/// scheduler will refuse to start.
///
/// # Errors
///
/// Returns [`ConfigError::UnrecognizedPhysicsEngine`] for an unknown name. The
/// error is logged here, before anything starts.
pub fn create_engine(settings: &Settings) -> Result<Option<Box<dyn PhysicsEngine>>, ConfigError> {
    match settings.physics_backend() {
        Ok(backend) => {
            let engine = backend.build(settings.wind(), settings.ext_force());
            info!(engine = engine.name(), "physics engine created");
            Ok(Some(engine))
        }
        Err(ConfigError::EmptyPhysicsEngine) => {
            error!("PhysicsEngineName is empty; simulation will not step");
            Ok(None)
        }
        Err(e) => {
            error!(error = %e, "cannot create physics engine");
            Err(e)
        }
    }
}
