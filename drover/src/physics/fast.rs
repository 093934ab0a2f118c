//! Fixed-step kinematic integrator.

use crate::vehicle::controls::ControlFrame;
use crate::vehicle::kinematics::{Vector3r, wrap_angle};

use super::{Body, FAST_PHYSICS_ENGINE, PhysicsEngine};

/// Explicit-Euler integration of the commanded twist plus wind and external
/// force.
///
/// With ground lock enabled bodies can never sink below `z = 0` (NED), which
/// keeps resting vehicles from drifting through the floor.
#[derive(Debug, Clone)]
pub struct FastPhysicsEngine {
    enable_ground_lock: bool,
    wind: Vector3r,
    ext_force: Vector3r,
}

impl FastPhysicsEngine {
    #[must_use]
    pub fn new(enable_ground_lock: bool) -> Self {
        Self {
            enable_ground_lock,
            wind: Vector3r::zeros(),
            ext_force: Vector3r::zeros(),
        }
    }

    #[must_use]
    pub const fn ground_lock(&self) -> bool {
        self.enable_ground_lock
    }
}

impl PhysicsEngine for FastPhysicsEngine {
    fn name(&self) -> &'static str {
        FAST_PHYSICS_ENGINE
    }

    fn update_body(&mut self, body: &mut Body, controls: &ControlFrame, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        body.command(controls);

        body.drift += self.ext_force / body.mass() * dt;
        let k = &mut body.kinematics;
        k.position += (k.linear_velocity + self.wind + body.drift) * dt;
        k.yaw = wrap_angle(k.yaw + k.yaw_rate * dt);

        if self.enable_ground_lock && k.position.z > 0.0 {
            k.position.z = 0.0;
            if body.drift.z > 0.0 {
                body.drift.z = 0.0;
            }
        }
    }

    fn set_wind(&mut self, wind: Vector3r) {
        self.wind = wind;
    }

    fn set_ext_force(&mut self, force: Vector3r) {
        self.ext_force = force;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::class::Capabilities;
    use crate::vehicle::kinematics::Kinematics;

    fn car_body() -> Body {
        Body::new(Kinematics::default(), &Capabilities::car())
    }

    #[test]
    fn throttle_moves_car_along_heading() {
        let mut engine = FastPhysicsEngine::new(true);
        let mut body = car_body();
        for _ in 0..10 {
            engine.update_body(&mut body, &ControlFrame::drive(1.0, 0.0), 0.1);
        }
        assert!(body.kinematics.position.x > 0.0);
        assert!(body.kinematics.position.y.abs() < 1e-5);
    }

    #[test]
    fn wind_drifts_a_parked_body() {
        let mut engine = FastPhysicsEngine::new(false);
        engine.set_wind(Vector3r::new(0.0, 2.0, 0.0));
        let mut body = car_body();
        engine.update_body(&mut body, &ControlFrame::default(), 0.5);
        assert!((body.kinematics.position.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn ground_lock_stops_downward_force() {
        let mut engine = FastPhysicsEngine::new(true);
        // Positive z is down in NED.
        engine.set_ext_force(Vector3r::new(0.0, 0.0, 1000.0));
        let mut body = Body::new(Kinematics::default(), &Capabilities::multirotor());
        for _ in 0..5 {
            engine.update_body(&mut body, &ControlFrame::default(), 0.1);
        }
        assert_eq!(body.kinematics.position.z, 0.0);
        assert_eq!(body.drift.z, 0.0);
    }

    #[test]
    fn without_ground_lock_bodies_sink() {
        let mut engine = FastPhysicsEngine::new(false);
        engine.set_ext_force(Vector3r::new(0.0, 0.0, 10.0));
        let mut body = Body::new(Kinematics::default(), &Capabilities::multirotor());
        engine.update_body(&mut body, &ControlFrame::default(), 0.1);
        assert!(body.kinematics.position.z > 0.0);
    }

    #[test]
    fn zero_dt_is_ignored() {
        let mut engine = FastPhysicsEngine::new(true);
        let mut body = car_body();
        engine.update_body(&mut body, &ControlFrame::drive(1.0, 1.0), 0.0);
        assert_eq!(body.kinematics, Kinematics::default());
    }
}
