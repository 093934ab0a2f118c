//! Kinematic state of a vehicle body.
//!
//! Coordinates are NED: `x` north, `y` east, `z` down. Ground level is `z = 0`
//! and altitude is negative `z`.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Three-component vector used for positions, velocities, wind and forces.
pub type Vector3r = Vector3<f32>;

/// Pose and twist of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kinematics {
    pub position: Vector3r,
    /// Heading in radians, wrapped to `(-pi, pi]`.
    pub yaw: f32,
    pub linear_velocity: Vector3r,
    /// Heading rate in radians per second.
    pub yaw_rate: f32,
}

impl Kinematics {
    /// A body at rest at `position` facing `yaw`.
    #[must_use]
    pub fn at_rest(position: Vector3r, yaw: f32) -> Self {
        Self {
            position,
            yaw: wrap_angle(yaw),
            linear_velocity: Vector3r::zeros(),
            yaw_rate: 0.0,
        }
    }

    /// Horizontal speed in metres per second.
    #[must_use]
    pub fn ground_speed(&self) -> f32 {
        self.linear_velocity.xy().norm()
    }

    /// Unit vector along the current heading in the horizontal plane.
    #[must_use]
    pub fn heading(&self) -> Vector3r {
        Vector3r::new(self.yaw.cos(), self.yaw.sin(), 0.0)
    }
}

impl Default for Kinematics {
    fn default() -> Self {
        Self::at_rest(Vector3r::zeros(), 0.0)
    }
}

/// Wraps an angle into `(-pi, pi]`.
#[must_use]
pub fn wrap_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};

    let wrapped = angle.rem_euclid(TAU);
    if wrapped > PI { wrapped - TAU } else { wrapped }
}
