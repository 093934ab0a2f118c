//! Control frames: the normalized command applied to a vehicle for one tick.

use serde::{Deserialize, Serialize};

/// Magnitude above which an API-sourced component counts as a live command.
pub const API_ACTIVITY_EPSILON: f32 = 1e-4;

/// Manual gear value selecting reverse.
pub const GEAR_REVERSE: i32 = -1;

/// One fully determined vehicle command.
///
/// `throttle` and `steering` live in `[-1, 1]`, `brake` in `[0, 1]`.
/// Device calibrations can produce values outside those ranges; they are
/// brought back in by [`ControlFrame::normalized`] before being applied.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlFrame {
    pub throttle: f32,
    pub steering: f32,
    pub brake: f32,
    pub handbrake: bool,
    pub is_manual_gear: bool,
    pub manual_gear: i32,
    pub gear_immediate: bool,
}

impl ControlFrame {
    /// Creates a frame with throttle and steering set and everything else released.
    #[must_use]
    pub const fn drive(throttle: f32, steering: f32) -> Self {
        Self {
            throttle,
            steering,
            brake: 0.0,
            handbrake: false,
            is_manual_gear: false,
            manual_gear: 0,
            gear_immediate: false,
        }
    }

    /// Returns `true` if any axis exceeds [`API_ACTIVITY_EPSILON`] or any
    /// latched input (handbrake, manual gear) is set.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.throttle.abs() > API_ACTIVITY_EPSILON
            || self.steering.abs() > API_ACTIVITY_EPSILON
            || self.brake.abs() > API_ACTIVITY_EPSILON
            || self.handbrake
            || self.is_manual_gear
    }

    /// Clamps every axis into its documented range. NaN axes become zero.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            throttle: clamp_axis(self.throttle, -1.0, 1.0),
            steering: clamp_axis(self.steering, -1.0, 1.0),
            brake: clamp_axis(self.brake, 0.0, 1.0),
            ..self
        }
    }
}

fn clamp_axis(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(min, max) }
}
