//! Vendor-keyed device calibration.
//!
//! Maps raw device axes onto a [`ControlFrame`]. Known wheels get a dedicated
//! mapping (and force feedback); everything else falls back to the generic
//! joystick layout.

use crate::vehicle::api::CarState;
use crate::vehicle::controls::{ControlFrame, GEAR_REVERSE};

use super::rc::{ForceFeedback, RcData};

/// Axis layout for a device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calibration {
    /// Racing wheel with force feedback: yaw steers, right-z is an inverted
    /// accelerator pedal, throttle axis is the brake pedal.
    ForceFeedbackWheel,
    /// Generic gamepad / joystick layout.
    Generic,
}

/// Vendor table. Unknown vendors use [`Calibration::Generic`].
const VENDOR_CALIBRATIONS: &[(&str, Calibration)] =
    &[("VID_044F", Calibration::ForceFeedbackWheel)];

/// A pair of switch indices; the action fires if either is pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchPair(pub u8, pub u8);

impl SwitchPair {
    #[must_use]
    pub fn pressed(self, rc: &RcData) -> bool {
        rc.switch(self.0) || rc.switch(self.1)
    }
}

pub const HANDBRAKE_SWITCHES: SwitchPair = SwitchPair(5, 6);
pub const REVERSE_SWITCHES: SwitchPair = SwitchPair(8, 1);
pub const AUTOMATIC_SWITCHES: SwitchPair = SwitchPair(9, 0);

/// Rumble at zero rpm; rises by a third at the rev limiter.
const RUMBLE_BASE: f32 = 0.66;
/// Speed at which auto-centring reaches half strength.
const AUTO_CENTER_SPEED: f32 = 120.0;

impl Calibration {
    #[must_use]
    pub fn for_vendor(vendor_id: &str) -> Self {
        VENDOR_CALIBRATIONS
            .iter()
            .find(|(vendor, _)| *vendor == vendor_id)
            .map_or(Self::Generic, |(_, calibration)| *calibration)
    }

    /// Writes the axes of `rc` into `frame`, leaving latched fields alone.
    pub fn map_axes(self, rc: &RcData, frame: &mut ControlFrame) {
        match self {
            Self::ForceFeedbackWheel => {
                frame.steering = rc.yaw;
                frame.throttle = (-rc.right_z + 1.0) / 2.0;
                frame.brake = rc.throttle;
            }
            Self::Generic => {
                frame.steering = (rc.throttle * 2.0 - 1.0) * 1.25;
                frame.throttle = (-rc.roll + 1.0) / 2.0;
                frame.brake = -rc.right_z + 1.0;
            }
        }
    }

    /// Force-feedback output for this device, if it has any.
    #[must_use]
    pub fn force_feedback(self, rc: &RcData, car: &CarState) -> Option<ForceFeedback> {
        match self {
            Self::ForceFeedbackWheel => {
                let rpm_ratio = if car.max_rpm > 0.0 {
                    car.rpm / car.max_rpm
                } else {
                    0.0
                };
                let rumble_strength = RUMBLE_BASE + rpm_ratio / 3.0;
                let auto_center = (1.0 - 1.0 / ((car.speed / AUTO_CENTER_SPEED).abs() + 1.0))
                    * (rc.yaw / 3.0);
                Some(ForceFeedback {
                    rumble_strength,
                    auto_center,
                })
            }
            Self::Generic => None,
        }
    }
}

/// Applies the digital switches (handbrake and gear shift) to `frame`.
///
/// Gear selection latches: with neither gear pair pressed the previous gear
/// stays in effect.
pub fn apply_switches(rc: &RcData, frame: &mut ControlFrame) {
    frame.handbrake = HANDBRAKE_SWITCHES.pressed(rc);

    if REVERSE_SWITCHES.pressed(rc) {
        frame.manual_gear = GEAR_REVERSE;
        frame.is_manual_gear = true;
        frame.gear_immediate = true;
    } else if AUTOMATIC_SWITCHES.pressed(rc) {
        frame.manual_gear = 0;
        frame.is_manual_gear = false;
        frame.gear_immediate = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wheel(yaw: f32, throttle: f32, right_z: f32) -> RcData {
        RcData {
            is_valid: true,
            vendor_id: "VID_044F".into(),
            yaw,
            throttle,
            right_z,
            ..RcData::default()
        }
    }

    #[test]
    fn vendor_lookup() {
        assert_eq!(
            Calibration::for_vendor("VID_044F"),
            Calibration::ForceFeedbackWheel
        );
        assert_eq!(Calibration::for_vendor("VID_046D"), Calibration::Generic);
        assert_eq!(Calibration::for_vendor(""), Calibration::Generic);
    }

    #[test]
    fn wheel_mapping() {
        let mut frame = ControlFrame::default();
        Calibration::ForceFeedbackWheel.map_axes(&wheel(0.25, 0.6, -1.0), &mut frame);
        assert_eq!(frame.steering, 0.25);
        assert_eq!(frame.throttle, 1.0);
        assert_eq!(frame.brake, 0.6);
    }

    #[test]
    fn generic_mapping() {
        let rc = RcData {
            is_valid: true,
            throttle: 0.5,
            roll: 1.0,
            right_z: 1.0,
            ..RcData::default()
        };
        let mut frame = ControlFrame::default();
        Calibration::Generic.map_axes(&rc, &mut frame);
        assert_eq!(frame.steering, 0.0);
        assert_eq!(frame.throttle, 0.0);
        assert_eq!(frame.brake, 0.0);
    }

    #[test]
    fn wheel_force_feedback() {
        let car = CarState {
            speed: 120.0,
            rpm: 3000.0,
            max_rpm: 6000.0,
            ..CarState::default()
        };
        let ff = Calibration::ForceFeedbackWheel
            .force_feedback(&wheel(0.6, 0.0, 0.0), &car)
            .expect("wheel has force feedback");

        assert!((ff.rumble_strength - (0.66 + 0.5 / 3.0)).abs() < 1e-6);
        // Half strength at 120, scaled by yaw / 3.
        assert!((ff.auto_center - 0.5 * 0.2).abs() < 1e-6);
    }

    #[test]
    fn force_feedback_survives_zero_max_rpm() {
        let ff = Calibration::ForceFeedbackWheel
            .force_feedback(&wheel(0.0, 0.0, 0.0), &CarState::default())
            .expect("wheel has force feedback");
        assert!((ff.rumble_strength - 0.66).abs() < 1e-6);
        assert_eq!(ff.auto_center, 0.0);
    }

    #[test]
    fn generic_devices_have_no_force_feedback() {
        assert!(
            Calibration::Generic
                .force_feedback(&RcData::default(), &CarState::default())
                .is_none()
        );
    }

    #[test]
    fn switches_set_handbrake_from_either_index() {
        let mut frame = ControlFrame::default();
        apply_switches(&RcData::default().with_switch(6), &mut frame);
        assert!(frame.handbrake);

        apply_switches(&RcData::default(), &mut frame);
        assert!(!frame.handbrake);
    }

    #[test]
    fn gear_latches_until_other_pair_pressed() {
        let mut frame = ControlFrame::default();
        apply_switches(&RcData::default().with_switch(1), &mut frame);
        assert_eq!(frame.manual_gear, GEAR_REVERSE);
        assert!(frame.is_manual_gear);
        assert!(frame.gear_immediate);

        // Nothing pressed: reverse stays selected.
        apply_switches(&RcData::default(), &mut frame);
        assert_eq!(frame.manual_gear, GEAR_REVERSE);

        apply_switches(&RcData::default().with_switch(9), &mut frame);
        assert_eq!(frame.manual_gear, 0);
        assert!(!frame.is_manual_gear);
    }

    #[test]
    fn reverse_wins_over_automatic() {
        let mut frame = ControlFrame::default();
        let rc = RcData::default().with_switch(8).with_switch(0);
        apply_switches(&rc, &mut frame);
        assert_eq!(frame.manual_gear, GEAR_REVERSE);
    }
}
