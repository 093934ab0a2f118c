//! Per-vehicle control arbitration.
//!
//! Each tick, [`ControlArbiter::arbitrate`] resolves the competing sources
//! into one frame:
//!
//! 1. A connected device that reports an invalid reading aborts arbitration
//!    for the tick. The previous frame is held.
//! 2. **API** wins outright when API control is enabled or the API frame
//!    carries a live command (see [`ControlFrame::is_active`]).
//! 3. Otherwise the **device** frame (calibrated per vendor) wins when a
//!    device is connected, else the **keyboard** frame.
//!
//! When a device or the keyboard wins, the applied frame is written back into
//! the vehicle's API state so telemetry observers see what is actually
//! driving the vehicle. A frame the arbiter wrote back itself is not an API
//! command and never counts as active on later ticks.

use std::fmt;

use crate::trace::{debug, warn};
use crate::vehicle::api::VehicleApi;
use crate::vehicle::controls::ControlFrame;

use super::calibration::{Calibration, apply_switches};
use super::rc::InputState;

/// Where the applied frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlSource {
    Api,
    HardwareDevice,
    Keyboard,
}

impl fmt::Display for ControlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api => f.write_str("API"),
            Self::HardwareDevice => f.write_str("Wheel/Joystick"),
            Self::Keyboard => f.write_str("Keyboard"),
        }
    }
}

/// Outcome of one arbitration pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arbitration {
    /// A source won; `frame` is the normalized frame to apply.
    Applied {
        source: ControlSource,
        frame: ControlFrame,
    },
    /// The device reported an invalid reading; `frame` is the previous frame.
    Held { frame: ControlFrame },
}

impl Arbitration {
    /// The frame to apply this tick, whichever way arbitration went.
    #[must_use]
    pub const fn frame(&self) -> ControlFrame {
        match self {
            Self::Applied { frame, .. } | Self::Held { frame } => *frame,
        }
    }

    #[must_use]
    pub const fn source(&self) -> Option<ControlSource> {
        match self {
            Self::Applied { source, .. } => Some(*source),
            Self::Held { .. } => None,
        }
    }
}

/// Arbitration state for one vehicle.
#[derive(Debug, Default)]
pub struct ControlArbiter {
    /// Device frame; persists across ticks so gear selection latches.
    device_frame: ControlFrame,
    /// Last applied frame.
    current: ControlFrame,
    last_source: Option<ControlSource>,
    /// Frame last written back into the API state.
    written_back: Option<ControlFrame>,
    /// The device reported invalid on the previous tick.
    device_invalid: bool,
}

impl ControlArbiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last applied frame.
    #[must_use]
    pub const fn current(&self) -> ControlFrame {
        self.current
    }

    #[must_use]
    pub const fn last_source(&self) -> Option<ControlSource> {
        self.last_source
    }

    /// Resolves this tick's frame for the vehicle behind `api`.
    ///
    /// Writes force feedback into `input` for calibrated wheels and writes the
    /// applied frame back to `api` when API control did not win.
    pub fn arbitrate(&mut self, api: &VehicleApi, input: &mut InputState) -> Arbitration {
        let fallback = match &input.device {
            Some(rc) if !rc.is_valid => {
                if !self.device_invalid {
                    warn!(vehicle = api.name(), "control mode: [INVALID] wheel/joystick, holding previous frame");
                    api.push_status_message("Control Mode: [INVALID] Wheel/Joystick");
                    self.device_invalid = true;
                }
                return Arbitration::Held {
                    frame: self.current,
                };
            }
            Some(rc) => {
                let calibration = Calibration::for_vendor(&rc.vendor_id);
                calibration.map_axes(rc, &mut self.device_frame);
                apply_switches(rc, &mut self.device_frame);
                input.force_feedback = calibration.force_feedback(rc, &api.car_state());
                (ControlSource::HardwareDevice, self.device_frame)
            }
            None => (ControlSource::Keyboard, input.keyboard),
        };
        self.device_invalid = false;

        let (api_enabled, api_frame) = api.api_command();
        let api_commanded =
            api_frame.is_active() && self.written_back != Some(api_frame);
        let (source, frame) = if api_enabled || api_commanded {
            self.written_back = None;
            (ControlSource::Api, api_frame.normalized())
        } else {
            let (source, frame) = fallback;
            let frame = frame.normalized();
            api.set_controls(frame);
            self.written_back = Some(frame);
            (source, frame)
        };

        if self.last_source != Some(source) {
            debug!(vehicle = api.name(), mode = %source, "control mode changed");
            self.last_source = Some(source);
        }
        self.current = frame;

        Arbitration::Applied { source, frame }
    }

    /// Drops latched device state and the held frame.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::rc::RcData;
    use crate::vehicle::class::VehicleClass;

    fn car_api() -> VehicleApi {
        VehicleApi::new("car0", VehicleClass::Car)
    }

    fn generic_device(roll: f32) -> RcData {
        RcData {
            is_valid: true,
            vendor_id: "VID_1234".into(),
            throttle: 0.5,
            roll,
            right_z: 1.0,
            ..RcData::default()
        }
    }

    #[test]
    fn enabled_api_wins_over_live_device() {
        let api = car_api();
        api.enable_api_control(true);
        api.set_controls(ControlFrame::drive(0.5, 0.0));

        let mut input = InputState {
            device: Some(generic_device(-1.0)),
            ..InputState::default()
        };
        let mut arbiter = ControlArbiter::new();
        let outcome = arbiter.arbitrate(&api, &mut input);

        assert_eq!(outcome.source(), Some(ControlSource::Api));
        assert_eq!(outcome.frame(), ControlFrame::drive(0.5, 0.0));
    }

    #[test]
    fn active_api_frame_wins_without_enable_flag() {
        let api = car_api();
        api.set_controls(ControlFrame {
            handbrake: true,
            ..ControlFrame::default()
        });

        let mut input = InputState {
            keyboard: ControlFrame::drive(1.0, 0.0),
            ..InputState::default()
        };
        let outcome = ControlArbiter::new().arbitrate(&api, &mut input);

        assert_eq!(outcome.source(), Some(ControlSource::Api));
        assert!(outcome.frame().handbrake);
    }

    #[test]
    fn keyboard_wins_without_api_or_device() {
        let api = car_api();
        let keyboard = ControlFrame::drive(0.7, -0.3);
        let mut input = InputState {
            keyboard,
            ..InputState::default()
        };
        let outcome = ControlArbiter::new().arbitrate(&api, &mut input);

        assert_eq!(outcome.source(), Some(ControlSource::Keyboard));
        assert_eq!(outcome.frame(), keyboard);
    }

    #[test]
    fn winning_fallback_is_written_back_to_api() {
        let api = car_api();
        let mut input = InputState {
            device: Some(generic_device(-1.0)),
            ..InputState::default()
        };
        let outcome = ControlArbiter::new().arbitrate(&api, &mut input);

        assert_eq!(outcome.source(), Some(ControlSource::HardwareDevice));
        assert_eq!(api.controls(), outcome.frame());
        assert_eq!(api.controls().throttle, 1.0);
    }

    #[test]
    fn written_back_frame_does_not_capture_arbitration() {
        let api = car_api();
        let mut arbiter = ControlArbiter::new();
        let mut input = InputState {
            device: Some(generic_device(-1.0)),
            ..InputState::default()
        };
        arbiter.arbitrate(&api, &mut input);
        assert!(api.controls().is_active());

        // Device released: roll = 1 maps to zero throttle.
        input.device = Some(generic_device(1.0));
        let outcome = arbiter.arbitrate(&api, &mut input);
        assert_eq!(outcome.source(), Some(ControlSource::HardwareDevice));
        assert_eq!(outcome.frame().throttle, 0.0);
    }

    #[test]
    fn fresh_api_command_overrides_written_back_frame() {
        let api = car_api();
        let mut arbiter = ControlArbiter::new();
        let mut input = InputState {
            keyboard: ControlFrame::drive(0.2, 0.0),
            ..InputState::default()
        };
        arbiter.arbitrate(&api, &mut input);

        api.set_controls(ControlFrame::drive(0.9, 0.1));
        let outcome = arbiter.arbitrate(&api, &mut input);
        assert_eq!(outcome.source(), Some(ControlSource::Api));
        assert_eq!(outcome.frame(), ControlFrame::drive(0.9, 0.1));
    }

    #[test]
    fn invalid_device_holds_previous_frame() {
        let api = car_api();
        let mut arbiter = ControlArbiter::new();
        let mut input = InputState {
            keyboard: ControlFrame::drive(0.3, 0.0),
            ..InputState::default()
        };
        let first = arbiter.arbitrate(&api, &mut input);

        input.device = Some(RcData {
            is_valid: false,
            ..generic_device(-1.0)
        });
        api.set_controls(ControlFrame::default());
        let second = arbiter.arbitrate(&api, &mut input);

        assert_eq!(second, Arbitration::Held { frame: first.frame() });
        // Nothing was written back.
        assert_eq!(api.controls(), ControlFrame::default());
    }

    #[test]
    fn invalid_device_is_reported_once_per_episode() {
        let api = car_api();
        let mut arbiter = ControlArbiter::new();
        let invalid = RcData {
            is_valid: false,
            ..generic_device(0.0)
        };
        let mut input = InputState {
            device: Some(invalid.clone()),
            ..InputState::default()
        };

        for _ in 0..10_000 {
            arbiter.arbitrate(&api, &mut input);
        }
        assert_eq!(
            api.take_status_messages(),
            vec!["Control Mode: [INVALID] Wheel/Joystick".to_owned()]
        );

        input.device = Some(generic_device(0.0));
        arbiter.arbitrate(&api, &mut input);
        input.device = Some(invalid);
        arbiter.arbitrate(&api, &mut input);
        arbiter.arbitrate(&api, &mut input);
        assert_eq!(api.take_status_messages().len(), 1);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn axis() -> impl Strategy<Value = f32> {
            -1.0f32..=1.0
        }

        proptest! {
            #[test]
            fn enabled_api_frame_always_wins(
                throttle in axis(),
                steering in axis(),
                roll in axis(),
                keyboard_throttle in axis(),
                with_device in any::<bool>(),
            ) {
                let api = car_api();
                api.enable_api_control(true);
                let commanded = ControlFrame::drive(throttle, steering);
                api.set_controls(commanded);

                let mut input = InputState {
                    keyboard: ControlFrame::drive(keyboard_throttle, 0.0),
                    device: with_device.then(|| generic_device(roll)),
                    ..InputState::default()
                };
                let outcome = ControlArbiter::new().arbitrate(&api, &mut input);
                prop_assert_eq!(outcome.source(), Some(ControlSource::Api));
                prop_assert_eq!(outcome.frame(), commanded);
            }

            #[test]
            fn quiet_api_yields_keyboard_frame(throttle in axis(), steering in axis()) {
                let api = car_api();
                let keyboard = ControlFrame::drive(throttle, steering);
                let mut input = InputState { keyboard, ..InputState::default() };
                let outcome = ControlArbiter::new().arbitrate(&api, &mut input);
                prop_assert_eq!(outcome.frame(), keyboard);
                prop_assert_eq!(api.controls(), keyboard);
            }
        }
    }

    #[test]
    fn wheel_produces_force_feedback() {
        let api = car_api();
        let mut input = InputState {
            device: Some(RcData {
                is_valid: true,
                vendor_id: "VID_044F".into(),
                ..RcData::default()
            }),
            ..InputState::default()
        };
        ControlArbiter::new().arbitrate(&api, &mut input);
        assert!(input.force_feedback.is_some());
    }

    #[test]
    fn device_frame_is_normalized() {
        let api = car_api();
        let mut input = InputState {
            device: Some(RcData {
                is_valid: true,
                vendor_id: String::new(),
                throttle: 1.0,
                roll: -1.0,
                right_z: -1.0,
                ..RcData::default()
            }),
            ..InputState::default()
        };
        let frame = ControlArbiter::new().arbitrate(&api, &mut input).frame();
        assert_eq!(frame.steering, 1.0);
        assert_eq!(frame.brake, 1.0);
    }
}
