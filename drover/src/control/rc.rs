//! Hardware input state: joystick / RC wheel readings, keyboard frame and
//! force-feedback output.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::vehicle::controls::ControlFrame;

/// One reading from a joystick, wheel or RC transmitter.
///
/// Axes are raw device values in `[-1, 1]` (triggers/pedals may use `[0, 1]`);
/// the meaning of each axis depends on the device's calibration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RcData {
    pub is_valid: bool,
    /// USB vendor identifier, formatted as `VID_XXXX`.
    pub vendor_id: String,
    pub yaw: f32,
    pub throttle: f32,
    pub roll: f32,
    pub pitch: f32,
    pub right_z: f32,
    /// Digital switches, bit `i` is switch `i`.
    pub switches: u32,
}

impl RcData {
    /// Returns the state of switch `index`; out-of-range switches read released.
    #[must_use]
    pub fn switch(&self, index: u8) -> bool {
        index < 32 && (self.switches >> index) & 1 == 1
    }

    /// Returns a copy with switch `index` pressed.
    #[must_use]
    pub fn with_switch(mut self, index: u8) -> Self {
        if index < 32 {
            self.switches |= 1 << index;
        }
        self
    }
}

/// Force-feedback command for a wheel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ForceFeedback {
    pub rumble_strength: f32,
    pub auto_center: f32,
}

/// Everything the local input layer feeds into a vehicle.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    /// Current keyboard-derived frame.
    pub keyboard: ControlFrame,
    /// Attached device, `None` when no joystick/RC is connected.
    pub device: Option<RcData>,
    /// Last force-feedback command produced by arbitration.
    pub force_feedback: Option<ForceFeedback>,
}

/// Shared input state, written by the input layer and read each tick.
pub type InputHandle = Arc<Mutex<InputState>>;

#[must_use]
pub fn input_handle() -> InputHandle {
    Arc::new(Mutex::new(InputState::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switches_read_by_bit() {
        let rc = RcData::default().with_switch(0).with_switch(6);
        assert!(rc.switch(0));
        assert!(rc.switch(6));
        assert!(!rc.switch(5));
        assert!(!rc.switch(40));
    }
}
