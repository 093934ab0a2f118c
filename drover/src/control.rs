//! Control-source arbitration.
//!
//! - `rc`: hardware input readings (joystick / RC wheel) and keyboard frame.
//! - `calibration`: vendor-keyed axis mapping, switches and force feedback.
//! - `arbiter`: per-vehicle, per-tick resolution into one control frame.

pub mod arbiter;
pub mod calibration;
pub mod rc;

pub use arbiter::{Arbitration, ControlArbiter, ControlSource};
pub use rc::{ForceFeedback, InputHandle, InputState, RcData, input_handle};
