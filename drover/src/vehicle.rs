//! Vehicles: control frames, kinematics, classes and API-visible state.

pub mod api;
pub mod class;
pub mod controls;
pub mod kinematics;
pub mod sim;

pub use api::{CarState, TelemetryError, TelemetrySink, VehicleApi, VehicleState};
pub use class::{Capabilities, ClassRegistry, ProtocolClass, VehicleClass, VehicleKind};
pub use controls::ControlFrame;
pub use kinematics::{Kinematics, Vector3r};
pub use sim::{RenderHook, RenderedState, SimVehicle, VehicleSim};
