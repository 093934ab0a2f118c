//! Vehicle classes and the per-class capability table.
//!
//! Every configured vehicle type resolves once, at spawn time, to a
//! [`VehicleClass`]. Everything that differs between classes (default pawn,
//! which API endpoint serves it, how controls move the body) is looked up in
//! the class's [`Capabilities`] rather than re-derived on each call.
//!
//! The set of available classes is a runtime [`ClassRegistry`]. A build of
//! the simulator without, say, car support simply leaves that class out of
//! the registry; lookups for it fail with "unsupported vehicle class".

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::controls::{ControlFrame, GEAR_REVERSE};
use super::kinematics::Kinematics;

/// A concrete vehicle type as it appears in settings (`VehicleType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleKind {
    SimpleFlight,
    Px4Multirotor,
    ArduCopter,
    ArduCopterSolo,
    CpHusky,
    Pioneer,
    PhysXCar,
    BoxCar,
}

impl VehicleKind {
    pub const ALL: [Self; 8] = [
        Self::SimpleFlight,
        Self::Px4Multirotor,
        Self::ArduCopter,
        Self::ArduCopterSolo,
        Self::CpHusky,
        Self::Pioneer,
        Self::PhysXCar,
        Self::BoxCar,
    ];

    /// The settings spelling of this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SimpleFlight => "SimpleFlight",
            Self::Px4Multirotor => "PX4Multirotor",
            Self::ArduCopter => "ArduCopter",
            Self::ArduCopterSolo => "ArduCopterSolo",
            Self::CpHusky => "CPHusky",
            Self::Pioneer => "Pioneer",
            Self::PhysXCar => "PhysXCar",
            Self::BoxCar => "BoxCar",
        }
    }

    /// Parses a settings `VehicleType`, ignoring ASCII case.
    #[must_use]
    pub fn parse(vehicle_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(vehicle_type))
    }

    #[must_use]
    pub const fn class(self) -> VehicleClass {
        match self {
            Self::SimpleFlight | Self::Px4Multirotor | Self::ArduCopter | Self::ArduCopterSolo => {
                VehicleClass::Multirotor
            }
            Self::CpHusky | Self::Pioneer => VehicleClass::SkidSteer,
            Self::PhysXCar | Self::BoxCar => VehicleClass::Car,
        }
    }

    /// Pawn asset used when the vehicle setting leaves `PawnPath` empty.
    #[must_use]
    pub const fn default_pawn_path(self) -> &'static str {
        match self {
            Self::PhysXCar | Self::BoxCar => "DefaultCar",
            Self::Pioneer => "Pioneer",
            Self::CpHusky => "DefaultSkidVehicle",
            _ => "DefaultQuadrotor",
        }
    }
}

impl fmt::Display for VehicleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime class of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VehicleClass {
    Multirotor,
    SkidSteer,
    Car,
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Multirotor => "multirotor",
            Self::SkidSteer => "skid-steer",
            Self::Car => "car",
        };
        f.write_str(name)
    }
}

/// API class served by one protocol endpoint.
///
/// The discriminant is the port offset from the configured base port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u16)]
pub enum ProtocolClass {
    /// Primary class, served on the base port.
    Multirotor = 0,
    /// Ground vehicles (car and skid-steer share one API), base port + 1.
    Car = 1,
}

impl ProtocolClass {
    #[must_use]
    pub const fn port_offset(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for ProtocolClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Multirotor => f.write_str("multirotor"),
            Self::Car => f.write_str("car"),
        }
    }
}

/// Sets the commanded twist of a body from the applied control frame.
pub type MovementModel = fn(&mut Kinematics, &ControlFrame);

/// What a vehicle class can do.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub class: VehicleClass,
    pub protocol: ProtocolClass,
    pub movement: MovementModel,
    /// Top commanded speed in metres per second.
    pub max_speed: f32,
    /// Body mass in kilograms (scales external force).
    pub mass: f32,
}

impl Capabilities {
    #[must_use]
    pub const fn multirotor() -> Self {
        Self {
            class: VehicleClass::Multirotor,
            protocol: ProtocolClass::Multirotor,
            movement: multirotor_movement,
            max_speed: MULTIROTOR_MAX_CLIMB,
            mass: 1.0,
        }
    }

    #[must_use]
    pub const fn skid_steer() -> Self {
        Self {
            class: VehicleClass::SkidSteer,
            protocol: ProtocolClass::Car,
            movement: skid_steer_movement,
            max_speed: SKID_MAX_SPEED,
            mass: 50.0,
        }
    }

    #[must_use]
    pub const fn car() -> Self {
        Self {
            class: VehicleClass::Car,
            protocol: ProtocolClass::Car,
            movement: car_movement,
            max_speed: CAR_MAX_SPEED,
            mass: 1200.0,
        }
    }
}

const MULTIROTOR_MAX_CLIMB: f32 = 5.0;
const MULTIROTOR_MAX_YAW_RATE: f32 = 1.5;
const SKID_MAX_SPEED: f32 = 2.0;
const SKID_MAX_YAW_RATE: f32 = 1.0;
const CAR_MAX_SPEED: f32 = 30.0;
/// Yaw rate per unit steering per metre per second of speed.
const CAR_STEER_GAIN: f32 = 0.08;

fn multirotor_movement(k: &mut Kinematics, controls: &ControlFrame) {
    // Throttle climbs (negative z); steering yaws.
    k.linear_velocity.z = -controls.throttle * MULTIROTOR_MAX_CLIMB;
    k.yaw_rate = controls.steering * MULTIROTOR_MAX_YAW_RATE;
}

fn ground_drive_speed(current: f32, controls: &ControlFrame, max_speed: f32) -> f32 {
    if controls.handbrake {
        return 0.0;
    }
    let direction = if controls.is_manual_gear && controls.manual_gear == GEAR_REVERSE {
        -1.0
    } else {
        1.0
    };
    let target = direction * controls.throttle * max_speed;
    let braked = target * (1.0 - controls.brake);
    // Brake alone bleeds off the current speed.
    if controls.throttle.abs() <= f32::EPSILON {
        current * (1.0 - controls.brake)
    } else {
        braked
    }
}

fn skid_steer_movement(k: &mut Kinematics, controls: &ControlFrame) {
    let speed = ground_drive_speed(
        k.linear_velocity.dot(&k.heading()),
        controls,
        SKID_MAX_SPEED,
    );
    k.linear_velocity = k.heading() * speed;
    // Tracks turn in place.
    k.yaw_rate = if controls.handbrake {
        0.0
    } else {
        controls.steering * SKID_MAX_YAW_RATE
    };
}

fn car_movement(k: &mut Kinematics, controls: &ControlFrame) {
    let speed = ground_drive_speed(
        k.linear_velocity.dot(&k.heading()),
        controls,
        CAR_MAX_SPEED,
    );
    k.linear_velocity = k.heading() * speed;
    k.yaw_rate = controls.steering * speed * CAR_STEER_GAIN;
}

/// Classes available in this simulator instance.
#[derive(Debug, Clone, Default)]
pub struct ClassRegistry {
    entries: HashMap<VehicleClass, Capabilities>,
}

impl ClassRegistry {
    /// A registry with no classes.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry with every built-in class.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Capabilities::multirotor());
        registry.register(Capabilities::skid_steer());
        registry.register(Capabilities::car());
        registry
    }

    /// Adds or replaces the capabilities for a class.
    pub fn register(&mut self, capabilities: Capabilities) {
        self.entries.insert(capabilities.class, capabilities);
    }

    /// Removes a class; later lookups for it report it unsupported.
    pub fn unregister(&mut self, class: VehicleClass) -> Option<Capabilities> {
        self.entries.remove(&class)
    }

    #[must_use]
    pub fn get(&self, class: VehicleClass) -> Option<&Capabilities> {
        self.entries.get(&class)
    }

    #[must_use]
    pub fn supports(&self, class: VehicleClass) -> bool {
        self.entries.contains_key(&class)
    }

    /// Protocol classes with at least one registered vehicle class, in port order.
    #[must_use]
    pub fn protocol_classes(&self) -> BTreeSet<ProtocolClass> {
        self.entries.values().map(|caps| caps.protocol).collect()
    }
}
