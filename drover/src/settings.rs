//! Simulator settings.
//!
//! Settings are a JSON document with PascalCase keys. Every key is optional;
//! missing keys take the defaults below.
//!
//! ```json
//! {
//!   "PhysicsEngineName": "FastPhysicsEngine",
//!   "PhysicsLoopPeriodNs": 3000000,
//!   "ApiServerPort": 41451,
//!   "TelemetryPort": 41460,
//!   "Wind": [0.0, 2.0, 0.0],
//!   "Vehicles": {
//!     "Drone1": { "VehicleType": "SimpleFlight", "X": 0, "Y": 0, "Z": -2 },
//!     "Car1": { "VehicleType": "PhysXCar", "RC": { "RemoteControlID": 0 } }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::net::AddrParseError;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::net::Endpoint;
use crate::physics::{FAST_PHYSICS_ENGINE, PhysicsBackend};
use crate::runtime::topology::CpuConfig;
use crate::vehicle::kinematics::{Kinematics, Vector3r};

pub const DEFAULT_API_SERVER_PORT: u16 = 41451;
pub const DEFAULT_PHYSICS_LOOP_PERIOD: Duration = Duration::from_millis(3);
/// Vehicle spawned when settings configure none.
pub const DEFAULT_VEHICLE_NAME: &str = "SimpleFlight";

/// Configuration failure. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("physics engine name is empty")]
    EmptyPhysicsEngine,
    #[error("physics engine name is not recognized: {0}")]
    UnrecognizedPhysicsEngine(String),
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// `FastPhysicsEngine` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FastPhysicsSettings {
    pub enable_ground_lock: bool,
}

impl Default for FastPhysicsSettings {
    fn default() -> Self {
        Self {
            enable_ground_lock: true,
        }
    }
}

/// Remote-control binding of one vehicle.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RcSettings {
    /// Input device index, `-1` for none.
    #[serde(rename = "RemoteControlID")]
    pub remote_control_id: i32,
}

impl Default for RcSettings {
    fn default() -> Self {
        Self {
            remote_control_id: -1,
        }
    }
}

/// One entry of `Vehicles`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VehicleSetting {
    pub vehicle_type: String,
    /// Pawn asset; empty selects the class default.
    pub pawn_path: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Spawn yaw in degrees.
    pub yaw: f32,
    #[serde(rename = "RC")]
    pub rc: RcSettings,
}

impl VehicleSetting {
    /// Spawn pose.
    #[must_use]
    pub fn initial_kinematics(&self) -> Kinematics {
        Kinematics::at_rest(
            Vector3r::new(self.x, self.y, self.z),
            self.yaw.to_radians(),
        )
    }
}

/// Top-level settings document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Settings {
    pub physics_engine_name: String,
    pub physics_loop_period_ns: u64,
    /// Bind address for the protocol servers; empty binds all interfaces.
    pub api_server_address: String,
    pub api_server_port: u16,
    pub api_server_threads: usize,
    pub enable_state_report: bool,
    /// Telemetry destination host; empty means loopback.
    pub telemetry_address: String,
    /// Telemetry destination port; zero disables telemetry.
    pub telemetry_port: u16,
    pub wind: [f32; 3],
    pub ext_force: [f32; 3],
    pub fast_physics_engine: FastPhysicsSettings,
    pub vehicles: BTreeMap<String, VehicleSetting>,
    pub cpu_pinning: CpuConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            physics_engine_name: FAST_PHYSICS_ENGINE.to_owned(),
            physics_loop_period_ns: u64::try_from(DEFAULT_PHYSICS_LOOP_PERIOD.as_nanos())
                .unwrap_or(u64::MAX),
            api_server_address: String::new(),
            api_server_port: DEFAULT_API_SERVER_PORT,
            api_server_threads: 1,
            enable_state_report: false,
            telemetry_address: String::new(),
            telemetry_port: 0,
            wind: [0.0; 3],
            ext_force: [0.0; 3],
            fast_physics_engine: FastPhysicsSettings::default(),
            vehicles: BTreeMap::new(),
            cpu_pinning: CpuConfig::default(),
        }
    }
}

impl Settings {
    /// Loads settings from a JSON file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not a valid settings document.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Parses settings from JSON text.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] if the text is not a valid settings document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Validates `PhysicsEngineName`.
    ///
    /// # Errors
    ///
    /// See [`PhysicsBackend::from_name`].
    pub fn physics_backend(&self) -> Result<PhysicsBackend, ConfigError> {
        PhysicsBackend::from_name(
            &self.physics_engine_name,
            self.fast_physics_engine.enable_ground_lock,
        )
    }

    /// Stepping period. Zero in settings falls back to the default.
    #[must_use]
    pub fn physics_loop_period(&self) -> Duration {
        if self.physics_loop_period_ns == 0 {
            DEFAULT_PHYSICS_LOOP_PERIOD
        } else {
            Duration::from_nanos(self.physics_loop_period_ns)
        }
    }

    #[must_use]
    pub fn wind(&self) -> Vector3r {
        Vector3r::from(self.wind)
    }

    #[must_use]
    pub fn ext_force(&self) -> Vector3r {
        Vector3r::from(self.ext_force)
    }

    /// Telemetry destination, or `None` while `TelemetryPort` is zero.
    ///
    /// # Errors
    ///
    /// Returns the parse error for a malformed `TelemetryAddress`.
    pub fn telemetry_endpoint(&self) -> Result<Option<Endpoint>, AddrParseError> {
        if self.telemetry_port == 0 {
            return Ok(None);
        }
        if self.telemetry_address.is_empty() {
            return Ok(Some(Endpoint::localhost(self.telemetry_port)));
        }
        Endpoint::from_host(&self.telemetry_address, self.telemetry_port).map(Some)
    }

    /// Configured vehicles, or the single default multirotor when none are.
    #[must_use]
    pub fn effective_vehicles(&self) -> BTreeMap<String, VehicleSetting> {
        if self.vehicles.is_empty() {
            let default = VehicleSetting {
                vehicle_type: "SimpleFlight".to_owned(),
                ..VehicleSetting::default()
            };
            BTreeMap::from([(DEFAULT_VEHICLE_NAME.to_owned(), default)])
        } else {
            self.vehicles.clone()
        }
    }

    /// Settings `VehicleType` for `name`, if configured.
    #[must_use]
    pub fn vehicle_type(&self, name: &str) -> Option<&str> {
        self.vehicles.get(name).map(|v| v.vehicle_type.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let settings = Settings::from_json_str("{}").unwrap();
        assert_eq!(settings.physics_engine_name, "FastPhysicsEngine");
        assert_eq!(settings.physics_loop_period(), Duration::from_millis(3));
        assert_eq!(settings.api_server_port, 41451);
        assert_eq!(settings.api_server_threads, 1);
        assert!(settings.fast_physics_engine.enable_ground_lock);
        assert!(matches!(settings.cpu_pinning, CpuConfig::Auto));
    }

    #[test]
    fn parses_vehicles() {
        let settings = Settings::from_json_str(
            r#"{
                "Vehicles": {
                    "Drone1": { "VehicleType": "PX4Multirotor", "Z": -2.5, "Yaw": 90 },
                    "Car1": { "VehicleType": "PhysXCar", "RC": { "RemoteControlID": 0 } }
                }
            }"#,
        )
        .unwrap();

        let drone = &settings.vehicles["Drone1"];
        assert_eq!(drone.vehicle_type, "PX4Multirotor");
        assert_eq!(drone.rc.remote_control_id, -1);
        let k = drone.initial_kinematics();
        assert_eq!(k.position.z, -2.5);
        assert!((k.yaw - std::f32::consts::FRAC_PI_2).abs() < 1e-6);

        assert_eq!(settings.vehicles["Car1"].rc.remote_control_id, 0);
        assert_eq!(settings.vehicle_type("Car1"), Some("PhysXCar"));
        assert_eq!(settings.vehicle_type("Nope"), None);
    }

    #[test]
    fn no_vehicles_spawns_default_multirotor() {
        let settings = Settings::default();
        let vehicles = settings.effective_vehicles();
        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles[DEFAULT_VEHICLE_NAME].vehicle_type, "SimpleFlight");
    }

    #[test]
    fn cpu_pinning_variants() {
        let manual = Settings::from_json_str(r#"{ "CpuPinning": { "Manual": { "stepping_core": 2 } } }"#)
            .unwrap();
        assert!(matches!(
            manual.cpu_pinning,
            CpuConfig::Manual {
                stepping_core: Some(2)
            }
        ));
        let disabled = Settings::from_json_str(r#"{ "CpuPinning": "Disabled" }"#).unwrap();
        assert!(matches!(disabled.cpu_pinning, CpuConfig::Disabled));
    }

    #[test]
    fn zero_period_falls_back_to_default() {
        let settings = Settings::from_json_str(r#"{ "PhysicsLoopPeriodNs": 0 }"#).unwrap();
        assert_eq!(settings.physics_loop_period(), DEFAULT_PHYSICS_LOOP_PERIOD);
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        assert!(matches!(
            Settings::from_json_str("{ \"ApiServerPort\": \"x\" }"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        assert!(matches!(
            Settings::from_path("/nonexistent/drover-settings.json"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn telemetry_is_off_until_a_port_is_set() {
        assert_eq!(Settings::default().telemetry_endpoint().unwrap(), None);

        let settings = Settings::from_json_str(r#"{ "TelemetryPort": 41460 }"#).unwrap();
        assert_eq!(
            settings.telemetry_endpoint().unwrap(),
            Some(Endpoint::localhost(41460))
        );

        let settings = Settings::from_json_str(
            r#"{ "TelemetryAddress": "10.0.0.7", "TelemetryPort": 9000 }"#,
        )
        .unwrap();
        assert_eq!(
            settings.telemetry_endpoint().unwrap().map(|e| e.to_string()),
            Some("10.0.0.7:9000".to_owned())
        );

        let settings = Settings::from_json_str(
            r#"{ "TelemetryAddress": "not-an-ip", "TelemetryPort": 9000 }"#,
        )
        .unwrap();
        assert!(settings.telemetry_endpoint().is_err());
    }
}
