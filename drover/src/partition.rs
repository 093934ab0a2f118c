//! Vehicle ownership partition.
//!
//! Each vehicle is simulated either by this core (stepped every tick) or by
//! the host engine (this core only forwards a one-time reset). The split is
//! decided once from the vehicle's settings type and never revisited.

use crate::trace::info;
use crate::vehicle::sim::VehicleSim;

/// Type keywords whose vehicles the host engine simulates.
pub const HOST_KEYWORDS: [&str; 5] = ["husky", "car", "rover", "skid", "physx"];
/// Type keywords whose vehicles this core simulates. Unmatched types also
/// land here.
pub const CORE_KEYWORDS: [&str; 4] = ["simpleflight", "px4", "ardu", "multirotor"];

/// Who simulates a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    CoreManaged,
    HostManaged,
}

/// Classifies a settings `VehicleType` by case-insensitive substring match.
///
/// Host keywords are checked first. `None` (no settings entry) and anything
/// unmatched are core-managed.
#[must_use]
pub fn classify(vehicle_type: Option<&str>) -> Partition {
    let Some(vehicle_type) = vehicle_type else {
        return Partition::CoreManaged;
    };
    let t = vehicle_type.to_ascii_lowercase();
    if HOST_KEYWORDS.iter().any(|k| t.contains(k)) {
        return Partition::HostManaged;
    }
    // Core keywords and unknown types resolve the same way.
    Partition::CoreManaged
}

/// Vehicles after the initial split.
#[derive(Default)]
pub struct Partitioned {
    pub core: Vec<Box<dyn VehicleSim>>,
    pub host: Vec<Box<dyn VehicleSim>>,
}

/// Tracks the one-shot host reset across a start/stop cycle.
#[derive(Debug, Default)]
pub struct OwnershipPartition {
    host_reset_done: bool,
}

impl OwnershipPartition {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits `vehicles`, resetting each host-managed vehicle on the first
    /// pass of the cycle only.
    pub fn split(&mut self, vehicles: Vec<Box<dyn VehicleSim>>) -> Partitioned {
        let mut out = Partitioned::default();
        for mut vehicle in vehicles {
            match classify(vehicle.vehicle_type()) {
                Partition::CoreManaged => out.core.push(vehicle),
                Partition::HostManaged => {
                    info!(vehicle = vehicle.name(), "host engine simulates vehicle, skipping core physics");
                    if !self.host_reset_done {
                        vehicle.reset();
                    }
                    out.host.push(vehicle);
                }
            }
        }
        self.host_reset_done = true;
        out
    }

    /// Whether a vehicle registered after initialization joins the core world.
    #[must_use]
    pub fn admits(&self, vehicle: &dyn VehicleSim) -> bool {
        match classify(vehicle.vehicle_type()) {
            Partition::CoreManaged => true,
            Partition::HostManaged => {
                info!(vehicle = vehicle.name(), "late registration skipped, host engine simulates vehicle");
                false
            }
        }
    }

    #[must_use]
    pub const fn host_reset_done(&self) -> bool {
        self.host_reset_done
    }

    /// Ends the cycle; the next split resets host vehicles again.
    pub fn teardown(&mut self) {
        self.host_reset_done = false;
    }
}
