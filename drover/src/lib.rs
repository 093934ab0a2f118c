//! Simulation core for a multi-vehicle simulator.
//!
//! - [`partition`]: decides which vehicles this core steps and which the host
//!   engine owns.
//! - [`control`]: per-tick arbitration between API, hardware device and
//!   keyboard inputs.
//! - [`runtime`]: the fixed-period stepping scheduler with deterministic
//!   `continue_for_*` primitives.
//! - [`api`]: per-class UDP protocol servers run together by a router.
//! - [`simmode`]: the lifecycle that ties them together.

pub mod api;
pub mod control;
pub mod net;
pub mod partition;
pub mod physics;
pub mod report;
pub mod runtime;
pub mod settings;
pub mod simmode;
pub mod trace;
pub mod vehicle;

pub use api::{ApiProvider, ProtocolRouter, RouterConfig};
pub use partition::{OwnershipPartition, Partition, classify};
pub use runtime::{SchedulerConfig, SchedulerError, StepScheduler};
pub use settings::{ConfigError, Settings};
pub use simmode::{SimError, SimMode};
pub use trace::init_tracing;
pub use vehicle::{ClassRegistry, ControlFrame, VehicleClass};
