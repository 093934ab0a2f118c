//! Remote protocol: wire messages, vehicle lookup, per-class servers, the
//! router that runs them together, and the UDP telemetry sink.

pub mod message;
pub mod provider;
pub mod router;
pub mod server;
pub mod telemetry;

pub use message::{ErrorCode, Request, Response, SessionId, WireError};
pub use provider::ApiProvider;
pub use router::{ProtocolRouter, RouterConfig, RouterError, RouterStopHandle};
pub use server::{ProtocolServer, ServerError, StopHandle};
pub use telemetry::{TelemetryFrame, UdpTelemetrySink};
