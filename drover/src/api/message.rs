//! Request/response messages exchanged with protocol servers.
//!
//! One request per UDP datagram, one response back to the sender. Payloads
//! are `postcard`-encoded serde enums.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vehicle::api::VehicleState;
use crate::vehicle::class::ProtocolClass;
use crate::vehicle::controls::ControlFrame;

/// Largest datagram a server accepts or emits.
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Identifies one client session on one server.
///
/// Invariant: Opaque. Generated via `SessionId::generate()`, never user-constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(u32);

impl SessionId {
    /// Generate a new random session ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(rand::random())
    }

    /// Raw value for wire serialization.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Opens (or re-opens) a session.
    Hello,
    Ping,
    /// Names of the vehicles this endpoint serves.
    ListVehicles,
    EnableApiControl { vehicle: String, enabled: bool },
    IsApiControlEnabled { vehicle: String },
    SetControls { vehicle: String, controls: ControlFrame },
    GetControls { vehicle: String },
    GetState { vehicle: String },
}

impl Request {
    /// Target vehicle, for vehicle-scoped requests.
    #[must_use]
    pub fn vehicle(&self) -> Option<&str> {
        match self {
            Self::EnableApiControl { vehicle, .. }
            | Self::IsApiControlEnabled { vehicle }
            | Self::SetControls { vehicle, .. }
            | Self::GetControls { vehicle }
            | Self::GetState { vehicle } => Some(vehicle),
            Self::Hello | Self::Ping | Self::ListVehicles => None,
        }
    }
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ErrorCode {
    #[error("unknown vehicle")]
    UnknownVehicle,
    /// The vehicle exists but belongs to another endpoint's class.
    #[error("vehicle belongs to a different class")]
    WrongClass,
    #[error("unsupported vehicle class")]
    UnsupportedVehicleClass,
    #[error("malformed request")]
    Malformed,
}

/// Server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Welcome {
        session: SessionId,
        class: ProtocolClass,
    },
    Pong,
    Ack,
    Vehicles(Vec<String>),
    Enabled(bool),
    Controls(ControlFrame),
    State(VehicleState),
    Error(ErrorCode),
}

/// Codec failure.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("failed to encode message: {0}")]
    Encode(postcard::Error),
    #[error("failed to decode message: {0}")]
    Decode(postcard::Error),
}

/// Serializes `msg` into `buf`, returning the used prefix.
///
/// # Errors
///
/// [`WireError::Encode`] if `msg` does not fit in `buf`.
pub fn encode<'a, T: Serialize>(msg: &T, buf: &'a mut [u8]) -> Result<&'a mut [u8], WireError> {
    postcard::to_slice(msg, buf).map_err(WireError::Encode)
}

/// Deserializes one message from `bytes`.
///
/// # Errors
///
/// [`WireError::Decode`] on malformed input.
pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, WireError> {
    postcard::from_bytes(bytes).map_err(WireError::Decode)
}
