//! Per-frame vehicle telemetry over UDP.
//!
//! Each render frame sends one datagram per vehicle: a postcard-encoded
//! [`TelemetryFrame`]. Delivery is fire-and-forget; a full send buffer or an
//! unreachable peer surfaces as [`TelemetryError::Send`] and the caller moves
//! on to the next vehicle.

use std::io;

use serde::{Deserialize, Serialize};

use crate::net::{Endpoint, UdpSocket};
use crate::trace::info;
use crate::vehicle::api::{TelemetryError, TelemetrySink, VehicleState};

use super::message::MAX_DATAGRAM_SIZE;

/// One telemetry datagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// Render-frame delta, in seconds.
    pub dt: f32,
    pub state: VehicleState,
}

/// Sends [`TelemetryFrame`]s from an ephemeral socket to one destination.
pub struct UdpTelemetrySink {
    socket: UdpSocket,
    destination: Endpoint,
}

impl UdpTelemetrySink {
    /// Binds an ephemeral local port for sending to `destination`.
    ///
    /// # Errors
    ///
    /// Returns the bind error.
    pub fn connect(destination: Endpoint) -> io::Result<Self> {
        let local = if destination.ip().is_loopback() {
            Endpoint::new(destination.ip(), 0)
        } else {
            Endpoint::any(0)
        };
        let socket = UdpSocket::bind(local)?;
        info!(%destination, "telemetry sink ready");
        Ok(Self {
            socket,
            destination,
        })
    }

    #[must_use]
    pub const fn destination(&self) -> Endpoint {
        self.destination
    }
}

impl TelemetrySink for UdpTelemetrySink {
    fn send(&self, state: &VehicleState, dt: f32) -> Result<(), TelemetryError> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        // Field order matches `TelemetryFrame`, so this decodes as one.
        let bytes = postcard::to_slice(&(dt, state), &mut buf)?;
        match self.socket.try_send_to(bytes, self.destination)? {
            Some(_) => Ok(()),
            None => Err(io::Error::from(io::ErrorKind::WouldBlock).into()),
        }
    }
}

impl std::fmt::Debug for UdpTelemetrySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTelemetrySink")
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}
