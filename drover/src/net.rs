//! Network transport primitives for the protocol servers.

pub mod endpoint;
pub mod socket;

pub use endpoint::Endpoint;
pub use socket::UdpSocket;
