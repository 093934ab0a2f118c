//! Socket address of a protocol server or client.

use std::fmt;
use std::net::{AddrParseError, IpAddr, Ipv4Addr, SocketAddr};

/// IP address and port. Servers bind one each; sessions are keyed by the
/// client's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    #[must_use]
    pub const fn new(addr: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(addr, port))
    }

    /// All interfaces.
    #[must_use]
    pub const fn any(port: u16) -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
    }

    #[must_use]
    pub const fn localhost(port: u16) -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    /// Endpoint for a settings `ApiServerAddress`; empty binds all interfaces.
    ///
    /// # Errors
    ///
    /// Returns an error if `address` is neither empty nor an IP address.
    pub fn from_host(address: &str, port: u16) -> Result<Self, AddrParseError> {
        if address.is_empty() {
            return Ok(Self::any(port));
        }
        Ok(Self::new(address.parse()?, port))
    }

    #[must_use]
    pub const fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.0.port()
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(ep: Endpoint) -> Self {
        ep.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_host_binds_all_interfaces() {
        let ep = Endpoint::from_host("", 41451).unwrap();
        assert_eq!(ep, Endpoint::any(41451));
        assert_eq!(ep.ip(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn host_must_be_an_ip_address() {
        assert_eq!(
            Endpoint::from_host("127.0.0.1", 41452).unwrap(),
            Endpoint::localhost(41452)
        );
        assert_eq!(Endpoint::from_host("::1", 7).unwrap().port(), 7);
        assert!(Endpoint::from_host("localhost", 1).is_err());
    }

    #[test]
    fn socket_addr_round_trip_and_display() {
        let addr: SocketAddr = "10.0.0.1:41451".parse().unwrap();
        let ep = Endpoint::from(addr);
        assert_eq!(SocketAddr::from(ep), addr);
        assert_eq!(ep.to_string(), "10.0.0.1:41451");
    }
}
