//! Non-blocking UDP socket shared by the workers of one protocol server.

use std::io::{self, ErrorKind};

use mio::net::UdpSocket as MioUdpSocket;

use super::Endpoint;

/// Non-blocking UDP socket.
///
/// Every worker of a server polls the same socket with the `try_*` calls; a
/// datagram is delivered to exactly one of them.
#[derive(Debug)]
pub struct UdpSocket {
    inner: MioUdpSocket,
}

impl UdpSocket {
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be bound.
    pub fn bind(endpoint: Endpoint) -> io::Result<Self> {
        let inner = MioUdpSocket::bind(endpoint.into())?;
        Ok(Self { inner })
    }

    /// Bound address; resolves port 0 to the port the OS picked.
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be retrieved.
    pub fn local_addr(&self) -> io::Result<Endpoint> {
        self.inner.local_addr().map(Endpoint::from)
    }

    /// # Errors
    ///
    /// Returns an error on I/O failure, including `WouldBlock`.
    pub fn send_to(&self, buf: &[u8], dest: Endpoint) -> io::Result<usize> {
        self.inner.send_to(buf, dest.into())
    }

    /// # Errors
    ///
    /// Returns an error on I/O failure, including `WouldBlock`.
    pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, Endpoint)> {
        self.inner
            .recv_from(buf)
            .map(|(n, addr)| (n, Endpoint::from(addr)))
    }

    /// Like [`send_to`](Self::send_to), with `WouldBlock` as `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns any other I/O error.
    pub fn try_send_to(&self, buf: &[u8], dest: Endpoint) -> io::Result<Option<usize>> {
        match self.send_to(buf, dest) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Like [`recv_from`](Self::recv_from), with `WouldBlock` as `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns any other I/O error.
    pub fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, Endpoint)>> {
        match self.recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Sets `SO_RCVBUF`. mio does not expose socket options.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be set.
    pub fn set_recv_buffer_size(&self, size: usize) -> io::Result<()> {
        use std::os::fd::AsFd;
        rustix::net::sockopt::set_socket_recv_buffer_size(self.inner.as_fd(), size)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the option cannot be read.
    pub fn recv_buffer_size(&self) -> io::Result<usize> {
        use std::os::fd::AsFd;
        Ok(rustix::net::sockopt::get_socket_recv_buffer_size(self.inner.as_fd())?)
    }
}
