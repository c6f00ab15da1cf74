//! Free TCP port allocation.

use crate::error::{Result, SimError};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::TcpSocket;

/// Source of TCP ports for node listeners.
pub trait PortAllocator {
    /// Returns a port that is not bound at the time of the call.
    fn allocate(&mut self) -> Result<u16>;
}

/// Asks the OS for an ephemeral port by binding port 0 and letting go.
///
/// Best effort only: another process may grab the port between release and
/// the node binding it. Acceptable on a local simulation host.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsPortAllocator;

impl PortAllocator for OsPortAllocator {
    fn allocate(&mut self) -> Result<u16> {
        find_free_port()
    }
}

/// Binds an ephemeral port with address and port reuse, returns its number
/// and releases it.
pub fn find_free_port() -> Result<u16> {
    let socket = reusable_socket().map_err(SimError::PortAllocation)?;
    socket
        .bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
        .map_err(SimError::PortAllocation)?;
    let port = socket
        .local_addr()
        .map_err(SimError::PortAllocation)?
        .port();
    Ok(port)
}

fn reusable_socket() -> std::io::Result<TcpSocket> {
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.set_reuseport(true)?;
    Ok(socket)
}

/// Hands out consecutive ports starting at a base. Deterministic, for tests.
#[derive(Debug, Clone)]
pub struct SequentialPorts {
    next: u16,
}

impl SequentialPorts {
    pub fn starting_at(base: u16) -> Self {
        Self { next: base }
    }
}

impl PortAllocator for SequentialPorts {
    fn allocate(&mut self) -> Result<u16> {
        let port = self.next;
        self.next = self.next.checked_add(1).ok_or_else(|| {
            SimError::PortAllocation(std::io::Error::other("sequential port range exhausted"))
        })?;
        Ok(port)
    }
}
