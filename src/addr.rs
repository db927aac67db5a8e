//! Canonical peer address keys.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// A hashable, ordered key identifying one remote peer.
///
/// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) are folded into their IPv4
/// form, so a peer reached through a dual-stack socket maps to the same key
/// as when reached over IPv4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddressKey(SocketAddr);

impl AddressKey {
    /// Canonicalize a socket address.
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        let ip = match addr.ip() {
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => IpAddr::V6(v6),
            },
            v4 => v4,
        };
        Self(SocketAddr::new(ip, addr.port()))
    }

    /// The canonical socket address.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    /// The peer's IP address.
    #[must_use]
    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    /// The peer's port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.0.port()
    }
}

impl From<SocketAddr> for AddressKey {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr)
    }
}

impl fmt::Display for AddressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
