//! Where a channel sends its exchanges.

use peerhttp_wire::PeerInfo;
use std::fmt;
use std::net::SocketAddr;

/// URI scheme used when reporting peer-addressed targets.
pub const PEER_SCHEME: &str = "p2p";

/// The remote end of a channel.
///
/// `Peer` is reached through the peer host by identity; `Host` is a plain
/// TCP socket speaking HTTP/1.1 with no peer handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Peer(PeerInfo),
    Host(SocketAddr),
}

impl Destination {
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Peer(_) => PEER_SCHEME,
            Self::Host(_) => "http",
        }
    }

    /// Authority component: the peer id or the socket address. Also used as
    /// the `host` header when the caller does not supply one.
    pub fn authority(&self) -> String {
        match self {
            Self::Peer(info) => info.id.to_string(),
            Self::Host(addr) => addr.to_string(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme(), self.authority())
    }
}

impl From<PeerInfo> for Destination {
    fn from(info: PeerInfo) -> Self {
        Self::Peer(info)
    }
}

impl From<SocketAddr> for Destination {
    fn from(addr: SocketAddr) -> Self {
        Self::Host(addr)
    }
}
