//! Negotiated protocol streams.

use crate::identity::PeerId;
use crate::protocol::ProtocolId;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// Pseudo-address of one end of a peer stream: socket plus identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddr {
    pub peer_id: PeerId,
    pub socket: SocketAddr,
}

impl PeerAddr {
    pub fn new(peer_id: PeerId, socket: SocketAddr) -> Self {
        Self { peer_id, socket }
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/p2p/{}", self.socket, self.peer_id)
    }
}

/// A handshaked TCP connection carrying the raw bytes of one protocol.
#[derive(Debug)]
pub struct PeerStream {
    inner: TcpStream,
    protocol: ProtocolId,
    local: PeerAddr,
    remote: PeerAddr,
}

impl PeerStream {
    pub(crate) fn new(
        inner: TcpStream,
        protocol: ProtocolId,
        local: PeerAddr,
        remote: PeerAddr,
    ) -> Self {
        Self {
            inner,
            protocol,
            local,
            remote,
        }
    }

    /// The protocol this stream was opened for.
    pub fn protocol(&self) -> &ProtocolId {
        &self.protocol
    }

    pub fn local_addr(&self) -> PeerAddr {
        self.local
    }

    pub fn remote_addr(&self) -> PeerAddr {
        self.remote
    }

    /// Identity of the peer at the other end.
    pub fn remote_peer(&self) -> PeerId {
        self.remote.peer_id
    }
}

impl AsyncRead for PeerStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for PeerStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}
