//! Inbound listener: peer streams presented as accepted connections.
//!
//! [`HttpListener`] implements [`axum::serve::Listener`], so a router can be
//! served over peer streams exactly as over TCP:
//!
//! ```no_run
//! # async fn demo(host: std::sync::Arc<peerhttp::PeerHost>) -> Result<(), Box<dyn std::error::Error>> {
//! let listener = peerhttp::listen(&host)?;
//! let closer = listener.closer();
//! axum::serve(listener, peerhttp::echo::router())
//!     .with_graceful_shutdown(async move { closer.closed().await })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::error::ListenerError;
use crate::protocol::http_protocol;
use peerhttp_wire::{PeerAddr, PeerHost, PeerId, PeerStream, ProtocolId};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Register [`HTTP_PROTOCOL`](crate::HTTP_PROTOCOL) on `host` and start
/// accepting streams for it.
pub fn listen(host: &Arc<PeerHost>) -> Result<HttpListener, ListenerError> {
    listen_on(host, http_protocol())
}

/// Register `protocol` on `host` and start accepting streams for it.
///
/// Fails immediately if the protocol already has a live listener on this host
/// or the host has shut down; nothing stays registered in that case.
pub fn listen_on(host: &Arc<PeerHost>, protocol: ProtocolId) -> Result<HttpListener, ListenerError> {
    let incoming = host
        .register_protocol(protocol.clone())
        .map_err(|source| ListenerError::Registration {
            protocol: protocol.clone(),
            source,
        })?;
    info!("peerhttp: listening for {} on {}", protocol, host.peer_id());
    Ok(HttpListener {
        local_addr: PeerAddr::new(host.peer_id(), host.local_addr()),
        registration: Arc::new(Registration {
            host: Arc::clone(host),
            protocol,
            closed: CancellationToken::new(),
            released: AtomicBool::new(false),
            incoming: Mutex::new(incoming),
        }),
    })
}

/// State shared between a listener and its closers.
struct Registration {
    host: Arc<PeerHost>,
    protocol: ProtocolId,
    closed: CancellationToken,
    released: AtomicBool,
    incoming: Mutex<mpsc::Receiver<PeerStream>>,
}

impl Registration {
    fn close(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.closed.cancel();
        self.host.unregister_protocol(&self.protocol);
        // A parked accept holds the queue; it drains once it sees the token.
        if let Ok(mut incoming) = self.incoming.try_lock() {
            discard_queued(&self.protocol, &mut incoming);
        }
        info!("peerhttp: listener for {} closed", self.protocol);
    }
}

/// Refuse further deliveries and drop every stream nobody accepted, so their
/// dialers see the connection close.
fn discard_queued(protocol: &ProtocolId, incoming: &mut mpsc::Receiver<PeerStream>) {
    incoming.close();
    let mut dropped = 0;
    while let Ok(stream) = incoming.try_recv() {
        drop(stream);
        dropped += 1;
    }
    if dropped > 0 {
        debug!("peerhttp: dropped {} unaccepted {} streams", dropped, protocol);
    }
}

/// Accepts inbound streams for one protocol on a local host.
///
/// Dropping the listener closes it.
pub struct HttpListener {
    registration: Arc<Registration>,
    local_addr: PeerAddr,
}

impl HttpListener {
    /// Wait for the next inbound stream.
    ///
    /// Returns [`ListenerError::Closed`] once the listener is closed, including
    /// for calls already parked here when [`close`](Self::close) runs, and when
    /// the host shuts down. Streams still queued at close are dropped.
    pub async fn accept(&self) -> Result<PeerConnection, ListenerError> {
        self.next_connection().await
    }

    async fn next_connection(&self) -> Result<PeerConnection, ListenerError> {
        let registration = &self.registration;
        if registration.closed.is_cancelled() {
            return Err(ListenerError::Closed);
        }
        let next = tokio::select! {
            biased;
            _ = registration.closed.cancelled() => None,
            stream = async { registration.incoming.lock().await.recv().await } => stream,
        };
        match next {
            Some(stream) => {
                debug!(
                    "peerhttp: accepted {} stream from {}",
                    stream.protocol(),
                    stream.remote_peer()
                );
                Ok(PeerConnection::new(stream))
            }
            None => {
                // Either closed, or the host dropped the handler on shutdown.
                registration.close();
                let mut incoming = registration.incoming.lock().await;
                discard_queued(&registration.protocol, &mut incoming);
                Err(ListenerError::Closed)
            }
        }
    }

    /// Stop accepting and release the protocol registration. Idempotent.
    pub fn close(&self) {
        self.registration.close();
    }

    pub fn is_closed(&self) -> bool {
        self.registration.closed.is_cancelled()
    }

    /// The local host's address and identity.
    pub fn local_addr(&self) -> PeerAddr {
        self.local_addr
    }

    pub fn protocol(&self) -> &ProtocolId {
        &self.registration.protocol
    }

    /// A handle that can close this listener from elsewhere, e.g. while it is
    /// owned by a server loop.
    pub fn closer(&self) -> ListenerCloser {
        ListenerCloser {
            registration: Arc::clone(&self.registration),
        }
    }
}

impl Drop for HttpListener {
    fn drop(&mut self) {
        self.registration.close();
    }
}

impl axum::serve::Listener for HttpListener {
    type Io = PeerConnection;
    type Addr = PeerAddr;

    /// Once closed this never resolves; stop the server with
    /// `with_graceful_shutdown(closer.closed())`.
    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        match self.next_connection().await {
            Ok(conn) => {
                let addr = conn.remote_addr();
                (conn, addr)
            }
            Err(_) => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}

/// Closes an [`HttpListener`] from another task.
#[derive(Clone)]
pub struct ListenerCloser {
    registration: Arc<Registration>,
}

impl ListenerCloser {
    pub fn close(&self) {
        self.registration.close();
    }

    pub fn is_closed(&self) -> bool {
        self.registration.closed.is_cancelled()
    }

    /// Resolves once the listener is closed.
    pub async fn closed(&self) {
        self.registration.closed.cancelled().await;
    }
}

/// One accepted inbound stream.
///
/// Reads and writes go straight to the underlying peer stream. After
/// [`close`](Self::close) reads return end-of-file and writes fail with
/// `BrokenPipe`.
#[derive(Debug)]
pub struct PeerConnection {
    stream: PeerStream,
    closed: bool,
}

impl PeerConnection {
    fn new(stream: PeerStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// Shut down the write side. Calling it again is a no-op.
    pub async fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream.shutdown().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn local_addr(&self) -> PeerAddr {
        self.stream.local_addr()
    }

    pub fn remote_addr(&self) -> PeerAddr {
        self.stream.remote_addr()
    }

    pub fn remote_peer(&self) -> PeerId {
        self.stream.remote_peer()
    }

    pub fn protocol(&self) -> &ProtocolId {
        self.stream.protocol()
    }

    pub fn into_inner(self) -> PeerStream {
        self.stream
    }
}

fn connection_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "connection closed")
}

impl AsyncRead for PeerConnection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.closed {
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for PeerConnection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.closed {
            return Poll::Ready(Err(connection_closed()));
        }
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.closed {
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.closed {
            return Poll::Ready(Ok(()));
        }
        let res = Pin::new(&mut self.stream).poll_shutdown(cx);
        if res.is_ready() {
            self.closed = true;
        }
        res
    }
}
