//! PeerHost: TCP endpoint that dials peers and routes protocol streams.
//!
//! A [`PeerHost`] binds a local TCP listener and accepts connections from
//! other hosts. It also dials outward to known peers. Every connection starts
//! with a handshake in which both sides prove ownership of their [`PeerId`]
//! (and, if configured, knowledge of a shared network key), then the dialer
//! states what the connection is for:
//!
//! - a **session**: the long-lived live connection to a peer, tracked in the
//!   [`AddressBook`];
//! - a **stream** for one [`ProtocolId`]: handed to whichever handler
//!   registered that protocol, after which the connection carries raw bytes.

use crate::identity::{InvalidPeerId, Keypair, PeerId, PeerInfo};
use crate::message::*;
use crate::protocol::{InvalidProtocolId, ProtocolId};
use crate::registry::AddressBook;
use crate::stream::{PeerAddr, PeerStream};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Generate HMAC-SHA256 signature for handshake authentication.
fn hmac_sign(secret: &str, data: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify HMAC-SHA256 signature using constant-time comparison.
fn hmac_verify(secret: &str, data: &[u8], signature: &str) -> bool {
    let expected = hmac_sign(secret, data);
    subtle::ConstantTimeEq::ct_eq(expected.as_bytes(), signature.as_bytes()).into()
}

/// Bytes signed (and HMAC'd) during the handshake: a nonce followed by the
/// signer's peer id.
fn auth_payload(nonce: &str, peer_id: &PeerId) -> Vec<u8> {
    format!("{nonce}{peer_id}").into_bytes()
}

/// Errors from the wire protocol layer.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: u32, max: u32 },
    #[error("Protocol version mismatch: local={local}, remote={remote}")]
    VersionMismatch { local: u32, remote: u32 },
    #[error("Peer identity mismatch: expected {expected}, got {actual}")]
    PeerIdMismatch { expected: PeerId, actual: PeerId },
    #[error("No known addresses for peer {0}")]
    NoAddresses(PeerId),
    #[error("Protocol not supported by remote peer: {0}")]
    ProtocolNotSupported(ProtocolId),
    #[error("Protocol already registered: {0}")]
    ProtocolAlreadyRegistered(ProtocolId),
    #[error(transparent)]
    InvalidProtocol(#[from] InvalidProtocolId),
    #[error(transparent)]
    InvalidPeerId(#[from] InvalidPeerId),
    #[error("Timed out during {0}")]
    Timeout(&'static str),
    #[error("Host is shut down")]
    ShutDown,
    #[error("Remote error {code}: {message}")]
    Remote { code: i32, message: String },
}

impl WireError {
    /// Whether a dial failure means the address does not lead to the
    /// expected peer at all, as opposed to the peer refusing us.
    pub fn is_unreachable_addr(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Timeout(_) | Self::PeerIdMismatch { .. }
        )
    }
}

/// Maximum single message size (16 MB).
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Configuration for a PeerHost.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Address to bind the listener on.
    pub listen_addr: SocketAddr,
    /// Optional pre-shared key. When set, peers must prove knowledge of it
    /// with an HMAC during the handshake.
    pub network_key: Option<String>,
    /// Upper bound on dialing plus the handshake, and on inbound handshakes.
    pub handshake_timeout: Duration,
    /// Inbound streams buffered per protocol before dialers wait.
    pub accept_backlog: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            network_key: None,
            handshake_timeout: Duration::from_secs(10),
            accept_backlog: 64,
        }
    }
}

/// Result of a successful inbound handshake.
struct Inbound {
    peer_id: PeerId,
    protocol_version: u32,
    listen_addrs: Vec<SocketAddr>,
    purpose: OpenPurpose,
    open_id: String,
}

/// The local network host. Listens for connections and dials peers.
pub struct PeerHost {
    keypair: Keypair,
    config: HostConfig,
    book: AddressBook,
    /// Actual bound address (useful when binding to port 0).
    local_addr: SocketAddr,
    handlers: DashMap<ProtocolId, mpsc::Sender<PeerStream>>,
    shutdown: watch::Sender<bool>,
}

impl PeerHost {
    /// Bind the configured address and start accepting connections.
    pub async fn start(keypair: Keypair, config: HostConfig) -> Result<Arc<Self>, WireError> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        let local_addr = listener.local_addr()?;

        info!(
            "peerhttp: listening on {} (peer_id={})",
            local_addr,
            keypair.peer_id()
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let host = Arc::new(Self {
            keypair,
            config,
            book: AddressBook::new(),
            local_addr,
            handlers: DashMap::new(),
            shutdown,
        });

        tokio::spawn(Self::accept_loop(listener, Arc::downgrade(&host), shutdown_rx));

        Ok(host)
    }

    /// This host's identity.
    pub fn peer_id(&self) -> PeerId {
        self.keypair.peer_id()
    }

    /// Get the actual bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Identity plus listen address, for handing to other hosts.
    pub fn peer_info(&self) -> PeerInfo {
        PeerInfo::new(self.peer_id(), vec![self.local_addr])
    }

    /// Get a reference to the address book.
    pub fn address_book(&self) -> &AddressBook {
        &self.book
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn ensure_running(&self) -> Result<(), WireError> {
        if self.is_shut_down() {
            return Err(WireError::ShutDown);
        }
        Ok(())
    }

    /// Ensure a live session to `peer` exists, dialing its known addresses
    /// in order if not.
    ///
    /// The addresses in `peer` are merged into the address book first. The
    /// remote end must prove it owns `peer.id`.
    pub async fn connect(&self, peer: &PeerInfo) -> Result<(), WireError> {
        self.ensure_running()?;
        self.book.add_addrs(peer.id, &peer.addrs);
        if self.book.is_connected(&peer.id) {
            return Ok(());
        }

        let addrs = self
            .book
            .peer_info(&peer.id)
            .map(|p| p.addrs)
            .unwrap_or_default();
        let mut last_err = None;
        for addr in addrs {
            match self.dial(addr, peer.id, OpenPurpose::Session).await {
                Ok((stream, protocol_version)) => {
                    info!("peerhttp: session established with {} at {}", peer.id, addr);
                    self.book.promote_addr(&peer.id, addr);
                    self.book.mark_connected(peer.id, protocol_version);
                    let book = self.book.clone();
                    let shutdown = self.shutdown.subscribe();
                    let peer_id = peer.id;
                    tokio::spawn(async move {
                        if let Err(e) = session_loop(stream, peer_id, book, shutdown).await {
                            debug!("peerhttp: session with {} ended: {}", peer_id, e);
                        }
                    });
                    return Ok(());
                }
                Err(e) => {
                    debug!("peerhttp: dialing {} at {} failed: {}", peer.id, addr, e);
                    if e.is_unreachable_addr() {
                        self.book.remove_addr(&peer.id, addr);
                    }
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(WireError::NoAddresses(peer.id)))
    }

    /// Open a new stream to `peer` negotiated for `protocol`.
    ///
    /// Fails with [`WireError::ProtocolNotSupported`] when the peer answers
    /// but has no handler registered for `protocol`.
    pub async fn open_stream(
        &self,
        peer: &PeerId,
        protocol: &ProtocolId,
    ) -> Result<PeerStream, WireError> {
        self.ensure_running()?;
        let addrs = self
            .book
            .peer_info(peer)
            .map(|p| p.addrs)
            .unwrap_or_default();

        let mut last_err = None;
        for addr in addrs {
            let purpose = OpenPurpose::Stream {
                protocol: protocol.clone(),
            };
            match self.dial(addr, *peer, purpose).await {
                Ok((stream, _)) => {
                    debug!("peerhttp: opened {} stream to {} at {}", protocol, peer, addr);
                    let local = PeerAddr::new(self.peer_id(), stream.local_addr()?);
                    let remote = PeerAddr::new(*peer, addr);
                    return Ok(PeerStream::new(stream, protocol.clone(), local, remote));
                }
                // The peer answered; another address will not change its mind.
                Err(e @ WireError::ProtocolNotSupported(_)) => return Err(e),
                Err(e) => {
                    debug!("peerhttp: stream dial to {} at {} failed: {}", peer, addr, e);
                    if e.is_unreachable_addr() {
                        self.book.remove_addr(peer, addr);
                    }
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(WireError::NoAddresses(*peer)))
    }

    /// Register a handler for `protocol`, returning the queue inbound streams
    /// are delivered to.
    ///
    /// A registration whose receiver has been dropped is stale and gets
    /// replaced; a live one makes this fail with
    /// [`WireError::ProtocolAlreadyRegistered`].
    pub fn register_protocol(
        &self,
        protocol: ProtocolId,
    ) -> Result<mpsc::Receiver<PeerStream>, WireError> {
        self.ensure_running()?;
        let (tx, rx) = mpsc::channel(self.config.accept_backlog.max(1));
        match self.handlers.entry(protocol.clone()) {
            Entry::Occupied(mut existing) if existing.get().is_closed() => {
                existing.insert(tx);
            }
            Entry::Occupied(_) => return Err(WireError::ProtocolAlreadyRegistered(protocol)),
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }
        info!("peerhttp: registered protocol {}", protocol);
        Ok(rx)
    }

    /// Remove the handler for `protocol`. Returns whether one was registered.
    pub fn unregister_protocol(&self, protocol: &ProtocolId) -> bool {
        let removed = self.handlers.remove(protocol).is_some();
        if removed {
            info!("peerhttp: unregistered protocol {}", protocol);
        }
        removed
    }

    /// Whether a live handler is registered for `protocol`.
    pub fn has_protocol(&self, protocol: &ProtocolId) -> bool {
        self.handlers
            .get(protocol)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Stop accepting connections, tell session peers we are leaving and drop
    /// every protocol registration.
    pub fn shutdown(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        self.handlers.clear();
        info!("peerhttp: host {} shut down", self.peer_id());
    }

    /// Dial `addr`, run the handshake expecting `expected` at the other end,
    /// and open the connection for `purpose`.
    async fn dial(
        &self,
        addr: SocketAddr,
        expected: PeerId,
        purpose: OpenPurpose,
    ) -> Result<(TcpStream, u32), WireError> {
        let attempt = async {
            let mut stream = TcpStream::connect(addr).await?;
            let version = self.dial_handshake(&mut stream, expected, purpose).await?;
            Ok::<_, WireError>((stream, version))
        };
        tokio::time::timeout(self.config.handshake_timeout, attempt)
            .await
            .map_err(|_| WireError::Timeout("dial handshake"))?
    }

    fn auth_hmac(&self, nonce: &str, peer_id: &PeerId) -> String {
        match &self.config.network_key {
            Some(key) => hmac_sign(key, &auth_payload(nonce, peer_id)),
            None => String::new(),
        }
    }

    async fn dial_handshake(
        &self,
        stream: &mut TcpStream,
        expected: PeerId,
        purpose: OpenPurpose,
    ) -> Result<u32, WireError> {
        let my_id = self.peer_id();
        let nonce = uuid::Uuid::new_v4().to_string();
        let hello = WireMessage::new(WireMessageKind::Request(WireRequest::Hello {
            peer_id: my_id,
            protocol_version: PROTOCOL_VERSION,
            nonce: nonce.clone(),
            listen_addrs: vec![self.local_addr],
            auth_hmac: self.auth_hmac(&nonce, &my_id),
        }));
        write_message(stream, &hello).await?;

        let ack = read_message(stream).await?;
        let (ack_nonce, protocol_version) = match ack.kind {
            WireMessageKind::Response(WireResponse::HelloAck {
                peer_id,
                protocol_version,
                nonce: ack_nonce,
                signature,
                auth_hmac,
            }) => {
                if protocol_version != PROTOCOL_VERSION {
                    return Err(WireError::VersionMismatch {
                        local: PROTOCOL_VERSION,
                        remote: protocol_version,
                    });
                }
                if peer_id != expected {
                    return Err(WireError::PeerIdMismatch {
                        expected,
                        actual: peer_id,
                    });
                }
                if let Some(key) = &self.config.network_key {
                    if !hmac_verify(key, &auth_payload(&ack_nonce, &peer_id), &auth_hmac) {
                        return Err(WireError::AuthenticationFailed(
                            "HMAC verification failed on HelloAck".into(),
                        ));
                    }
                }
                if !peer_id.verify(&auth_payload(&nonce, &peer_id), &signature) {
                    return Err(WireError::AuthenticationFailed(
                        "signature verification failed on HelloAck".into(),
                    ));
                }
                (ack_nonce, protocol_version)
            }
            WireMessageKind::Response(WireResponse::Error { code, message }) => {
                return Err(WireError::Remote { code, message });
            }
            _ => {
                return Err(WireError::HandshakeFailed(
                    "Unexpected response to hello".to_string(),
                ));
            }
        };

        let open = WireMessage::new(WireMessageKind::Request(WireRequest::Open {
            purpose: purpose.clone(),
            signature: self.keypair.sign(&auth_payload(&ack_nonce, &my_id)),
        }));
        write_message(stream, &open).await?;

        let opened = read_message(stream).await?;
        match opened.kind {
            WireMessageKind::Response(WireResponse::Opened) => Ok(protocol_version),
            WireMessageKind::Response(WireResponse::Error { code, message }) => {
                match purpose {
                    OpenPurpose::Stream { protocol } if code == CODE_PROTOCOL_NOT_SUPPORTED => {
                        Err(WireError::ProtocolNotSupported(protocol))
                    }
                    _ => Err(WireError::Remote { code, message }),
                }
            }
            _ => Err(WireError::HandshakeFailed(
                "Unexpected response to open".to_string(),
            )),
        }
    }

    /// Internal accept loop. Runs in a spawned task until the host shuts
    /// down or is dropped.
    async fn accept_loop(
        listener: TcpListener,
        host: Weak<PeerHost>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let accepted = tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, addr)) => {
                    let Some(host) = host.upgrade() else {
                        break;
                    };
                    debug!("peerhttp: accepted connection from {}", addr);
                    tokio::spawn(async move {
                        if let Err(e) = host.handle_inbound(stream, addr).await {
                            debug!("peerhttp: inbound connection from {} ended: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("peerhttp: accept error: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
        debug!("peerhttp: accept loop stopped");
    }

    /// Handle a single inbound connection: handshake, then either run a
    /// session or hand the stream to its protocol handler.
    async fn handle_inbound(&self, mut stream: TcpStream, addr: SocketAddr) -> Result<(), WireError> {
        let inbound = tokio::time::timeout(
            self.config.handshake_timeout,
            self.accept_handshake(&mut stream, addr),
        )
        .await
        .map_err(|_| WireError::Timeout("inbound handshake"))??;

        match inbound.purpose {
            OpenPurpose::Session => {
                self.book.add_addrs(inbound.peer_id, &inbound.listen_addrs);
                self.book
                    .mark_connected(inbound.peer_id, inbound.protocol_version);
                let opened = WireMessage {
                    id: inbound.open_id,
                    kind: WireMessageKind::Response(WireResponse::Opened),
                };
                write_message(&mut stream, &opened).await?;
                info!("peerhttp: session from {} at {}", inbound.peer_id, addr);
                session_loop(
                    stream,
                    inbound.peer_id,
                    self.book.clone(),
                    self.shutdown.subscribe(),
                )
                .await
            }
            OpenPurpose::Stream { protocol } => {
                self.book.add_addrs(inbound.peer_id, &inbound.listen_addrs);
                self.route_stream(stream, addr, inbound.peer_id, protocol, &inbound.open_id)
                    .await
            }
        }
    }

    async fn accept_handshake(
        &self,
        stream: &mut TcpStream,
        addr: SocketAddr,
    ) -> Result<Inbound, WireError> {
        let my_id = self.peer_id();
        let msg = read_message(stream).await?;
        let (peer_id, protocol_version, dialer_nonce, listen_addrs) = match msg.kind {
            WireMessageKind::Request(WireRequest::Hello {
                peer_id,
                protocol_version,
                nonce,
                listen_addrs,
                auth_hmac,
            }) => {
                if protocol_version != PROTOCOL_VERSION {
                    let err_resp = WireMessage::error(
                        &msg.id,
                        CODE_VERSION_MISMATCH,
                        format!(
                            "Protocol version mismatch: expected {}, got {}",
                            PROTOCOL_VERSION, protocol_version
                        ),
                    );
                    write_message(stream, &err_resp).await?;
                    return Err(WireError::VersionMismatch {
                        local: PROTOCOL_VERSION,
                        remote: protocol_version,
                    });
                }

                if let Some(key) = &self.config.network_key {
                    if !hmac_verify(key, &auth_payload(&nonce, &peer_id), &auth_hmac) {
                        warn!("peerhttp: rejected hello from {}: bad network key HMAC", addr);
                        let err_resp =
                            WireMessage::error(&msg.id, CODE_FORBIDDEN, "HMAC authentication failed");
                        write_message(stream, &err_resp).await?;
                        return Err(WireError::AuthenticationFailed(
                            "HMAC verification failed on incoming Hello".into(),
                        ));
                    }
                }
                (peer_id, protocol_version, nonce, listen_addrs)
            }
            // Nothing is accepted before the dialer has said hello.
            _ => {
                warn!("peerhttp: rejected message from {}: hello required", addr);
                let err_resp = WireMessage::error(
                    &msg.id,
                    CODE_BAD_REQUEST,
                    "Handshake required: send hello first",
                );
                write_message(stream, &err_resp).await?;
                return Err(WireError::HandshakeFailed(
                    "Rejected message before hello".into(),
                ));
            }
        };

        let ack_nonce = uuid::Uuid::new_v4().to_string();
        let ack = WireMessage {
            id: msg.id.clone(),
            kind: WireMessageKind::Response(WireResponse::HelloAck {
                peer_id: my_id,
                protocol_version: PROTOCOL_VERSION,
                nonce: ack_nonce.clone(),
                signature: self.keypair.sign(&auth_payload(&dialer_nonce, &my_id)),
                auth_hmac: self.auth_hmac(&ack_nonce, &my_id),
            }),
        };
        write_message(stream, &ack).await?;

        let open = read_message(stream).await?;
        match open.kind {
            WireMessageKind::Request(WireRequest::Open { purpose, signature }) => {
                if !peer_id.verify(&auth_payload(&ack_nonce, &peer_id), &signature) {
                    warn!("peerhttp: rejected open from {}: bad identity signature", addr);
                    let err_resp =
                        WireMessage::error(&open.id, CODE_UNAUTHORIZED, "Identity signature invalid");
                    write_message(stream, &err_resp).await?;
                    return Err(WireError::AuthenticationFailed(
                        "signature verification failed on Open".into(),
                    ));
                }
                Ok(Inbound {
                    peer_id,
                    protocol_version,
                    listen_addrs,
                    purpose,
                    open_id: open.id,
                })
            }
            _ => {
                let err_resp =
                    WireMessage::error(&open.id, CODE_BAD_REQUEST, "Expected open after hello");
                write_message(stream, &err_resp).await?;
                Err(WireError::HandshakeFailed(
                    "Unexpected message after hello".into(),
                ))
            }
        }
    }

    /// Deliver an authenticated stream to the handler registered for
    /// `protocol`, or refuse it.
    async fn route_stream(
        &self,
        mut stream: TcpStream,
        addr: SocketAddr,
        peer_id: PeerId,
        protocol: ProtocolId,
        open_id: &str,
    ) -> Result<(), WireError> {
        let handler = self.handlers.get(&protocol).map(|h| h.value().clone());
        let permit = match handler {
            Some(tx) => tx.reserve_owned().await.ok(),
            None => None,
        };
        let Some(permit) = permit else {
            debug!("peerhttp: {} asked for unsupported protocol {}", peer_id, protocol);
            let err_resp = WireMessage::error(
                open_id,
                CODE_PROTOCOL_NOT_SUPPORTED,
                format!("Protocol not supported: {protocol}"),
            );
            write_message(&mut stream, &err_resp).await?;
            return Err(WireError::ProtocolNotSupported(protocol));
        };

        let opened = WireMessage {
            id: open_id.to_string(),
            kind: WireMessageKind::Response(WireResponse::Opened),
        };
        write_message(&mut stream, &opened).await?;

        let local = PeerAddr::new(self.peer_id(), stream.local_addr()?);
        let remote = PeerAddr::new(peer_id, addr);
        debug!("peerhttp: routed {} stream from {}", protocol, remote);
        permit.send(PeerStream::new(stream, protocol, local, remote));
        Ok(())
    }
}

/// Resolves once `shutdown` flips to true or its sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Keep a session open until either side leaves.
async fn session_loop(
    mut stream: TcpStream,
    peer_id: PeerId,
    book: AddressBook,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), WireError> {
    let result = loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => {
                let bye = WireMessage::new(WireMessageKind::Notification(
                    WireNotification::ShuttingDown,
                ));
                let _ = write_message(&mut stream, &bye).await;
                break Ok(());
            }
            msg = read_message(&mut stream) => match msg {
                Ok(WireMessage {
                    kind: WireMessageKind::Notification(WireNotification::ShuttingDown),
                    ..
                }) => {
                    info!("peerhttp: peer {} is shutting down", peer_id);
                    break Ok(());
                }
                Ok(other) => {
                    warn!(
                        "peerhttp: unexpected session message from {}: {:?}",
                        peer_id, other.id
                    );
                }
                Err(WireError::ConnectionClosed) => break Ok(()),
                Err(e) => break Err(e),
            },
        }
    };
    book.mark_disconnected(&peer_id);
    result
}

/// Write a framed message (4-byte length + JSON).
pub async fn write_message<W>(writer: &mut W, msg: &WireMessage) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_message(msg)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a framed message (4-byte length + JSON).
///
/// Reads exactly one frame so that bytes following it stay in the stream.
pub async fn read_message<R>(reader: &mut R) -> Result<WireMessage, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(WireError::ConnectionClosed);
        }
        Err(e) => return Err(WireError::Io(e)),
    }

    let len = decode_length(&header);
    if len > MAX_MESSAGE_SIZE {
        return Err(WireError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;

    let msg = decode_message(&body)?;
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_protocol() -> ProtocolId {
        ProtocolId::new("/test/echo/1").unwrap()
    }

    async fn start_host() -> Arc<PeerHost> {
        PeerHost::start(Keypair::generate(), HostConfig::default())
            .await
            .unwrap()
    }

    async fn start_host_with_key(key: &str) -> Arc<PeerHost> {
        let config = HostConfig {
            network_key: Some(key.to_string()),
            ..HostConfig::default()
        };
        PeerHost::start(Keypair::generate(), config).await.unwrap()
    }

    #[tokio::test]
    async fn test_host_start_and_connect() {
        let host_a = start_host().await;
        let host_b = start_host().await;

        host_b.connect(&host_a.peer_info()).await.unwrap();

        // B dialed, so it tracks A as connected immediately.
        assert!(host_b.address_book().is_connected(&host_a.peer_id()));
        assert_eq!(host_b.address_book().connected_count(), 1);

        // A learns about B from the inbound session.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(host_a.address_book().is_connected(&host_b.peer_id()));
        let entry = host_a.address_book().get_peer(&host_b.peer_id()).unwrap();
        assert_eq!(entry.addrs, vec![host_b.local_addr()]);

        // A second connect reuses the live session.
        host_b.connect(&host_a.peer_info()).await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_rejects_wrong_identity() {
        let host_a = start_host().await;
        let host_b = start_host().await;

        let impostor = PeerInfo::new(Keypair::generate().peer_id(), vec![host_a.local_addr()]);
        let err = host_b.connect(&impostor).await.unwrap_err();
        assert!(
            matches!(err, WireError::PeerIdMismatch { actual, .. } if actual == host_a.peer_id()),
            "Expected PeerIdMismatch, got {err:?}"
        );
        assert!(!host_b.address_book().is_connected(&impostor.id));
        assert!(host_b.address_book().peer_info(&impostor.id).unwrap().addrs.is_empty());
    }

    #[tokio::test]
    async fn test_connect_without_addresses() {
        let host = start_host().await;
        let unknown = PeerInfo::new(Keypair::generate().peer_id(), vec![]);
        let err = host.connect(&unknown).await.unwrap_err();
        assert!(matches!(err, WireError::NoAddresses(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = closed.local_addr().unwrap();
        drop(closed);

        let host = start_host().await;
        let target = PeerInfo::new(Keypair::generate().peer_id(), vec![addr]);
        let err = host.connect(&target).await.unwrap_err();
        assert!(matches!(err, WireError::Io(_)), "got {err:?}");

        // The dead address is forgotten; the next attempt has nothing to dial.
        assert!(host.address_book().peer_info(&target.id).unwrap().addrs.is_empty());
        let err = host.connect(&PeerInfo::new(target.id, vec![])).await.unwrap_err();
        assert!(matches!(err, WireError::NoAddresses(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_open_stream_carries_raw_bytes() {
        let host_a = start_host().await;
        let host_b = start_host().await;
        let mut inbound = host_a.register_protocol(echo_protocol()).unwrap();

        let b_id = host_b.peer_id();
        let server = tokio::spawn(async move {
            let mut stream = inbound.recv().await.unwrap();
            assert_eq!(stream.remote_peer(), b_id);
            assert_eq!(stream.protocol(), &echo_protocol());
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(&buf).await.unwrap();
            stream.flush().await.unwrap();
        });

        host_b.connect(&host_a.peer_info()).await.unwrap();
        let mut stream = host_b
            .open_stream(&host_a.peer_id(), &echo_protocol())
            .await
            .unwrap();
        assert_eq!(stream.remote_addr().peer_id, host_a.peer_id());
        assert_eq!(stream.local_addr().peer_id, host_b.peer_id());

        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_open_stream_unsupported_protocol() {
        let host_a = start_host().await;
        let host_b = start_host().await;
        host_b.connect(&host_a.peer_info()).await.unwrap();

        let err = host_b
            .open_stream(&host_a.peer_id(), &echo_protocol())
            .await
            .unwrap_err();
        assert!(
            matches!(&err, WireError::ProtocolNotSupported(p) if *p == echo_protocol()),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let host = start_host().await;
        let first = host.register_protocol(echo_protocol()).unwrap();
        let err = host.register_protocol(echo_protocol()).unwrap_err();
        assert!(matches!(err, WireError::ProtocolAlreadyRegistered(_)));

        // A dropped receiver leaves a stale registration that can be replaced.
        drop(first);
        assert!(!host.has_protocol(&echo_protocol()));
        let _second = host.register_protocol(echo_protocol()).unwrap();
        assert!(host.has_protocol(&echo_protocol()));

        assert!(host.unregister_protocol(&echo_protocol()));
        assert!(!host.unregister_protocol(&echo_protocol()));
    }

    #[tokio::test]
    async fn test_network_key_mismatch_rejected() {
        let host_a = start_host_with_key("secret-one").await;
        let host_b = start_host_with_key("secret-two").await;

        let err = host_b.connect(&host_a.peer_info()).await.unwrap_err();
        assert!(
            matches!(err, WireError::Remote { code: CODE_FORBIDDEN, .. }),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_network_key_match_accepted() {
        let host_a = start_host_with_key("shared-secret").await;
        let host_b = start_host_with_key("shared-secret").await;
        host_b.connect(&host_a.peer_info()).await.unwrap();
        assert!(host_b.address_book().is_connected(&host_a.peer_id()));
    }

    #[tokio::test]
    async fn test_open_before_hello_rejected() {
        let host = start_host().await;
        let mut stream = TcpStream::connect(host.local_addr()).await.unwrap();

        let msg = WireMessage {
            id: "open-1".to_string(),
            kind: WireMessageKind::Request(WireRequest::Open {
                purpose: OpenPurpose::Stream {
                    protocol: echo_protocol(),
                },
                signature: "forged".to_string(),
            }),
        };
        write_message(&mut stream, &msg).await.unwrap();

        let response = read_message(&mut stream).await.unwrap();
        assert_eq!(response.id, "open-1");
        match response.kind {
            WireMessageKind::Response(WireResponse::Error { code, message }) => {
                assert_eq!(code, CODE_BAD_REQUEST);
                assert!(message.contains("hello"), "got: {message}");
            }
            other => panic!("Expected Error(400), got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_drops_registrations() {
        let host_a = start_host().await;
        let host_b = start_host().await;
        let mut inbound = host_a.register_protocol(echo_protocol()).unwrap();
        host_b.connect(&host_a.peer_info()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        host_a.shutdown();
        assert!(host_a.is_shut_down());
        assert!(inbound.recv().await.is_none());
        assert!(matches!(
            host_a.register_protocol(echo_protocol()),
            Err(WireError::ShutDown)
        ));

        // B's session sees the goodbye and marks A disconnected.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!host_b.address_book().is_connected(&host_a.peer_id()));
    }

    #[test]
    fn test_host_config_default() {
        let config = HostConfig::default();
        assert!(config.listen_addr.ip().is_loopback());
        assert_eq!(config.listen_addr.port(), 0);
        assert!(config.network_key.is_none());
        assert_eq!(config.accept_backlog, 64);
    }
}
