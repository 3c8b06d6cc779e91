//! peerhttp: HTTP-shaped RPC exchanges over peer-to-peer streams.
//!
//! Two halves that share nothing but a protocol identifier:
//!
//! - [`HttpChannel`] performs one request/response round trip per call to a
//!   peer addressed by identity, returning a streaming [`HttpResponse`] or a
//!   [`ChannelError`] that says how far the call got.
//! - [`HttpListener`] registers the protocol on a local [`PeerHost`] and
//!   hands out each inbound stream as a [`PeerConnection`], so an ordinary
//!   HTTP server loop (for example `axum::serve`) can serve it unchanged.
//!
//! ```no_run
//! use peerhttp::{listen, HttpChannel, HttpRequest, RequestContext};
//! use peerhttp::wire::{HostConfig, Keypair, PeerHost};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let server = PeerHost::start(Keypair::generate(), HostConfig::default()).await?;
//! let listener = listen(&server)?;
//! tokio::spawn(async move { axum::serve(listener, peerhttp::echo::router()).await });
//!
//! let client = PeerHost::start(Keypair::generate(), HostConfig::default()).await?;
//! let channel = HttpChannel::new(client, server.peer_info(), "/");
//! let response = channel
//!     .request(&RequestContext::new(), HttpRequest::new("ping", Default::default()))
//!     .await?;
//! assert_eq!(response.status(), 200);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod context;
pub mod destination;
pub mod echo;
pub mod error;
pub mod exchange;
pub mod listener;
pub mod protocol;

pub use channel::{Channel, HttpChannel};
pub use context::{Interrupted, RequestContext};
pub use destination::Destination;
pub use error::{ChannelError, ConnectFailure, ListenerError, RemoteError, TransportFailure};
pub use exchange::{Body, HttpRequest, HttpResponse};
pub use listener::{listen, listen_on, HttpListener, ListenerCloser, PeerConnection};
pub use protocol::{http_protocol, HTTP_PROTOCOL};

pub use peerhttp_wire as wire;
pub use peerhttp_wire::{PeerAddr, PeerHost, PeerId, PeerInfo};
