//! peerhttp wire layer: the peer host that HTTP exchanges ride on.
//!
//! Peers are identified by ed25519 public keys rather than by address. Every
//! TCP connection between two hosts starts with a mutually authenticated
//! handshake and then either becomes a long-lived session (the "live
//! connection" to a peer) or a raw byte stream bound to one registered
//! protocol identifier.
//!
//! ## Architecture
//!
//! - **PeerHost**: local endpoint; accepts connections, dials peers, routes
//!   inbound streams to registered protocol handlers
//! - **AddressBook**: tracks known peers, their addresses and session state
//! - **WireMessage**: JSON-framed handshake and control messages
//! - **PeerStream**: one negotiated protocol stream, readable and writable

pub mod host;
pub mod identity;
pub mod message;
pub mod protocol;
pub mod registry;
pub mod stream;

pub use host::{HostConfig, PeerHost, WireError};
pub use identity::{InvalidPeerId, Keypair, PeerId, PeerInfo};
pub use message::{WireMessage, WireRequest, WireResponse};
pub use protocol::{InvalidProtocolId, ProtocolId};
pub use registry::{AddressBook, PeerEntry, PeerState};
pub use stream::{PeerAddr, PeerStream};
