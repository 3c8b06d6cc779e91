//! Error taxonomy for channel calls and listeners.
//!
//! A failed [`HttpChannel`](crate::HttpChannel) call tells the caller how far
//! it got: the request was never built, the peer was never reached, the
//! exchange broke in flight, or the peer answered with a non-200 status.

use crate::context::Interrupted;
use http::{HeaderMap, Method, StatusCode};
use peerhttp_wire::{ProtocolId, WireError};
use thiserror::Error;

/// Errors returned by a channel call.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The outbound request was rejected before any network activity.
    #[error("creating HTTP request: {0}")]
    RequestConstruction(#[from] http::Error),

    /// The peer could not be reached.
    #[error("connecting to remote peer {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: ConnectFailure,
    },

    /// A connection existed but the exchange did not complete.
    #[error("doing HTTP request to {target}: {source}")]
    Transport {
        target: String,
        #[source]
        source: TransportFailure,
    },

    /// The peer answered with a status other than 200.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl ChannelError {
    /// Whether the request reached the peer and was rejected by it.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Whether the call was stopped by its context rather than by a failure.
    pub fn is_interrupted(&self) -> bool {
        self.interruption().is_some()
    }

    /// The cancellation or deadline that stopped the call, if any.
    pub fn interruption(&self) -> Option<Interrupted> {
        match self {
            Self::Connect {
                source: ConnectFailure::Interrupted(i),
                ..
            }
            | Self::Transport {
                source: TransportFailure::Interrupted(i),
                ..
            } => Some(*i),
            _ => None,
        }
    }

    /// Whether repeating the same call later could succeed. This layer never
    /// retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect { .. } => true,
            Self::Transport { source, .. } => !matches!(
                source,
                TransportFailure::Stream(WireError::ProtocolNotSupported(_))
            ),
            Self::RequestConstruction(_) | Self::Remote(_) => false,
        }
    }

    /// Response status, for [`ChannelError::Remote`].
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Remote(e) => Some(e.status),
            _ => None,
        }
    }
}

/// Why the connect step failed.
#[derive(Debug, Error)]
pub enum ConnectFailure {
    #[error(transparent)]
    Peer(WireError),
    #[error(transparent)]
    Io(std::io::Error),
    #[error(transparent)]
    Interrupted(Interrupted),
}

/// Why the round trip failed.
#[derive(Debug, Error)]
pub enum TransportFailure {
    /// Opening or negotiating the protocol stream failed.
    #[error("opening stream: {0}")]
    Stream(WireError),
    /// The HTTP/1 exchange itself failed.
    #[error(transparent)]
    Http(hyper::Error),
    #[error(transparent)]
    Interrupted(Interrupted),
}

/// The peer received the request and rejected it with a non-200 status.
#[derive(Debug, Error)]
#[error("HTTP Request failed. {method} {uri} → {}", .status.as_u16())]
pub struct RemoteError {
    pub method: Method,
    /// Full target address, e.g. `p2p://<peer-id>/path`.
    pub uri: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// Errors returned by an [`HttpListener`](crate::HttpListener).
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The protocol handler could not be registered on the host.
    #[error("registering protocol {protocol}: {source}")]
    Registration {
        protocol: ProtocolId,
        #[source]
        source: WireError,
    },
    /// The listener has been closed; no more connections will be accepted.
    #[error("listener closed")]
    Closed,
}
