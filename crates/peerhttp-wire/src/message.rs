//! Wire protocol message types.
//!
//! Handshake and session control between hosts uses JSON-framed messages
//! over TCP. Each message is prefixed with a 4-byte big-endian length header.
//! Once a stream has been opened for a protocol, frames stop and the
//! connection carries that protocol's raw bytes.

use crate::identity::PeerId;
use crate::protocol::ProtocolId;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// A wire protocol message (envelope).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Unique message ID.
    pub id: String,
    /// Message variant.
    #[serde(flatten)]
    pub kind: WireMessageKind,
}

impl WireMessage {
    /// Wrap `kind` in an envelope with a fresh message ID.
    pub fn new(kind: WireMessageKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
        }
    }

    /// Build an error response correlated to `request_id`.
    pub fn error(request_id: &str, code: i32, message: impl Into<String>) -> Self {
        Self {
            id: request_id.to_string(),
            kind: WireMessageKind::Response(WireResponse::Error {
                code,
                message: message.into(),
            }),
        }
    }
}

/// The different kinds of wire messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessageKind {
    /// Request from one peer to another.
    #[serde(rename = "request")]
    Request(WireRequest),
    /// Response to a request.
    #[serde(rename = "response")]
    Response(WireResponse),
    /// One-way notification (no response expected).
    #[serde(rename = "notification")]
    Notification(WireNotification),
}

/// Request messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum WireRequest {
    /// First message on every connection: announce identity.
    #[serde(rename = "hello")]
    Hello {
        /// The dialer's peer id.
        peer_id: PeerId,
        /// Protocol version.
        protocol_version: u32,
        /// Random nonce the listener must sign.
        nonce: String,
        /// Addresses the dialer accepts connections on.
        #[serde(default)]
        listen_addrs: Vec<SocketAddr>,
        /// HMAC-SHA256(network_key, nonce + peer_id); empty without a network key.
        #[serde(default)]
        auth_hmac: String,
    },
    /// Prove the dialer's identity and say what the connection is for.
    #[serde(rename = "open")]
    Open {
        purpose: OpenPurpose,
        /// Signature over the listener's nonce + the dialer's peer id.
        signature: String,
    },
}

/// What an authenticated connection will be used for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OpenPurpose {
    /// Long-lived live connection between two hosts.
    Session,
    /// Raw byte stream for one registered protocol.
    Stream { protocol: ProtocolId },
}

/// Response messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum WireResponse {
    /// Handshake acknowledgement.
    #[serde(rename = "hello_ack")]
    HelloAck {
        peer_id: PeerId,
        protocol_version: u32,
        /// Random nonce the dialer must sign.
        nonce: String,
        /// Signature over the dialer's nonce + the listener's peer id.
        signature: String,
        /// HMAC-SHA256(network_key, nonce + peer_id); empty without a network key.
        #[serde(default)]
        auth_hmac: String,
    },
    /// The connection is open for the requested purpose.
    #[serde(rename = "opened")]
    Opened,
    /// Error response.
    #[serde(rename = "error")]
    Error {
        /// Error code.
        code: i32,
        /// Error message.
        message: String,
    },
}

/// Notification messages (one-way, no response).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum WireNotification {
    /// Peer is shutting down.
    #[serde(rename = "shutting_down")]
    ShuttingDown,
}

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Error code: protocol version mismatch.
pub const CODE_VERSION_MISMATCH: i32 = 1;
/// Error code: unexpected message during the handshake.
pub const CODE_BAD_REQUEST: i32 = 400;
/// Error code: identity signature did not verify.
pub const CODE_UNAUTHORIZED: i32 = 401;
/// Error code: network key HMAC did not verify.
pub const CODE_FORBIDDEN: i32 = 403;
/// Error code: no handler registered for the requested protocol.
pub const CODE_PROTOCOL_NOT_SUPPORTED: i32 = 404;

/// Encode a wire message to bytes (4-byte big-endian length + JSON).
pub fn encode_message(msg: &WireMessage) -> Result<Vec<u8>, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    let len = json.len() as u32;
    let mut bytes = Vec::with_capacity(4 + json.len());
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(&json);
    Ok(bytes)
}

/// Decode the length prefix from a 4-byte header.
pub fn decode_length(header: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*header)
}

/// Parse a JSON body into a WireMessage.
pub fn decode_message(body: &[u8]) -> Result<WireMessage, serde_json::Error> {
    serde_json::from_slice(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keypair;

    #[test]
    fn test_encode_decode_roundtrip() {
        let msg = WireMessage {
            id: "msg-1".to_string(),
            kind: WireMessageKind::Response(WireResponse::Opened),
        };
        let bytes = encode_message(&msg).unwrap();
        // First 4 bytes are length
        let len = decode_length(&[bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(len as usize, bytes.len() - 4);
        let decoded = decode_message(&bytes[4..]).unwrap();
        assert_eq!(decoded.id, "msg-1");
    }

    #[test]
    fn test_hello_serialization() {
        let peer_id = Keypair::generate().peer_id();
        let msg = WireMessage {
            id: "hs-1".to_string(),
            kind: WireMessageKind::Request(WireRequest::Hello {
                peer_id,
                protocol_version: PROTOCOL_VERSION,
                nonce: "test-nonce".to_string(),
                listen_addrs: vec!["127.0.0.1:4001".parse().unwrap()],
                auth_hmac: String::new(),
            }),
        };
        let json = serde_json::to_string_pretty(&msg).unwrap();
        assert!(json.contains("hello"));
        assert!(json.contains(&peer_id.to_string()));
        let decoded: WireMessage = serde_json::from_str(&json).unwrap();
        match decoded.kind {
            WireMessageKind::Request(WireRequest::Hello {
                peer_id: decoded_id,
                listen_addrs,
                ..
            }) => {
                assert_eq!(decoded_id, peer_id);
                assert_eq!(listen_addrs.len(), 1);
            }
            other => panic!("Expected Hello, got {other:?}"),
        }
    }

    #[test]
    fn test_open_stream_serialization() {
        let msg = WireMessage::new(WireMessageKind::Request(WireRequest::Open {
            purpose: OpenPurpose::Stream {
                protocol: ProtocolId::new("/echo/1").unwrap(),
            },
            signature: "sig".to_string(),
        }));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"kind\":\"stream\""));
        assert!(json.contains("/echo/1"));
        let decoded = decode_message(json.as_bytes()).unwrap();
        match decoded.kind {
            WireMessageKind::Request(WireRequest::Open { purpose, .. }) => {
                assert_eq!(
                    purpose,
                    OpenPurpose::Stream {
                        protocol: ProtocolId::new("/echo/1").unwrap()
                    }
                );
            }
            other => panic!("Expected Open, got {other:?}"),
        }
    }

    #[test]
    fn test_error_response() {
        let msg = WireMessage::error("err-1", CODE_PROTOCOL_NOT_SUPPORTED, "no handler");
        let json = serde_json::to_string(&msg).unwrap();
        let decoded: WireMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.id, "err-1");
        match decoded.kind {
            WireMessageKind::Response(WireResponse::Error { code, message }) => {
                assert_eq!(code, 404);
                assert_eq!(message, "no handler");
            }
            other => panic!("Expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_notification_serialization() {
        let msg = WireMessage::new(WireMessageKind::Notification(
            WireNotification::ShuttingDown,
        ));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("shutting_down"));
        let _: WireMessage = serde_json::from_str(&json).unwrap();
    }
}
