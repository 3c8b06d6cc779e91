//! The protocol identifier both ends of an exchange register.

use peerhttp_wire::ProtocolId;

/// Protocol identifier for HTTP exchanges. Channels and listeners must agree
/// on it byte for byte; a mismatch shows up as "protocol not supported"
/// when the stream is opened.
pub const HTTP_PROTOCOL: &str = "/peerhttp/rpc/1.0.0";

/// [`HTTP_PROTOCOL`] as a [`ProtocolId`].
pub fn http_protocol() -> ProtocolId {
    ProtocolId::from_static(HTTP_PROTOCOL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_protocol_is_valid() {
        assert_eq!(http_protocol().as_str(), HTTP_PROTOCOL);
        assert!(HTTP_PROTOCOL.starts_with('/'));
    }
}
