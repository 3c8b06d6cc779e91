//! Peer identities.
//!
//! A [`PeerId`] is the hex encoding of an ed25519 public key. A host proves
//! it owns its id during the handshake by signing the counterparty's nonce
//! with the matching [`Keypair`].

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// Length of a hex-encoded peer id.
pub const PEER_ID_HEX_LEN: usize = 64;

/// Identity of a peer: an ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerId([u8; 32]);

impl PeerId {
    /// Raw public key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check a hex-encoded signature produced by the owner of this id.
    pub fn verify(&self, data: &[u8], signature_hex: &str) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let Ok(raw) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(raw) = <[u8; 64]>::try_from(raw.as_slice()) else {
            return false;
        };
        key.verify(data, &Signature::from_bytes(&raw)).is_ok()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps logs readable.
        let full = hex::encode(self.0);
        write!(f, "PeerId({})", &full[..12])
    }
}

impl FromStr for PeerId {
    type Err = InvalidPeerId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != PEER_ID_HEX_LEN {
            return Err(InvalidPeerId(format!(
                "expected {PEER_ID_HEX_LEN} hex characters, got {}",
                s.len()
            )));
        }
        let raw = hex::decode(s).map_err(|e| InvalidPeerId(e.to_string()))?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&raw);
        VerifyingKey::from_bytes(&bytes)
            .map_err(|_| InvalidPeerId("not a valid ed25519 public key".to_string()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for PeerId {
    type Error = InvalidPeerId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PeerId> for String {
    fn from(id: PeerId) -> Self {
        id.to_string()
    }
}

/// A string that could not be parsed as a [`PeerId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid peer id: {0}")]
pub struct InvalidPeerId(pub String);

/// An ed25519 signing key that defines a host's identity.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    /// Restore an identity from its hex-encoded 32-byte seed.
    pub fn from_seed_hex(seed: &str) -> Result<Self, InvalidPeerId> {
        let raw = hex::decode(seed.trim()).map_err(|e| InvalidPeerId(e.to_string()))?;
        let seed = <[u8; 32]>::try_from(raw.as_slice())
            .map_err(|_| InvalidPeerId(format!("seed must be 32 bytes, got {}", raw.len())))?;
        Ok(Self {
            signing: SigningKey::from_bytes(&seed),
        })
    }

    /// Hex-encoded seed, suitable for persisting.
    pub fn to_seed_hex(&self) -> String {
        hex::encode(self.signing.to_bytes())
    }

    /// The public identity of this keypair.
    pub fn peer_id(&self) -> PeerId {
        PeerId(self.signing.verifying_key().to_bytes())
    }

    /// Sign `data`, returning the hex-encoded signature.
    pub fn sign(&self, data: &[u8]) -> String {
        hex::encode(self.signing.sign(data).to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("peer_id", &self.peer_id())
            .finish_non_exhaustive()
    }
}

/// A peer identity plus the addresses it can currently be reached at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: PeerId,
    pub addrs: Vec<SocketAddr>,
}

impl PeerInfo {
    pub fn new(id: PeerId, addrs: Vec<SocketAddr>) -> Self {
        Self { id, addrs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_display_parse_roundtrip() {
        let kp = Keypair::generate();
        let id = kp.peer_id();
        let text = id.to_string();
        assert_eq!(text.len(), PEER_ID_HEX_LEN);
        let parsed: PeerId = text.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_peer_id_rejects_garbage() {
        assert!("abc".parse::<PeerId>().is_err());
        assert!("zz".repeat(32).parse::<PeerId>().is_err());
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = Keypair::generate();
        let sig = kp.sign(b"nonce-1");
        assert!(kp.peer_id().verify(b"nonce-1", &sig));
        assert!(!kp.peer_id().verify(b"nonce-2", &sig));

        let other = Keypair::generate();
        assert!(!other.peer_id().verify(b"nonce-1", &sig));
        assert!(!kp.peer_id().verify(b"nonce-1", "not-hex"));
    }

    #[test]
    fn test_seed_restores_identity() {
        let kp = Keypair::generate();
        let restored = Keypair::from_seed_hex(&kp.to_seed_hex()).unwrap();
        assert_eq!(restored.peer_id(), kp.peer_id());
        assert!(Keypair::from_seed_hex("00ff").is_err());
    }

    #[test]
    fn test_peer_id_serde_as_string() {
        let id = Keypair::generate().peer_id();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: PeerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
