//! Protocol identifiers negotiated when a stream is opened.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Label that routes an inbound stream to one registered handler.
///
/// Treated as an opaque token: two identifiers match only if they are
/// byte-for-byte equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProtocolId(String);

impl ProtocolId {
    /// Validate and wrap a protocol identifier.
    ///
    /// Identifiers must start with `/`, have something after it, and contain
    /// no whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidProtocolId> {
        let id = id.into();
        if !id.starts_with('/') || id.len() < 2 {
            return Err(InvalidProtocolId(id));
        }
        if id.chars().any(char::is_whitespace) {
            return Err(InvalidProtocolId(id));
        }
        Ok(Self(id))
    }

    /// Wrap a compile-time identifier.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a valid identifier.
    pub fn from_static(id: &'static str) -> Self {
        match Self::new(id) {
            Ok(id) => id,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ProtocolId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProtocolId {
    type Error = InvalidProtocolId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProtocolId> for String {
    fn from(id: ProtocolId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid protocol id {0:?}: must start with '/' and contain no whitespace")]
pub struct InvalidProtocolId(pub String);
