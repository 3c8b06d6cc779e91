//! Address book: tracks known peers, their addresses and session state.
//!
//! The [`AddressBook`] is a thread-safe, concurrent data structure shared by
//! every channel and listener on a host. It records all known remote peers,
//! the socket addresses they were announced at, and whether a live session
//! to them currently exists.

use crate::identity::{PeerId, PeerInfo};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

/// Addresses remembered per peer.
pub const MAX_ADDRS_PER_PEER: usize = 8;

/// Session state of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// A handshaked session is open.
    Connected,
    /// Known addresses only; no live session.
    Disconnected,
}

/// An entry representing a single known peer.
#[derive(Debug, Clone)]
pub struct PeerEntry {
    /// Identity of the peer.
    pub peer_id: PeerId,
    /// Addresses the peer may be reached at, most recently successful first.
    pub addrs: Vec<SocketAddr>,
    /// Session state.
    pub state: PeerState,
    /// When the current session was established.
    pub connected_at: Option<DateTime<Utc>>,
    /// Protocol version negotiated during the last handshake.
    pub protocol_version: Option<u32>,
}

impl PeerEntry {
    fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            addrs: Vec::new(),
            state: PeerState::Disconnected,
            connected_at: None,
            protocol_version: None,
        }
    }
}

/// Thread-safe registry of all known peers.
#[derive(Debug, Clone, Default)]
pub struct AddressBook {
    peers: Arc<RwLock<HashMap<PeerId, PeerEntry>>>,
}

impl AddressBook {
    /// Create a new empty address book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record addresses for a peer, creating the entry if needed.
    ///
    /// Already-known addresses keep their position. Past
    /// [`MAX_ADDRS_PER_PEER`] the oldest entries after the first (the last
    /// one that worked) are dropped.
    pub fn add_addrs(&self, peer_id: PeerId, addrs: &[SocketAddr]) {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        let entry = peers
            .entry(peer_id)
            .or_insert_with(|| PeerEntry::new(peer_id));
        for addr in addrs {
            if !entry.addrs.contains(addr) {
                entry.addrs.push(*addr);
            }
        }
        let excess = entry.addrs.len().saturating_sub(MAX_ADDRS_PER_PEER);
        if excess > 0 {
            entry.addrs.drain(1..1 + excess);
        }
    }

    /// Move `addr` to the front of the peer's address list.
    pub fn promote_addr(&self, peer_id: &PeerId, addr: SocketAddr) {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = peers.get_mut(peer_id) {
            entry.addrs.retain(|a| *a != addr);
            entry.addrs.insert(0, addr);
        }
    }

    /// Forget one address of a peer, e.g. after dialing it failed.
    pub fn remove_addr(&self, peer_id: &PeerId, addr: SocketAddr) {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = peers.get_mut(peer_id) {
            entry.addrs.retain(|a| *a != addr);
        }
    }

    /// Mark a peer as having a live session.
    pub fn mark_connected(&self, peer_id: PeerId, protocol_version: u32) {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        let entry = peers
            .entry(peer_id)
            .or_insert_with(|| PeerEntry::new(peer_id));
        entry.state = PeerState::Connected;
        entry.connected_at = Some(Utc::now());
        entry.protocol_version = Some(protocol_version);
    }

    /// Mark a peer as disconnected (but keep its addresses for reconnect).
    pub fn mark_disconnected(&self, peer_id: &PeerId) {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = peers.get_mut(peer_id) {
            entry.state = PeerState::Disconnected;
            entry.connected_at = None;
        }
    }

    /// Whether a live session to `peer_id` exists.
    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers
            .get(peer_id)
            .is_some_and(|p| p.state == PeerState::Connected)
    }

    /// Get a snapshot of a specific peer.
    pub fn get_peer(&self, peer_id: &PeerId) -> Option<PeerEntry> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers.get(peer_id).cloned()
    }

    /// Identity plus known addresses, as a [`PeerInfo`].
    pub fn peer_info(&self, peer_id: &PeerId) -> Option<PeerInfo> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers
            .get(peer_id)
            .map(|p| PeerInfo::new(p.peer_id, p.addrs.clone()))
    }

    /// Number of connected peers.
    pub fn connected_count(&self) -> usize {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers
            .values()
            .filter(|p| p.state == PeerState::Connected)
            .count()
    }

    /// Total number of peers (including disconnected).
    pub fn total_count(&self) -> usize {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keypair;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_add_and_get_peer() {
        let book = AddressBook::new();
        let id = Keypair::generate().peer_id();
        book.add_addrs(id, &[addr(9000), addr(9001)]);

        let entry = book.get_peer(&id).unwrap();
        assert_eq!(entry.peer_id, id);
        assert_eq!(entry.addrs, vec![addr(9000), addr(9001)]);
        assert_eq!(entry.state, PeerState::Disconnected);
    }

    #[test]
    fn test_add_addrs_deduplicates() {
        let book = AddressBook::new();
        let id = Keypair::generate().peer_id();
        book.add_addrs(id, &[addr(9000)]);
        book.add_addrs(id, &[addr(9001), addr(9000)]);
        assert_eq!(book.peer_info(&id).unwrap().addrs, vec![addr(9000), addr(9001)]);
    }

    #[test]
    fn test_promote_addr() {
        let book = AddressBook::new();
        let id = Keypair::generate().peer_id();
        book.add_addrs(id, &[addr(9000), addr(9001)]);
        book.promote_addr(&id, addr(9001));
        assert_eq!(book.peer_info(&id).unwrap().addrs, vec![addr(9001), addr(9000)]);
    }

    #[test]
    fn test_remove_addr() {
        let book = AddressBook::new();
        let id = Keypair::generate().peer_id();
        book.add_addrs(id, &[addr(9000), addr(9001)]);
        book.remove_addr(&id, addr(9000));
        assert_eq!(book.peer_info(&id).unwrap().addrs, vec![addr(9001)]);
        assert_eq!(book.total_count(), 1);
    }

    #[test]
    fn test_address_list_is_capped() {
        let book = AddressBook::new();
        let id = Keypair::generate().peer_id();
        book.add_addrs(id, &[addr(9000)]);
        book.promote_addr(&id, addr(9000));
        for port in 9001..9020 {
            book.add_addrs(id, &[addr(port)]);
        }

        let addrs = book.peer_info(&id).unwrap().addrs;
        assert_eq!(addrs.len(), MAX_ADDRS_PER_PEER);
        // The known-good address and the newest ones survive.
        assert_eq!(addrs[0], addr(9000));
        assert_eq!(*addrs.last().unwrap(), addr(9019));
        assert!(!addrs.contains(&addr(9001)));
    }

    #[test]
    fn test_disconnect_reconnect() {
        let book = AddressBook::new();
        let id = Keypair::generate().peer_id();
        book.add_addrs(id, &[addr(9000)]);
        book.mark_connected(id, 1);
        assert!(book.is_connected(&id));
        assert_eq!(book.connected_count(), 1);
        assert!(book.get_peer(&id).unwrap().connected_at.is_some());

        book.mark_disconnected(&id);
        assert!(!book.is_connected(&id));
        assert_eq!(book.connected_count(), 0);
        assert_eq!(book.total_count(), 1);
        // Addresses survive a disconnect.
        assert_eq!(book.peer_info(&id).unwrap().addrs, vec![addr(9000)]);
    }

    #[test]
    fn test_unknown_peer() {
        let book = AddressBook::new();
        let id = Keypair::generate().peer_id();
        assert!(book.get_peer(&id).is_none());
        assert!(!book.is_connected(&id));
        book.mark_disconnected(&id);
        assert_eq!(book.total_count(), 0);
    }
}
