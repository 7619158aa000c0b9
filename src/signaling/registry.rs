//! Peer/session/room bookkeeping for the signaling relay (§3, §4.2).
//!
//! Mutated only from signaling-server tasks, never from media or supervisor
//! code (§5 shared resources).

use axum::extract::ws::Message;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;

/// What a peer is currently doing: idle, paired 1:1, or inside a room.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerStatus {
    None,
    Session,
    Room(String),
}

pub struct Peer {
    pub sender: mpsc::UnboundedSender<Message>,
    pub status: PeerStatus,
    pub meta: Option<String>,
}

/// `peers`, `sessions`, `rooms` from `WebRTCSimpleServer` (signalling_web.py),
/// collapsed into one struct guarded by a single mutex at the call site.
#[derive(Default)]
pub struct PeerRegistry {
    peers: HashMap<String, Peer>,
    sessions: HashMap<String, String>,
    rooms: HashMap<String, HashSet<String>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.peers.contains_key(uid)
    }

    pub fn insert(&mut self, uid: String, sender: mpsc::UnboundedSender<Message>, meta: Option<String>) {
        self.peers.insert(uid, Peer { sender, status: PeerStatus::None, meta });
    }

    pub fn status(&self, uid: &str) -> Option<PeerStatus> {
        self.peers.get(uid).map(|p| p.status.clone())
    }

    pub fn meta(&self, uid: &str) -> Option<String> {
        self.peers.get(uid).and_then(|p| p.meta.clone())
    }

    pub fn send_to(&self, uid: &str, msg: String) -> bool {
        match self.peers.get(uid) {
            Some(peer) => peer.sender.send(Message::Text(msg)).is_ok(),
            None => false,
        }
    }

    /// Start a 1:1 session between `uid` and `callee_id`. Caller has already
    /// checked both exist and are idle.
    pub fn start_session(&mut self, uid: &str, callee_id: &str) {
        if let Some(peer) = self.peers.get_mut(uid) {
            peer.status = PeerStatus::Session;
        }
        if let Some(peer) = self.peers.get_mut(callee_id) {
            peer.status = PeerStatus::Session;
        }
        self.sessions.insert(uid.to_string(), callee_id.to_string());
        self.sessions.insert(callee_id.to_string(), uid.to_string());
    }

    pub fn session_peer(&self, uid: &str) -> Option<String> {
        self.sessions.get(uid).cloned()
    }

    /// Join (creating if necessary) `room_id`. Room ids must not be the
    /// literal `"session"`, empty, or contain whitespace; caller validates.
    pub fn join_room(&mut self, uid: &str, room_id: &str) -> Vec<String> {
        let room = self.rooms.entry(room_id.to_string()).or_default();
        let existing: Vec<String> = room.iter().cloned().collect();
        room.insert(uid.to_string());
        if let Some(peer) = self.peers.get_mut(uid) {
            peer.status = PeerStatus::Room(room_id.to_string());
        }
        existing
    }

    pub fn room_peers(&self, room_id: &str, excluding: &str) -> Vec<String> {
        self.rooms
            .get(room_id)
            .map(|set| set.iter().filter(|p| p.as_str() != excluding).cloned().collect())
            .unwrap_or_default()
    }

    pub fn peer_in_room(&self, room_id: &str, uid: &str) -> bool {
        self.rooms.get(room_id).map(|set| set.contains(uid)).unwrap_or(false)
    }

    /// Tear down `uid`'s session, also clearing the peer it was paired
    /// with, and returning that peer's id if any (caller closes its socket).
    pub fn cleanup_session(&mut self, uid: &str) -> Option<String> {
        let other_id = self.sessions.remove(uid)?;
        self.sessions.remove(&other_id);
        Some(other_id)
    }

    /// Remove `uid` from its room, returning the remaining room members so
    /// the caller can notify them with `ROOM_PEER_LEFT`.
    pub fn cleanup_room(&mut self, uid: &str, room_id: &str) -> Vec<String> {
        let Some(room) = self.rooms.get_mut(room_id) else { return Vec::new() };
        if !room.remove(uid) {
            return Vec::new();
        }
        room.iter().cloned().collect()
    }

    pub fn remove(&mut self, uid: &str) -> Option<Peer> {
        self.peers.remove(uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> mpsc::UnboundedSender<Message> {
        mpsc::unbounded_channel().0
    }

    #[test]
    fn session_pairs_both_peers() {
        let mut reg = PeerRegistry::new();
        reg.insert("a".into(), sender(), None);
        reg.insert("b".into(), sender(), None);
        reg.start_session("a", "b");
        assert_eq!(reg.status("a"), Some(PeerStatus::Session));
        assert_eq!(reg.status("b"), Some(PeerStatus::Session));
        assert_eq!(reg.session_peer("a").as_deref(), Some("b"));
        assert_eq!(reg.session_peer("b").as_deref(), Some("a"));
    }

    #[test]
    fn cleanup_session_tears_down_both_sides() {
        let mut reg = PeerRegistry::new();
        reg.insert("a".into(), sender(), None);
        reg.insert("b".into(), sender(), None);
        reg.start_session("a", "b");
        let other = reg.cleanup_session("a");
        assert_eq!(other.as_deref(), Some("b"));
        assert!(reg.session_peer("b").is_none());
    }

    #[test]
    fn room_join_reports_existing_members_then_tracks_new_one() {
        let mut reg = PeerRegistry::new();
        reg.insert("a".into(), sender(), None);
        reg.insert("b".into(), sender(), None);
        let existing = reg.join_room("a", "lobby");
        assert!(existing.is_empty());
        let existing = reg.join_room("b", "lobby");
        assert_eq!(existing, vec!["a".to_string()]);
        assert!(reg.peer_in_room("lobby", "a"));
        assert!(reg.peer_in_room("lobby", "b"));
    }

    #[test]
    fn cleanup_room_returns_remaining_members() {
        let mut reg = PeerRegistry::new();
        reg.insert("a".into(), sender(), None);
        reg.insert("b".into(), sender(), None);
        reg.join_room("a", "lobby");
        reg.join_room("b", "lobby");
        let remaining = reg.cleanup_room("a", "lobby");
        assert_eq!(remaining, vec!["b".to_string()]);
        assert!(!reg.peer_in_room("lobby", "a"));
    }
}
