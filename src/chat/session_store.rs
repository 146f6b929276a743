//! In-memory session store and connection registry.
//!
//! Sessions are process-local; durability lives in the conversation log. Each map is a
//! `DashMap`, so single-entry updates are atomic. Two messages racing on one session
//! are not serialized against each other.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chat::connection::ConnectionHandle;
use crate::chat::message::{Message, PromptMessage, Role};
use crate::core::ids::{SessionId, UserId};

#[derive(Clone, Debug)]
struct SessionEntry {
    user_id: Option<UserId>,
    messages: VecDeque<Message>,
    last_activity: DateTime<Utc>,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            user_id: None,
            messages: VecDeque::new(),
            last_activity: Utc::now(),
        }
    }

    fn last_seen(&self) -> DateTime<Utc> {
        self.messages
            .back()
            .map_or(self.last_activity, |message| message.timestamp)
    }
}

/// Counters reported by [`SessionStore::stats`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct SessionStats {
    /// Sessions with a live connection.
    pub active_connections: usize,
    /// Sessions held in memory.
    pub total_sessions: usize,
    /// Users mapped to a session.
    pub linked_users: usize,
}

/// Full transcript of one session.
#[derive(Clone, Debug, Serialize)]
pub struct SessionExport {
    /// Session identifier.
    pub session_id: SessionId,
    /// Owning user, when known.
    pub user_id: Option<UserId>,
    /// Stored messages, oldest first.
    pub messages: Vec<Message>,
    /// Export time.
    pub exported_at: DateTime<Utc>,
}

/// Process-wide session and connection registry.
#[derive(Debug)]
pub struct SessionStore {
    max_messages: usize,
    sessions: DashMap<SessionId, SessionEntry>,
    connections: DashMap<SessionId, ConnectionHandle>,
    user_sessions: DashMap<UserId, SessionId>,
}

impl SessionStore {
    /// Create a store keeping at most `max_messages` per session (minimum one).
    #[must_use]
    pub fn new(max_messages: usize) -> Self {
        Self {
            max_messages: max_messages.max(1),
            sessions: DashMap::new(),
            connections: DashMap::new(),
            user_sessions: DashMap::new(),
        }
    }

    /// Per-session message cap.
    #[must_use]
    pub const fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Create a session with a fresh identifier.
    pub fn create_session(&self, user_id: Option<UserId>) -> SessionId {
        let session_id = SessionId::generate();
        self.sessions.insert(session_id.clone(), SessionEntry::new());
        if let Some(user_id) = user_id {
            self.attach_user(&session_id, user_id);
        }
        info!(session_id = %session_id, "Created session");
        session_id
    }

    /// Create an empty session under a client-chosen id if it does not exist yet.
    pub fn ensure_session(&self, session_id: &SessionId) {
        self.sessions
            .entry(session_id.clone())
            .or_insert_with(SessionEntry::new);
    }

    /// Whether the session is held in memory.
    #[must_use]
    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Record the owning user of a session. The latest session wins per user.
    pub fn attach_user(&self, session_id: &SessionId, user_id: UserId) {
        {
            let mut entry = self
                .sessions
                .entry(session_id.clone())
                .or_insert_with(SessionEntry::new);
            entry.user_id = Some(user_id.clone());
        }
        self.user_sessions.insert(user_id, session_id.clone());
    }

    /// Most recent session recorded for a user.
    #[must_use]
    pub fn session_for_user(&self, user_id: &UserId) -> Option<SessionId> {
        self.user_sessions.get(user_id).map(|sid| sid.value().clone())
    }

    /// Append a message and drop the oldest ones beyond the cap.
    pub fn append_message(&self, session_id: &SessionId, role: Role, content: impl Into<String>) {
        let message = Message::now(role, content);
        let mut entry = self
            .sessions
            .entry(session_id.clone())
            .or_insert_with(SessionEntry::new);
        entry.last_activity = message.timestamp;
        entry.messages.push_back(message);
        while entry.messages.len() > self.max_messages {
            entry.messages.pop_front();
        }
    }

    /// User and assistant messages of a session, oldest first. Unknown sessions are empty.
    #[must_use]
    pub fn history(&self, session_id: &SessionId) -> Vec<PromptMessage> {
        self.sessions
            .get(session_id)
            .map(|entry| {
                entry
                    .messages
                    .iter()
                    .filter(|message| message.role != Role::System)
                    .map(Message::to_prompt)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop a session, its connection and any user mapping to it.
    pub fn end_session(&self, session_id: &SessionId) {
        if let Some((_, handle)) = self.connections.remove(session_id) {
            handle.close();
        }
        self.sessions.remove(session_id);
        self.user_sessions.retain(|_, sid| *sid != *session_id);
        info!(session_id = %session_id, "Ended session");
    }

    /// Remove sessions idle for longer than `max_age` that have no live connection.
    pub fn remove_stale(&self, max_age: Duration) -> usize {
        self.remove_stale_at(max_age, Utc::now())
    }

    fn remove_stale_at(&self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now
            .checked_sub_signed(max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let candidates: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().last_seen() < cutoff)
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for session_id in candidates {
            if self.is_connected(&session_id) {
                continue;
            }
            if self
                .sessions
                .remove_if(&session_id, |_, entry| entry.last_seen() < cutoff)
                .is_some()
            {
                self.user_sessions.retain(|_, sid| *sid != session_id);
                debug!(session_id = %session_id, "Removed stale session");
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Removed {removed} stale sessions");
        }
        removed
    }

    /// Register the live connection of a session, replacing any previous one.
    pub fn register_connection(&self, session_id: &SessionId, handle: ConnectionHandle) -> u64 {
        let handle_id = handle.id();
        self.ensure_session(session_id);
        if let Some(previous) = self.connections.insert(session_id.clone(), handle) {
            debug!(session_id = %session_id, "Replacing previous connection");
            previous.close();
        }
        info!(session_id = %session_id, "Client connected");
        handle_id
    }

    /// Forget the live connection of a session.
    ///
    /// With `handle_id`, the record is removed only while it still belongs to that
    /// handle, so a closing socket does not tear down a newer reconnect.
    pub fn disconnect(&self, session_id: &SessionId, handle_id: Option<u64>) {
        let removed = match handle_id {
            Some(id) => self
                .connections
                .remove_if(session_id, |_, handle| handle.id() == id)
                .is_some(),
            None => self.connections.remove(session_id).is_some(),
        };
        if removed {
            info!(session_id = %session_id, "Client disconnected");
        }
    }

    /// Whether a live connection is registered for the session.
    #[must_use]
    pub fn is_connected(&self, session_id: &SessionId) -> bool {
        self.connections.contains_key(session_id)
    }

    /// Sessions with a live connection.
    #[must_use]
    pub fn active_sessions(&self) -> Vec<SessionId> {
        self.connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Send a text frame to one session. Dead connections are dropped.
    pub fn send_to(&self, session_id: &SessionId, text: &str) -> bool {
        let Some(handle) = self.connections.get(session_id).map(|h| h.value().clone()) else {
            return false;
        };
        if handle.send_text(text) {
            return true;
        }
        warn!(session_id = %session_id, "Send failed, dropping connection");
        self.disconnect(session_id, Some(handle.id()));
        false
    }

    /// Send a text frame to every live connection except `exclude`.
    pub fn broadcast(&self, text: &str, exclude: Option<&SessionId>) -> usize {
        let targets: Vec<(SessionId, ConnectionHandle)> = self
            .connections
            .iter()
            .filter(|entry| exclude != Some(entry.key()))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut delivered = 0;
        for (session_id, handle) in targets {
            if handle.send_text(text) {
                delivered += 1;
            } else {
                warn!(session_id = %session_id, "Broadcast failed, dropping connection");
                self.disconnect(&session_id, Some(handle.id()));
            }
        }
        delivered
    }

    /// Registry counters.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            active_connections: self.connections.len(),
            total_sessions: self.sessions.len(),
            linked_users: self.user_sessions.len(),
        }
    }

    /// Snapshot the full transcript of a session.
    #[must_use]
    pub fn export(&self, session_id: &SessionId) -> Option<SessionExport> {
        self.sessions.get(session_id).map(|entry| SessionExport {
            session_id: session_id.clone(),
            user_id: entry.user_id.clone(),
            messages: entry.messages.iter().cloned().collect(),
            exported_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::connection::ConnectionSignal;

    fn sid(value: &str) -> SessionId {
        SessionId::new(value)
    }

    #[test]
    fn test_history_keeps_most_recent_cap_in_order() {
        let store = SessionStore::new(20);
        let session = sid("s1");
        for i in 0..25 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            store.append_message(&session, role, format!("m{i}"));
        }

        let history = store.history(&session);
        assert_eq!(history.len(), 20);
        assert_eq!(history[0].content, "m5");
        assert_eq!(history[19].content, "m24");
    }

    #[test]
    fn test_history_excludes_system_messages() {
        let store = SessionStore::new(20);
        let session = sid("s1");
        store.append_message(&session, Role::System, "internal");
        store.append_message(&session, Role::User, "hi");
        store.append_message(&session, Role::Assistant, "hello");

        let history = store.history(&session);
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|m| m.role != Role::System));
    }

    #[test]
    fn test_unknown_session_has_empty_history() {
        let store = SessionStore::new(20);
        assert!(store.history(&sid("missing")).is_empty());
    }

    #[test]
    fn test_create_session_links_user_last_write_wins() {
        let store = SessionStore::new(20);
        let user = UserId::new("u1");
        let first = store.create_session(Some(user.clone()));
        let second = store.create_session(Some(user.clone()));

        assert_ne!(first, second);
        assert_eq!(store.session_for_user(&user), Some(second));
        assert_eq!(store.stats().total_sessions, 2);
        assert_eq!(store.stats().linked_users, 1);
    }

    #[test]
    fn test_end_session_clears_everything() {
        let store = SessionStore::new(20);
        let user = UserId::new("u1");
        let session = store.create_session(Some(user.clone()));
        let (handle, mut rx) = ConnectionHandle::channel();
        store.register_connection(&session, handle);
        store.append_message(&session, Role::User, "hi");

        store.end_session(&session);

        assert!(!store.contains(&session));
        assert!(!store.is_connected(&session));
        assert!(store.session_for_user(&user).is_none());
        assert_eq!(rx.try_recv().ok(), Some(ConnectionSignal::Close));
    }

    #[test]
    fn test_remove_stale_spares_connected_sessions() {
        let store = SessionStore::new(20);
        let idle = sid("idle");
        let live = sid("live");
        store.append_message(&idle, Role::User, "old");
        store.append_message(&live, Role::User, "old");
        let (handle, _rx) = ConnectionHandle::channel();
        store.register_connection(&live, handle);

        let later = Utc::now() + Duration::hours(25);
        let removed = store.remove_stale_at(Duration::hours(24), later);

        assert_eq!(removed, 1);
        assert!(!store.contains(&idle));
        assert!(store.contains(&live));
    }

    #[test]
    fn test_remove_stale_keeps_recent_sessions() {
        let store = SessionStore::new(20);
        let session = sid("recent");
        store.append_message(&session, Role::User, "new");
        assert_eq!(store.remove_stale(Duration::hours(24)), 0);
        assert!(store.contains(&session));
    }

    #[test]
    fn test_remove_stale_with_unbounded_age_keeps_everything() {
        let store = SessionStore::new(20);
        let session = sid("s1");
        store.append_message(&session, Role::User, "hello");
        assert_eq!(store.remove_stale(Duration::max_value()), 0);
        assert!(store.contains(&session));
    }

    #[test]
    fn test_old_socket_does_not_drop_reconnect() {
        let store = SessionStore::new(20);
        let session = sid("s1");
        let (old, _old_rx) = ConnectionHandle::channel();
        let (new, _new_rx) = ConnectionHandle::channel();
        let old_id = store.register_connection(&session, old);
        store.register_connection(&session, new);

        store.disconnect(&session, Some(old_id));
        assert!(store.is_connected(&session));
    }

    #[test]
    fn test_broadcast_skips_excluded_and_drops_dead() {
        let store = SessionStore::new(20);
        let (a, mut rx_a) = ConnectionHandle::channel();
        let (b, rx_b) = ConnectionHandle::channel();
        let (c, mut rx_c) = ConnectionHandle::channel();
        store.register_connection(&sid("a"), a);
        store.register_connection(&sid("b"), b);
        store.register_connection(&sid("c"), c);
        drop(rx_b);

        let delivered = store.broadcast("news", Some(&sid("c")));

        assert_eq!(delivered, 1);
        assert_eq!(rx_a.try_recv().ok(), Some(ConnectionSignal::Text("news".to_string())));
        assert!(rx_c.try_recv().is_err());
        assert!(!store.is_connected(&sid("b")));
    }

    #[test]
    fn test_send_to_delivers_and_drops_dead_connection() {
        let store = SessionStore::new(20);
        let (live, mut rx_live) = ConnectionHandle::channel();
        let (dead, rx_dead) = ConnectionHandle::channel();
        store.register_connection(&sid("live"), live);
        store.register_connection(&sid("dead"), dead);
        drop(rx_dead);

        assert!(store.send_to(&sid("live"), "price drop"));
        assert_eq!(
            rx_live.try_recv().ok(),
            Some(ConnectionSignal::Text("price drop".to_string()))
        );

        assert!(!store.send_to(&sid("dead"), "price drop"));
        assert!(!store.is_connected(&sid("dead")));
        assert!(store.contains(&sid("dead")));

        assert!(!store.send_to(&sid("unknown"), "price drop"));
        assert_eq!(store.stats().active_connections, 1);
    }

    #[test]
    fn test_export_returns_messages() {
        let store = SessionStore::new(20);
        let session = sid("s1");
        store.append_message(&session, Role::User, "hi");
        let export = store.export(&session);
        assert_eq!(export.map(|e| e.messages.len()), Some(1));
        assert!(store.export(&sid("missing")).is_none());
    }
}
