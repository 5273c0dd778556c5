//! Broadcast hub
//!
//! Fan-out of server events to live client connections. Each connection
//! gets its own bounded outbound buffer, so a slow or dead connection never
//! stalls the others; events past the bound for one connection are dropped
//! for that connection only.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use switchboard_core::events::{EventSink, ServerEvent};

/// Outbound buffer bound per connection.
pub const CONNECTION_BUFFER: usize = 256;

struct ConnectionEntry {
    session_id: String,
    tx: mpsc::Sender<ServerEvent>,
}

/// Registry of live client connections, indexed by connection and session.
pub struct BroadcastHub {
    connections: RwLock<HashMap<String, ConnectionEntry>>,
    sessions: RwLock<HashMap<String, HashSet<String>>>,
}

impl BroadcastHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connections: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Register a connection; the returned receiver feeds its socket writer.
    pub fn subscribe(&self, connection_id: &str, session_id: &str) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);
        self.connections.write().insert(
            connection_id.to_string(),
            ConnectionEntry {
                session_id: session_id.to_string(),
                tx,
            },
        );
        self.sessions
            .write()
            .entry(session_id.to_string())
            .or_default()
            .insert(connection_id.to_string());
        rx
    }

    /// Drop a connection. Unknown ids are ignored.
    pub fn unsubscribe(&self, connection_id: &str) {
        let entry = self.connections.write().remove(connection_id);
        if let Some(entry) = entry {
            let mut sessions = self.sessions.write();
            if let Some(set) = sessions.get_mut(&entry.session_id) {
                set.remove(connection_id);
                if set.is_empty() {
                    sessions.remove(&entry.session_id);
                }
            }
        }
    }

    /// Deliver to one connection. Returns whether the link was alive and
    /// writable; an event past a full buffer is dropped for that link.
    pub fn publish_to_connection(&self, event: ServerEvent, connection_id: &str) -> bool {
        let tx = match self.connections.read().get(connection_id) {
            Some(entry) => entry.tx.clone(),
            None => return false,
        };
        match tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(connection_id, "outbound buffer full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Deliver to every live connection of a session; returns how many
    /// links accepted the event.
    pub fn publish_to_session(&self, event: &ServerEvent, session_id: &str) -> usize {
        let connection_ids: Vec<String> = match self.sessions.read().get(session_id) {
            Some(set) => set.iter().cloned().collect(),
            None => return 0,
        };
        connection_ids
            .into_iter()
            .filter(|id| self.publish_to_connection(event.clone(), id))
            .count()
    }

    /// Deliver to every connection of every session.
    pub fn broadcast(&self, event: &ServerEvent) -> usize {
        let connection_ids: Vec<String> = self.connections.read().keys().cloned().collect();
        connection_ids
            .into_iter()
            .filter(|id| self.publish_to_connection(event.clone(), id))
            .count()
    }

    /// Drop every connection of a session. Called at session retirement.
    pub fn clear(&self, session_id: &str) {
        let connection_ids: Vec<String> = match self.sessions.write().remove(session_id) {
            Some(set) => set.into_iter().collect(),
            None => return,
        };
        let mut connections = self.connections.write();
        for id in connection_ids {
            connections.remove(&id);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    pub fn session_connection_count(&self, session_id: &str) -> usize {
        self.sessions
            .read()
            .get(session_id)
            .map(|set| set.len())
            .unwrap_or(0)
    }

    /// An [`EventSink`] that fans out to one session's connections.
    pub fn sink_for(self: &Arc<Self>, session_id: &str) -> Arc<dyn EventSink> {
        Arc::new(SessionPublisher {
            hub: self.clone(),
            session_id: session_id.to_string(),
        })
    }
}

/// Session-scoped publisher handed to the core as its event sink.
struct SessionPublisher {
    hub: Arc<BroadcastHub>,
    session_id: String,
}

impl EventSink for SessionPublisher {
    fn send(&self, event: ServerEvent) {
        self.hub.publish_to_session(&event, &self.session_id);
    }
}

#[cfg(test)]
#[path = "broadcast_tests.rs"]
mod tests;
