//! Connection registry for name-addressed routing.
//!
//! Maps registered names to [`ConnectionHandle`]s. This is the only state
//! shared between receive loops.
//!
//! ```text
//! session (alice) <-> ConnectionRegistry <-> session (bob)
//!       |                    |                    |
//!       v                    v                    v
//!  mpsc::Sender     DashMap<String, Handle>   mpsc::Sender
//! ```
//!
//! Every operation is atomic per name. Handles are cloned out of the map
//! before anything is sent, so no shard lock is ever held across a send.

use std::fmt;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, instrument};

use crate::codec::Reply;
use crate::connection::{Connection, ConnectionHandle, ConnectionId, SendResult};

/// Registry of logged-in connections, keyed by name (case-sensitive).
pub struct ConnectionRegistry {
    connections: DashMap<String, ConnectionHandle>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        info!("Creating connection registry");
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register `conn` under `name`.
    ///
    /// Returns false and leaves the registry untouched if `name` is
    /// already held, even by a connection whose transport is closing.
    #[instrument(skip(self, conn), fields(conn_id = %conn.id()))]
    pub fn register(&self, name: &str, conn: &Connection) -> bool {
        match self.connections.entry(name.to_string()) {
            Entry::Occupied(existing) => {
                debug!(holder = %existing.get().id(), "Name already registered");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(conn.handle_for(name));
                debug!("Registered connection");
                true
            }
        }
    }

    /// Current holder of `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<ConnectionHandle> {
        self.connections.get(name).map(|entry| entry.value().clone())
    }

    /// Remove `name` only if it is still held by connection `id`.
    ///
    /// Returns true if an entry was removed.
    #[instrument(skip(self), fields(conn_id = %id))]
    pub fn unregister(&self, name: &str, id: ConnectionId) -> bool {
        let removed = self
            .connections
            .remove_if(name, |_, handle| handle.id() == id)
            .is_some();
        if removed {
            debug!("Unregistered connection");
        } else {
            debug!("Name not held by this connection");
        }
        removed
    }

    /// Check if a name is currently registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.connections.contains_key(name)
    }

    /// Sorted point-in-time list of registered names.
    pub fn snapshot(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Enqueue a reply for whoever holds `name`.
    #[instrument(skip(self, reply), fields(to = %name))]
    pub fn send_to(&self, name: &str, reply: Reply) -> SendResult {
        match self.lookup(name) {
            Some(handle) => handle.send(reply),
            None => {
                debug!("Recipient not registered");
                SendResult::NotConnected
            }
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connection_count", &self.connections.len())
            .finish()
    }
}
