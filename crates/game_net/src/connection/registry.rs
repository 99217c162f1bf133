//! Registry of live connections for one reactor pool.
//!
//! Tracks every connection a worker has opened so the application can look
//! one up by id, count them, or broadcast to all of them. The registry holds
//! only weak references; it never keeps a connection alive by itself.

use super::{Connection, ConnectionId, WeakConnection};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// Id-indexed view of the connections serviced by a pool.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, WeakConnection>,
    next_id: AtomicUsize,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Allocates a fresh connection id.
    pub fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Records a new connection.
    pub fn insert(&self, conn: &Connection) {
        self.connections.insert(conn.id(), conn.downgrade());
        info!("🔗 Connection {} to {}", conn.id(), conn.peer_addr());
    }

    /// Forgets a connection. Returns whether it was present.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let removed = self.connections.remove(&id).is_some();
        if removed {
            info!("❌ Connection {} removed", id);
        }
        removed
    }

    /// Returns a new reference to the connection with `id`, if it is alive.
    pub fn get(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.get(&id).and_then(|entry| entry.upgrade())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Writes `message` to every Connected connection.
    ///
    /// # Returns
    ///
    /// The number of connections the message was queued for.
    pub fn broadcast(&self, message: &[u8]) -> usize {
        let targets: Vec<Connection> = self
            .connections
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .collect();

        let sent = targets
            .iter()
            .filter(|conn| conn.write(message).is_ok())
            .count();
        debug!("📡 Broadcasted message to {} connections", sent);
        sent
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
