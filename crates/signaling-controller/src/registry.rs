//! Connection registry: every live socket and the identity it claims.
//!
//! Purely in-process bookkeeping, independent of room membership; a
//! connection is meaningless outside the process that accepted it. Each
//! entry owns the outbound channel feeding that connection's writer task.
//!
//! Delivery is best-effort by design: a peer vanishing mid-broadcast is a
//! routine condition, so failures are counted and swallowed, never raised.

use crate::observability::CoreStats;
use crate::protocol::ServerFrame;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Outbound channel capacity per connection.
pub const OUTBOUND_CHANNEL_BUFFER: usize = 200;

/// Result of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Target gone or its channel saturated; counted, not an error.
    Dropped,
}

/// What a connection has claimed and where it is bound.
#[derive(Debug, Clone)]
pub struct ConnectionBinding {
    pub user_id: String,
    pub role: String,
    /// A connection is bound to at most one room at a time.
    pub bound_room: Option<String>,
}

struct RegisteredConnection {
    binding: ConnectionBinding,
    sender: mpsc::Sender<ServerFrame>,
}

/// Registry of live connections keyed by connection id.
pub struct ConnectionRegistry {
    connections: DashMap<String, RegisteredConnection>,
    stats: Arc<CoreStats>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new(stats: Arc<CoreStats>) -> Self {
        Self {
            connections: DashMap::new(),
            stats,
        }
    }

    /// Register a freshly authenticated connection.
    pub fn register(
        &self,
        connection_id: &str,
        user_id: &str,
        role: &str,
        sender: mpsc::Sender<ServerFrame>,
    ) {
        self.connections.insert(
            connection_id.to_string(),
            RegisteredConnection {
                binding: ConnectionBinding {
                    user_id: user_id.to_string(),
                    role: role.to_string(),
                    bound_room: None,
                },
                sender,
            },
        );
        self.stats.connection_opened();
    }

    /// Bind a connection to a room. Returns false if the connection is gone.
    pub fn bind_room(&self, connection_id: &str, room_id: &str) -> bool {
        match self.connections.get_mut(connection_id) {
            Some(mut entry) => {
                entry.binding.bound_room = Some(room_id.to_string());
                true
            }
            None => false,
        }
    }

    /// Clear a connection's room binding (explicit leave).
    pub fn clear_room(&self, connection_id: &str) {
        if let Some(mut entry) = self.connections.get_mut(connection_id) {
            entry.binding.bound_room = None;
        }
    }

    /// Remove a connection. Synchronous: after this returns, no further
    /// frame can be routed to it. Returns the binding for lifecycle cleanup.
    pub fn unregister(&self, connection_id: &str) -> Option<ConnectionBinding> {
        let removed = self
            .connections
            .remove(connection_id)
            .map(|(_, conn)| conn.binding);
        if removed.is_some() {
            self.stats.connection_closed();
        }
        removed
    }

    /// Current binding of a connection.
    #[must_use]
    pub fn binding(&self, connection_id: &str) -> Option<ConnectionBinding> {
        self.connections
            .get(connection_id)
            .map(|entry| entry.binding.clone())
    }

    /// Deliver one frame to one connection, best-effort.
    pub fn send(&self, connection_id: &str, frame: ServerFrame) -> Delivery {
        let Some(entry) = self.connections.get(connection_id) else {
            self.stats.delivery_dropped();
            return Delivery::Dropped;
        };

        match entry.sender.try_send(frame) {
            Ok(()) => Delivery::Delivered,
            Err(_) => {
                debug!(
                    target: "sc.registry",
                    connection_id = %connection_id,
                    "Outbound channel gone or saturated, frame dropped"
                );
                self.stats.delivery_dropped();
                Delivery::Dropped
            }
        }
    }

    /// Deliver a frame to every connection bound to `room_id`, except
    /// `exclude`. Returns the number delivered; per-recipient failures never
    /// abort delivery to the rest.
    pub fn broadcast_room(
        &self,
        room_id: &str,
        frame: &ServerFrame,
        exclude: Option<&str>,
    ) -> usize {
        let targets: Vec<String> = self
            .connections
            .iter()
            .filter(|entry| {
                entry.value().binding.bound_room.as_deref() == Some(room_id)
                    && Some(entry.key().as_str()) != exclude
            })
            .map(|entry| entry.key().clone())
            .collect();

        let mut delivered = 0;
        for connection_id in targets {
            if self.send(&connection_id, frame.clone()) == Delivery::Delivered {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
