use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use kindred_types::events::GatewayEvent;

/// Identifies one live WebSocket, not a user: a user with two tabs has two.
pub type ConnId = Uuid;

/// Tracks live connections and which rooms they have joined, and fans
/// events out to room members.
///
/// One instance is owned by the server and cloned into every connection
/// task; tests build as many isolated instances as they like.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    registry: RwLock<Registry>,

    /// Per-room write locks: persist + broadcast happen under the lock so
    /// every member sees the same order.
    room_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnId, ConnectionHandle>,
    /// room_id -> member connections
    rooms: HashMap<String, HashSet<ConnId>>,
}

struct ConnectionHandle {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
    rooms: HashSet<String>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns its id and the receiver the socket
    /// writer drains.
    pub async fn register(&self, user_id: Uuid) -> (ConnId, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.registry.write().await.connections.insert(
            conn_id,
            ConnectionHandle {
                user_id,
                tx,
                rooms: HashSet::new(),
            },
        );
        (conn_id, rx)
    }

    /// Drop a connection and remove it from every room it had joined.
    /// Returns the rooms it left.
    pub async fn unregister(&self, conn_id: ConnId) -> Vec<String> {
        let mut registry = self.inner.registry.write().await;
        let Some(handle) = registry.connections.remove(&conn_id) else {
            return Vec::new();
        };

        debug!("unregistered connection {} of {}", conn_id, handle.user_id);
        let left: Vec<String> = handle.rooms.into_iter().collect();
        for room_id in &left {
            registry.remove_member(room_id, conn_id);
        }
        drop(registry);

        for room_id in &left {
            self.release_room_lock_if_idle(room_id).await;
        }
        left
    }

    /// Add a connection to a room. Returns `false` if it was already a
    /// member or is not registered.
    pub async fn join(&self, conn_id: ConnId, room_id: &str) -> bool {
        let mut registry = self.inner.registry.write().await;
        let Some(handle) = registry.connections.get_mut(&conn_id) else {
            warn!("join from unregistered connection {}", conn_id);
            return false;
        };
        if !handle.rooms.insert(room_id.to_string()) {
            return false;
        }
        registry
            .rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(conn_id);
        true
    }

    /// Remove a connection from a room. Returns `false` if it was not a member.
    pub async fn leave(&self, conn_id: ConnId, room_id: &str) -> bool {
        let removed = {
            let mut registry = self.inner.registry.write().await;
            let removed = registry
                .connections
                .get_mut(&conn_id)
                .is_some_and(|handle| handle.rooms.remove(room_id));
            if removed {
                registry.remove_member(room_id, conn_id);
            }
            removed
        };

        if removed {
            self.release_room_lock_if_idle(room_id).await;
        }
        removed
    }

    /// Send an event to one connection.
    pub async fn send_to_connection(&self, conn_id: ConnId, event: GatewayEvent) -> bool {
        let registry = self.inner.registry.read().await;
        registry
            .connections
            .get(&conn_id)
            .is_some_and(|handle| handle.tx.send(event).is_ok())
    }

    /// Send an event to every connection joined to `room_id`.
    /// Returns the number of connections it was handed to.
    pub async fn broadcast_to_room(&self, room_id: &str, event: GatewayEvent) -> usize {
        let registry = self.inner.registry.read().await;
        let Some(members) = registry.rooms.get(room_id) else {
            return 0;
        };

        let mut delivered = 0;
        for conn_id in members {
            if let Some(handle) = registry.connections.get(conn_id) {
                // A closed receiver means the socket is going away; its
                // task will unregister it.
                if handle.tx.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        debug!("room {} broadcast reached {} connections", short(room_id), delivered);
        delivered
    }

    /// The lock serializing writes in `room_id`.
    pub fn room_lock(&self, room_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .inner
            .room_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(room_id.to_string()).or_default().clone()
    }

    pub async fn rooms_of(&self, conn_id: ConnId) -> Vec<String> {
        self.inner
            .registry
            .read()
            .await
            .connections
            .get(&conn_id)
            .map(|handle| handle.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn room_members(&self, room_id: &str) -> usize {
        self.inner
            .registry
            .read()
            .await
            .rooms
            .get(room_id)
            .map_or(0, HashSet::len)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.registry.read().await.connections.len()
    }

    /// Forget the lock of a room nobody is in and nobody is writing to.
    pub(crate) async fn release_room_lock_if_idle(&self, room_id: &str) {
        if self.room_members(room_id).await > 0 {
            return;
        }
        let mut locks = self
            .inner
            .room_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks.get(room_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(room_id);
        }
    }
}

#[cfg(test)]
impl Dispatcher {
    pub(crate) fn room_lock_count(&self) -> usize {
        self.inner
            .room_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl Registry {
    fn remove_member(&mut self, room_id: &str, conn_id: ConnId) {
        if let Some(members) = self.rooms.get_mut(room_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                self.rooms.remove(room_id);
            }
        }
    }
}

pub(crate) fn short(room_id: &str) -> &str {
    &room_id[..room_id.len().min(12)]
}
