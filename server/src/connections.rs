//! Connection tracking and outbound message routing
//!
//! Each socket, regardless of framing, is registered here with an unbounded
//! sender that its writer task drains. The manager also records which player
//! identity a connection currently owns, which is how ingress events are
//! attributed after `join`.

use log::{info, warn};
use shared::ServerEvent;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc::UnboundedSender;

/// Process-unique connection handle, assigned by the transport layer.
pub type ConnectionId = u64;

/// A connected socket and the identity it currently speaks for.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub sender: UnboundedSender<ServerEvent>,
    /// Identity installed by the most recent join on this socket.
    pub od_id: Option<String>,
}

/// Registry of all live connections.
///
/// Ownership is single-threaded: the world loop is the only mutator, so a
/// plain map suffices.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }

    /// Registers a freshly accepted socket.
    pub fn add(&mut self, id: ConnectionId, addr: SocketAddr, sender: UnboundedSender<ServerEvent>) {
        info!("Connection {} established from {}", id, addr);
        self.connections.insert(
            id,
            Connection {
                id,
                addr,
                sender,
                od_id: None,
            },
        );
    }

    /// Drops a closed socket, returning its record for final cleanup.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&id);
        if let Some(conn) = &connection {
            info!("Connection {} from {} closed", id, conn.addr);
        }
        connection
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Identity currently owned by the connection, if a join happened.
    pub fn od_of(&self, id: ConnectionId) -> Option<&str> {
        self.connections.get(&id).and_then(|c| c.od_id.as_deref())
    }

    pub fn set_od(&mut self, id: ConnectionId, od_id: &str) {
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.od_id = Some(od_id.to_string());
        }
    }

    /// Clears ownership of `od_id` wherever it is held.
    pub fn clear_od(&mut self, od_id: &str) {
        for conn in self.connections.values_mut() {
            if conn.od_id.as_deref() == Some(od_id) {
                conn.od_id = None;
            }
        }
    }

    /// Queues an event for one connection.
    ///
    /// A send only fails when the writer task is gone, which means the socket
    /// is mid-teardown; the event is dropped and the disconnect path cleans
    /// up shortly after.
    pub fn send(&self, id: ConnectionId, event: ServerEvent) {
        if let Some(conn) = self.connections.get(&id) {
            if conn.sender.send(event).is_err() {
                warn!("Dropped event for closing connection {}", id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn test_register_and_remove_connection() {
        let mut manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        manager.add(1, test_addr(), tx);
        assert_eq!(manager.len(), 1);
        assert!(manager.get(1).is_some());

        let removed = manager.remove(1);
        assert!(removed.is_some());
        assert!(manager.is_empty());
        assert!(manager.remove(1).is_none());
    }

    #[test]
    fn test_identity_ownership() {
        let mut manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        manager.add(1, test_addr(), tx);

        assert_eq!(manager.od_of(1), None);

        manager.set_od(1, "od_1");
        assert_eq!(manager.od_of(1), Some("od_1"));

        manager.clear_od("od_1");
        assert_eq!(manager.od_of(1), None);
    }

    #[test]
    fn test_send_queues_event() {
        let mut manager = ConnectionManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.add(1, test_addr(), tx);

        manager.send(
            1,
            ServerEvent::Error {
                message: "test".to_string(),
            },
        );

        match rx.try_recv() {
            Ok(ServerEvent::Error { message }) => assert_eq!(message, "test"),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_send_to_unknown_connection_is_noop() {
        let manager = ConnectionManager::new();
        manager.send(
            42,
            ServerEvent::Error {
                message: "nobody home".to_string(),
            },
        );
    }
}
