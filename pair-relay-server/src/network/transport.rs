//! Transport Capabilities
//!
//! Group membership and delivery as seen by the relay. The [`Transport`]
//! trait is the only surface the relay needs; [`ConnectionHub`] implements
//! it over per-connection outbound queues.

use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::game::participant::ParticipantId;
use crate::network::protocol::ServerMessage;

/// Outbound queue of one connection.
pub type ConnectionSender = mpsc::Sender<ServerMessage>;

/// Delivery capabilities required by the relay.
pub trait Transport {
    /// Add a connection to a group.
    fn join_group(&mut self, conn: ParticipantId, group: &str);

    /// Remove a connection from a group.
    fn leave_group(&mut self, conn: ParticipantId, group: &str);

    /// Deliver to every member of a group, optionally skipping one.
    fn broadcast(&self, group: &str, exclude: Option<ParticipantId>, message: ServerMessage);

    /// Deliver to one connection.
    fn unicast(&self, conn: ParticipantId, message: ServerMessage);
}

/// Live connections and their group memberships.
#[derive(Debug, Default)]
pub struct ConnectionHub {
    connections: BTreeMap<ParticipantId, ConnectionSender>,
    groups: BTreeMap<String, BTreeSet<ParticipantId>>,
}

impl ConnectionHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound queue.
    pub fn register(&mut self, conn: ParticipantId, sender: ConnectionSender) {
        self.connections.insert(conn, sender);
    }

    /// Forget a connection and drop it from every group.
    pub fn unregister(&mut self, conn: &ParticipantId) {
        self.connections.remove(conn);
        self.groups.retain(|_, members| {
            members.remove(conn);
            !members.is_empty()
        });
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Members of a group.
    pub fn group_members(&self, group: &str) -> Vec<ParticipantId> {
        self.groups
            .get(group)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Deliver to every registered connection.
    pub fn broadcast_all(&self, message: ServerMessage) {
        for conn in self.connections.keys() {
            self.unicast(*conn, message.clone());
        }
    }

    fn deliver(&self, conn: ParticipantId, sender: &ConnectionSender, message: ServerMessage) {
        if let Err(e) = sender.try_send(message) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    warn!("Outbound queue full for {}, dropping message", conn.short());
                }
                mpsc::error::TrySendError::Closed(_) => {
                    debug!("Connection {} already closed", conn.short());
                }
            }
        }
    }
}

impl Transport for ConnectionHub {
    fn join_group(&mut self, conn: ParticipantId, group: &str) {
        self.groups.entry(group.to_string()).or_default().insert(conn);
    }

    fn leave_group(&mut self, conn: ParticipantId, group: &str) {
        if let Some(members) = self.groups.get_mut(group) {
            members.remove(&conn);
            if members.is_empty() {
                self.groups.remove(group);
            }
        }
    }

    fn broadcast(&self, group: &str, exclude: Option<ParticipantId>, message: ServerMessage) {
        let Some(members) = self.groups.get(group) else {
            return;
        };

        for conn in members.iter().filter(|c| Some(**c) != exclude) {
            if let Some(sender) = self.connections.get(conn) {
                self.deliver(*conn, sender, message.clone());
            }
        }
    }

    fn unicast(&self, conn: ParticipantId, message: ServerMessage) {
        match self.connections.get(&conn) {
            Some(sender) => self.deliver(conn, sender, message),
            None => debug!("Unicast to unknown connection {}", conn.short()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> ParticipantId {
        ParticipantId::from_bytes([byte; 16])
    }

    fn connect(hub: &mut ConnectionHub, byte: u8) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(8);
        hub.register(id(byte), tx);
        rx
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let mut hub = ConnectionHub::new();
        let mut rx1 = connect(&mut hub, 1);
        let mut rx2 = connect(&mut hub, 2);
        hub.join_group(id(1), "g1");
        hub.join_group(id(2), "g1");

        hub.broadcast("g1", Some(id(1)), ServerMessage::OpponentLeft);
        assert_eq!(rx2.try_recv().unwrap(), ServerMessage::OpponentLeft);
        assert!(rx1.try_recv().is_err());

        hub.broadcast("g1", None, ServerMessage::message("hi"));
        assert_eq!(rx1.try_recv().unwrap(), ServerMessage::message("hi"));
        assert_eq!(rx2.try_recv().unwrap(), ServerMessage::message("hi"));
    }

    #[tokio::test]
    async fn test_groups_are_isolated() {
        let mut hub = ConnectionHub::new();
        let mut rx1 = connect(&mut hub, 1);
        let mut rx2 = connect(&mut hub, 2);
        hub.join_group(id(1), "g1");
        hub.join_group(id(2), "g2");

        hub.broadcast("g1", None, ServerMessage::OpponentLeft);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregister_leaves_groups() {
        let mut hub = ConnectionHub::new();
        let _rx1 = connect(&mut hub, 1);
        hub.join_group(id(1), "g1");
        assert_eq!(hub.group_members("g1"), vec![id(1)]);

        hub.unregister(&id(1));
        assert!(hub.group_members("g1").is_empty());
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let mut hub = ConnectionHub::new();
        let (tx, mut rx) = mpsc::channel(1);
        hub.register(id(1), tx);

        hub.unicast(id(1), ServerMessage::message("one"));
        hub.unicast(id(1), ServerMessage::message("two"));

        assert_eq!(rx.try_recv().unwrap(), ServerMessage::message("one"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leave_group() {
        let mut hub = ConnectionHub::new();
        let mut rx1 = connect(&mut hub, 1);
        hub.join_group(id(1), "g1");
        hub.leave_group(id(1), "g1");

        hub.broadcast("g1", None, ServerMessage::OpponentLeft);
        assert!(rx1.try_recv().is_err());
        assert_eq!(hub.connection_count(), 1);
    }
}
