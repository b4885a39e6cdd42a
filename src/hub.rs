//! Hub actor implementation
//!
//! The central actor that owns the client registry and is the only writer of
//! the document. Connection actors talk to it exclusively through
//! `HubCommand`s on a single FIFO channel, so registration, edits and
//! unregistration from one connection are handled in the order they were sent.
//!
//! Delivery to clients never waits: a client whose outbound queue is full is
//! evicted on the spot instead of stalling the loop.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::document::{Edit, SharedDocument};
use crate::error::DeliveryError;
use crate::message::{Presence, ServerMessage, UserInfo};
use crate::types::{ClientId, Peer};

/// Commands sent from connection actors to the Hub
#[derive(Debug)]
pub enum HubCommand {
    /// New connection upgraded
    Register {
        peer: Peer,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// Connection ended (may arrive more than once)
    Unregister { peer: Peer },
    /// Bind a display name
    Join {
        peer: Peer,
        username: Option<String>,
    },
    /// Apply an edit to the document
    Apply {
        peer: Peer,
        client_version: u64,
        edit: Edit,
    },
    /// Relay presence data to everyone else
    Presence { peer: Peer, presence: Presence },
}

/// The Hub actor
///
/// Processes commands one at a time until every sender is dropped.
pub struct Hub {
    /// Registered clients: ClientId -> Client
    clients: HashMap<ClientId, Client>,
    /// Authoritative document; written only from this loop
    document: SharedDocument,
    /// Command receiver channel
    receiver: mpsc::Receiver<HubCommand>,
}

impl Hub {
    pub fn new(receiver: mpsc::Receiver<HubCommand>, document: SharedDocument) -> Self {
        Self {
            clients: HashMap::new(),
            document,
            receiver,
        }
    }

    /// Run the Hub event loop
    pub async fn run(mut self) {
        info!("Hub started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!("Hub shutting down");
    }

    async fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register { peer, sender } => self.handle_register(peer, sender).await,
            HubCommand::Unregister { peer } => self.handle_unregister(peer),
            HubCommand::Join { peer, username } => self.handle_join(peer, username),
            HubCommand::Apply {
                peer,
                client_version,
                edit,
            } => self.handle_apply(peer, client_version, edit).await,
            HubCommand::Presence { peer, presence } => self.handle_presence(peer, presence),
        }
    }

    /// Register a connection, then send welcome, join notice and roster
    async fn handle_register(&mut self, peer: Peer, sender: mpsc::Sender<ServerMessage>) {
        let id = peer.id.clone();

        if self.clients.contains_key(&id) {
            info!("Client {} reconnected, replacing previous connection", id);
            self.evict(&id);
        }

        let welcome = {
            let doc = self.document.read().await;
            ServerMessage::Welcome {
                client_id: id.clone(),
                version: doc.version(),
                document: doc.content().to_string(),
            }
        };

        self.clients.insert(id.clone(), Client::new(peer, sender));
        info!("Client {} registered ({} active)", id, self.clients.len());

        if !self.send_to(&id, welcome) {
            return;
        }

        self.broadcast(
            Some(&id),
            ServerMessage::UserJoined {
                client_id: id.clone(),
                username: None,
            },
        );

        self.send_roster(&id);
    }

    /// Remove a connection; stale or repeated requests are no-ops
    fn handle_unregister(&mut self, peer: Peer) {
        if !self.is_current(&peer) {
            debug!("Unregister for {} ignored (not registered)", peer.id);
            return;
        }

        // Dropping the record closes the outbound queue
        self.clients.remove(&peer.id);
        info!("Client {} unregistered ({} active)", peer.id, self.clients.len());

        self.broadcast(None, ServerMessage::UserLeft { client_id: peer.id });
    }

    fn handle_join(&mut self, peer: Peer, username: Option<String>) {
        let Some(client) = self.clients.get_mut(&peer.id).filter(|c| c.is_session(&peer)) else {
            debug!("Join from unregistered {} ignored", peer.id);
            return;
        };

        client.set_username(username);
        let username = client.username.clone();
        info!("Client {} joined as {:?}", peer.id, username);

        if !self.send_roster(&peer.id) {
            return;
        }

        self.broadcast(
            Some(&peer.id),
            ServerMessage::UserJoined {
                client_id: peer.id.clone(),
                username,
            },
        );
    }

    /// Apply an edit and relay it to everyone except its author
    async fn handle_apply(&mut self, peer: Peer, client_version: u64, edit: Edit) {
        if !self.is_current(&peer) {
            debug!("Operation from unregistered {} ignored", peer.id);
            return;
        }

        let result = self
            .document
            .write()
            .await
            .apply(peer.id.clone(), client_version, edit.clone());

        match result {
            Ok(version) => {
                debug!("Applied operation from {}: {:?}, version {}", peer.id, edit, version);
                self.broadcast(
                    Some(&peer.id),
                    ServerMessage::Operation {
                        client_id: peer.id.clone(),
                        version,
                        operation: edit,
                    },
                );
            }
            Err(e) => {
                debug!("Operation from {} ignored: {}", peer.id, e);
            }
        }
    }

    fn handle_presence(&mut self, peer: Peer, presence: Presence) {
        if !self.is_current(&peer) {
            return;
        }

        let msg = presence.into_message(peer.id.clone());
        self.broadcast(Some(&peer.id), msg);
    }

    /// Send the roster of other clients to `id`
    ///
    /// Returns false if the client was evicted while sending.
    fn send_roster(&mut self, id: &ClientId) -> bool {
        let users: Vec<UserInfo> = self
            .clients
            .values()
            .filter(|c| &c.id != id)
            .map(Client::info)
            .collect();

        self.send_to(id, ServerMessage::Users { users })
    }

    /// Deliver a message to one client, evicting it if it can't take it
    ///
    /// Returns true if the message was queued.
    fn send_to(&mut self, id: &ClientId, msg: ServerMessage) -> bool {
        let Some(client) = self.clients.get(id) else {
            return false;
        };

        match client.try_send(msg) {
            Ok(()) => true,
            Err(e) => {
                self.report_delivery_failure(id, e);
                self.evict(id);
                false
            }
        }
    }

    /// Deliver a message to every client except `except`
    fn broadcast(&mut self, except: Option<&ClientId>, msg: ServerMessage) {
        let mut failed = Vec::new();

        for (id, client) in &self.clients {
            if Some(id) == except {
                continue;
            }
            if let Err(e) = client.try_send(msg.clone()) {
                failed.push((id.clone(), e));
            }
        }

        for (id, e) in failed {
            self.report_delivery_failure(&id, e);
            self.evict(&id);
        }
    }

    /// Forcibly remove a client and tell the others it left
    fn evict(&mut self, id: &ClientId) {
        if self.clients.remove(id).is_none() {
            return;
        }
        debug!("Client {} evicted ({} active)", id, self.clients.len());

        self.broadcast(
            None,
            ServerMessage::UserLeft {
                client_id: id.clone(),
            },
        );
    }

    fn report_delivery_failure(&self, id: &ClientId, e: DeliveryError) {
        match e {
            DeliveryError::Full => warn!("Client {} is too slow, disconnecting", id),
            DeliveryError::Closed => debug!("Client {} queue already closed", id),
        }
    }

    fn is_current(&self, peer: &Peer) -> bool {
        self.clients
            .get(&peer.id)
            .is_some_and(|c| c.is_session(peer))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::document::Document;

    /// Drives a Hub synchronously, one command at a time
    struct TestHub {
        hub: Hub,
        _tx: mpsc::Sender<HubCommand>,
    }

    impl TestHub {
        fn new(content: &str) -> Self {
            let (tx, rx) = mpsc::channel(1);
            Self {
                hub: Hub::new(rx, Document::shared(content)),
                _tx: tx,
            }
        }

        async fn register(
            &mut self,
            name: &str,
            capacity: usize,
        ) -> (Peer, mpsc::Receiver<ServerMessage>) {
            let peer = Peer::new(ClientId(name.to_string()));
            let (sender, rx) = mpsc::channel(capacity);
            self.send(HubCommand::Register {
                peer: peer.clone(),
                sender,
            })
            .await;
            (peer, rx)
        }

        async fn send(&mut self, cmd: HubCommand) {
            self.hub.handle_command(cmd).await;
        }

        async fn apply(&mut self, peer: &Peer, edit: Edit) {
            self.send(HubCommand::Apply {
                peer: peer.clone(),
                client_version: 0,
                edit,
            })
            .await;
        }

        async fn state(&self) -> (String, u64) {
            let doc = self.hub.document.read().await;
            (doc.content().to_string(), doc.version())
        }
    }

    async fn recv(rx: &mut mpsc::Receiver<ServerMessage>) -> ServerMessage {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("queue closed")
    }

    /// Everything currently queued
    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn ids(users: &[UserInfo]) -> Vec<&str> {
        let mut ids: Vec<&str> = users.iter().map(|u| u.client_id.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    fn insert(position: usize, text: &str) -> Edit {
        Edit::Insert {
            position,
            text: text.to_string(),
        }
    }

    fn has_operation(msgs: &[ServerMessage]) -> bool {
        msgs.iter().any(|m| matches!(m, ServerMessage::Operation { .. }))
    }

    #[tokio::test]
    async fn test_register_welcome_and_roster() {
        let mut hub = TestHub::new("Hello");
        let (_a, mut a_rx) = hub.register("a", 16).await;
        let (_b, mut b_rx) = hub.register("b", 16).await;
        drain(&mut a_rx);
        drain(&mut b_rx);
        let (_c, mut c_rx) = hub.register("c", 16).await;

        match recv(&mut c_rx).await {
            ServerMessage::Welcome {
                client_id,
                version,
                document,
            } => {
                assert_eq!(client_id.as_str(), "c");
                assert_eq!(version, 0);
                assert_eq!(document, "Hello");
            }
            other => panic!("expected welcome, got {other:?}"),
        }
        match recv(&mut c_rx).await {
            ServerMessage::Users { users } => assert_eq!(ids(&users), ["a", "b"]),
            other => panic!("expected users, got {other:?}"),
        }

        for rx in [&mut a_rx, &mut b_rx] {
            match drain(rx).as_slice() {
                [ServerMessage::UserJoined { client_id, .. }] => assert_eq!(client_id.as_str(), "c"),
                other => panic!("expected a single userJoined, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_operations_exclude_sender() {
        let mut hub = TestHub::new("Hello");
        let (a, mut a_rx) = hub.register("a", 16).await;
        let (b, mut b_rx) = hub.register("b", 16).await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        hub.apply(&a, insert(5, " world")).await;
        assert_eq!(hub.state().await, ("Hello world".to_string(), 1));

        match drain(&mut b_rx).as_slice() {
            [ServerMessage::Operation {
                client_id,
                version,
                operation,
            }] => {
                assert_eq!(client_id, &a.id);
                assert_eq!(*version, 1);
                assert_eq!(operation, &insert(5, " world"));
            }
            other => panic!("expected one operation, got {other:?}"),
        }
        assert!(!has_operation(&drain(&mut a_rx)));

        let delete = Edit::Delete {
            position: 0,
            length: 6,
        };
        hub.apply(&b, delete).await;
        assert_eq!(hub.state().await, ("world".to_string(), 2));

        assert!(drain(&mut a_rx).iter().any(|m| matches!(
            m,
            ServerMessage::Operation { client_id, version: 2, .. } if client_id == &b.id
        )));
        assert!(!has_operation(&drain(&mut b_rx)));
    }

    #[tokio::test]
    async fn test_out_of_range_not_relayed() {
        let mut hub = TestHub::new("abc");
        let (a, _a_rx) = hub.register("a", 16).await;
        let (_b, mut b_rx) = hub.register("b", 16).await;
        drain(&mut b_rx);

        hub.apply(&a, insert(10, "x")).await;
        let delete = Edit::Delete {
            position: 1,
            length: 5,
        };
        hub.apply(&a, delete).await;

        assert_eq!(hub.state().await, ("abc".to_string(), 0));
        assert!(drain(&mut b_rx).is_empty());
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let mut hub = TestHub::new("");
        let (a, mut a_rx) = hub.register("a", 16).await;
        let (_b, mut b_rx) = hub.register("b", 16).await;
        drain(&mut b_rx);

        hub.send(HubCommand::Unregister { peer: a.clone() }).await;
        hub.send(HubCommand::Unregister { peer: a.clone() }).await;

        match drain(&mut b_rx).as_slice() {
            [ServerMessage::UserLeft { client_id }] => assert_eq!(client_id, &a.id),
            other => panic!("expected a single userLeft, got {other:?}"),
        }

        // Queue closes once buffered messages are consumed
        drain(&mut a_rx);
        assert!(a_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_slow_client_evicted() {
        let mut hub = TestHub::new("");
        let (a, mut a_rx) = hub.register("a", 64).await;
        // Room for welcome and roster only
        let (slow, mut slow_rx) = hub.register("slow", 2).await;
        drain(&mut a_rx);

        hub.apply(&a, insert(0, "x")).await;
        hub.apply(&a, insert(0, "y")).await;
        assert_eq!(hub.state().await, ("yx".to_string(), 2));

        assert!(drain(&mut a_rx).iter().any(|m| matches!(
            m,
            ServerMessage::UserLeft { client_id } if client_id == &slow.id
        )));

        // The slow client keeps what was queued before eviction, then sees closure
        let mut received = 0;
        while slow_rx.recv().await.is_some() {
            received += 1;
        }
        assert_eq!(received, 2);

        // Other clients are unaffected
        let (_b, _b_rx) = hub.register("b", 64).await;
        assert!(drain(&mut a_rx).iter().any(|m| matches!(
            m,
            ServerMessage::UserJoined { client_id, .. } if client_id.as_str() == "b"
        )));
    }

    #[tokio::test]
    async fn test_full_roster_evicts_new_client() {
        let mut hub = TestHub::new("");
        let (_a, mut a_rx) = hub.register("a", 64).await;
        drain(&mut a_rx);
        let (c, mut c_rx) = hub.register("c", 1).await;

        assert!(matches!(recv(&mut c_rx).await, ServerMessage::Welcome { .. }));
        assert!(c_rx.recv().await.is_none());

        let a_msgs = drain(&mut a_rx);
        assert!(matches!(
            a_msgs.as_slice(),
            [ServerMessage::UserJoined { .. }, ServerMessage::UserLeft { client_id }] if client_id == &c.id
        ));
    }

    #[tokio::test]
    async fn test_join_binds_username() {
        let mut hub = TestHub::new("");
        let (a, mut a_rx) = hub.register("a", 16).await;
        let (_b, mut b_rx) = hub.register("b", 16).await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        hub.send(HubCommand::Join {
            peer: a.clone(),
            username: Some("Alice".to_string()),
        })
        .await;

        match drain(&mut a_rx).as_slice() {
            [ServerMessage::Users { users }] => assert_eq!(ids(users), ["b"]),
            other => panic!("expected only a roster, got {other:?}"),
        }
        assert!(drain(&mut b_rx).iter().any(|m| matches!(
            m,
            ServerMessage::UserJoined { client_id, username: Some(name) }
                if client_id == &a.id && name == "Alice"
        )));

        // Later rosters carry the name
        let (_c, mut c_rx) = hub.register("c", 16).await;
        recv(&mut c_rx).await;
        match recv(&mut c_rx).await {
            ServerMessage::Users { users } => assert!(users
                .iter()
                .any(|u| u.client_id == a.id && u.username.as_deref() == Some("Alice"))),
            other => panic!("expected users, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_presence_relayed_to_others() {
        let mut hub = TestHub::new("abc");
        let (a, mut a_rx) = hub.register("a", 16).await;
        let (_b, mut b_rx) = hub.register("b", 16).await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        hub.send(HubCommand::Presence {
            peer: a.clone(),
            presence: Presence::Selection {
                from: 1,
                to: 2,
                cursor: 2,
            },
        })
        .await;

        assert_eq!(hub.state().await.1, 0);
        assert!(matches!(
            drain(&mut b_rx).as_slice(),
            [ServerMessage::Selection { client_id, from: 1, to: 2, cursor: 2 }] if client_id == &a.id
        ));
        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn test_replaced_session_is_ignored() {
        let mut hub = TestHub::new("");
        let (old, mut old_rx) = hub.register("dup", 16).await;
        let (new, mut new_rx) = hub.register("dup", 16).await;

        drain(&mut old_rx);
        assert!(old_rx.recv().await.is_none());

        hub.apply(&old, insert(0, "stale")).await;
        hub.send(HubCommand::Unregister { peer: old }).await;
        assert_eq!(hub.state().await, (String::new(), 0));

        hub.apply(&new, insert(0, "fresh")).await;
        assert_eq!(hub.state().await, ("fresh".to_string(), 1));
        assert!(matches!(recv(&mut new_rx).await, ServerMessage::Welcome { .. }));
    }

    #[tokio::test]
    async fn test_run_handles_commands_in_order() {
        let (tx, rx) = mpsc::channel(16);
        let document = Document::shared("");
        let task = tokio::spawn(Hub::new(rx, document.clone()).run());

        let a = Peer::new(ClientId("a".to_string()));
        let b = Peer::new(ClientId("b".to_string()));
        let (a_tx, _a_rx) = mpsc::channel(16);
        let (b_tx, mut b_rx) = mpsc::channel(16);
        tx.send(HubCommand::Register { peer: a.clone(), sender: a_tx }).await.unwrap();
        tx.send(HubCommand::Register { peer: b.clone(), sender: b_tx }).await.unwrap();
        for text in ["1", "2", "3"] {
            tx.send(HubCommand::Apply {
                peer: a.clone(),
                client_version: 0,
                edit: Edit::Splice {
                    retain: usize::MAX,
                    delete: 0,
                    insert: text.to_string(),
                },
            })
            .await
            .unwrap();
        }

        let mut versions = Vec::new();
        while versions.len() < 3 {
            if let ServerMessage::Operation { version, .. } = recv(&mut b_rx).await {
                versions.push(version);
            }
        }
        assert_eq!(versions, [1, 2, 3]);
        assert_eq!(document.read().await.content(), "123");

        drop(tx);
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}
