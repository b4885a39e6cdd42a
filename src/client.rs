//! Client record
//!
//! The Hub's view of a registered connection: identity, display name and
//! the sending half of its bounded outbound queue.

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::DeliveryError;
use crate::message::{ServerMessage, UserInfo};
use crate::types::{ClientId, Peer, SessionId};

/// Registered client
///
/// Owned exclusively by the Hub. Dropping the record drops the only
/// sender of the outbound queue, which ends the connection's outbound loop.
#[derive(Debug)]
pub struct Client {
    /// Identifier shown to other clients
    pub id: ClientId,
    /// Connection this record belongs to
    pub session: SessionId,
    /// Display name (None before `join`)
    pub username: Option<String>,
    /// Hub → connection queue
    sender: mpsc::Sender<ServerMessage>,
}

impl Client {
    pub fn new(peer: Peer, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id: peer.id,
            session: peer.session,
            username: None,
            sender,
        }
    }

    /// Enqueue a message without waiting
    ///
    /// A full queue is reported instead of blocking the caller.
    pub fn try_send(&self, msg: ServerMessage) -> Result<(), DeliveryError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Whether a command from `peer` refers to this very connection
    pub fn is_session(&self, peer: &Peer) -> bool {
        self.id == peer.id && self.session == peer.session
    }

    /// Set the client's display name; blank names clear it
    pub fn set_username(&mut self, username: Option<String>) {
        self.username = username
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
    }

    /// Roster entry for this client
    pub fn info(&self) -> UserInfo {
        UserInfo {
            client_id: self.id.clone(),
            username: self.username.clone(),
        }
    }
}
