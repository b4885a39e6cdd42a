//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization.
//!
//! Server-generated kinds (`welcome`, `userJoined`, `userLeft`, `users`) are
//! not part of `ClientMessage`, so a client sending one fails to parse.

use serde::{Deserialize, Serialize};

use crate::document::Edit;
use crate::types::ClientId;

/// Client → Server message
///
/// Any `clientId` the client includes is ignored; the connection stamps
/// its own identity before anything is relayed.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Bind a display name to the connection
    Join {
        #[serde(default)]
        username: Option<String>,
    },
    /// Edit the document
    Operation {
        /// Version the client believes it is editing (informational)
        #[serde(default)]
        version: u64,
        operation: Edit,
    },
    /// Selection range and caret
    Selection {
        #[serde(default)]
        from: usize,
        #[serde(default)]
        to: usize,
        #[serde(default)]
        cursor: usize,
    },
    /// Caret only
    Cursor { cursor: usize },
}

/// Ephemeral presence data, never written to the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    Selection { from: usize, to: usize, cursor: usize },
    Cursor { cursor: usize },
}

impl Presence {
    /// Attribute presence data to a client for relaying
    pub fn into_message(self, client_id: ClientId) -> ServerMessage {
        match self {
            Presence::Selection { from, to, cursor } => ServerMessage::Selection {
                client_id,
                from,
                to,
                cursor,
            },
            Presence::Cursor { cursor } => ServerMessage::Cursor { client_id, cursor },
        }
    }
}

/// One roster entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub client_id: ClientId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Server → Client message
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Registration succeeded; carries the current document
    Welcome {
        client_id: ClientId,
        version: u64,
        document: String,
    },
    /// Another client connected or bound a display name
    UserJoined {
        client_id: ClientId,
        #[serde(skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
    /// Another client left
    UserLeft { client_id: ClientId },
    /// Roster of the other connected clients
    Users { users: Vec<UserInfo> },
    /// An operation applied by another client
    Operation {
        client_id: ClientId,
        /// Document version after this operation
        version: u64,
        operation: Edit,
    },
    Selection {
        client_id: ClientId,
        from: usize,
        to: usize,
        cursor: usize,
    },
    Cursor { client_id: ClientId, cursor: usize },
}
