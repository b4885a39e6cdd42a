//! Basic type definitions for the document server
//!
//! Provides newtype wrappers for type safety:
//! - `ClientId`: client identifier, server-generated or supplied on upgrade
//! - `SessionId`: UUID-based identifier of one physical connection

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest client-supplied identifier that is accepted
const MAX_SUPPLIED_ID_LEN: usize = 64;

/// Client identifier (newtype pattern)
///
/// This is the identity other clients see in rosters and relayed messages.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(format!("client_{}", Uuid::new_v4().simple()))
    }

    /// Accept a client-supplied ID if it is well formed
    ///
    /// Supplied IDs must be 1..=64 characters of `[A-Za-z0-9_-]`.
    pub fn from_supplied(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SUPPLIED_ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        valid.then(|| Self(raw.to_string()))
    }

    /// Use the supplied ID when valid, otherwise generate one
    pub fn supplied_or_new(raw: Option<&str>) -> Self {
        raw.and_then(Self::from_supplied).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a single connection
///
/// Two connections claiming the same `ClientId` still have distinct sessions,
/// so a late command from a replaced connection can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The connection a Hub command originates from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub id: ClientId,
    pub session: SessionId,
}

impl Peer {
    /// Start a new session for the given client
    pub fn new(id: ClientId) -> Self {
        Self {
            id,
            session: SessionId::new(),
        }
    }
}
