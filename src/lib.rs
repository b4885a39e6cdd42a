//! Real-time Shared Document Server Library
//!
//! Keeps a single text document in sync across many concurrently connected
//! editors, built with tokio and axum WebSockets using the Actor pattern.
//!
//! # Features
//! - WebSocket connection handling with idle and write timeouts
//! - Display names and live rosters
//! - Document edits applied in arrival order and relayed to every other client
//! - Selection and cursor presence
//! - Eviction of clients that can't keep up
//! - Read-only JSON snapshot endpoint
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Hub` is the central actor; it owns the client registry and is the only
//!   writer of the document
//! - Each connection runs an inbound and an outbound task talking to the Hub
//! - The snapshot endpoint reads the document under its `RwLock`
//!
//! Edits are not transformed against concurrent edits: two clients editing at
//! once can diverge from each other until they resync from a snapshot.
//!
//! # Example
//! ```ignore
//! use collab_hub::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), collab_hub::AppError> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     server.run().await
//! }
//! ```

pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod handler;
pub mod hub;
pub mod message;
pub mod server;
pub mod snapshot;
pub mod types;

// Re-export main types for convenience
pub use client::Client;
pub use config::ServerConfig;
pub use document::{Document, Edit, SharedDocument, Snapshot};
pub use error::{AppError, DeliveryError, EditError};
pub use handler::{handle_connection, ConnectParams};
pub use hub::{Hub, HubCommand};
pub use message::{ClientMessage, Presence, ServerMessage, UserInfo};
pub use server::{router, AppState, Server};
pub use types::{ClientId, Peer, SessionId};
