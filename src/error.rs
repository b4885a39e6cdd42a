//! Error types for the document server
//!
//! Defines application-level errors, outbound delivery errors and
//! rejected edits. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Everything here ends the connection (or the server, for `Config`).
/// Malformed client payloads never surface as an `AppError`: they are
/// logged and dropped where they are parsed.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket transport error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] axum::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The Hub's command channel is closed
    #[error("Hub is not running")]
    HubClosed,

    /// No frame arrived within the idle-read window
    #[error("Connection idle for too long")]
    IdleTimeout,

    /// A single write did not complete within the write timeout
    #[error("Write timed out")]
    WriteTimeout,

    /// Invalid server configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl AppError {
    /// Whether this is the peer going away rather than a server-side fault
    ///
    /// Socket errors mean the peer dropped, reset or broke the protocol; they
    /// end that one connection and are not worth more than a debug line.
    pub fn is_graceful(&self) -> bool {
        matches!(self, AppError::WebSocket(_) | AppError::IdleTimeout)
    }
}

/// Outbound delivery errors
///
/// Result of a non-blocking enqueue into a client's outbound queue.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The queue is at capacity (slow consumer)
    #[error("Outbound queue full")]
    Full,
    /// The receiving end of the queue has been closed
    #[error("Channel closed")]
    Closed,
}

/// Edit rejected by the document
///
/// Out-of-range position edits are never partially applied.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("insert at {position} is beyond content length {len}")]
    InsertOutOfRange { position: usize, len: usize },

    #[error("delete of {length} at {position} exceeds content length {len}")]
    DeleteOutOfRange {
        position: usize,
        length: usize,
        len: usize,
    },
}
