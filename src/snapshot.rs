//! Read-only document snapshot
//!
//! `GET` on the snapshot path returns the current `{content, version}` as
//! JSON. The document is read under its lock; nothing goes through the Hub.

use axum::extract::State;
use axum::Json;
use tracing::debug;

use crate::document::{SharedDocument, Snapshot};

/// Current content and version of the shared document
pub async fn document_snapshot(State(document): State<SharedDocument>) -> Json<Snapshot> {
    let snapshot = document.read().await.snapshot();
    debug!("Serving snapshot at version {}", snapshot.version);
    Json(snapshot)
}
