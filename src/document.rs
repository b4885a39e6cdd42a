//! Authoritative document state
//!
//! Holds the shared text, its version counter and the log of applied
//! operations. Positions and lengths are counted in Unicode code points.
//! Operations are applied in the order they arrive; nothing is transformed
//! against concurrent edits.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::EditError;
use crate::types::ClientId;

/// Document shared between the Hub (sole writer) and read-only observers
pub type SharedDocument = Arc<RwLock<Document>>;

/// A single edit request
///
/// Either a retain/delete/insert triple applied at the document head, or an
/// absolute-position insert or delete. Variants are distinguished by which
/// fields are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Edit {
    /// Insert `text` at `position`
    Insert { position: usize, text: String },
    /// Remove `length` code points starting at `position`
    Delete { position: usize, length: usize },
    /// Keep `retain`, insert `insert`, then skip `delete`
    Splice {
        retain: usize,
        #[serde(default)]
        delete: usize,
        #[serde(default)]
        insert: String,
    },
}

/// An operation recorded in the document history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedOperation {
    /// Server-stamped author
    pub author: ClientId,
    /// Version the client claimed to be editing (informational only)
    pub client_version: u64,
    pub edit: Edit,
}

/// Point-in-time view of the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub content: String,
    pub version: u64,
}

/// The shared text document
///
/// `history.len() == version` holds at all times.
#[derive(Debug, Default)]
pub struct Document {
    content: String,
    /// Cached code point count of `content`
    char_len: usize,
    version: u64,
    history: Vec<AppliedOperation>,
}

impl Document {
    /// Create a document at version 0 with the given content
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let char_len = content.chars().count();
        Self {
            content,
            char_len,
            version: 0,
            history: Vec::new(),
        }
    }

    /// Wrap a new document for sharing
    pub fn shared(content: impl Into<String>) -> SharedDocument {
        Arc::new(RwLock::new(Self::new(content)))
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn history(&self) -> &[AppliedOperation] {
        &self.history
    }

    /// Length in code points
    pub fn len(&self) -> usize {
        self.char_len
    }

    pub fn is_empty(&self) -> bool {
        self.char_len == 0
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            content: self.content.clone(),
            version: self.version,
        }
    }

    /// Apply an edit and return the new version
    ///
    /// Splices always succeed (retain and delete are clamped to the content).
    /// Position edits outside the content are rejected and leave both the
    /// content and the version untouched.
    pub fn apply(
        &mut self,
        author: ClientId,
        client_version: u64,
        edit: Edit,
    ) -> Result<u64, EditError> {
        match &edit {
            Edit::Splice {
                retain,
                delete,
                insert,
            } => {
                let start = (*retain).min(self.char_len);
                let removed = (*delete).min(self.char_len - start);
                self.replace(start, removed, insert);
            }
            Edit::Insert { position, text } => {
                if *position > self.char_len {
                    return Err(EditError::InsertOutOfRange {
                        position: *position,
                        len: self.char_len,
                    });
                }
                self.replace(*position, 0, text);
            }
            Edit::Delete { position, length } => {
                let in_range = position
                    .checked_add(*length)
                    .is_some_and(|end| end <= self.char_len);
                if !in_range {
                    return Err(EditError::DeleteOutOfRange {
                        position: *position,
                        length: *length,
                        len: self.char_len,
                    });
                }
                self.replace(*position, *length, "");
            }
        }

        self.version += 1;
        self.history.push(AppliedOperation {
            author,
            client_version,
            edit,
        });
        Ok(self.version)
    }

    /// Replace `count` code points at `start` with `text`; caller checks bounds
    fn replace(&mut self, start: usize, count: usize, text: &str) {
        let from = self.byte_offset(start);
        let to = self.byte_offset(start + count);
        self.content.replace_range(from..to, text);
        self.char_len = self.char_len - count + text.chars().count();
    }

    fn byte_offset(&self, chars: usize) -> usize {
        self.content
            .char_indices()
            .nth(chars)
            .map_or(self.content.len(), |(i, _)| i)
    }
}
