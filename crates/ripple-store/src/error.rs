#![forbid(unsafe_code)]

//! Store errors: validation failures reported through `"invalid"`, and the
//! [`StoreError`] returned by fallible operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// A failed validation. Reported through an `"invalid"` event and a falsy
/// return, never as an `Err` from `set`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    pub field: Option<String>,
}

impl ValidationError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    #[must_use]
    pub fn on_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

/// A failure reported by a [`SyncBackend`](crate::SyncBackend).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("resource not found: {url}")]
    NotFound { url: String },

    #[error("backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("transport failure: {message}")]
    Transport { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("cannot sort a collection without a comparator")]
    MissingComparator,

    #[error("a url or url_root must be configured")]
    MissingUrl,

    #[error("no sync backend configured for kind {kind}")]
    MissingSync { kind: String },

    #[error("validation failed: {0}")]
    Invalid(#[from] ValidationError),

    #[error("sync failed: {0}")]
    Sync(#[from] SyncError),

    #[error("malformed response: {message}")]
    MalformedResponse { message: String },
}

impl StoreError {
    /// Whether the error indicates programmer misconfiguration rather than a
    /// runtime data condition.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingComparator | Self::MissingUrl | Self::MissingSync { .. }
        )
    }

    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }
}
