#![forbid(unsafe_code)]

//! Test harness for Ripple.
//!
//! - [`EventLog`] records every event an emitter produces as a comparable
//!   transcript, with a JSONL export and a stable digest for golden checks.
//! - [`MemoryBackend`] is a URL-keyed in-memory [`SyncBackend`] with a call
//!   log and one-shot failure injection.
//! - [`fixtures`] builds the kinds and collections the integration tests
//!   share.
//!
//! [`SyncBackend`]: ripple_store::SyncBackend

pub mod backend;
pub mod fixtures;
pub mod log;

pub use backend::{Call, MemoryBackend};
pub use log::{EventLog, LogEntry};
