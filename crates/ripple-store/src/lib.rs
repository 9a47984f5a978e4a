#![forbid(unsafe_code)]

//! Observable models and reconciling collections.
//!
//! - [`Model`]: a change-tracked attribute store with validation hooks.
//! - [`Collection`]: an ordered, indexed set of models that reconciles new
//!   input lists into minimal add/remove/merge/reorder operations.
//! - [`ModelKind`]: the per-subtype configuration both are built from.
//! - [`SyncBackend`]: the persistence seam behind `fetch`/`save`/`destroy`.
//!
//! Both observable types embed a [`ripple_core::EventBus`] carrying
//! [`StoreEvent`] payloads and implement [`ripple_core::Emitter`].

pub mod collection;
pub mod comparator;
pub mod error;
pub mod event;
pub mod kind;
pub mod model;
pub mod options;
pub mod query;
mod reconcile;
pub mod sync;

pub use collection::{Collection, Item};
pub use comparator::Comparator;
pub use error::{Result, StoreError, SyncError, ValidationError};
pub use event::{StoreEvent, Target};
pub use kind::{KindBuilder, ModelKind};
pub use model::Model;
pub use options::SetOptions;
pub use sync::{SyncBackend, SyncMethod, SyncRequest, SyncTarget};
