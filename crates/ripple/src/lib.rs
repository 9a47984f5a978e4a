#![forbid(unsafe_code)]

//! Ripple public facade crate.
//!
//! Observable models, reconciling collections, and the event bus they share.
//!
//! ```
//! use ripple::prelude::*;
//! use serde_json::json;
//!
//! let people = Collection::new(&ModelKind::new("person"))
//!     .with_comparator(Comparator::attribute("name"));
//! people.add([json!({"id": 1, "name": "moe"}), json!({"id": 2, "name": "curly"})], &SetOptions::default());
//!
//! let moe = people.get(&json!(1)).unwrap();
//! assert_eq!(people.index_of(&moe), Some(1));
//! ```

pub use ripple_core as core;
pub use ripple_store as store;

pub mod prelude {
    pub use ripple_core::{ALL_EVENTS, Attributes, Callback, Emitter, EventBus, Value};
    pub use ripple_store::{
        Collection, Comparator, Item, Model, ModelKind, SetOptions, StoreError, StoreEvent,
        SyncBackend, SyncMethod, SyncRequest, SyncTarget,
    };
}
