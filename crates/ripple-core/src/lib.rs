#![forbid(unsafe_code)]

//! Core: the event bus capability, attribute value semantics, and id generation.

pub mod events;
pub mod id;
pub mod value;

pub use events::{ALL_EVENTS, Callback, Emitter, EventBus};
pub use id::{ClientId, ContextId, IdGenerator};
pub use value::{Attributes, IdKey, Value};
