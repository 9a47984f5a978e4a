#![forbid(unsafe_code)]

//! Payloads carried by model and collection events.
//!
//! Every bus in this crate is an `EventBus<StoreEvent>`. The event *name*
//! selects listeners and the payload variant carries the arguments. A
//! collection re-emits member events verbatim, so a listener on a collection
//! sees the same payload a listener on the member would.

use ripple_core::value::Value;

use crate::collection::Collection;
use crate::error::{SyncError, ValidationError};
use crate::model::Model;
use crate::options::SetOptions;

/// The object an event concerns when it may be either kind.
#[derive(Debug, Clone)]
pub enum Target {
    Model(Model),
    Collection(Collection),
}

impl Target {
    #[must_use]
    pub fn model(&self) -> Option<&Model> {
        match self {
            Self::Model(model) => Some(model),
            Self::Collection(_) => None,
        }
    }

    #[must_use]
    pub fn collection(&self) -> Option<&Collection> {
        match self {
            Self::Collection(collection) => Some(collection),
            Self::Model(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// `"change:<attribute>"`: `value` is the attribute's value at emit time,
    /// `None` once unset.
    AttributeChanged {
        model: Model,
        attribute: String,
        value: Option<Value>,
        options: SetOptions,
    },
    /// `"change"`: one per drained transaction.
    Changed { model: Model, options: SetOptions },
    /// `"invalid"`. `collection` is set when a collection rejected a
    /// candidate member.
    Invalid {
        model: Model,
        collection: Option<Collection>,
        error: ValidationError,
        options: SetOptions,
    },
    /// `"add"`: `index` is the member's position after insertion.
    Added {
        model: Model,
        collection: Collection,
        index: usize,
        options: SetOptions,
    },
    /// `"remove"`: `index` is the position the member was removed from.
    Removed {
        model: Model,
        collection: Collection,
        index: usize,
        options: SetOptions,
    },
    /// `"reset"`: `previous` holds the members that were discarded.
    Reset {
        collection: Collection,
        previous: Vec<Model>,
        options: SetOptions,
    },
    Sorted {
        collection: Collection,
        options: SetOptions,
    },
    Destroyed {
        model: Model,
        collection: Option<Collection>,
        options: SetOptions,
    },
    /// `"request"`: a persistence call is about to be made.
    Requested { target: Target, options: SetOptions },
    Synced {
        target: Target,
        response: Value,
        options: SetOptions,
    },
    /// `"error"`: the backend reported a failure.
    SyncFailed {
        target: Target,
        error: SyncError,
        options: SetOptions,
    },
    /// Application-defined events.
    Custom { target: Option<Target>, data: Value },
}

impl StoreEvent {
    /// The model the event is about, if any.
    #[must_use]
    pub fn model(&self) -> Option<&Model> {
        match self {
            Self::AttributeChanged { model, .. }
            | Self::Changed { model, .. }
            | Self::Invalid { model, .. }
            | Self::Added { model, .. }
            | Self::Removed { model, .. }
            | Self::Destroyed { model, .. } => Some(model),
            Self::Requested { target, .. }
            | Self::Synced { target, .. }
            | Self::SyncFailed { target, .. } => target.model(),
            Self::Custom { target, .. } => target.as_ref().and_then(Target::model),
            Self::Reset { .. } | Self::Sorted { .. } => None,
        }
    }

    /// The collection the event names, if any.
    #[must_use]
    pub fn collection(&self) -> Option<&Collection> {
        match self {
            Self::Added { collection, .. }
            | Self::Removed { collection, .. }
            | Self::Reset { collection, .. }
            | Self::Sorted { collection, .. } => Some(collection),
            Self::Invalid { collection, .. } | Self::Destroyed { collection, .. } => {
                collection.as_ref()
            }
            Self::Requested { target, .. }
            | Self::Synced { target, .. }
            | Self::SyncFailed { target, .. } => target.collection(),
            Self::Custom { target, .. } => target.as_ref().and_then(Target::collection),
            Self::AttributeChanged { .. } | Self::Changed { .. } => None,
        }
    }

    /// The options of the operation that emitted the event.
    #[must_use]
    pub fn options(&self) -> Option<&SetOptions> {
        match self {
            Self::AttributeChanged { options, .. }
            | Self::Changed { options, .. }
            | Self::Invalid { options, .. }
            | Self::Added { options, .. }
            | Self::Removed { options, .. }
            | Self::Reset { options, .. }
            | Self::Sorted { options, .. }
            | Self::Destroyed { options, .. }
            | Self::Requested { options, .. }
            | Self::Synced { options, .. }
            | Self::SyncFailed { options, .. } => Some(options),
            Self::Custom { .. } => None,
        }
    }
}
