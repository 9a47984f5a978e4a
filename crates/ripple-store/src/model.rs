#![forbid(unsafe_code)]

//! Observable attribute records with transactional change tracking.
//!
//! A [`Model`] is a cheaply clonable handle over shared state: an attribute
//! map, the snapshot taken when the current change transaction began, the
//! attributes changed since that snapshot, and the last validation error.
//! All mutation goes through [`Model::set`].
//!
//! # Transactions
//!
//! The outermost `set` call opens a transaction: it snapshots the current
//! attributes into `previous` and clears `changed`. `set` calls made by
//! listeners while the transaction is open (from a `"change:<attr>"` or
//! `"change"` handler) join it; they never re-snapshot and never drain. The
//! outermost call drains pending notifications in a loop, emitting one
//! `"change"` per pass, so handlers that mutate again produce exactly one
//! further `"change"` and recursion stays bounded.
//!
//! # Invariants
//!
//! 1. `id()` mirrors the identity attribute (absent or `null` mean no id).
//! 2. `changed` holds exactly the attributes whose value differs from
//!    `previous`, so a value changed and changed back is not reported.
//! 3. `"change:<attr>"` fires only when the value differs from the value
//!    current at the time of the write.
//! 4. No borrow of the model state is held while a listener runs.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Validator rejects the candidate | `"invalid"` emitted, state untouched, `set` returns `false` |
//! | `url()` with no `url_root` and no owning collection URL | `Err(StoreError::MissingUrl)` |

use std::cell::RefCell;
use std::fmt::{self, Write as _};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use ripple_core::events::{Emitter, EventBus};
use ripple_core::value::{self, Attributes, IdKey, Value};
use ripple_core::ClientId;
use tracing::debug;

use crate::collection::{Collection, WeakCollection};
use crate::error::{Result, StoreError, ValidationError};
use crate::event::StoreEvent;
use crate::kind::ModelKind;
use crate::options::SetOptions;

#[derive(Default)]
struct ModelState {
    attributes: Attributes,
    previous: Attributes,
    changed: Attributes,
    id: Option<Value>,
    changing: bool,
    pending: Option<SetOptions>,
    validation_error: Option<ValidationError>,
    collection: Option<WeakCollection>,
}

struct ModelInner {
    cid: ClientId,
    kind: ModelKind,
    events: EventBus<StoreEvent>,
    state: RefCell<ModelState>,
}

/// An observable, identity-bearing attribute record.
///
/// Cloning a `Model` creates a new handle to the **same** record; use
/// [`duplicate`](Self::duplicate) for an independent copy.
#[derive(Clone)]
pub struct Model {
    inner: Rc<ModelInner>,
}

impl Model {
    /// Build a model with default options.
    #[must_use]
    pub fn new(kind: &ModelKind, attrs: Attributes) -> Self {
        Self::with_options(kind, attrs, &SetOptions::default())
    }

    /// Build a model from raw input.
    ///
    /// With `options.parse` the input goes through the kind's parse hook
    /// first. Kind defaults fill attributes the input leaves out, the result
    /// is applied through [`set`](Self::set), and the change record is
    /// cleared so a fresh model reports no changes.
    #[must_use]
    pub fn with_options(kind: &ModelKind, attrs: Attributes, options: &SetOptions) -> Self {
        let ids = kind.ids();
        let model = Self {
            inner: Rc::new(ModelInner {
                cid: ids.next_client_id(),
                kind: kind.clone(),
                events: EventBus::with_ids(ids),
                state: RefCell::new(ModelState::default()),
            }),
        };
        let attrs = if options.parse {
            kind.parse(Value::Object(attrs), options).unwrap_or_default()
        } else {
            attrs
        };
        let mut initial = kind.defaults().clone();
        initial.extend(attrs);
        model.set(initial, options);
        model.inner.state.borrow_mut().changed.clear();
        model
    }

    // ─── Identity ────────────────────────────────────────────────────────

    #[must_use]
    pub fn cid(&self) -> ClientId {
        self.inner.cid
    }

    #[must_use]
    pub fn kind(&self) -> &ModelKind {
        &self.inner.kind
    }

    /// The identity attribute's value, if present and not `null`.
    #[must_use]
    pub fn id(&self) -> Option<Value> {
        self.inner.state.borrow().id.clone()
    }

    /// Index key of the identity value.
    #[must_use]
    pub fn id_key(&self) -> Option<IdKey> {
        self.inner.state.borrow().id.as_ref().and_then(value::identity_key)
    }

    /// Whether the model has never been persisted (it has no identity).
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.inner.state.borrow().id.is_none()
    }

    /// Whether both handles point at the same record.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ─── Mutation ────────────────────────────────────────────────────────

    /// Apply `attrs` as one change transaction.
    ///
    /// Returns `false` only when validation rejected the candidate.
    pub fn set(&self, attrs: Attributes, options: &SetOptions) -> bool {
        if !self.validate_candidate(&attrs, options) {
            return false;
        }

        let id_attribute = self.inner.kind.id_attribute();
        let (changes, outermost) = {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            let outermost = !state.changing;
            state.changing = true;
            if outermost {
                state.previous = state.attributes.clone();
                state.changed.clear();
            }

            let touches_id = attrs.contains_key(id_attribute);
            let mut changes = Vec::new();
            for (attr, incoming) in attrs {
                let target = if options.unset { None } else { Some(incoming) };
                if !value::deep_eq(state.attributes.get(&attr), target.as_ref()) {
                    changes.push(attr.clone());
                }
                if value::deep_eq(state.previous.get(&attr), target.as_ref()) {
                    state.changed.remove(&attr);
                } else {
                    state
                        .changed
                        .insert(attr.clone(), target.clone().unwrap_or(Value::Null));
                }
                match target {
                    Some(written) => {
                        state.attributes.insert(attr, written);
                    }
                    None => {
                        state.attributes.remove(&attr);
                    }
                }
            }
            if touches_id {
                state.id = state
                    .attributes
                    .get(id_attribute)
                    .filter(|id| !id.is_null())
                    .cloned();
            }
            if !options.silent && !changes.is_empty() {
                state.pending = Some(options.clone());
            }
            (changes, outermost)
        };

        if !options.silent {
            for attribute in changes {
                let value = self.get(&attribute);
                let name = format!("change:{attribute}");
                self.emit(
                    &name,
                    &StoreEvent::AttributeChanged {
                        model: self.clone(),
                        attribute,
                        value,
                        options: options.clone(),
                    },
                );
            }
        }

        if !outermost {
            return true;
        }
        if !options.silent {
            loop {
                let pending = self.inner.state.borrow_mut().pending.take();
                let Some(pending) = pending else {
                    break;
                };
                self.emit(
                    "change",
                    &StoreEvent::Changed {
                        model: self.clone(),
                        options: pending,
                    },
                );
            }
        }
        let mut state = self.inner.state.borrow_mut();
        state.pending = None;
        state.changing = false;
        true
    }

    /// Set a single attribute.
    pub fn set_attr(&self, attribute: &str, value: impl Into<Value>, options: &SetOptions) -> bool {
        let mut attrs = Attributes::new();
        attrs.insert(attribute.to_owned(), value.into());
        self.set(attrs, options)
    }

    /// Delete one attribute.
    pub fn unset(&self, attribute: &str, options: &SetOptions) -> bool {
        let mut attrs = Attributes::new();
        attrs.insert(attribute.to_owned(), Value::Null);
        self.set(attrs, &options.clone().with_unset(true))
    }

    /// Delete every attribute.
    pub fn clear(&self, options: &SetOptions) -> bool {
        let attrs: Attributes = self
            .inner
            .state
            .borrow()
            .attributes
            .keys()
            .map(|key| (key.clone(), Value::Null))
            .collect();
        self.set(attrs, &options.clone().with_unset(true))
    }

    // ─── Change tracking ─────────────────────────────────────────────────

    /// Whether anything (or `attribute`) changed in the last transaction.
    #[must_use]
    pub fn has_changed(&self, attribute: Option<&str>) -> bool {
        let state = self.inner.state.borrow();
        match attribute {
            Some(attribute) => state.changed.contains_key(attribute),
            None => !state.changed.is_empty(),
        }
    }

    /// Attributes changed in the last transaction, or `None` if nothing did.
    ///
    /// With `diff`, returns the entries of `diff` that differ from the
    /// snapshot while a transaction is open, and from the current attributes
    /// otherwise.
    #[must_use]
    pub fn changed_attributes(&self, diff: Option<&Attributes>) -> Option<Attributes> {
        let state = self.inner.state.borrow();
        let Some(diff) = diff else {
            return (!state.changed.is_empty()).then(|| state.changed.clone());
        };
        let old = if state.changing {
            &state.previous
        } else {
            &state.attributes
        };
        let changed: Attributes = diff
            .iter()
            .filter(|(attr, candidate)| !value::deep_eq(old.get(*attr), Some(*candidate)))
            .map(|(attr, value)| (attr.clone(), value.clone()))
            .collect();
        (!changed.is_empty()).then_some(changed)
    }

    /// Value of `attribute` when the last transaction began.
    #[must_use]
    pub fn previous(&self, attribute: &str) -> Option<Value> {
        self.inner.state.borrow().previous.get(attribute).cloned()
    }

    #[must_use]
    pub fn previous_attributes(&self) -> Attributes {
        self.inner.state.borrow().previous.clone()
    }

    // ─── Reads ───────────────────────────────────────────────────────────

    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<Value> {
        self.inner.state.borrow().attributes.get(attribute).cloned()
    }

    /// Whether `attribute` is present and not `null`.
    #[must_use]
    pub fn has(&self, attribute: &str) -> bool {
        self.inner
            .state
            .borrow()
            .attributes
            .get(attribute)
            .is_some_and(|value| !value.is_null())
    }

    /// HTML-escaped display text of `attribute`.
    #[must_use]
    pub fn escape(&self, attribute: &str) -> String {
        value::escape_html(self.inner.state.borrow().attributes.get(attribute))
    }

    /// A copy of the current attributes.
    #[must_use]
    pub fn attributes(&self) -> Attributes {
        self.inner.state.borrow().attributes.clone()
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(self.attributes())
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.state.borrow().attributes.keys().cloned().collect()
    }

    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.inner.state.borrow().attributes.values().cloned().collect()
    }

    #[must_use]
    pub fn pairs(&self) -> Vec<(String, Value)> {
        self.inner
            .state
            .borrow()
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// The listed attributes that are present.
    #[must_use]
    pub fn pick(&self, attributes: &[&str]) -> Attributes {
        let state = self.inner.state.borrow();
        attributes
            .iter()
            .filter_map(|attr| {
                state
                    .attributes
                    .get(*attr)
                    .map(|value| ((*attr).to_owned(), value.clone()))
            })
            .collect()
    }

    /// Every attribute except the listed ones.
    #[must_use]
    pub fn omit(&self, attributes: &[&str]) -> Attributes {
        self.inner
            .state
            .borrow()
            .attributes
            .iter()
            .filter(|(attr, _)| !attributes.contains(&attr.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// String-valued attributes with keys and values swapped.
    #[must_use]
    pub fn invert(&self) -> Attributes {
        self.inner
            .state
            .borrow()
            .attributes
            .iter()
            .filter_map(|(attr, value)| match value {
                Value::String(text) => Some((text.clone(), Value::String(attr.clone()))),
                _ => None,
            })
            .collect()
    }

    // ─── Validation ──────────────────────────────────────────────────────

    #[must_use]
    pub fn validation_error(&self) -> Option<ValidationError> {
        self.inner.state.borrow().validation_error.clone()
    }

    /// Validate the current attributes, emitting `"invalid"` on failure.
    pub fn is_valid(&self) -> bool {
        let candidate = self.attributes();
        self.check(&candidate, &SetOptions::default().with_validate(true))
    }

    pub(crate) fn validate_candidate(&self, attrs: &Attributes, options: &SetOptions) -> bool {
        if !options.validate || !self.inner.kind.has_validator() {
            return true;
        }
        let mut candidate = self.attributes();
        for (attr, value) in attrs {
            if options.unset {
                candidate.remove(attr);
            } else {
                candidate.insert(attr.clone(), value.clone());
            }
        }
        self.check(&candidate, options)
    }

    fn check(&self, candidate: &Attributes, options: &SetOptions) -> bool {
        let Some(error) = self.inner.kind.validate(candidate, options) else {
            self.inner.state.borrow_mut().validation_error = None;
            return true;
        };
        debug!(message = "model.invalid", cid = %self.inner.cid, error = %error);
        self.inner.state.borrow_mut().validation_error = Some(error.clone());
        self.emit(
            "invalid",
            &StoreEvent::Invalid {
                model: self.clone(),
                collection: None,
                error,
                options: options.clone(),
            },
        );
        false
    }

    // ─── Misc ────────────────────────────────────────────────────────────

    /// Run the kind's parse hook over a raw response.
    #[must_use]
    pub fn parse(&self, raw: Value, options: &SetOptions) -> Option<Attributes> {
        self.inner.kind.parse(raw, options)
    }

    /// An independent model of the same kind with a copy of the current
    /// attributes, a fresh client id, and no change history.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self::new(&self.inner.kind, self.attributes())
    }

    /// The collection that owns this model, if it is still alive.
    #[must_use]
    pub fn collection(&self) -> Option<Collection> {
        self.inner
            .state
            .borrow()
            .collection
            .as_ref()
            .and_then(WeakCollection::upgrade)
    }

    pub(crate) fn has_owner(&self) -> bool {
        self.collection().is_some()
    }

    pub(crate) fn set_owner(&self, owner: Option<&Collection>) {
        self.inner.state.borrow_mut().collection = owner.map(Collection::downgrade);
    }

    /// Resource URL: the kind's `url_root`, else the owning collection's URL,
    /// with the encoded id appended once the model has one.
    pub fn url(&self) -> Result<String> {
        let base = match self.inner.kind.url_root() {
            Some(root) => root.to_owned(),
            None => self
                .collection()
                .and_then(|collection| collection.url())
                .ok_or(StoreError::MissingUrl)?,
        };
        let Some(id) = self.id() else {
            return Ok(base);
        };
        let mut url = base;
        if !url.is_empty() && !url.ends_with('/') {
            url.push('/');
        }
        url.push_str(&encode_component(&value::display_text(Some(&id))));
        Ok(url)
    }

    /// Swap the attribute map without change tracking or events, returning
    /// the old one. Used to stage attributes for a deferred save.
    pub(crate) fn swap_attributes(&self, attributes: Attributes) -> Attributes {
        let id_attribute = self.inner.kind.id_attribute();
        let mut state = self.inner.state.borrow_mut();
        state.id = attributes
            .get(id_attribute)
            .filter(|id| !id.is_null())
            .cloned();
        std::mem::replace(&mut state.attributes, attributes)
    }

    pub(crate) fn emit(&self, name: &str, event: &StoreEvent) {
        self.inner.events.emit(name, event);
    }
}

/// Percent-encode everything but unreserved URI characters.
fn encode_component(raw: &str) -> String {
    const KEEP: &[u8] = b"-_.!~*'()";
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || KEEP.contains(&byte) {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

impl Emitter<StoreEvent> for Model {
    fn events(&self) -> &EventBus<StoreEvent> {
        &self.inner.events
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Model {}

impl Hash for Model {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.cid.hash(state);
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Model");
        dbg.field("cid", &self.inner.cid)
            .field("kind", &self.inner.kind.name());
        if let Ok(state) = self.inner.state.try_borrow() {
            dbg.field("attributes", &state.attributes);
        }
        dbg.finish_non_exhaustive()
    }
}
