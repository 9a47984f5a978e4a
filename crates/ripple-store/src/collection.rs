#![forbid(unsafe_code)]

//! Ordered, indexed sets of models.
//!
//! A [`Collection`] keeps its members in one authoritative order plus two
//! lookup indexes: by client id and by identity key. Every member's `"all"`
//! channel is forwarded to the collection, so observers can subscribe once at
//! the collection level for all member activity.
//!
//! Bulk updates go through the reconciliation in `reconcile.rs`; this module
//! holds the member bookkeeping, the single-item removal path, `reset`, and
//! the convenience wrappers.
//!
//! # Invariants
//!
//! 1. Every member appears in the client-id index exactly once, and no
//!    client id maps to a non-member.
//! 2. At most one member owns a given identity key. A member whose id is
//!    changed onto a key another member owns stays reachable by client id
//!    only, and takes over the key once the owner releases it.
//! 3. When a comparator is configured, members stay sorted after every
//!    structural change unless the caller suppressed sorting or gave `at`.
//! 4. A member's forwarding subscription is active exactly while it is a
//!    member. Registrations left behind by a dropped collection are pruned
//!    the next time the member emits.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | `sort` without a comparator | `Err(StoreError::MissingComparator)` |
//! | Candidate member fails validation | collection-level `"invalid"`, item skipped |
//! | Lookup by absent or `null` id | `None` |

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use ripple_core::events::{Callback, Emitter, EventBus, ALL_EVENTS};
use ripple_core::value::{self, Attributes, IdKey, Value};
use ripple_core::ClientId;
use tracing::{debug, trace};

use crate::comparator::Comparator;
use crate::error::{Result, StoreError};
use crate::event::StoreEvent;
use crate::kind::ModelKind;
use crate::model::Model;
use crate::options::SetOptions;
use crate::sync::SyncBackend;

/// Transform hook turning a raw list response into a list value.
pub type ListParser = Rc<dyn Fn(Value, &SetOptions) -> Value>;

// ─── Input items ─────────────────────────────────────────────────────────────

/// One entry of reconciliation input: raw attributes or an existing model.
#[derive(Debug, Clone)]
pub enum Item {
    Attrs(Attributes),
    Model(Model),
}

impl From<Attributes> for Item {
    fn from(attrs: Attributes) -> Self {
        Self::Attrs(attrs)
    }
}

impl From<Model> for Item {
    fn from(model: Model) -> Self {
        Self::Model(model)
    }
}

impl From<&Model> for Item {
    fn from(model: &Model) -> Self {
        Self::Model(model.clone())
    }
}

/// Non-object values become empty attribute maps.
impl From<Value> for Item {
    fn from(raw: Value) -> Self {
        Self::Attrs(value::attributes_of(raw))
    }
}

// ─── Members ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct Members {
    pub(crate) models: Vec<Model>,
    by_cid: AHashMap<ClientId, Model>,
    by_identity: AHashMap<IdKey, Model>,
    /// The identity key each member is currently indexed under.
    identity_of: AHashMap<ClientId, IdKey>,
    /// Members whose identity key is held by another member.
    shadowed: Vec<Model>,
}

impl Members {
    fn index(&mut self, model: &Model) {
        self.by_cid.insert(model.cid(), model.clone());
        self.index_identity(model);
    }

    fn index_identity(&mut self, model: &Model) {
        let Some(key) = model.id_key() else {
            return;
        };
        if let Some(owner) = self.by_identity.get(&key)
            && !owner.ptr_eq(model)
        {
            debug!(
                message = "collection.identity_shadowed",
                cid = %model.cid(),
                owner = %owner.cid(),
                key = %key
            );
            self.shadowed.push(model.clone());
            return;
        }
        self.by_identity.insert(key.clone(), model.clone());
        self.identity_of.insert(model.cid(), key);
    }

    fn unindex_identity(&mut self, model: &Model) {
        self.shadowed.retain(|member| !member.ptr_eq(model));
        let Some(key) = self.identity_of.remove(&model.cid()) else {
            return;
        };
        if !self
            .by_identity
            .get(&key)
            .is_some_and(|owner| owner.ptr_eq(model))
        {
            return;
        }
        self.by_identity.remove(&key);
        if let Some(position) = self
            .shadowed
            .iter()
            .position(|member| member.id_key().as_ref() == Some(&key))
        {
            let heir = self.shadowed.remove(position);
            self.by_identity.insert(key.clone(), heir.clone());
            self.identity_of.insert(heir.cid(), key);
        }
    }

    fn unindex(&mut self, model: &Model) {
        self.by_cid.remove(&model.cid());
        self.unindex_identity(model);
    }
}

#[derive(Default)]
struct Config {
    comparator: Option<Comparator>,
    url: Option<String>,
    parser: Option<ListParser>,
    sync: Option<Rc<dyn SyncBackend>>,
}

pub(crate) struct CollectionInner {
    kind: ModelKind,
    events: EventBus<StoreEvent>,
    /// Subscribed to every member's `"all"` channel.
    forward: Callback<StoreEvent>,
    state: RefCell<Members>,
    config: RefCell<Config>,
}

/// Non-owning handle held by members as their back-reference.
#[derive(Clone)]
pub(crate) struct WeakCollection(Weak<CollectionInner>);

impl WeakCollection {
    pub(crate) fn upgrade(&self) -> Option<Collection> {
        self.0.upgrade().map(|inner| Collection { inner })
    }
}

// ─── Collection ──────────────────────────────────────────────────────────────

/// An ordered, indexed, optionally sorted set of models.
///
/// Cloning a `Collection` creates a new handle to the **same** set; use
/// [`duplicate`](Self::duplicate) for an independent one.
#[derive(Clone)]
pub struct Collection {
    inner: Rc<CollectionInner>,
}

impl Collection {
    /// An empty collection coercing raw attributes into models of `kind`.
    #[must_use]
    pub fn new(kind: &ModelKind) -> Self {
        let events = EventBus::with_ids(kind.ids());
        let context = events.id();
        let inner = Rc::new_cyclic(|weak: &Weak<CollectionInner>| {
            let weak = weak.clone();
            let forward = Callback::new(move |name: &str, event: &StoreEvent| {
                match weak.upgrade() {
                    Some(inner) => Self { inner }.on_model_event(name, event),
                    None => {
                        if let Some(model) = event.model() {
                            model.off(Some(ALL_EVENTS), None, Some(context));
                        }
                    }
                }
            });
            CollectionInner {
                kind: kind.clone(),
                events,
                forward,
                state: RefCell::new(Members::default()),
                config: RefCell::new(Config::default()),
            }
        });
        Self { inner }
    }

    #[must_use]
    pub fn with_comparator(self, comparator: Comparator) -> Self {
        self.set_comparator(Some(comparator));
        self
    }

    #[must_use]
    pub fn with_url(self, url: impl Into<String>) -> Self {
        self.inner.config.borrow_mut().url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_parser(self, parse: impl Fn(Value, &SetOptions) -> Value + 'static) -> Self {
        self.inner.config.borrow_mut().parser = Some(Rc::new(parse));
        self
    }

    #[must_use]
    pub fn with_sync(self, backend: Rc<dyn SyncBackend>) -> Self {
        self.inner.config.borrow_mut().sync = Some(backend);
        self
    }

    /// Seed the collection through a silent [`reset`](Self::reset).
    #[must_use]
    pub fn with_models<I: Into<Item>>(self, items: impl IntoIterator<Item = I>) -> Self {
        self.reset(items, &SetOptions::silent());
        self
    }

    pub fn set_comparator(&self, comparator: Option<Comparator>) {
        self.inner.config.borrow_mut().comparator = comparator;
    }

    #[must_use]
    pub fn comparator(&self) -> Option<Comparator> {
        self.inner.config.borrow().comparator.clone()
    }

    #[must_use]
    pub fn kind(&self) -> &ModelKind {
        &self.inner.kind
    }

    #[must_use]
    pub fn url(&self) -> Option<String> {
        self.inner.config.borrow().url.clone()
    }

    pub(crate) fn sync_backend(&self) -> Option<Rc<dyn SyncBackend>> {
        self.inner.config.borrow().sync.clone()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakCollection {
        WeakCollection(Rc::downgrade(&self.inner))
    }

    // ─── Lookup ──────────────────────────────────────────────────────────

    /// Find a member by identity value, or by client id text (`"c12"`, `"c3@2"`).
    #[must_use]
    pub fn get(&self, id: &Value) -> Option<Model> {
        let members = self.inner.state.borrow();
        if let Some(model) = value::identity_key(id).and_then(|key| members.by_identity.get(&key)) {
            return Some(model.clone());
        }
        let cid = id.as_str()?.parse::<ClientId>().ok()?;
        members.by_cid.get(&cid).cloned()
    }

    #[must_use]
    pub fn get_by_cid(&self, cid: ClientId) -> Option<Model> {
        self.inner.state.borrow().by_cid.get(&cid).cloned()
    }

    /// `model` itself when it is a member, else the member owning its
    /// identity.
    #[must_use]
    pub fn get_model(&self, model: &Model) -> Option<Model> {
        let members = self.inner.state.borrow();
        members
            .by_cid
            .get(&model.cid())
            .filter(|member| member.ptr_eq(model))
            .or_else(|| model.id_key().and_then(|key| members.by_identity.get(&key)))
            .cloned()
    }

    /// The member already owning `model`'s identity key, other than `model`.
    pub(crate) fn identity_owner(&self, model: &Model) -> Option<Model> {
        let key = model.id_key()?;
        self.inner
            .state
            .borrow()
            .by_identity
            .get(&key)
            .filter(|owner| !owner.ptr_eq(model))
            .cloned()
    }

    pub(crate) fn resolve(&self, item: &Item) -> Option<Model> {
        match item {
            Item::Model(model) => self.get_model(model),
            Item::Attrs(attrs) => attrs
                .get(self.inner.kind.id_attribute())
                .and_then(value::identity_key)
                .and_then(|key| self.inner.state.borrow().by_identity.get(&key).cloned()),
        }
    }

    #[must_use]
    pub fn at(&self, index: usize) -> Option<Model> {
        self.inner.state.borrow().models.get(index).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.borrow().models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().models.is_empty()
    }

    /// A snapshot of the members in order.
    #[must_use]
    pub fn models(&self) -> Vec<Model> {
        self.inner.state.borrow().models.clone()
    }

    /// Iterate a snapshot of the members.
    pub fn iter(&self) -> std::vec::IntoIter<Model> {
        self.models().into_iter()
    }

    #[must_use]
    pub fn index_of(&self, model: &Model) -> Option<usize> {
        self.inner
            .state
            .borrow()
            .models
            .iter()
            .position(|member| member.ptr_eq(model))
    }

    #[must_use]
    pub fn contains(&self, model: &Model) -> bool {
        self.inner.state.borrow().by_cid.contains_key(&model.cid())
            && self.index_of(model).is_some()
    }

    /// Members in `start..end`, clamped to the current length.
    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> Vec<Model> {
        let members = self.inner.state.borrow();
        let end = end.min(members.models.len());
        let start = start.min(end);
        members.models[start..end].to_vec()
    }

    // ─── Structural updates ──────────────────────────────────────────────

    /// Reconcile the members against `items`.
    ///
    /// Returns the member each valid input item resolved to, in input order.
    /// Items that failed validation, or that matched nothing while adding is
    /// disabled, are left out.
    pub fn set<I: Into<Item>>(
        &self,
        items: impl IntoIterator<Item = I>,
        options: &SetOptions,
    ) -> Vec<Model> {
        let options = SetOptions {
            merge: Some(options.merges(true)),
            ..options.clone()
        };
        self.reconcile(items.into_iter().map(Into::into).collect(), &options)
            .into_iter()
            .flatten()
            .collect()
    }

    /// Single-item [`set`](Self::set); `None` when the item was rejected.
    pub fn set_one(&self, item: impl Into<Item>, options: &SetOptions) -> Option<Model> {
        self.set([item.into()], options).into_iter().next()
    }

    /// Add items, leaving existing members in place. Existing matches are
    /// merged only when `options.merge` is explicitly on.
    pub fn add<I: Into<Item>>(
        &self,
        items: impl IntoIterator<Item = I>,
        options: &SetOptions,
    ) -> Vec<Model> {
        let options = SetOptions {
            add: true,
            remove: false,
            merge: Some(options.merges(false)),
            ..options.clone()
        };
        self.reconcile(items.into_iter().map(Into::into).collect(), &options)
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn add_one(&self, item: impl Into<Item>, options: &SetOptions) -> Option<Model> {
        self.add([item.into()], options).into_iter().next()
    }

    /// Remove the members matching `items`, returning those removed.
    pub fn remove<I: Into<Item>>(
        &self,
        items: impl IntoIterator<Item = I>,
        options: &SetOptions,
    ) -> Vec<Model> {
        let resolved: Vec<Model> = items
            .into_iter()
            .filter_map(|item| self.resolve(&item.into()))
            .collect();
        self.remove_models(resolved, options)
    }

    pub fn remove_one(&self, item: impl Into<Item>, options: &SetOptions) -> Option<Model> {
        self.remove([item.into()], options).into_iter().next()
    }

    /// Remove the member with identity `id`.
    pub fn remove_by_id(&self, id: &Value, options: &SetOptions) -> Option<Model> {
        let model = self.get(id)?;
        self.remove_models(vec![model], options).into_iter().next()
    }

    /// The single-item removal path: unindex, splice out, emit `"remove"`
    /// carrying the index, then unwire.
    pub(crate) fn remove_models(&self, models: Vec<Model>, options: &SetOptions) -> Vec<Model> {
        let mut removed = Vec::with_capacity(models.len());
        for model in models {
            let index = {
                let mut members = self.inner.state.borrow_mut();
                let Some(index) = members.models.iter().position(|m| m.ptr_eq(&model)) else {
                    continue;
                };
                members.unindex(&model);
                members.models.remove(index);
                index
            };
            trace!(message = "collection.remove", cid = %model.cid(), index);
            if !options.silent {
                model.emit(
                    "remove",
                    &StoreEvent::Removed {
                        model: model.clone(),
                        collection: self.clone(),
                        index,
                        options: options.clone(),
                    },
                );
            }
            self.remove_reference(&model);
            removed.push(model);
        }
        removed
    }

    /// Replace every member with `items` without granular events, then emit
    /// one `"reset"` carrying the discarded members.
    pub fn reset<I: Into<Item>>(
        &self,
        items: impl IntoIterator<Item = I>,
        options: &SetOptions,
    ) -> Vec<Model> {
        let previous = self.models();
        for model in &previous {
            self.remove_reference(model);
        }
        *self.inner.state.borrow_mut() = Members::default();
        let added = self.add(items, &options.clone().with_silent(true));
        debug!(
            message = "collection.reset",
            previous = previous.len(),
            len = self.len()
        );
        if !options.silent {
            self.emit(
                "reset",
                &StoreEvent::Reset {
                    collection: self.clone(),
                    previous,
                    options: options.clone(),
                },
            );
        }
        added
    }

    /// Append one item.
    pub fn push(&self, item: impl Into<Item>, options: &SetOptions) -> Option<Model> {
        let options = options.clone().with_at(self.len());
        self.add_one(item, &options)
    }

    /// Remove and return the last member.
    pub fn pop(&self, options: &SetOptions) -> Option<Model> {
        let last = self.len().checked_sub(1).and_then(|index| self.at(index))?;
        self.remove_models(vec![last], options).into_iter().next()
    }

    /// Insert one item at the front.
    pub fn unshift(&self, item: impl Into<Item>, options: &SetOptions) -> Option<Model> {
        self.add_one(item, &options.clone().with_at(0))
    }

    /// Remove and return the first member.
    pub fn shift(&self, options: &SetOptions) -> Option<Model> {
        let first = self.at(0)?;
        self.remove_models(vec![first], options).into_iter().next()
    }

    // ─── Sorting ─────────────────────────────────────────────────────────

    /// Re-sort by the comparator, emitting `"sort"` unless silent.
    pub fn sort(&self, options: &SetOptions) -> Result<()> {
        let comparator = self.comparator().ok_or(StoreError::MissingComparator)?;
        self.sort_members(&comparator);
        if !options.silent {
            debug!(message = "collection.sort", len = self.len());
            self.emit(
                "sort",
                &StoreEvent::Sorted {
                    collection: self.clone(),
                    options: options.clone(),
                },
            );
        }
        Ok(())
    }

    /// Sort outside the borrow so comparators may read the collection.
    pub(crate) fn sort_members(&self, comparator: &Comparator) {
        let mut models = self.models();
        comparator.sort(&mut models);
        self.inner.state.borrow_mut().models = models;
    }

    // ─── Wiring ──────────────────────────────────────────────────────────

    pub(crate) fn with_members<R>(&self, f: impl FnOnce(&mut Members) -> R) -> R {
        f(&mut self.inner.state.borrow_mut())
    }

    /// Build a member from raw attributes. Models pass through unchanged.
    pub(crate) fn prepare_model(&self, item: Item, options: &SetOptions) -> Option<Model> {
        let attrs = match item {
            Item::Model(model) => return Some(model),
            Item::Attrs(attrs) => attrs,
        };
        let model = Model::with_options(&self.inner.kind, attrs, options);
        let Some(error) = model.validation_error() else {
            return Some(model);
        };
        self.emit(
            "invalid",
            &StoreEvent::Invalid {
                model,
                collection: Some(self.clone()),
                error,
                options: options.clone(),
            },
        );
        None
    }

    pub(crate) fn add_reference(&self, model: &Model) {
        self.inner.state.borrow_mut().index(model);
        if !model.has_owner() {
            model.set_owner(Some(self));
        }
        model.on(ALL_EVENTS, &self.inner.forward, Some(self.inner.events.id()));
    }

    fn remove_reference(&self, model: &Model) {
        if model.collection().is_some_and(|owner| owner.ptr_eq(self)) {
            model.set_owner(None);
        }
        model.off(
            Some(ALL_EVENTS),
            Some(&self.inner.forward),
            Some(self.inner.events.id()),
        );
    }

    fn on_model_event(&self, name: &str, event: &StoreEvent) {
        if (name == "add" || name == "remove")
            && !event.collection().is_some_and(|origin| origin.ptr_eq(self))
        {
            return;
        }
        if let Some(model) = event.model() {
            if name == "destroy" {
                let options = event.options().cloned().unwrap_or_default();
                self.remove_models(vec![model.clone()], &options);
            } else if name
                .strip_prefix("change:")
                .is_some_and(|attr| attr == model.kind().id_attribute())
            {
                self.rekey(model);
            }
        }
        self.emit(name, event);
    }

    fn rekey(&self, model: &Model) {
        let mut members = self.inner.state.borrow_mut();
        if !members.by_cid.contains_key(&model.cid()) {
            return;
        }
        members.unindex_identity(model);
        members.index_identity(model);
    }

    pub(crate) fn emit(&self, name: &str, event: &StoreEvent) {
        self.inner.events.emit(name, event);
    }

    // ─── Parsing and copies ──────────────────────────────────────────────

    /// Run the list parse hook; without one the response passes through.
    #[must_use]
    pub fn parse(&self, raw: Value, options: &SetOptions) -> Value {
        let parser = self.inner.config.borrow().parser.clone();
        match parser {
            Some(parse) => parse(raw, options),
            None => raw,
        }
    }

    pub(crate) fn items_from_response(&self, raw: Value, options: &SetOptions) -> Vec<Item> {
        match self.parse(raw, options) {
            Value::Array(values) => values.into_iter().map(Item::from).collect(),
            Value::Null => Vec::new(),
            single => vec![Item::from(single)],
        }
    }

    /// [`set`](Self::set) from a raw response routed through both parse
    /// hooks.
    pub fn set_parsed(&self, raw: Value, options: &SetOptions) -> Vec<Model> {
        let options = options.clone().with_parse(true);
        let items = self.items_from_response(raw, &options);
        self.set(items, &options)
    }

    /// [`reset`](Self::reset) from a raw response routed through both parse
    /// hooks.
    pub fn reset_parsed(&self, raw: Value, options: &SetOptions) -> Vec<Model> {
        let options = options.clone().with_parse(true);
        let items = self.items_from_response(raw, &options);
        self.reset(items, &options)
    }

    /// A new collection with the same configuration over the same member
    /// handles.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        let copy = Self::new(&self.inner.kind);
        {
            let config = self.inner.config.borrow();
            let mut target = copy.inner.config.borrow_mut();
            target.comparator = config.comparator.clone();
            target.url = config.url.clone();
            target.parser = config.parser.clone();
            target.sync = config.sync.clone();
        }
        copy.with_models(self.models())
    }
}

impl Emitter<StoreEvent> for Collection {
    fn events(&self) -> &EventBus<StoreEvent> {
        &self.inner.events
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Collection {}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Collection");
        dbg.field("kind", &self.inner.kind.name());
        if let Ok(members) = self.inner.state.try_borrow() {
            let cids: Vec<String> = members.models.iter().map(|m| m.cid().to_string()).collect();
            dbg.field("members", &cids);
        }
        dbg.finish_non_exhaustive()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = Model;
    type IntoIter = std::vec::IntoIter<Model>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_core::IdGenerator;
    use serde_json::json;

    fn kind() -> ModelKind {
        ModelKind::builder("row")
            .with_ids(IdGenerator::isolated())
            .build()
    }

    fn ids(collection: &Collection) -> Vec<Value> {
        collection
            .iter()
            .map(|m| m.id().unwrap_or(Value::Null))
            .collect()
    }

    type Log = Rc<RefCell<Vec<String>>>;

    fn record(collection: &Collection) -> Log {
        let log = Log::default();
        let sink = Rc::clone(&log);
        collection.on(
            ALL_EVENTS,
            &Callback::new(move |name, _: &StoreEvent| sink.borrow_mut().push(name.to_owned())),
            None,
        );
        log
    }

    // ---

    #[test]
    fn add_indexes_by_id_and_cid() {
        let rows = Collection::new(&kind());
        let added = rows.add([json!({"id": 1}), json!({"id": "x"})], &SetOptions::default());
        assert_eq!(added.len(), 2);
        assert_eq!(rows.len(), 2);
        assert!(rows.get(&json!(1)).is_some());
        assert!(rows.get(&json!("1")).is_some());
        assert!(rows.get(&json!("x")).is_some());
        let cid = added[0].cid();
        assert_eq!(rows.get_by_cid(cid), Some(added[0].clone()));
        assert_eq!(rows.get(&json!(cid.to_string())), Some(added[0].clone()));
        assert!(rows.get(&Value::Null).is_none());
        assert_eq!(added[0].collection(), Some(rows.clone()));
    }

    #[test]
    fn add_does_not_merge_by_default() {
        let rows = Collection::new(&kind());
        rows.add([json!({"id": 1, "v": "a"})], &SetOptions::default());
        rows.add([json!({"id": 1, "v": "b"})], &SetOptions::default());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.at(0).and_then(|m| m.get("v")), Some(json!("a")));
        rows.add(
            [json!({"id": 1, "v": "c"})],
            &SetOptions::default().with_merge(true),
        );
        assert_eq!(rows.at(0).and_then(|m| m.get("v")), Some(json!("c")));
    }

    #[test]
    fn remove_emits_index_and_unwires() {
        let rows = Collection::new(&kind());
        rows.add([json!({"id": 1}), json!({"id": 2}), json!({"id": 3})], &SetOptions::default());
        let index = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&index);
        rows.on(
            "remove",
            &Callback::new(move |_, event: &StoreEvent| {
                if let StoreEvent::Removed { index, .. } = event {
                    *sink.borrow_mut() = Some(*index);
                }
            }),
            None,
        );
        let removed = rows.remove_by_id(&json!(2), &SetOptions::default());
        assert_eq!(*index.borrow(), Some(1));
        let removed = removed.unwrap_or_else(|| panic!("member 2 should be removed"));
        assert!(removed.collection().is_none());
        assert!(!removed.events().has_listeners(None));
        assert_eq!(ids(&rows), vec![json!(1), json!(3)]);
        assert!(rows.get(&json!(2)).is_none());

        let log = record(&rows);
        removed.set_attr("x", 1, &SetOptions::default());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn member_events_are_forwarded() {
        let rows = Collection::new(&kind());
        let member = rows.add_one(json!({"id": 1}), &SetOptions::default());
        let log = record(&rows);
        if let Some(member) = member {
            member.set_attr("title", "t", &SetOptions::default());
        }
        assert_eq!(*log.borrow(), vec!["change:title", "change"]);
    }

    #[test]
    fn identity_change_rekeys_index() {
        let rows = Collection::new(&kind());
        let member = rows
            .add_one(json!({"id": 1}), &SetOptions::default())
            .unwrap_or_else(|| panic!("valid member"));
        member.set_attr("id", 100, &SetOptions::default());
        assert!(rows.get(&json!(1)).is_none());
        assert_eq!(rows.get(&json!(100)), Some(member.clone()));
        assert_eq!(rows.get_by_cid(member.cid()), Some(member.clone()));
        member.unset("id", &SetOptions::default());
        assert!(rows.get(&json!(100)).is_none());
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn rekey_onto_owned_identity_keeps_first_owner() {
        let rows = Collection::new(&kind());
        rows.add([json!({"id": 1}), json!({"id": 2})], &SetOptions::default());
        let (owner, mover) = match (rows.get(&json!(1)), rows.get(&json!(2))) {
            (Some(owner), Some(mover)) => (owner, mover),
            _ => panic!("both members present"),
        };

        mover.set_attr("id", 1, &SetOptions::default());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.get(&json!(1)), Some(owner.clone()));
        assert!(rows.get(&json!(2)).is_none());
        assert_eq!(rows.get_by_cid(mover.cid()), Some(mover.clone()));

        rows.remove_one(&owner, &SetOptions::default());
        assert_eq!(rows.get(&json!(1)), Some(mover.clone()));
        assert_eq!(rows.len(), 1);

        mover.set_attr("id", 3, &SetOptions::default());
        assert!(rows.get(&json!(1)).is_none());
        assert_eq!(rows.get(&json!(3)), Some(mover));
    }

    #[test]
    fn shadowed_member_leaving_releases_nothing() {
        let rows = Collection::new(&kind());
        rows.add([json!({"id": 1}), json!({"id": 2})], &SetOptions::default());
        let Some(mover) = rows.get(&json!(2)) else {
            panic!("member 2 present");
        };
        mover.set_attr("id", 1, &SetOptions::default());
        rows.remove_one(&mover, &SetOptions::default());
        assert!(!rows.contains(&mover));
        assert_eq!(rows.get(&json!(1)).and_then(|m| m.id()), Some(json!(1)));
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn models_from_separate_isolated_kinds_stay_distinct() {
        let first_kind = kind();
        let second_kind = kind();
        let first = Model::new(&first_kind, value::attributes_of(json!({"id": 1, "name": "one"})));
        let second = Model::new(&second_kind, value::attributes_of(json!({"name": "two"})));
        assert_eq!(first.cid().raw(), second.cid().raw());
        assert_ne!(first.cid(), second.cid());

        let rows = Collection::new(&first_kind);
        assert_eq!(rows.add_one(&first, &SetOptions::default()), Some(first.clone()));
        assert_eq!(rows.add_one(&second, &SetOptions::default()), Some(second.clone()));
        assert_eq!(rows.len(), 2);
        assert!(rows.contains(&second));
        assert_eq!(rows.get_by_cid(second.cid()), Some(second.clone()));
        assert_eq!(rows.get(&json!(second.cid().to_string())), Some(second.clone()));

        rows.set([&first, &second], &SetOptions::default());
        assert_eq!(rows.len(), 2);
        assert_eq!(first.get("name"), Some(json!("one")));
        assert_eq!(second.get("name"), Some(json!("two")));
    }

    #[test]
    fn dropped_collection_registrations_are_pruned() {
        let kind = kind();
        let member = Model::new(&kind, value::attributes_of(json!({"id": 1})));
        {
            let rows = Collection::new(&kind);
            rows.add_one(&member, &SetOptions::default());
            assert_eq!(member.events().listener_count(ALL_EVENTS), 1);
        }
        assert!(member.collection().is_none());
        member.set_attr("v", 1, &SetOptions::default());
        assert_eq!(member.events().listener_count(ALL_EVENTS), 0);
        assert!(!member.events().has_listeners(None));
    }

    #[test]
    fn reset_replaces_with_single_event() {
        let rows = Collection::new(&kind());
        let old = rows.add([json!({"id": 1}), json!({"id": 2})], &SetOptions::default());
        let previous = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&previous);
        rows.on(
            "reset",
            &Callback::new(move |_, event: &StoreEvent| {
                if let StoreEvent::Reset { previous, .. } = event {
                    *sink.borrow_mut() = previous.clone();
                }
            }),
            None,
        );
        let log = record(&rows);
        rows.reset([json!({"id": 3})], &SetOptions::default());
        assert_eq!(*log.borrow(), vec!["reset"]);
        assert_eq!(*previous.borrow(), old);
        assert_eq!(ids(&rows), vec![json!(3)]);
        assert!(old.iter().all(|m| m.collection().is_none()));
    }

    #[test]
    fn push_pop_shift_unshift() {
        let rows = Collection::new(&kind());
        rows.push(json!({"id": 2}), &SetOptions::default());
        rows.push(json!({"id": 3}), &SetOptions::default());
        rows.unshift(json!({"id": 1}), &SetOptions::default());
        assert_eq!(ids(&rows), vec![json!(1), json!(2), json!(3)]);
        assert_eq!(rows.pop(&SetOptions::default()).and_then(|m| m.id()), Some(json!(3)));
        assert_eq!(rows.shift(&SetOptions::default()).and_then(|m| m.id()), Some(json!(1)));
        assert_eq!(ids(&rows), vec![json!(2)]);
        assert_eq!(rows.slice(0, 10).len(), 1);
        rows.pop(&SetOptions::default());
        assert!(rows.pop(&SetOptions::default()).is_none());
        assert!(rows.is_empty());
    }

    #[test]
    fn sort_without_comparator_is_a_configuration_error() {
        let rows = Collection::new(&kind());
        let err = rows.sort(&SetOptions::default());
        assert_eq!(err, Err(StoreError::MissingComparator));
        assert!(matches!(err, Err(e) if e.is_configuration()));
    }

    #[test]
    fn explicit_sort_emits_sort() {
        let rows = Collection::new(&kind()).with_models([json!({"n": 2}), json!({"n": 1})]);
        rows.set_comparator(Some(Comparator::attribute("n")));
        let log = record(&rows);
        assert!(rows.sort(&SetOptions::default()).is_ok());
        assert_eq!(*log.borrow(), vec!["sort"]);
        let ns: Vec<_> = rows.iter().filter_map(|m| m.get("n")).collect();
        assert_eq!(ns, vec![json!(1), json!(2)]);
    }

    #[test]
    fn destroy_event_removes_member() {
        let rows = Collection::new(&kind());
        let member = rows
            .add_one(json!({"id": 1}), &SetOptions::default())
            .unwrap_or_else(|| panic!("valid member"));
        let log = record(&rows);
        member.trigger(
            "destroy",
            &StoreEvent::Destroyed {
                model: member.clone(),
                collection: Some(rows.clone()),
                options: SetOptions::default(),
            },
        );
        assert!(rows.is_empty());
        assert_eq!(*log.borrow(), vec!["remove", "destroy"]);
    }

    #[test]
    fn duplicate_shares_members_not_membership() {
        let rows = Collection::new(&kind())
            .with_url("/rows")
            .with_models([json!({"id": 1})]);
        let copy = rows.duplicate();
        assert_eq!(copy.len(), 1);
        assert_eq!(copy.url(), Some("/rows".to_string()));
        assert_eq!(copy.at(0), rows.at(0));
        copy.remove_by_id(&json!(1), &SetOptions::default());
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn member_url_uses_collection_url() {
        let rows = Collection::new(&kind()).with_url("/rows/");
        let member = rows
            .add_one(json!({"id": 5}), &SetOptions::default())
            .unwrap_or_else(|| panic!("valid member"));
        assert_eq!(member.url(), Ok("/rows/5".to_string()));
    }

    #[test]
    fn parsed_input_goes_through_both_hooks() {
        let kind = ModelKind::builder("wrapped")
            .with_parser(|raw, _| match raw {
                Value::Object(mut map) => map.remove("row").map(value::attributes_of),
                _ => None,
            })
            .build();
        let rows = Collection::new(&kind).with_parser(|raw, _| match raw {
            Value::Object(mut map) => map.remove("rows").unwrap_or(Value::Null),
            other => other,
        });
        let models = rows.set_parsed(
            json!({"rows": [{"row": {"id": 1}}, {"row": {"id": 2}}]}),
            &SetOptions::default(),
        );
        assert_eq!(models.len(), 2);
        assert_eq!(ids(&rows), vec![json!(1), json!(2)]);
        rows.reset_parsed(json!({"rows": null}), &SetOptions::default());
        assert!(rows.is_empty());
    }
}
