#![forbid(unsafe_code)]

//! Name-keyed publish/subscribe shared by models and collections.
//!
//! [`EventBus<P>`] is a cheaply clonable handle (`Rc<RefCell<..>>` inside) over
//! a registry mapping event names to ordered lists of [`Callback`]s. Payloads
//! of type `P` are passed by reference to every callback together with the
//! event name that fired.
//!
//! # Names
//!
//! Every method that takes `names` accepts a single name or a
//! whitespace-separated list; each name is handled independently. Callbacks
//! registered under [`ALL_EVENTS`] receive every event after the exact-name
//! callbacks, with the true event name as their first argument.
//!
//! # Invariants
//!
//! 1. Callbacks for one event fire in registration order.
//! 2. A name whose callback list becomes empty is dropped from the registry.
//! 3. A registration removed by [`EventBus::off`] never fires again, even if
//!    it was part of a dispatch already in progress.
//! 4. Registrations added during a dispatch do not fire for that dispatch.
//!
//! # Failure Modes
//!
//! None: every method is infallible. Unknown names, callbacks, and contexts
//! degrade to no-ops.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
#[cfg(feature = "tracing")]
use tracing::trace;

use crate::id::{ContextId, IdGenerator};

/// The wildcard channel name.
pub const ALL_EVENTS: &str = "all";

// ─── Callback ────────────────────────────────────────────────────────────────

/// A shared event handler. Identity is the identity of the wrapped closure,
/// so clones of one `Callback` all match each other in [`EventBus::off`].
pub struct Callback<P> {
    func: Rc<dyn Fn(&str, &P)>,
}

impl<P> Clone for Callback<P> {
    fn clone(&self) -> Self {
        Self {
            func: Rc::clone(&self.func),
        }
    }
}

impl<P> fmt::Debug for Callback<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback")
            .field(&Rc::as_ptr(&self.func).cast::<()>())
            .finish()
    }
}

impl<P: 'static> Callback<P> {
    /// Wrap a closure receiving the event name and payload.
    pub fn new(func: impl Fn(&str, &P) + 'static) -> Self {
        Self {
            func: Rc::new(func),
        }
    }
}

impl<P> Callback<P> {
    /// Whether both handles wrap the same closure.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.func), Rc::as_ptr(&other.func))
    }

    /// Invoke the handler.
    pub fn call(&self, name: &str, payload: &P) {
        (self.func)(name, payload);
    }
}

// ─── Registry ────────────────────────────────────────────────────────────────

struct Registration<P> {
    callback: Callback<P>,
    /// The user callback when `callback` is a one-shot wrapper.
    original: Option<Callback<P>>,
    context: Option<ContextId>,
    /// Cleared when the registration is removed.
    live: Rc<Cell<bool>>,
}

impl<P> Clone for Registration<P> {
    fn clone(&self) -> Self {
        Self {
            callback: self.callback.clone(),
            original: self.original.clone(),
            context: self.context,
            live: Rc::clone(&self.live),
        }
    }
}

impl<P> Registration<P> {
    fn matches_callback(&self, callback: &Callback<P>) -> bool {
        self.callback.ptr_eq(callback)
            || self
                .original
                .as_ref()
                .is_some_and(|original| original.ptr_eq(callback))
    }

    /// Filters combine conjunctively: a registration is removed only when it
    /// matches every filter that was given.
    fn survives(&self, callback: Option<&Callback<P>>, context: Option<ContextId>) -> bool {
        callback.is_some_and(|cb| !self.matches_callback(cb))
            || context.is_some_and(|ctx| self.context != Some(ctx))
    }

    fn retire(&self) {
        self.live.set(false);
    }
}

struct BusState<P> {
    registry: AHashMap<String, Vec<Registration<P>>>,
    listening_to: AHashMap<ContextId, EventBus<P>>,
}

impl<P> Default for BusState<P> {
    fn default() -> Self {
        Self {
            registry: AHashMap::new(),
            listening_to: AHashMap::new(),
        }
    }
}

fn remove_live<P>(state: &RefCell<BusState<P>>, name: &str, live: &Rc<Cell<bool>>) {
    let mut state = state.borrow_mut();
    let emptied = match state.registry.get_mut(name) {
        Some(regs) => {
            regs.retain(|reg| !Rc::ptr_eq(&reg.live, live));
            regs.is_empty()
        }
        None => false,
    };
    if emptied {
        state.registry.remove(name);
    }
}

// ─── EventBus ────────────────────────────────────────────────────────────────

/// A registry of named callbacks.
///
/// Cloning an `EventBus` creates a new handle to the **same** registry.
pub struct EventBus<P> {
    id: ContextId,
    state: Rc<RefCell<BusState<P>>>,
}

impl<P> Clone for EventBus<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            state: Rc::clone(&self.state),
        }
    }
}

impl<P> fmt::Debug for EventBus<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        let mut names: Vec<&str> = state.registry.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("EventBus")
            .field("id", &self.id)
            .field("events", &names)
            .field("listening_to", &state.listening_to.len())
            .finish()
    }
}

impl<P: 'static> Default for EventBus<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: 'static> EventBus<P> {
    /// Create a bus whose context id comes from the process-wide counter.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ids(&IdGenerator::global())
    }

    /// Create a bus drawing its context id from `ids`.
    #[must_use]
    pub fn with_ids(ids: &IdGenerator) -> Self {
        Self {
            id: ids.next_context_id(),
            state: Rc::new(RefCell::new(BusState::default())),
        }
    }

    /// The id this bus uses as the context of its `listen_to` subscriptions.
    #[must_use]
    pub const fn id(&self) -> ContextId {
        self.id
    }

    /// Whether both handles share one registry.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    fn push(&self, name: &str, registration: Registration<P>) {
        self.state
            .borrow_mut()
            .registry
            .entry(name.to_owned())
            .or_default()
            .push(registration);
    }

    /// Register `callback` for each of `names`.
    pub fn on(&self, names: &str, callback: &Callback<P>, context: Option<ContextId>) {
        for name in names.split_whitespace() {
            self.push(
                name,
                Registration {
                    callback: callback.clone(),
                    original: None,
                    context,
                    live: Rc::new(Cell::new(true)),
                },
            );
        }
    }

    /// Register many name→callback pairs in one call.
    pub fn on_map<'a>(
        &self,
        pairs: impl IntoIterator<Item = (&'a str, Callback<P>)>,
        context: Option<ContextId>,
    ) {
        for (names, callback) in pairs {
            self.on(names, &callback, context);
        }
    }

    /// Register `callback` to fire at most once per name.
    ///
    /// The wrapper deregisters itself before invoking `callback`, and
    /// [`off`](Self::off) with the original `callback` still matches it.
    pub fn once(&self, names: &str, callback: &Callback<P>, context: Option<ContextId>) {
        for name in names.split_whitespace() {
            let live = Rc::new(Cell::new(true));
            let token = Rc::clone(&live);
            let weak_state = Rc::downgrade(&self.state);
            let original = callback.clone();
            let bucket = name.to_owned();
            let wrapper = Callback::new(move |event: &str, payload: &P| {
                if !token.replace(false) {
                    return;
                }
                if let Some(state) = weak_state.upgrade() {
                    remove_live(&*state, &bucket, &token);
                }
                original.call(event, payload);
            });
            self.push(
                name,
                Registration {
                    callback: wrapper,
                    original: Some(callback.clone()),
                    context,
                    live,
                },
            );
        }
    }

    /// Remove registrations matching every given filter.
    ///
    /// With no filters at all, every registration on the bus is removed.
    pub fn off(
        &self,
        names: Option<&str>,
        callback: Option<&Callback<P>>,
        context: Option<ContextId>,
    ) {
        let mut state = self.state.borrow_mut();
        if names.is_none() && callback.is_none() && context.is_none() {
            for reg in state.registry.values().flatten() {
                reg.retire();
            }
            state.registry.clear();
            return;
        }

        let targets: Vec<String> = match names {
            Some(names) => names.split_whitespace().map(str::to_owned).collect(),
            None => state.registry.keys().cloned().collect(),
        };
        let filtered = callback.is_some() || context.is_some();

        for name in targets {
            let Some(regs) = state.registry.remove(&name) else {
                continue;
            };
            let mut retained = Vec::with_capacity(regs.len());
            for reg in regs {
                if filtered && reg.survives(callback, context) {
                    retained.push(reg);
                } else {
                    reg.retire();
                }
            }
            if !retained.is_empty() {
                state.registry.insert(name, retained);
            }
        }
    }

    /// Fire each of `names` in turn.
    pub fn trigger(&self, names: &str, payload: &P) {
        for name in names.split_whitespace() {
            self.emit(name, payload);
        }
    }

    /// Fire exactly one event name, without splitting on whitespace.
    ///
    /// Exact-name callbacks run first, then wildcard callbacks. Firing
    /// [`ALL_EVENTS`] itself invokes the wildcard callbacks once.
    pub fn emit(&self, name: &str, payload: &P) {
        let (direct, wildcard) = {
            let state = self.state.borrow();
            let direct = state.registry.get(name).cloned().unwrap_or_default();
            let wildcard = if name == ALL_EVENTS {
                Vec::new()
            } else {
                state.registry.get(ALL_EVENTS).cloned().unwrap_or_default()
            };
            (direct, wildcard)
        };
        if direct.is_empty() && wildcard.is_empty() {
            return;
        }
        #[cfg(feature = "tracing")]
        trace!(
            message = "events.trigger",
            bus = %self.id,
            name,
            listeners = direct.len() + wildcard.len()
        );
        for reg in direct.iter().chain(&wildcard) {
            if reg.live.get() {
                reg.callback.call(name, payload);
            }
        }
    }

    /// Subscribe to `other`, tagging the registration with this bus's id so
    /// [`stop_listening`](Self::stop_listening) can release it.
    pub fn listen_to(&self, other: &Self, names: &str, callback: &Callback<P>) {
        self.track(other);
        other.on(names, callback, Some(self.id));
    }

    /// One-shot form of [`listen_to`](Self::listen_to).
    pub fn listen_to_once(&self, other: &Self, names: &str, callback: &Callback<P>) {
        self.track(other);
        other.once(names, callback, Some(self.id));
    }

    fn track(&self, other: &Self) {
        self.state
            .borrow_mut()
            .listening_to
            .insert(other.id, other.clone());
    }

    /// Release subscriptions made through [`listen_to`](Self::listen_to).
    ///
    /// Without `other`, every tracked emitter is targeted. An emitter is
    /// forgotten once everything was released or its registry is empty.
    pub fn stop_listening(
        &self,
        other: Option<&Self>,
        names: Option<&str>,
        callback: Option<&Callback<P>>,
    ) {
        let targets: Vec<Self> = match other {
            Some(other) => vec![other.clone()],
            None => self.state.borrow().listening_to.values().cloned().collect(),
        };
        let release_all = names.is_none() && callback.is_none();
        for target in targets {
            target.off(names, callback, Some(self.id));
            if release_all || !target.has_listeners(None) {
                self.state.borrow_mut().listening_to.remove(&target.id);
            }
        }
    }

    /// Whether any callback is registered for `name`, or for anything at all.
    #[must_use]
    pub fn has_listeners(&self, name: Option<&str>) -> bool {
        let state = self.state.borrow();
        match name {
            Some(name) => state.registry.contains_key(name),
            None => !state.registry.is_empty(),
        }
    }

    /// Number of callbacks registered for exactly `name`.
    #[must_use]
    pub fn listener_count(&self, name: &str) -> usize {
        self.state.borrow().registry.get(name).map_or(0, Vec::len)
    }

    /// Number of emitters this bus is tracking through `listen_to`.
    #[must_use]
    pub fn listening_count(&self) -> usize {
        self.state.borrow().listening_to.len()
    }

    /// Whether this bus tracks a `listen_to` relationship with `other`.
    #[must_use]
    pub fn is_listening_to(&self, other: &Self) -> bool {
        self.state.borrow().listening_to.contains_key(&other.id)
    }
}

// ─── Emitter capability ──────────────────────────────────────────────────────

/// The event capability embedded by every observable type.
///
/// Implementors expose their bus; the provided methods forward to it.
pub trait Emitter<P: 'static> {
    /// The embedded bus.
    fn events(&self) -> &EventBus<P>;

    /// See [`EventBus::on`].
    fn on(&self, names: &str, callback: &Callback<P>, context: Option<ContextId>) {
        self.events().on(names, callback, context);
    }

    /// See [`EventBus::once`].
    fn once(&self, names: &str, callback: &Callback<P>, context: Option<ContextId>) {
        self.events().once(names, callback, context);
    }

    /// See [`EventBus::off`].
    fn off(&self, names: Option<&str>, callback: Option<&Callback<P>>, context: Option<ContextId>) {
        self.events().off(names, callback, context);
    }

    /// See [`EventBus::trigger`].
    fn trigger(&self, names: &str, payload: &P) {
        self.events().trigger(names, payload);
    }

    /// See [`EventBus::listen_to`].
    fn listen_to<E: Emitter<P> + ?Sized>(&self, other: &E, names: &str, callback: &Callback<P>) {
        self.events().listen_to(other.events(), names, callback);
    }

    /// See [`EventBus::listen_to_once`].
    fn listen_to_once<E: Emitter<P> + ?Sized>(
        &self,
        other: &E,
        names: &str,
        callback: &Callback<P>,
    ) {
        self.events().listen_to_once(other.events(), names, callback);
    }

    /// See [`EventBus::stop_listening`].
    fn stop_listening(
        &self,
        other: Option<&EventBus<P>>,
        names: Option<&str>,
        callback: Option<&Callback<P>>,
    ) {
        self.events().stop_listening(other, names, callback);
    }
}

impl<P: 'static> Emitter<P> for EventBus<P> {
    fn events(&self) -> &EventBus<P> {
        self
    }
}
