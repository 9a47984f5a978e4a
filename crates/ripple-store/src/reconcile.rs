#![forbid(unsafe_code)]

//! Set reconciliation: turn an input list into minimal add, remove, merge,
//! and reorder operations against a collection's current members.
//!
//! # Algorithm
//!
//! 1. Resolve each input item against the identity and client-id indexes.
//!    Found members are marked seen and, when merging, updated through their
//!    own `set` so attribute events surface. Unknown items are built into
//!    models and checked again, since the parse hook or the kind's defaults
//!    may supply an identity a member already owns. Genuinely new models are
//!    indexed and wired immediately, so later duplicates in the same input
//!    resolve to them.
//! 2. With `remove`, every member not seen is removed through the
//!    single-item removal path, before any insertion.
//! 3. New members are spliced at `at`, or the whole order is rebuilt from
//!    the input (when adding and removing without a comparator), or they are
//!    appended.
//! 4. A comparator re-sorts silently when members were added or a merge
//!    changed the sort attribute.
//! 5. `"add"` fires per new member, then at most one `"sort"`.
//!
//! # Invariants
//!
//! 1. Removals happen before insertions within one call.
//! 2. Per-item `"add"` events precede the single batch `"sort"` event.
//! 3. No input item produces more than one member.
//! 4. No input item produces a member whose identity another member owns.

use ahash::AHashSet;
use ripple_core::value::{Attributes, Value};
use ripple_core::ClientId;
use tracing::{debug, debug_span};

use crate::collection::{Collection, Item};
use crate::comparator::Comparator;
use crate::event::StoreEvent;
use crate::model::Model;
use crate::options::SetOptions;

impl Collection {
    /// Reconcile against `items`. The result is positional: one entry per
    /// input item, `None` where the item was rejected or skipped.
    pub(crate) fn reconcile(&self, items: Vec<Item>, options: &SetOptions) -> Vec<Option<Model>> {
        let span = debug_span!("collection.set", kind = self.kind().name(), items = items.len());
        let _guard = span.enter();

        let comparator = self.comparator();
        let sortable = comparator.is_some() && options.at.is_none() && options.sort;
        let sort_attribute = comparator
            .as_ref()
            .filter(|_| sortable)
            .and_then(Comparator::sort_attribute)
            .map(str::to_owned);
        let merge = options.merges(true);
        let rebuild = !sortable && options.at.is_none() && options.add && options.remove;

        let mut seen: AHashSet<ClientId> = AHashSet::new();
        let mut order: Vec<Model> = Vec::new();
        let mut ordered: AHashSet<ClientId> = AHashSet::new();
        let mut to_add: Vec<Model> = Vec::new();
        let mut results = Vec::with_capacity(items.len());
        let mut needs_sort = false;
        let mut merged = 0_usize;

        for item in items {
            let model = if let Some(existing) = self.resolve(&item) {
                if options.remove {
                    seen.insert(existing.cid());
                }
                if merge {
                    let attrs = match item {
                        Item::Attrs(attrs) => Some(attrs),
                        Item::Model(model) if model.ptr_eq(&existing) => None,
                        Item::Model(model) => Some(model.attributes()),
                    };
                    if let Some(attrs) = attrs {
                        needs_sort |=
                            merge_into(&existing, attrs, options, sort_attribute.as_deref());
                        merged += 1;
                    }
                }
                existing
            } else if options.add {
                let raw = match &item {
                    Item::Attrs(attrs) if merge => Some(attrs.clone()),
                    _ => None,
                };
                let Some(model) = self.prepare_model(item, options) else {
                    results.push(None);
                    continue;
                };
                if let Some(existing) = self.identity_owner(&model) {
                    if options.remove {
                        seen.insert(existing.cid());
                    }
                    if let Some(attrs) = raw {
                        needs_sort |=
                            merge_into(&existing, attrs, options, sort_attribute.as_deref());
                        merged += 1;
                    }
                    existing
                } else {
                    self.add_reference(&model);
                    to_add.push(model.clone());
                    model
                }
            } else {
                results.push(None);
                continue;
            };

            if rebuild && ordered.insert(model.cid()) {
                order.push(model.clone());
            }
            results.push(Some(model));
        }

        let mut removed = 0_usize;
        if options.remove {
            let stale: Vec<Model> = self.with_members(|members| {
                members
                    .models
                    .iter()
                    .filter(|member| !seen.contains(&member.cid()))
                    .cloned()
                    .collect()
            });
            removed = self.remove_models(stale, options).len();
        }

        let rebuilt = rebuild && !order.is_empty();
        if !to_add.is_empty() || rebuilt {
            if sortable {
                needs_sort = true;
            }
            self.with_members(|members| {
                if let Some(at) = options.at {
                    let at = at.min(members.models.len());
                    members.models.splice(at..at, to_add.iter().cloned());
                } else if rebuilt {
                    members.models = order;
                } else {
                    members.models.extend(to_add.iter().cloned());
                }
            });
        }

        if needs_sort && let Some(comparator) = &comparator {
            self.sort_members(comparator);
        }

        if !options.silent {
            for model in &to_add {
                let Some(index) = self.index_of(model) else {
                    continue;
                };
                model.emit(
                    "add",
                    &StoreEvent::Added {
                        model: model.clone(),
                        collection: self.clone(),
                        index,
                        options: options.clone(),
                    },
                );
            }
            if needs_sort || rebuilt {
                self.emit(
                    "sort",
                    &StoreEvent::Sorted {
                        collection: self.clone(),
                        options: options.clone(),
                    },
                );
            }
        }

        debug!(
            message = "collection.set",
            added = to_add.len(),
            removed,
            merged,
            sorted = needs_sort,
            len = self.len()
        );
        results
    }
}

/// Merge input attributes into the member they resolved to, through the
/// parse hook when asked. Returns whether the sort attribute changed.
fn merge_into(
    existing: &Model,
    attrs: Attributes,
    options: &SetOptions,
    sort_attribute: Option<&str>,
) -> bool {
    let attrs = if options.parse {
        existing
            .parse(Value::Object(attrs), options)
            .unwrap_or_default()
    } else {
        attrs
    };
    existing.set(attrs, options);
    sort_attribute.is_some_and(|attr| existing.has_changed(Some(attr)))
}
