#![forbid(unsafe_code)]

//! Member ordering for sorted collections.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use ripple_core::value::{self, Value};

use crate::model::Model;

/// How a collection orders its members.
///
/// `Attribute` and `Key` sort by a computed key, ascending, with absent keys
/// last and ties kept in insertion order. `Order` is a full two-argument
/// ordering; it should be total, but one that is not only yields an
/// unspecified permutation of the members, never a panic.
#[derive(Clone)]
pub enum Comparator {
    Attribute(String),
    Key(Rc<dyn Fn(&Model) -> Option<Value>>),
    Order(Rc<dyn Fn(&Model, &Model) -> Ordering>),
}

impl fmt::Debug for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attribute(attr) => f.debug_tuple("Attribute").field(attr).finish(),
            Self::Key(_) => f.write_str("Key(..)"),
            Self::Order(_) => f.write_str("Order(..)"),
        }
    }
}

impl Comparator {
    #[must_use]
    pub fn attribute(attribute: impl Into<String>) -> Self {
        Self::Attribute(attribute.into())
    }

    #[must_use]
    pub fn key(key: impl Fn(&Model) -> Option<Value> + 'static) -> Self {
        Self::Key(Rc::new(key))
    }

    #[must_use]
    pub fn order(order: impl Fn(&Model, &Model) -> Ordering + 'static) -> Self {
        Self::Order(Rc::new(order))
    }

    /// The attribute a merge must change to require a re-sort.
    #[must_use]
    pub fn sort_attribute(&self) -> Option<&str> {
        match self {
            Self::Attribute(attr) => Some(attr.as_str()),
            Self::Key(_) | Self::Order(_) => None,
        }
    }

    /// Sort `models` in place.
    pub fn sort(&self, models: &mut [Model]) {
        match self {
            Self::Attribute(attr) => sort_by_key(models, |model| model.get(attr)),
            Self::Key(key) => sort_by_key(models, |model| key(model)),
            Self::Order(order) => merge_sort_by(models, order.as_ref()),
        }
    }
}

/// Keys are computed once per member before sorting.
fn sort_by_key(models: &mut [Model], key: impl Fn(&Model) -> Option<Value>) {
    let mut keyed: Vec<(Option<Value>, Model)> =
        models.iter().map(|model| (key(model), model.clone())).collect();
    keyed.sort_by(|(a, _), (b, _)| value::compare_sort_keys(a.as_ref(), b.as_ref()));
    for (slot, (_, model)) in models.iter_mut().zip(keyed) {
        *slot = model;
    }
}

/// Stable bottom-up merge sort. Every pass writes each member exactly once,
/// so an inconsistent `order` cannot lose members or panic.
fn merge_sort_by(models: &mut [Model], order: &dyn Fn(&Model, &Model) -> Ordering) {
    let len = models.len();
    if len < 2 {
        return;
    }
    let mut merged = models.to_vec();
    let mut width = 1;
    while width < len {
        let mut start = 0;
        while start < len {
            let mid = (start + width).min(len);
            let end = (start + 2 * width).min(len);
            let (mut left, mut right) = (start, mid);
            for slot in &mut merged[start..end] {
                let take_left = right >= end
                    || (left < mid && order(&models[right], &models[left]) != Ordering::Less);
                if take_left {
                    *slot = models[left].clone();
                    left += 1;
                } else {
                    *slot = models[right].clone();
                    right += 1;
                }
            }
            start = end;
        }
        models.clone_from_slice(&merged);
        width *= 2;
    }
}
