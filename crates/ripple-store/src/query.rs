#![forbid(unsafe_code)]

//! Read-only queries over a collection's members.
//!
//! Every query works on a snapshot of the members, so callbacks may freely
//! read (or mutate) the collection while a query runs.

use std::collections::BTreeMap;

use ripple_core::value::{self, Attributes, Value};

use crate::collection::Collection;
use crate::comparator::Comparator;
use crate::model::Model;

fn matches_all(model: &Model, attrs: &Attributes) -> bool {
    attrs
        .iter()
        .all(|(attr, expected)| value::deep_eq(model.get(attr).as_ref(), Some(expected)))
}

impl Collection {
    /// Members whose attributes include every entry of `attrs`. An empty
    /// filter matches nothing.
    #[must_use]
    pub fn where_attrs(&self, attrs: &Attributes) -> Vec<Model> {
        if attrs.is_empty() {
            return Vec::new();
        }
        self.filter(|model| matches_all(model, attrs))
    }

    /// First member matching [`where_attrs`](Self::where_attrs).
    #[must_use]
    pub fn find_where(&self, attrs: &Attributes) -> Option<Model> {
        if attrs.is_empty() {
            return None;
        }
        self.find(|model| matches_all(model, attrs))
    }

    /// The value of `attribute` for every member, `None` where absent.
    #[must_use]
    pub fn pluck(&self, attribute: &str) -> Vec<Option<Value>> {
        self.map(|model| model.get(attribute))
    }

    #[must_use]
    pub fn filter(&self, mut predicate: impl FnMut(&Model) -> bool) -> Vec<Model> {
        self.iter().filter(|model| predicate(model)).collect()
    }

    #[must_use]
    pub fn find(&self, mut predicate: impl FnMut(&Model) -> bool) -> Option<Model> {
        self.iter().find(|model| predicate(model))
    }

    #[must_use]
    pub fn map<T>(&self, f: impl FnMut(&Model) -> T) -> Vec<T> {
        self.models().iter().map(f).collect()
    }

    #[must_use]
    pub fn first(&self) -> Option<Model> {
        self.at(0)
    }

    #[must_use]
    pub fn last(&self) -> Option<Model> {
        self.len().checked_sub(1).and_then(|index| self.at(index))
    }

    /// Members ordered by `comparator`, leaving the collection untouched.
    #[must_use]
    pub fn sort_by(&self, comparator: &Comparator) -> Vec<Model> {
        let mut models = self.models();
        comparator.sort(&mut models);
        models
    }

    /// Members grouped by the display text of `key`, in member order within
    /// each group.
    #[must_use]
    pub fn group_by(&self, key: impl Fn(&Model) -> Option<Value>) -> BTreeMap<String, Vec<Model>> {
        let mut groups: BTreeMap<String, Vec<Model>> = BTreeMap::new();
        for model in self.iter() {
            let group = value::display_text(key(&model).as_ref());
            groups.entry(group).or_default().push(model);
        }
        groups
    }

    /// Member counts per display text of `key`.
    #[must_use]
    pub fn count_by(&self, key: impl Fn(&Model) -> Option<Value>) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for model in self.iter() {
            *counts
                .entry(value::display_text(key(&model).as_ref()))
                .or_default() += 1;
        }
        counts
    }

    /// Every member's attributes, in order.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Array(self.map(Model::to_json))
    }
}
