#![forbid(unsafe_code)]

//! Event transcripts.

use std::cell::RefCell;
use std::rc::Rc;

use ripple_core::events::{ALL_EVENTS, Callback, Emitter};
use ripple_core::{ClientId, Value};
use ripple_store::StoreEvent;
use serde_json::json;

/// One recorded event.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub name: String,
    pub model: Option<ClientId>,
    /// Position carried by `"add"` and `"remove"`.
    pub index: Option<usize>,
    /// Value carried by `"change:<attr>"`.
    pub value: Option<Value>,
}

impl LogEntry {
    fn capture(name: &str, event: &StoreEvent) -> Self {
        let index = match event {
            StoreEvent::Added { index, .. } | StoreEvent::Removed { index, .. } => Some(*index),
            _ => None,
        };
        let value = match event {
            StoreEvent::AttributeChanged { value, .. } => value.clone(),
            _ => None,
        };
        Self {
            name: name.to_owned(),
            model: event.model().map(|model| model.cid()),
            index,
            value,
        }
    }

    /// `model` is the alias the transcript assigned to this entry's client id.
    fn to_json(&self, model: Option<String>) -> Value {
        json!({
            "event": self.name,
            "model": model,
            "index": self.index,
            "value": self.value,
        })
    }
}

/// Shared recorder. Clones append to the same transcript.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Rc<RefCell<Vec<LogEntry>>>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record everything `emitter` emits. Returns the callback so callers
    /// can detach it with `off`.
    pub fn attach(&self, emitter: &impl Emitter<StoreEvent>) -> Callback<StoreEvent> {
        let entries = Rc::clone(&self.entries);
        let callback = Callback::new(move |name, event: &StoreEvent| {
            entries.borrow_mut().push(LogEntry::capture(name, event));
        });
        emitter.on(ALL_EVENTS, &callback, None);
        callback
    }

    /// A fresh log attached to `emitter`.
    pub fn watching(emitter: &impl Emitter<StoreEvent>) -> Self {
        let log = Self::new();
        log.attach(emitter);
        log
    }

    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.borrow().clone()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.borrow().iter().map(|e| e.name.clone()).collect()
    }

    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.entries.borrow().iter().filter(|e| e.name == name).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// One JSON object per line. Client ids are written as `m<n>`, numbered
    /// by first appearance, so runs with different id sequences compare
    /// equal.
    #[must_use]
    pub fn to_jsonl(&self) -> String {
        let mut aliases: Vec<ClientId> = Vec::new();
        let mut out = String::new();
        for entry in self.entries.borrow().iter() {
            let alias = entry.model.map(|cid| {
                let n = aliases.iter().position(|seen| *seen == cid).unwrap_or_else(|| {
                    aliases.push(cid);
                    aliases.len() - 1
                });
                format!("m{n}")
            });
            out.push_str(&entry.to_json(alias).to_string());
            out.push('\n');
        }
        out
    }

    /// BLAKE3 hex digest of [`to_jsonl`](Self::to_jsonl), for comparing
    /// transcripts of two runs.
    #[must_use]
    pub fn digest(&self) -> String {
        blake3::hash(self.to_jsonl().as_bytes()).to_hex().to_string()
    }
}
