#![forbid(unsafe_code)]

//! In-memory persistence backend.
//!
//! Records live under their full resource URL (`/people/3`). A collection
//! read lists the records one path segment below the collection URL, in
//! insertion order. Creates assign sequential numeric ids under the
//! target's id attribute.

use std::cell::{Cell, RefCell};

use ripple_core::value::{self, Value};
use ripple_store::{SyncBackend, SyncError, SyncMethod, SyncRequest, SyncTarget};
use serde_json::json;
use tracing::trace;

/// One call the backend received.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: SyncMethod,
    pub url: String,
    pub body: Option<Value>,
}

#[derive(Debug)]
pub struct MemoryBackend {
    records: RefCell<Vec<(String, Value)>>,
    calls: RefCell<Vec<Call>>,
    next_id: Cell<u64>,
    fail_next: RefCell<Option<SyncError>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn join(base: &str, id: &Value) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        value::display_text(Some(id))
    )
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RefCell::new(Vec::new()),
            calls: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
            fail_next: RefCell::new(None),
        }
    }

    /// Store `record` under `base/<id>`, where `id` is the record's `"id"`.
    pub fn seed(&self, base: &str, record: Value) {
        let url = match record.get("id") {
            Some(id) => join(base, id),
            None => base.to_owned(),
        };
        self.store(url, record);
    }

    #[must_use]
    pub fn record(&self, url: &str) -> Option<Value> {
        self.records
            .borrow()
            .iter()
            .find(|(key, _)| key == url)
            .map(|(_, record)| record.clone())
    }

    /// Records one segment below `base`, in insertion order.
    #[must_use]
    pub fn list(&self, base: &str) -> Vec<Value> {
        let prefix = format!("{}/", base.trim_end_matches('/'));
        self.records
            .borrow()
            .iter()
            .filter(|(key, _)| {
                key.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .map(|(_, record)| record.clone())
            .collect()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Make the next call fail with `error`.
    pub fn fail_next(&self, error: SyncError) {
        *self.fail_next.borrow_mut() = Some(error);
    }

    fn store(&self, url: String, record: Value) {
        let mut records = self.records.borrow_mut();
        match records.iter_mut().find(|(key, _)| *key == url) {
            Some((_, slot)) => *slot = record,
            None => records.push((url, record)),
        }
    }

    fn take(&self, url: &str) -> Option<Value> {
        let mut records = self.records.borrow_mut();
        let position = records.iter().position(|(key, _)| key == url)?;
        Some(records.remove(position).1)
    }

    fn create(&self, target: SyncTarget<'_>, request: &SyncRequest) -> Result<Value, SyncError> {
        let id_attribute = match target {
            SyncTarget::Model(model) => model.kind().id_attribute().to_owned(),
            SyncTarget::Collection(collection) => collection.kind().id_attribute().to_owned(),
        };
        let Some(Value::Object(mut record)) = request.body.clone() else {
            return Err(SyncError::Rejected {
                status: 422,
                message: "create needs an object body".into(),
            });
        };
        let id = Value::from(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        record.insert(id_attribute, id.clone());
        let record = Value::Object(record);
        self.store(join(&request.url, &id), record.clone());
        Ok(record)
    }

    fn patch(&self, request: &SyncRequest) -> Result<Value, SyncError> {
        let Some(Value::Object(mut existing)) = self.record(&request.url) else {
            return Err(SyncError::NotFound {
                url: request.url.clone(),
            });
        };
        if let Some(Value::Object(changes)) = &request.body {
            existing.extend(changes.clone());
        }
        let record = Value::Object(existing);
        self.store(request.url.clone(), record.clone());
        Ok(record)
    }
}

impl SyncBackend for MemoryBackend {
    fn sync(
        &self,
        method: SyncMethod,
        target: SyncTarget<'_>,
        request: &SyncRequest,
    ) -> Result<Value, SyncError> {
        trace!(message = "memory.sync", method = %method, url = %request.url);
        self.calls.borrow_mut().push(Call {
            method,
            url: request.url.clone(),
            body: request.body.clone(),
        });
        if let Some(error) = self.fail_next.borrow_mut().take() {
            return Err(error);
        }
        let not_found = || SyncError::NotFound {
            url: request.url.clone(),
        };
        match method {
            SyncMethod::Create => self.create(target, request),
            SyncMethod::Read => match target {
                SyncTarget::Collection(_) => Ok(Value::Array(self.list(&request.url))),
                SyncTarget::Model(_) => self.record(&request.url).ok_or_else(not_found),
            },
            SyncMethod::Update => {
                let record = request.body.clone().unwrap_or_else(|| json!({}));
                self.store(request.url.clone(), record.clone());
                Ok(record)
            }
            SyncMethod::Patch => self.patch(request),
            SyncMethod::Delete => self
                .take(&request.url)
                .map(|_| json!({}))
                .ok_or_else(not_found),
        }
    }
}
