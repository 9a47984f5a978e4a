#![forbid(unsafe_code)]

//! Persistence seam and the `fetch`/`save`/`destroy`/`create` wrappers.
//!
//! The store never talks to a transport itself. A [`SyncBackend`] receives a
//! method, the target, and a prepared [`SyncRequest`], and returns the raw
//! response synchronously. The wrappers resolve the backend (kind first, then
//! the owning collection), emit `"request"`, call the backend, and apply the
//! response through the ordinary `set`/`reset` paths, so persistence produces
//! the same change events as local edits.
//!
//! # Events
//!
//! | Event | When |
//! |-------|------|
//! | `"request"` | before the backend is called |
//! | `"sync"` | after a successful response was applied |
//! | `"error"` | the backend failed; the wrapper returns `Err(StoreError::Sync)` |
//! | `"destroy"` | `destroy`: before the call, or after success with `wait` |

use std::fmt;
use std::rc::Rc;

use ripple_core::value::{Attributes, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collection::{Collection, Item};
use crate::error::{Result, StoreError, SyncError};
use crate::event::{StoreEvent, Target};
use crate::model::Model;
use crate::options::SetOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMethod {
    Create,
    Read,
    Update,
    Patch,
    Delete,
}

impl SyncMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Patch => "patch",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a persistence call is about.
#[derive(Debug, Clone, Copy)]
pub enum SyncTarget<'a> {
    Model(&'a Model),
    Collection(&'a Collection),
}

/// A prepared persistence call.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRequest {
    pub url: String,
    /// The payload for create/update/patch; `None` for read and delete.
    pub body: Option<Value>,
    pub options: SetOptions,
}

/// The transport behind the persistence wrappers.
pub trait SyncBackend {
    fn sync(
        &self,
        method: SyncMethod,
        target: SyncTarget<'_>,
        request: &SyncRequest,
    ) -> std::result::Result<Value, SyncError>;
}

// ─── Model ───────────────────────────────────────────────────────────────────

impl Model {
    fn backend(&self) -> Result<Rc<dyn SyncBackend>> {
        self.kind()
            .sync_backend()
            .or_else(|| self.collection().and_then(|owner| owner.sync_backend()))
            .ok_or_else(|| StoreError::MissingSync {
                kind: self.kind().name().to_owned(),
            })
    }

    fn call_backend(
        &self,
        backend: &dyn SyncBackend,
        method: SyncMethod,
        request: &SyncRequest,
    ) -> std::result::Result<Value, SyncError> {
        debug!(message = "model.sync", cid = %self.cid(), method = %method, url = %request.url);
        self.emit(
            "request",
            &StoreEvent::Requested {
                target: Target::Model(self.clone()),
                options: request.options.clone(),
            },
        );
        backend.sync(method, SyncTarget::Model(self), request)
    }

    fn fail(&self, error: SyncError, options: &SetOptions) -> StoreError {
        self.emit(
            "error",
            &StoreEvent::SyncFailed {
                target: Target::Model(self.clone()),
                error: error.clone(),
                options: options.clone(),
            },
        );
        StoreError::Sync(error)
    }

    fn synced(&self, response: Value, options: &SetOptions) {
        self.emit(
            "sync",
            &StoreEvent::Synced {
                target: Target::Model(self.clone()),
                response,
                options: options.clone(),
            },
        );
    }

    /// Read the model from the backend and apply the parsed response.
    ///
    /// Returns `Ok(false)` when the response failed validation.
    pub fn fetch(&self, options: &SetOptions) -> Result<bool> {
        let options = options.clone().with_parse(true);
        let backend = self.backend()?;
        let request = SyncRequest {
            url: self.url()?,
            body: None,
            options: options.clone(),
        };
        let response = self
            .call_backend(backend.as_ref(), SyncMethod::Read, &request)
            .map_err(|error| self.fail(error, &options))?;
        if let Some(attrs) = self.parse(response.clone(), &options)
            && !self.set(attrs, &options)
        {
            return Ok(false);
        }
        self.synced(response, &options);
        Ok(true)
    }

    /// Persist the model, creating it when new.
    ///
    /// `attrs` are applied first, or with `wait` only staged for the request
    /// and applied once the backend accepts them. `patch` sends only `attrs`.
    /// Returns `Ok(false)` when validation rejected the save.
    pub fn save(&self, attrs: Option<Attributes>, options: &SetOptions) -> Result<bool> {
        let options = options.clone().with_parse(true);
        match &attrs {
            Some(attrs) if !options.wait => {
                if !self.set(attrs.clone(), &options) {
                    return Ok(false);
                }
            }
            _ => {
                let pending = attrs.clone().unwrap_or_default();
                if !self.validate_candidate(&pending, &options) {
                    return Ok(false);
                }
            }
        }

        let backend = self.backend()?;
        let staged = attrs.as_ref().filter(|_| options.wait).map(|attrs| {
            let mut staged = self.attributes();
            staged.extend(attrs.clone());
            self.swap_attributes(staged)
        });

        let method = if self.is_new() {
            SyncMethod::Create
        } else if options.patch {
            SyncMethod::Patch
        } else {
            SyncMethod::Update
        };
        let body = match method {
            SyncMethod::Patch => Value::Object(attrs.clone().unwrap_or_default()),
            _ => self.to_json(),
        };
        let request = self.url().map(|url| SyncRequest {
            url,
            body: Some(body),
            options: options.clone(),
        });
        let outcome = request.map(|request| self.call_backend(backend.as_ref(), method, &request));
        if let Some(original) = staged {
            self.swap_attributes(original);
        }
        let response = outcome?.map_err(|error| self.fail(error, &options))?;

        let server = self.parse(response.clone(), &options);
        let server = if options.wait {
            let mut merged = attrs.unwrap_or_default();
            merged.extend(server.unwrap_or_default());
            Some(merged)
        } else {
            server
        };
        if let Some(server) = server
            && !self.set(server, &options)
        {
            return Ok(false);
        }
        self.synced(response, &options);
        Ok(true)
    }

    /// Delete the model on the backend and announce `"destroy"`.
    ///
    /// New models are only destroyed locally and return `Ok(false)`. Without
    /// `wait`, `"destroy"` fires before the backend is called.
    pub fn destroy(&self, options: &SetOptions) -> Result<bool> {
        if self.is_new() {
            self.announce_destroy(options);
            return Ok(false);
        }
        let backend = self.backend()?;
        let request = SyncRequest {
            url: self.url()?,
            body: None,
            options: options.clone(),
        };
        if !options.wait {
            self.announce_destroy(options);
        }
        let response = self
            .call_backend(backend.as_ref(), SyncMethod::Delete, &request)
            .map_err(|error| self.fail(error, options))?;
        if options.wait {
            self.announce_destroy(options);
        }
        self.synced(response, options);
        Ok(true)
    }

    fn announce_destroy(&self, options: &SetOptions) {
        self.emit(
            "destroy",
            &StoreEvent::Destroyed {
                model: self.clone(),
                collection: self.collection(),
                options: options.clone(),
            },
        );
    }
}

// ─── Collection ──────────────────────────────────────────────────────────────

impl Collection {
    fn backend(&self) -> Result<Rc<dyn SyncBackend>> {
        self.sync_backend()
            .or_else(|| self.kind().sync_backend())
            .ok_or_else(|| StoreError::MissingSync {
                kind: self.kind().name().to_owned(),
            })
    }

    /// Read the member list from the backend and reconcile it, through
    /// `reset` when `options.reset` is on and `set` otherwise.
    pub fn fetch(&self, options: &SetOptions) -> Result<Vec<Model>> {
        let options = options.clone().with_parse(true);
        let backend = self.backend()?;
        let url = self.url().ok_or(StoreError::MissingUrl)?;
        let request = SyncRequest {
            url,
            body: None,
            options: options.clone(),
        };
        debug!(message = "collection.fetch", url = %request.url, reset = options.reset);
        self.emit(
            "request",
            &StoreEvent::Requested {
                target: Target::Collection(self.clone()),
                options: options.clone(),
            },
        );
        let response = match backend.sync(SyncMethod::Read, SyncTarget::Collection(self), &request) {
            Ok(response) => response,
            Err(error) => {
                self.emit(
                    "error",
                    &StoreEvent::SyncFailed {
                        target: Target::Collection(self.clone()),
                        error: error.clone(),
                        options: options.clone(),
                    },
                );
                return Err(StoreError::Sync(error));
            }
        };
        let models = if options.reset {
            self.reset_parsed(response.clone(), &options)
        } else {
            self.set_parsed(response.clone(), &options)
        };
        self.emit(
            "sync",
            &StoreEvent::Synced {
                target: Target::Collection(self.clone()),
                response,
                options,
            },
        );
        Ok(models)
    }

    /// Build a member from `item`, add it (after the save with `wait`), and
    /// save it. `Ok(None)` when the item failed validation.
    pub fn create(&self, item: impl Into<Item>, options: &SetOptions) -> Result<Option<Model>> {
        let Some(model) = self.prepare_model(item.into(), options) else {
            return Ok(None);
        };
        if !model.has_owner() {
            model.set_owner(Some(self));
        }
        if !options.wait {
            self.add_one(&model, options);
        }
        let saved = model.save(None, options)?;
        if saved && options.wait {
            self.add_one(&model, options);
        }
        Ok(Some(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::kind::ModelKind;
    use ripple_core::events::{Callback, Emitter, ALL_EVENTS};
    use ripple_core::value::attributes_of;
    use serde_json::json;
    use std::cell::RefCell;

    /// Replays scripted responses and records every call.
    #[derive(Default)]
    struct Scripted {
        calls: RefCell<Vec<(SyncMethod, String, Option<Value>)>>,
        responses: RefCell<Vec<std::result::Result<Value, SyncError>>>,
    }

    impl Scripted {
        fn replying(responses: Vec<std::result::Result<Value, SyncError>>) -> Rc<Self> {
            Rc::new(Self {
                calls: RefCell::default(),
                responses: RefCell::new(responses),
            })
        }
    }

    impl SyncBackend for Scripted {
        fn sync(
            &self,
            method: SyncMethod,
            _target: SyncTarget<'_>,
            request: &SyncRequest,
        ) -> std::result::Result<Value, SyncError> {
            self.calls
                .borrow_mut()
                .push((method, request.url.clone(), request.body.clone()));
            let mut responses = self.responses.borrow_mut();
            if responses.is_empty() {
                Ok(json!({}))
            } else {
                responses.remove(0)
            }
        }
    }

    fn kind_with(backend: &Rc<Scripted>) -> ModelKind {
        ModelKind::builder("note")
            .with_url_root("/notes")
            .with_sync(backend.clone())
            .build()
    }

    type Log = Rc<RefCell<Vec<String>>>;

    fn record(emitter: &impl Emitter<StoreEvent>) -> Log {
        let log = Log::default();
        let sink = Rc::clone(&log);
        emitter.on(
            ALL_EVENTS,
            &Callback::new(move |name, _: &StoreEvent| sink.borrow_mut().push(name.to_owned())),
            None,
        );
        log
    }

    // ---

    #[test]
    fn method_names() {
        assert_eq!(SyncMethod::Patch.to_string(), "patch");
        assert_eq!(
            serde_json::to_value(SyncMethod::Delete).ok(),
            Some(json!("delete"))
        );
    }

    #[test]
    fn fetch_applies_response() {
        let backend = Scripted::replying(vec![Ok(json!({"id": 1, "title": "remote"}))]);
        let model = Model::new(&kind_with(&backend), attributes_of(json!({"id": 1})));
        let log = record(&model);
        assert_eq!(model.fetch(&SetOptions::default()), Ok(true));
        assert_eq!(model.get("title"), Some(json!("remote")));
        assert_eq!(*log.borrow(), vec!["request", "change:title", "change", "sync"]);
        assert_eq!(backend.calls.borrow()[0].1, "/notes/1");
    }

    #[test]
    fn save_new_model_creates_and_merges_id() {
        let backend = Scripted::replying(vec![Ok(json!({"id": 42}))]);
        let model = Model::new(&kind_with(&backend), attributes_of(json!({"title": "t"})));
        assert_eq!(model.save(None, &SetOptions::default()), Ok(true));
        assert_eq!(model.id(), Some(json!(42)));
        let calls = backend.calls.borrow();
        assert_eq!(calls[0].0, SyncMethod::Create);
        assert_eq!(calls[0].1, "/notes");
        assert_eq!(calls[0].2, Some(json!({"title": "t"})));
    }

    #[test]
    fn save_existing_updates_or_patches() {
        let backend = Scripted::replying(vec![]);
        let model = Model::new(&kind_with(&backend), attributes_of(json!({"id": 1, "a": 1})));
        model
            .save(Some(attributes_of(json!({"b": 2}))), &SetOptions::default())
            .ok();
        model
            .save(
                Some(attributes_of(json!({"c": 3}))),
                &SetOptions::default().with_patch(true),
            )
            .ok();
        let calls = backend.calls.borrow();
        assert_eq!(calls[0].0, SyncMethod::Update);
        assert_eq!(calls[0].2, Some(json!({"id": 1, "a": 1, "b": 2})));
        assert_eq!(calls[1].0, SyncMethod::Patch);
        assert_eq!(calls[1].2, Some(json!({"c": 3})));
    }

    #[test]
    fn wait_defers_attributes_until_success() {
        let backend = Scripted::replying(vec![Err(SyncError::Rejected {
            status: 500,
            message: "boom".into(),
        })]);
        let model = Model::new(&kind_with(&backend), attributes_of(json!({"id": 1, "a": 1})));
        let log = record(&model);
        let result = model.save(
            Some(attributes_of(json!({"a": 2}))),
            &SetOptions::default().with_wait(true),
        );
        assert!(matches!(result, Err(StoreError::Sync(_))));
        assert_eq!(model.get("a"), Some(json!(1)));
        assert_eq!(*log.borrow(), vec!["request", "error"]);
        assert_eq!(
            backend.calls.borrow()[0].2,
            Some(json!({"id": 1, "a": 2}))
        );

        assert_eq!(
            model.save(
                Some(attributes_of(json!({"a": 3}))),
                &SetOptions::default().with_wait(true)
            ),
            Ok(true)
        );
        assert_eq!(model.get("a"), Some(json!(3)));
    }

    #[test]
    fn invalid_save_never_reaches_backend() {
        let backend = Scripted::replying(vec![]);
        let kind = ModelKind::builder("checked")
            .with_url_root("/c")
            .with_sync(backend.clone())
            .with_validator(|attrs, _| attrs.get("bad").map(|_| ValidationError::new("bad")))
            .build();
        let model = Model::new(&kind, Attributes::new());
        let staged = model.save(
            Some(attributes_of(json!({"bad": true}))),
            &SetOptions::default().with_wait(true),
        );
        assert_eq!(staged, Ok(false));
        assert!(!model.has("bad"));
        assert_eq!(model.save(Some(attributes_of(json!({"bad": 1}))), &SetOptions::default()), Ok(false));
        assert!(backend.calls.borrow().is_empty());
    }

    #[test]
    fn destroy_new_model_is_local() {
        let backend = Scripted::replying(vec![]);
        let model = Model::new(&kind_with(&backend), Attributes::new());
        let log = record(&model);
        assert_eq!(model.destroy(&SetOptions::default()), Ok(false));
        assert_eq!(*log.borrow(), vec!["destroy"]);
        assert!(backend.calls.borrow().is_empty());
    }

    #[test]
    fn destroy_with_wait_announces_after_success() {
        let backend = Scripted::replying(vec![]);
        let model = Model::new(&kind_with(&backend), attributes_of(json!({"id": 9})));
        let log = record(&model);
        assert_eq!(model.destroy(&SetOptions::default().with_wait(true)), Ok(true));
        assert_eq!(*log.borrow(), vec!["request", "destroy", "sync"]);
        assert_eq!(backend.calls.borrow()[0].0, SyncMethod::Delete);
    }

    #[test]
    fn missing_backend_and_url_are_configuration_errors() {
        let bare = Model::new(&ModelKind::new("bare"), attributes_of(json!({"id": 1})));
        assert_eq!(
            bare.fetch(&SetOptions::default()),
            Err(StoreError::MissingSync { kind: "bare".into() })
        );
        let backend = Scripted::replying(vec![]);
        let rows = Collection::new(&ModelKind::new("row")).with_sync(backend);
        assert_eq!(rows.fetch(&SetOptions::default()), Err(StoreError::MissingUrl));
    }

    #[test]
    fn collection_fetch_sets_or_resets() {
        let backend = Scripted::replying(vec![
            Ok(json!([{"id": 1}, {"id": 2}])),
            Ok(json!([{"id": 3}])),
        ]);
        let rows = Collection::new(&ModelKind::new("row"))
            .with_url("/rows")
            .with_sync(backend.clone());
        let log = record(&rows);
        assert_eq!(rows.fetch(&SetOptions::default()).map(|m| m.len()), Ok(2));
        assert_eq!(
            *log.borrow(),
            vec!["request", "add", "add", "sort", "sync"]
        );
        log.borrow_mut().clear();
        rows.fetch(&SetOptions::default().with_reset(true)).ok();
        assert_eq!(*log.borrow(), vec!["request", "reset", "sync"]);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn create_adds_then_saves() {
        let backend = Scripted::replying(vec![Ok(json!({"id": 5}))]);
        let rows = Collection::new(&ModelKind::new("row"))
            .with_url("/rows")
            .with_sync(backend.clone());
        let created = rows.create(json!({"title": "new"}), &SetOptions::default());
        let model = created.ok().flatten().unwrap_or_else(|| panic!("created"));
        assert_eq!(model.id(), Some(json!(5)));
        assert_eq!(rows.get(&json!(5)), Some(model.clone()));
        assert_eq!(backend.calls.borrow()[0].1, "/rows");
    }

    #[test]
    fn create_with_wait_adds_only_after_success() {
        let backend = Scripted::replying(vec![Err(SyncError::Transport {
            message: "offline".into(),
        })]);
        let rows = Collection::new(&ModelKind::new("row"))
            .with_url("/rows")
            .with_sync(backend);
        let result = rows.create(json!({"title": "x"}), &SetOptions::default().with_wait(true));
        assert!(result.is_err());
        assert!(rows.is_empty());
    }
}
