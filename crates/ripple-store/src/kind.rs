#![forbid(unsafe_code)]

//! Per-subtype model configuration.
//!
//! A [`ModelKind`] plays the role a class plays in prototype-based data
//! layers: it names the identity attribute, supplies defaults, and carries
//! the validate/parse hooks, the URL root, the persistence backend, and the
//! id generator shared by every model built from it. Kinds are immutable once
//! built and cheap to clone.

use std::fmt;
use std::rc::Rc;

use ripple_core::value::{Attributes, Value};
use ripple_core::IdGenerator;

use crate::error::ValidationError;
use crate::options::SetOptions;
use crate::sync::SyncBackend;

/// Validator hook: `None` means the candidate attributes are valid.
pub type Validator = Rc<dyn Fn(&Attributes, &SetOptions) -> Option<ValidationError>>;

/// Transform hook turning a raw response into attributes.
pub type Parser = Rc<dyn Fn(Value, &SetOptions) -> Option<Attributes>>;

struct KindInner {
    name: String,
    id_attribute: String,
    defaults: Attributes,
    validator: Option<Validator>,
    parser: Option<Parser>,
    url_root: Option<String>,
    sync: Option<Rc<dyn SyncBackend>>,
    ids: IdGenerator,
}

/// Shared configuration for a family of models.
///
/// Cloning a `ModelKind` creates a new handle to the **same** configuration.
#[derive(Clone)]
pub struct ModelKind {
    inner: Rc<KindInner>,
}

impl fmt::Debug for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelKind")
            .field("name", &self.inner.name)
            .field("id_attribute", &self.inner.id_attribute)
            .field("defaults", &self.inner.defaults)
            .field("validates", &self.inner.validator.is_some())
            .field("url_root", &self.inner.url_root)
            .finish_non_exhaustive()
    }
}

impl Default for ModelKind {
    fn default() -> Self {
        Self::new("model")
    }
}

impl ModelKind {
    /// A kind with no defaults, hooks, or backend.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    #[must_use]
    pub fn builder(name: impl Into<String>) -> KindBuilder {
        KindBuilder::new(name)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Attribute holding the durable identity.
    #[must_use]
    pub fn id_attribute(&self) -> &str {
        &self.inner.id_attribute
    }

    #[must_use]
    pub fn defaults(&self) -> &Attributes {
        &self.inner.defaults
    }

    #[must_use]
    pub fn url_root(&self) -> Option<&str> {
        self.inner.url_root.as_deref()
    }

    #[must_use]
    pub fn ids(&self) -> &IdGenerator {
        &self.inner.ids
    }

    #[must_use]
    pub fn sync_backend(&self) -> Option<Rc<dyn SyncBackend>> {
        self.inner.sync.clone()
    }

    #[must_use]
    pub fn has_validator(&self) -> bool {
        self.inner.validator.is_some()
    }

    /// Run the validator over a complete candidate attribute set.
    #[must_use]
    pub fn validate(&self, candidate: &Attributes, options: &SetOptions) -> Option<ValidationError> {
        self.inner
            .validator
            .as_ref()
            .and_then(|validate| validate(candidate, options))
    }

    /// Turn a raw response into attributes. Without a parse hook, objects
    /// pass through and anything else yields nothing.
    #[must_use]
    pub fn parse(&self, raw: Value, options: &SetOptions) -> Option<Attributes> {
        match &self.inner.parser {
            Some(parse) => parse(raw, options),
            None => match raw {
                Value::Object(map) => Some(map),
                _ => None,
            },
        }
    }

    /// Whether both handles share one configuration.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Builder for [`ModelKind`].
pub struct KindBuilder {
    name: String,
    id_attribute: String,
    defaults: Attributes,
    validator: Option<Validator>,
    parser: Option<Parser>,
    url_root: Option<String>,
    sync: Option<Rc<dyn SyncBackend>>,
    ids: IdGenerator,
}

impl KindBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_attribute: "id".to_owned(),
            defaults: Attributes::new(),
            validator: None,
            parser: None,
            url_root: None,
            sync: None,
            ids: IdGenerator::global(),
        }
    }

    #[must_use]
    pub fn with_id_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.id_attribute = attribute.into();
        self
    }

    #[must_use]
    pub fn with_default(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(attribute.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_defaults(mut self, defaults: Attributes) -> Self {
        self.defaults.extend(defaults);
        self
    }

    #[must_use]
    pub fn with_validator(
        mut self,
        validate: impl Fn(&Attributes, &SetOptions) -> Option<ValidationError> + 'static,
    ) -> Self {
        self.validator = Some(Rc::new(validate));
        self
    }

    #[must_use]
    pub fn with_parser(
        mut self,
        parse: impl Fn(Value, &SetOptions) -> Option<Attributes> + 'static,
    ) -> Self {
        self.parser = Some(Rc::new(parse));
        self
    }

    #[must_use]
    pub fn with_url_root(mut self, url_root: impl Into<String>) -> Self {
        self.url_root = Some(url_root.into());
        self
    }

    #[must_use]
    pub fn with_sync(mut self, backend: Rc<dyn SyncBackend>) -> Self {
        self.sync = Some(backend);
        self
    }

    /// Draw client ids from `ids` instead of the process-wide counter.
    #[must_use]
    pub fn with_ids(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    #[must_use]
    pub fn build(self) -> ModelKind {
        ModelKind {
            inner: Rc::new(KindInner {
                name: self.name,
                id_attribute: self.id_attribute,
                defaults: self.defaults,
                validator: self.validator,
                parser: self.parser,
                url_root: self.url_root,
                sync: self.sync,
                ids: self.ids,
            }),
        }
    }
}
