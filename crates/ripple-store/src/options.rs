#![forbid(unsafe_code)]

//! Per-call flags shared by model and collection operations.

/// Flags for `set`, `add`, `remove`, `reset` and the persistence wrappers.
///
/// One options value flows through an entire operation, including the
/// nested model `set` calls a collection reconciliation performs, and is
/// carried by every event the operation emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOptions {
    /// Suppress every event.
    pub silent: bool,
    /// Delete the named attributes instead of writing them.
    pub unset: bool,
    /// Run the kind's validator, when one is configured.
    pub validate: bool,
    /// Add input items with no existing member.
    pub add: bool,
    /// Remove members absent from the input.
    pub remove: bool,
    /// Merge input attributes into existing members. `None` takes the
    /// operation's default: on for `set`, off for `add`.
    pub merge: Option<bool>,
    /// Splice new members at this index instead of appending.
    pub at: Option<usize>,
    /// Keep the comparator order after structural changes.
    pub sort: bool,
    /// Route raw input through the parse hooks first.
    pub parse: bool,
    /// Persistence: apply state only after the backend succeeds.
    pub wait: bool,
    /// Persistence: send only the given attributes.
    pub patch: bool,
    /// Collection fetch: replace members through `reset`.
    pub reset: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            silent: false,
            unset: false,
            validate: true,
            add: true,
            remove: true,
            merge: None,
            at: None,
            sort: true,
            parse: false,
            wait: false,
            patch: false,
            reset: false,
        }
    }
}

impl SetOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with every event suppressed.
    #[must_use]
    pub fn silent() -> Self {
        Self::default().with_silent(true)
    }

    #[must_use]
    pub const fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    #[must_use]
    pub const fn with_unset(mut self, unset: bool) -> Self {
        self.unset = unset;
        self
    }

    #[must_use]
    pub const fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    #[must_use]
    pub const fn with_add(mut self, add: bool) -> Self {
        self.add = add;
        self
    }

    #[must_use]
    pub const fn with_remove(mut self, remove: bool) -> Self {
        self.remove = remove;
        self
    }

    #[must_use]
    pub const fn with_merge(mut self, merge: bool) -> Self {
        self.merge = Some(merge);
        self
    }

    #[must_use]
    pub const fn with_at(mut self, at: usize) -> Self {
        self.at = Some(at);
        self
    }

    #[must_use]
    pub const fn with_sort(mut self, sort: bool) -> Self {
        self.sort = sort;
        self
    }

    #[must_use]
    pub const fn with_parse(mut self, parse: bool) -> Self {
        self.parse = parse;
        self
    }

    #[must_use]
    pub const fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    #[must_use]
    pub const fn with_patch(mut self, patch: bool) -> Self {
        self.patch = patch;
        self
    }

    #[must_use]
    pub const fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    /// Resolve [`merge`](Self::merge) against an operation default.
    #[must_use]
    pub fn merges(&self, default: bool) -> bool {
        self.merge.unwrap_or(default)
    }
}
