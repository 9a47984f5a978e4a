#![forbid(unsafe_code)]

//! Process-local identifiers for models and event buses.
//!
//! Every model receives a [`ClientId`] at construction and every
//! [`EventBus`](crate::EventBus) owns a
//! [`ContextId`] used to tag inversion-of-control subscriptions. Both are drawn
//! from an [`IdGenerator`], which is injected rather than ambient so tests can
//! run against a deterministic sequence.
//!
//! # Invariants
//!
//! 1. Ids from one generator are strictly increasing and never repeat.
//! 2. All [`IdGenerator::global`] handles share one process-wide counter.
//! 3. An [`IdGenerator::isolated`] sequence starts at 1 and is shared by its
//!    clones only.
//! 4. Every isolated generator claims its own space, so no two generators in
//!    a process ever produce equal ids.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

// ─── Global counters ─────────────────────────────────────────────────────────

static NEXT_GLOBAL_ID: AtomicU64 = AtomicU64::new(1);

/// Space 0 belongs to the global counter.
static NEXT_SPACE: AtomicU32 = AtomicU32::new(1);

fn next_global_id() -> u64 {
    NEXT_GLOBAL_ID.fetch_add(1, Ordering::Relaxed)
}

fn claim_space() -> u32 {
    NEXT_SPACE.fetch_add(1, Ordering::Relaxed)
}

/// Writes `<prefix><seq>`, qualified as `<prefix><seq>@<space>` outside the
/// global space.
fn write_id(f: &mut fmt::Formatter<'_>, prefix: char, space: u32, seq: u64) -> fmt::Result {
    if space == 0 {
        write!(f, "{prefix}{seq}")
    } else {
        write!(f, "{prefix}{seq}@{space}")
    }
}

fn parse_id(text: &str, prefix: char) -> Option<(u32, u64)> {
    let body = text.strip_prefix(prefix)?;
    match body.split_once('@') {
        Some((seq, space)) => Some((space.parse().ok()?, seq.parse().ok()?)),
        None => Some((0, body.parse().ok()?)),
    }
}

/// Text that is not a well-formed id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseIdError;

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("malformed id")
    }
}

impl std::error::Error for ParseIdError {}

// ─── Identifier newtypes ─────────────────────────────────────────────────────

/// Ephemeral identity of a model, stable for its lifetime and never persisted.
///
/// Displays as `c<n>`, or `c<n>@<space>` when drawn from an isolated
/// generator. [`FromStr`] accepts both forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId {
    space: u32,
    seq: u64,
}

impl ClientId {
    /// Wrap a raw value from the global space.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self { space: 0, seq: raw }
    }

    /// Get the position within the id's space.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.seq
    }

    /// The generator space this id was drawn from (0 for the global counter).
    #[must_use]
    pub const fn space(self) -> u32 {
        self.space
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_id(f, 'c', self.space, self.seq)
    }
}

impl FromStr for ClientId {
    type Err = ParseIdError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (space, seq) = parse_id(text, 'c').ok_or(ParseIdError)?;
        Ok(Self { space, seq })
    }
}

/// Identity of an event bus when it acts as a subscription context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId {
    space: u32,
    seq: u64,
}

impl ContextId {
    /// Wrap a raw value from the global space.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self { space: 0, seq: raw }
    }

    /// Get the position within the id's space.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.seq
    }

    #[must_use]
    pub const fn space(self) -> u32 {
        self.space
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_id(f, 'l', self.space, self.seq)
    }
}

impl FromStr for ContextId {
    type Err = ParseIdError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (space, seq) = parse_id(text, 'l').ok_or(ParseIdError)?;
        Ok(Self { space, seq })
    }
}

// ─── Generator ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
enum Source {
    #[default]
    Global,
    Isolated { space: u32, next: Rc<Cell<u64>> },
}

/// Monotonic id source shared by models, collections and buses of one kind.
///
/// Cloning shares the underlying sequence.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    source: Source,
}

impl IdGenerator {
    /// A handle onto the process-wide counter.
    #[must_use]
    pub fn global() -> Self {
        Self {
            source: Source::Global,
        }
    }

    /// A fresh, independent sequence starting at 1 in a newly claimed space.
    #[must_use]
    pub fn isolated() -> Self {
        Self {
            source: Source::Isolated {
                space: claim_space(),
                next: Rc::new(Cell::new(1)),
            },
        }
    }

    /// The space every id from this generator carries.
    #[must_use]
    pub const fn space(&self) -> u32 {
        match &self.source {
            Source::Global => 0,
            Source::Isolated { space, .. } => *space,
        }
    }

    /// Draw the next raw value.
    pub fn next_raw(&self) -> u64 {
        match &self.source {
            Source::Global => next_global_id(),
            Source::Isolated { next, .. } => {
                let id = next.get();
                next.set(id.wrapping_add(1));
                id
            }
        }
    }

    /// Draw the next client id.
    pub fn next_client_id(&self) -> ClientId {
        ClientId {
            space: self.space(),
            seq: self.next_raw(),
        }
    }

    /// Draw the next context id.
    pub fn next_context_id(&self) -> ContextId {
        ContextId {
            space: self.space(),
            seq: self.next_raw(),
        }
    }

    /// Whether this handle draws from the process-wide counter.
    #[must_use]
    pub const fn is_global(&self) -> bool {
        matches!(self.source, Source::Global)
    }
}
