#![forbid(unsafe_code)]

//! Mutation ledger: the per-context revision counter.
//!
//! Every model bound to one activity context shares a single [`Ledger`].
//! Each real change bumps the revision by exactly one and raises the redraw
//! flag; equal-value writes touch neither. Renderers keep a [`RevisionWatch`]
//! and compare counters instead of diffing model contents.
//!
//! The counter is atomic so any thread may *read* it, but only the owning
//! thread bumps it (enforced by [`Binding`](crate::Binding)).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Default)]
struct LedgerInner {
    revision: AtomicU64,
    redraw: AtomicBool,
}

/// Shared handle to one revision counter.
///
/// Cloning the handle shares the counter. Use [`Ledger::new`] for an
/// independent one.
#[derive(Clone, Default)]
pub struct Ledger {
    inner: Arc<LedgerInner>,
}

impl Ledger {
    /// Create a fresh ledger at revision 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current revision.
    #[inline]
    pub fn revision(&self) -> u64 {
        self.inner.revision.load(Ordering::Acquire)
    }

    /// Record one change: bump the revision and request a redraw.
    ///
    /// Returns the new revision.
    pub(crate) fn record(&self) -> u64 {
        let next = self.inner.revision.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.redraw.store(true, Ordering::Release);
        tracing::trace!(revision = next, "ledger bumped");
        next
    }

    /// Request a redraw without recording a change.
    pub fn request_redraw(&self) {
        self.inner.redraw.store(true, Ordering::Release);
    }

    /// Whether a redraw is pending.
    pub fn redraw_requested(&self) -> bool {
        self.inner.redraw.load(Ordering::Acquire)
    }

    /// Consume the pending redraw request.
    pub fn take_redraw_request(&self) -> bool {
        self.inner.redraw.swap(false, Ordering::AcqRel)
    }

    /// Whether two handles share the same counter.
    pub fn same_as(&self, other: &Ledger) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Start watching this ledger from its current revision.
    pub fn watch(&self) -> RevisionWatch {
        RevisionWatch {
            ledger: self.clone(),
            seen: self.revision(),
        }
    }
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("revision", &self.revision())
            .field("redraw", &self.redraw_requested())
            .finish()
    }
}

/// Last-observed revision of a ledger.
#[derive(Debug, Clone)]
pub struct RevisionWatch {
    ledger: Ledger,
    seen: u64,
}

impl RevisionWatch {
    /// Whether the ledger moved since the last call; marks it observed.
    pub fn changed(&mut self) -> bool {
        let now = self.ledger.revision();
        let changed = now != self.seen;
        self.seen = now;
        changed
    }

    /// Whether the ledger moved, without marking it observed.
    pub fn is_stale(&self) -> bool {
        self.ledger.revision() != self.seen
    }

    /// Revision seen at the last observation.
    pub fn seen(&self) -> u64 {
        self.seen
    }
}
