#![forbid(unsafe_code)]

//! Model binding: the single point every observable state change goes through.
//!
//! A [`Binding`] is either *bound* to an activity context (context id, owning
//! thread, shared [`Ledger`], lazily created logger span) or *detached*. A
//! detached binding marks an immutable snapshot: every write is rejected with
//! [`Error::IllegalState`].
//!
//! # Invariants
//!
//! 1. An equal-value write returns `Ok(false)` and touches nothing.
//! 2. A real change assigns, bumps the ledger by exactly one, and requests a
//!    redraw, in that order.
//! 3. Writes from any thread other than the one that created the binding are
//!    rejected before anything is assigned.
//!
//! Model types never derive `Clone`; duplicating state goes through
//! [`Model::copy`], which always takes a new binding.

use crate::error::{Error, Result};
use crate::ids::ContextId;
use crate::ledger::Ledger;
use std::fmt;
use std::sync::OnceLock;
use std::thread::{self, ThreadId};
use tracing::Span;

struct Bound {
    context: ContextId,
    owner: ThreadId,
    ledger: Ledger,
    logger: OnceLock<Span>,
}

/// Bound-or-detached handle owned by every model.
pub struct Binding {
    bound: Option<Bound>,
}

impl Binding {
    /// Bind to `ledger` on behalf of `context`, owned by the calling thread.
    pub fn bound(context: ContextId, ledger: Ledger) -> Self {
        Self {
            bound: Some(Bound {
                context,
                owner: thread::current().id(),
                ledger,
                logger: OnceLock::new(),
            }),
        }
    }

    /// A binding with no context and no ledger.
    pub const fn detached() -> Self {
        Self { bound: None }
    }

    /// Whether this binding is a frozen snapshot.
    #[inline]
    pub fn is_detached(&self) -> bool {
        self.bound.is_none()
    }

    /// The shared ledger, if bound.
    pub fn ledger(&self) -> Option<&Ledger> {
        self.bound.as_ref().map(|b| &b.ledger)
    }

    /// The owning context, if bound.
    pub fn context(&self) -> Option<ContextId> {
        self.bound.as_ref().map(|b| b.context)
    }

    /// Logger span for the model; created on first use.
    ///
    /// Detached bindings log into a disabled span.
    pub fn logger(&self) -> Span {
        match &self.bound {
            Some(b) => b
                .logger
                .get_or_init(|| tracing::debug_span!("model", context = %b.context))
                .clone(),
            None => Span::none(),
        }
    }

    /// Rebind to the same context on a different ledger.
    ///
    /// A detached binding stays detached.
    pub fn rebind(&self, ledger: Ledger) -> Self {
        match &self.bound {
            Some(b) => Self::bound(b.context, ledger),
            None => Self::detached(),
        }
    }

    /// Fail unless a write from the current thread is allowed.
    pub fn ensure_mutable(&self) -> Result<()> {
        let Some(b) = &self.bound else {
            return Err(Error::illegal("cannot mutate a detached model"));
        };
        if thread::current().id() != b.owner {
            return Err(Error::illegal(format!(
                "model of {} mutated off its owning thread",
                b.context
            )));
        }
        Ok(())
    }

    /// Assign `value` to `slot` if it differs, recording one change.
    ///
    /// Returns whether anything changed.
    pub fn update<T: PartialEq>(&self, slot: &mut T, value: T) -> Result<bool> {
        self.ensure_mutable()?;
        if *slot == value {
            return Ok(false);
        }
        *slot = value;
        self.commit();
        Ok(true)
    }

    /// Record one change made in place by the caller.
    ///
    /// Callers must have passed [`ensure_mutable`](Self::ensure_mutable)
    /// and must call this at most once per logical change.
    pub fn commit(&self) {
        if let Some(b) = &self.bound {
            let revision = b.ledger.record();
            let _guard = self.logger().entered();
            tracing::trace!(revision, "model changed");
        }
    }
}

impl Default for Binding {
    fn default() -> Self {
        Self::detached()
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.bound {
            Some(b) => f
                .debug_struct("Binding")
                .field("context", &b.context)
                .field("ledger", &b.ledger)
                .finish(),
            None => f.write_str("Binding(detached)"),
        }
    }
}

/// Observable piece of UI state.
pub trait Model: Sized {
    /// The binding every setter routes through.
    fn binding(&self) -> &Binding;

    /// Copy the current state under a new binding.
    ///
    /// The copy shares no mutable state with `self`: its writes bump only
    /// the ledger of `binding`.
    fn copy(&self, binding: Binding) -> Self;

    /// Frozen, context-free copy safe to hand to other threads.
    fn snapshot(&self) -> Self {
        self.copy(Binding::detached())
    }

    /// Whether this model is a frozen snapshot.
    fn is_detached(&self) -> bool {
        self.binding().is_detached()
    }
}
