#![forbid(unsafe_code)]

//! Runtime error type.

use crate::activity::ActivityState;
use crate::saved_state::StorageError;
use actstack_core::{ActivityId, InstanceId};
use std::fmt;

/// Errors surfaced by the activity runtime.
///
/// Instantiation faults are logged and turned into placeholders before they
/// can reach a caller; [`ActivityError::Instantiation`] only appears inside
/// that boundary and in activity callbacks that choose to report it.
#[derive(Debug)]
pub enum ActivityError {
    /// Invalid argument, illegal state, or corrupt data from the core layer.
    Core(actstack_core::Error),
    /// A lifecycle callback was driven out of order.
    IllegalTransition {
        from: ActivityState,
        to: ActivityState,
    },
    /// An activity could not be produced.
    Instantiation {
        activity: ActivityId,
        reason: String,
    },
    /// Launch would exceed the configured stack depth.
    StackFull { depth: usize },
    /// No live slot with this id.
    UnknownInstance(InstanceId),
    /// An activity callback reported failure.
    Failed(String),
    /// Saved-state storage failed.
    Storage(StorageError),
}

impl ActivityError {
    /// Convenience for activity implementations reporting failure.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl fmt::Display for ActivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityError::Core(e) => write!(f, "{e}"),
            ActivityError::IllegalTransition { from, to } => {
                write!(f, "illegal lifecycle transition {from:?} -> {to:?}")
            }
            ActivityError::Instantiation { activity, reason } => {
                write!(f, "cannot instantiate {activity}: {reason}")
            }
            ActivityError::StackFull { depth } => write!(f, "activity stack full ({depth})"),
            ActivityError::UnknownInstance(id) => write!(f, "no live activity {id}"),
            ActivityError::Failed(msg) => write!(f, "activity failed: {msg}"),
            ActivityError::Storage(e) => write!(f, "saved state: {e}"),
        }
    }
}

impl std::error::Error for ActivityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ActivityError::Core(e) => Some(e),
            ActivityError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<actstack_core::Error> for ActivityError {
    fn from(e: actstack_core::Error) -> Self {
        ActivityError::Core(e)
    }
}

impl From<StorageError> for ActivityError {
    fn from(e: StorageError) -> Self {
        ActivityError::Storage(e)
    }
}

/// Result type for runtime operations.
pub type ActivityResult<T> = Result<T, ActivityError>;
