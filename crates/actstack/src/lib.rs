#![forbid(unsafe_code)]

//! actstack public facade crate.
//!
//! Re-exports the types most hosts and activities need from the internal
//! crates and offers a prelude for day-to-day use.
//!
//! ```no_run
//! use actstack::prelude::*;
//!
//! let runtime = actstack::start(&RuntimeConfig::from_env())?;
//! let mut stack = runtime.stack();
//! # let _ = &mut stack;
//! # Ok::<(), actstack::Error>(())
//! ```

use std::fmt;

// --- Core re-exports -------------------------------------------------------

pub use actstack_core::{
    ActivityId, ActivityMode, Binding, ContextId, DataInput, DataOutput, Identity, InstanceId,
    Ledger, Location, Model, Payload, RequestId, RevisionWatch, Value,
};

// --- Model re-exports ------------------------------------------------------

#[cfg(feature = "models")]
pub use actstack_models::{Progress, Selection, Text, Toggle};

// --- Runtime re-exports ----------------------------------------------------

pub use actstack_runtime::{
    Activity, ActivityContext, ActivityError, ActivityLaunch, ActivityResponse, ActivityResult,
    ActivityStack, ActivityState, AppRegistry, Application, Bundle, BundleOnly, Builtins,
    DefaultAction, DeferredActivity, Environment, InterfaceRegistry, LaunchOutcome, LoggingError,
    MainLoop, Performer, ResponseTarget, Runtime, RuntimeConfig, SavedStateStore, StackSnapshot,
    Task, TaskFailure, TaskRunner, channel,
};

// --- Errors ---------------------------------------------------------------

/// Top-level error type for actstack hosts.
#[derive(Debug)]
pub enum Error {
    /// Launch, lifecycle, or storage failure.
    Activity(ActivityError),
    /// Log subscriber installation failed.
    Logging(LoggingError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activity(err) => write!(f, "{err}"),
            Self::Logging(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Activity(err) => Some(err),
            Self::Logging(err) => Some(err),
        }
    }
}

impl From<ActivityError> for Error {
    fn from(err: ActivityError) -> Self {
        Self::Activity(err)
    }
}

impl From<LoggingError> for Error {
    fn from(err: LoggingError) -> Self {
        Self::Logging(err)
    }
}

impl From<actstack_core::Error> for Error {
    fn from(err: actstack_core::Error) -> Self {
        Self::Activity(err.into())
    }
}

/// Standard result type for actstack APIs.
pub type Result<T> = std::result::Result<T, Error>;

/// Install logging from `config` and build a [`Runtime`].
///
/// An already installed global subscriber is kept; a malformed filter is an
/// error.
pub fn start(config: &RuntimeConfig) -> Result<Runtime> {
    match actstack_runtime::logging::install(config) {
        Ok(()) => {}
        Err(LoggingError::SubscriberAlreadySet) => {
            tracing::debug!("global subscriber already set, keeping it");
        }
        Err(err) => return Err(err.into()),
    }
    Ok(Runtime::new(config.clone()))
}

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        Activity, ActivityContext, ActivityId, ActivityMode, ActivityResponse, ActivityResult,
        ActivityStack, ActivityState, Bundle, DataInput, DataOutput, DeferredActivity, Error,
        Identity, Model, RequestId, ResponseTarget, Result, Runtime, RuntimeConfig,
    };

    #[cfg(feature = "models")]
    pub use crate::{Progress, Selection, Text, Toggle};

    pub use crate::{core, runtime};

    #[cfg(feature = "models")]
    pub use crate::models;
}

pub use actstack_core as core;
#[cfg(feature = "models")]
pub use actstack_models as models;
pub use actstack_runtime as runtime;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_builds_runtime_with_config() {
        let runtime = start(&RuntimeConfig::new().with_max_depth(4)).unwrap();
        assert_eq!(runtime.config().max_depth, 4);
        assert!(runtime.apps().is_empty());
        runtime.shutdown();
        assert!(runtime.is_shut_down());
    }

    #[test]
    fn errors_convert_and_display() {
        let err: Error = actstack_core::Error::IllegalState("nope".into()).into();
        assert!(matches!(err, Error::Activity(ActivityError::Core(_))));
        assert!(err.to_string().contains("nope"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
