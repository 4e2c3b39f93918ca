#![forbid(unsafe_code)]

//! actstack Runtime
//!
//! This crate turns launch requests into a managed stack of activities. It
//! owns activity lifecycles, routes responses back to requesters, and
//! bridges background work onto the owning thread.
//!
//! # Key Components
//!
//! - [`Runtime`] - Explicitly constructed root that owns the registries
//! - [`ActivityStack`] - Launch resolution, placement, and response routing
//! - [`Activity`] - Trait implemented by every stack-managed unit
//! - [`ActivityContext`] - Per-activity handle for binding models and making requests
//! - [`DeferredActivity`] - A launch request, resolved by the stack into an [`ActivityLaunch`]
//! - [`AppRegistry`] / [`Bundle`] - Installed apps and the activities they declare
//! - [`Builtins`] - Activities available without an app
//! - [`TaskRunner`] / [`channel`] - Background tasks marshaled back to the owning thread
//! - [`SavedStateStore`] - Suspend/resume snapshots with pluggable storage
//!
//! # How it fits in the system
//! `actstack-core` provides ids, modes, payloads and the model binding;
//! `actstack-models` builds observable state on top of it. This crate drives
//! both: each activity context owns one ledger, and every model an activity
//! binds reports its changes there.

pub mod activity;
pub mod app;
pub mod builtins;
pub mod config;
pub mod context;
pub mod error;
pub mod instance;
pub mod launch;
pub mod logging;
pub mod marshal;
pub mod registry;
pub mod runtime;
pub mod saved_state;
pub mod stack;
pub mod task;

pub use activity::{Activity, ActivityState, Lifecycle};
pub use app::{
    ActivityDetails, ActivityFactory, AppInstance, Application, Bundle, BundleBuilder, BundleOnly,
    Environment,
};
pub use builtins::{BUILTIN_REGISTRY, BadAppActivity, BuiltinMeta, Builtins};
pub use config::RuntimeConfig;
pub use context::{ActivityContext, Ancestors};
pub use error::{ActivityError, ActivityResult};
pub use instance::{ActionHandler, ActivityInstance, DefaultAction};
pub use launch::{
    ActivityLaunch, ActivityResponse, DeferredActivity, DeferredBuilder, LaunchBinding,
    ResponseTarget,
};
pub use logging::LoggingError;
pub use marshal::{MainLoop, Performer, channel};
pub use registry::{AppRegistry, InterfaceRegistry};
pub use runtime::Runtime;
#[cfg(feature = "state-persistence")]
pub use saved_state::FileStorage;
pub use saved_state::{
    MemoryStorage, SavedStateStore, SnapshotEntry, StackSnapshot, StorageBackend, StorageError,
    StorageResult, StoredEntry,
};
pub use stack::{ActivityStack, LaunchOutcome};
pub use task::{BoxError, Task, TaskFailure, TaskRunner, ToggleAccess};
