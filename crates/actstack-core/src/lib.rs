#![forbid(unsafe_code)]

//! Core: revision ledgers, model binding, activity modes, and launch payloads.
//!
//! Everything in this crate is a leaf value type. The runtime crate builds
//! the activity stack on top of these pieces; model crates build observable
//! state on top of [`Binding`].
//!
//! # Key Components
//!
//! - [`Ledger`] - Monotonic revision counter shared by all models of one context
//! - [`Binding`] - Bound-or-detached handle every model mutates through
//! - [`Model`] - Trait implemented by observable state types
//! - [`ActivityMode`] - Closed launch-mode enumeration with static facet table
//! - [`DataOutput`] / [`DataInput`] / [`Payload`] - Opaque launch/response/save payloads
//! - [`Location`] / [`LocationTable`] - Interned install location names

pub mod data;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod location;
pub mod mode;
pub mod model;

pub use data::{DataInput, DataOutput, Payload, Value};
pub use error::{Error, Result};
pub use ids::{ActivityId, ContextId, Identity, InstanceId, RequestId};
pub use ledger::{Ledger, RevisionWatch};
pub use location::{Location, LocationTable};
pub use mode::{ActivityMode, ModeFacets};
pub use model::{Binding, Model};
