#![forbid(unsafe_code)]

//! Observable models for actstack activities.
//!
//! Every model owns a [`Binding`](actstack_core::Binding) and routes each
//! setter through it, so a real change bumps the context's ledger exactly
//! once and an equal-value write is free.
//!
//! - [`Toggle`] - checkbox-like boolean (also the background task "busy" flag)
//! - [`Text`] - single string with optional length limit
//! - [`Progress`] - fraction in `[0, 1]` or indeterminate
//! - [`Selection`] - option list with an optional selected index

pub mod progress;
pub mod selection;
pub mod text;
pub mod toggle;

pub use actstack_core::{Binding, Model};
pub use progress::Progress;
pub use selection::Selection;
pub use text::Text;
pub use toggle::Toggle;
