#![forbid(unsafe_code)]

//! Error taxonomy shared by every actstack crate.

use std::fmt;

/// Errors raised at the call site of a public constructor or setter.
///
/// None of these leave partial mutations behind: the check happens before
/// any state is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Null, empty, or out-of-range input.
    InvalidArgument(String),
    /// Operation not allowed in the current state (detached model, wrong
    /// thread, missing context).
    IllegalState(String),
    /// Serialized data that cannot be trusted (bad mode ordinal, malformed
    /// payload).
    Corruption(String),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn illegal(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::IllegalState(msg) => write!(f, "illegal state: {msg}"),
            Error::Corruption(msg) => write!(f, "data corruption: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
