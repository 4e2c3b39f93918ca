#![forbid(unsafe_code)]

//! Identifier newtypes.
//!
//! String identifiers are validated once at construction so the rest of the
//! system can treat them as opaque and well-formed.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

fn validate(kind: &str, raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(Error::invalid(format!("{kind} must not be empty")));
    }
    if raw.chars().any(char::is_whitespace) {
        return Err(Error::invalid(format!(
            "{kind} must not contain whitespace: {raw:?}"
        )));
    }
    Ok(())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Create a validated ", $kind, ".")]
            pub fn new(raw: impl Into<String>) -> Result<Self> {
                let raw = raw.into();
                validate($kind, &raw)?;
                Ok(Self(raw))
            }

            /// Borrow the identifier text.
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(raw: String) -> Result<Self> {
                Self::new(raw)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

string_id!(
    /// Identity of an installed application bundle (e.g. `org.example.clock`).
    Identity,
    "app identity"
);

string_id!(
    /// Identifier of an activity declared by a bundle or the built-in table.
    ActivityId,
    "activity id"
);

string_id!(
    /// Correlation id tying an `ActivityResponse` back to its request.
    RequestId,
    "request id"
);

impl Identity {
    /// Identity used as the requester for launches issued by built-ins.
    pub fn system() -> Self {
        Self("system".to_owned())
    }
}

/// Runtime id of a live activity slot. Never reused within one stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Id of an activity context. Models record it so their logger can name
/// the context they belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

impl From<InstanceId> for ContextId {
    fn from(id: InstanceId) -> Self {
        Self(id.0)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_whitespace() {
        assert!(matches!(
            ActivityId::new(""),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            Identity::new("org.example clock"),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(RequestId::new("r1").unwrap().as_str(), "r1");
    }

    #[test]
    fn serde_validates_on_the_way_in() {
        let id: ActivityId = serde_json::from_str("\"main\"").unwrap();
        assert_eq!(id.as_str(), "main");
        assert!(serde_json::from_str::<ActivityId>("\"\"").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"main\"");
    }
}
