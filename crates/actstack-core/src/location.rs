#![forbid(unsafe_code)]

//! Interned install-location names.
//!
//! Two tiers:
//!
//! - a fixed canonical set (`system`, `user`, `removable`, `builtin`) built
//!   once per process and never freed;
//! - a [`LocationTable`] cache for ad hoc names. The cache holds only `Weak`
//!   references, so it never keeps a name alive by itself; dead entries are
//!   evicted on [`LocationTable::purge`] and opportunistically on insert.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, Weak};

const CANONICAL_NAMES: [&str; 4] = ["system", "user", "removable", "builtin"];

fn canonical() -> &'static HashMap<&'static str, Location> {
    static CANONICAL: OnceLock<HashMap<&'static str, Location>> = OnceLock::new();
    CANONICAL.get_or_init(|| {
        CANONICAL_NAMES
            .iter()
            .map(|name| (*name, Location(Arc::from(*name))))
            .collect()
    })
}

/// An interned location name. Equal names from the same table share storage.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location(Arc<str>);

impl Location {
    fn canonical(name: &str) -> Location {
        canonical()
            .get(name)
            .cloned()
            .unwrap_or_else(|| Location(Arc::from(name)))
    }

    pub fn system() -> Location {
        Self::canonical("system")
    }

    pub fn user() -> Location {
        Self::canonical("user")
    }

    pub fn removable() -> Location {
        Self::canonical("removable")
    }

    pub fn builtin() -> Location {
        Self::canonical("builtin")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is one of the process-wide canonical names.
    pub fn is_canonical(&self) -> bool {
        canonical()
            .get(&*self.0)
            .is_some_and(|c| Arc::ptr_eq(&c.0, &self.0))
    }

    /// Whether two locations share storage.
    pub fn same_as(&self, other: &Location) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location({})", self.0)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Weak cache of ad hoc location names.
#[derive(Default)]
pub struct LocationTable {
    cache: Mutex<HashMap<Box<str>, Weak<str>>>,
}

impl LocationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `name`, returning the canonical or cached instance when alive.
    pub fn intern(&self, name: &str) -> Result<Location> {
        if name.is_empty() {
            return Err(Error::invalid("location name must not be empty"));
        }
        if let Some(loc) = canonical().get(name) {
            return Ok(loc.clone());
        }
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| Error::illegal("location cache lock poisoned"))?;
        if let Some(live) = cache.get(name).and_then(Weak::upgrade) {
            return Ok(Location(live));
        }
        cache.retain(|_, weak| weak.strong_count() > 0);
        let strong: Arc<str> = Arc::from(name);
        cache.insert(name.into(), Arc::downgrade(&strong));
        Ok(Location(strong))
    }

    /// Drop cache entries nobody references any more. Returns how many.
    pub fn purge(&self) -> usize {
        let Ok(mut cache) = self.cache.lock() else {
            return 0;
        };
        let before = cache.len();
        cache.retain(|_, weak| weak.strong_count() > 0);
        before - cache.len()
    }

    /// Number of cached (possibly dead) ad hoc entries.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl fmt::Debug for LocationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationTable")
            .field("cached", &self.cached_len())
            .finish()
    }
}
