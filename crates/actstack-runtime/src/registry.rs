#![forbid(unsafe_code)]

//! Installed apps and shared service interfaces.
//!
//! Each registry guards its table with a single mutex. Locks are never held
//! while calling into an application.

use crate::app::{AppInstance, Application, Bundle, Environment};
use crate::error::{ActivityError, ActivityResult};
use actstack_core::{Error, Identity, LocationTable};
use rustc_hash::FxHashMap;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Named, type-erased services apps can look up through their
/// [`Environment`].
#[derive(Default)]
pub struct InterfaceRegistry {
    table: Mutex<FxHashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl InterfaceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service` under `name`, returning whether it replaced one.
    pub fn register<S: Any + Send + Sync>(&self, name: impl Into<String>, service: Arc<S>) -> ActivityResult<bool> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidArgument("interface name must not be empty".into()).into());
        }
        let mut table = self.lock()?;
        Ok(table.insert(name, service).is_some())
    }

    /// Look up `name` as an `S`. `None` when absent or of another type.
    pub fn get<S: Any + Send + Sync>(&self, name: &str) -> Option<Arc<S>> {
        let service = self.table.lock().ok()?.get(name).cloned()?;
        service.downcast::<S>().ok()
    }

    pub fn unregister(&self, name: &str) -> ActivityResult<bool> {
        Ok(self.lock()?.remove(name).is_some())
    }

    pub fn len(&self) -> usize {
        self.table.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn clear(&self) {
        if let Ok(mut table) = self.table.lock() {
            table.clear();
        }
    }

    fn lock(
        &self,
    ) -> ActivityResult<std::sync::MutexGuard<'_, FxHashMap<String, Arc<dyn Any + Send + Sync>>>> {
        self.table
            .lock()
            .map_err(|_| ActivityError::failed("interface registry lock poisoned"))
    }
}

impl fmt::Debug for InterfaceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceRegistry")
            .field("interfaces", &self.len())
            .finish()
    }
}

/// Installed applications keyed by identity.
pub struct AppRegistry {
    apps: Mutex<FxHashMap<Identity, Arc<AppInstance>>>,
    locations: LocationTable,
    interfaces: Arc<InterfaceRegistry>,
    next_serial: AtomicU64,
}

impl AppRegistry {
    pub fn new(interfaces: Arc<InterfaceRegistry>) -> Self {
        Self {
            apps: Mutex::new(FxHashMap::default()),
            locations: LocationTable::new(),
            interfaces,
            next_serial: AtomicU64::new(1),
        }
    }

    /// Install and start an app at `location`.
    ///
    /// Fails if the identity is already installed or `init` fails; in the
    /// latter case nothing stays installed.
    pub fn install(
        &self,
        bundle: Bundle,
        application: Box<dyn Application>,
        location: &str,
    ) -> ActivityResult<Arc<AppInstance>> {
        let identity = bundle.identity().clone();
        if self.lock()?.contains_key(&identity) {
            return Err(Error::IllegalState(format!("{identity} is already installed")).into());
        }
        let location = self.locations.intern(location)?;
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let app = Arc::new(AppInstance::new(serial, bundle, location.clone(), application));

        let env = Environment {
            identity: identity.clone(),
            location,
            interfaces: Arc::clone(&self.interfaces),
        };
        app.start(&env)?;

        let mut apps = self.lock()?;
        if apps.contains_key(&identity) {
            drop(apps);
            app.stop();
            return Err(Error::IllegalState(format!("{identity} is already installed")).into());
        }
        apps.insert(identity.clone(), Arc::clone(&app));
        drop(apps);
        tracing::info!(app = %identity, location = %app.location(), serial, "app installed");
        Ok(app)
    }

    /// Stop and remove an app. Returns whether it was installed.
    pub fn uninstall(&self, identity: &Identity) -> ActivityResult<bool> {
        let removed = self.lock()?.remove(identity);
        let Some(app) = removed else {
            return Ok(false);
        };
        app.stop();
        tracing::info!(app = %identity, "app uninstalled");
        Ok(true)
    }

    pub fn get(&self, identity: &Identity) -> Option<Arc<AppInstance>> {
        self.apps.lock().ok()?.get(identity).cloned()
    }

    pub fn identities(&self) -> Vec<Identity> {
        self.apps
            .lock()
            .map(|apps| apps.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.apps.lock().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn locations(&self) -> &LocationTable {
        &self.locations
    }

    /// Stop every app and forget interned locations.
    pub fn shutdown(&self) {
        let drained: Vec<Arc<AppInstance>> = match self.apps.lock() {
            Ok(mut apps) => apps.drain().map(|(_, app)| app).collect(),
            Err(_) => {
                tracing::error!("app registry lock poisoned at shutdown");
                return;
            }
        };
        for app in &drained {
            app.stop();
        }
        drop(drained);
        let purged = self.locations.purge();
        tracing::debug!(purged, "app registry shut down");
    }

    fn lock(&self) -> ActivityResult<std::sync::MutexGuard<'_, FxHashMap<Identity, Arc<AppInstance>>>> {
        self.apps
            .lock()
            .map_err(|_| ActivityError::failed("app registry lock poisoned"))
    }
}

impl fmt::Debug for AppRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppRegistry")
            .field("apps", &self.len())
            .field("locations", &self.locations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::BundleOnly;
    use std::sync::atomic::AtomicUsize;

    struct Counting(Arc<AtomicUsize>, Arc<AtomicUsize>);

    impl Application for Counting {
        fn init(&mut self, env: &Environment) -> ActivityResult<()> {
            assert!(env.location.is_canonical());
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn destroy(&mut self) {
            self.1.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FailingInit;

    impl Application for FailingInit {
        fn init(&mut self, _: &Environment) -> ActivityResult<()> {
            Err(ActivityError::failed("no"))
        }
    }

    fn bundle(name: &str) -> Bundle {
        Bundle::builder(Identity::new(name).unwrap()).build().unwrap()
    }

    #[test]
    fn install_start_uninstall_stop() {
        let registry = AppRegistry::new(Arc::new(InterfaceRegistry::new()));
        let inits = Arc::new(AtomicUsize::new(0));
        let destroys = Arc::new(AtomicUsize::new(0));
        registry
            .install(
                bundle("org.example.a"),
                Box::new(Counting(inits.clone(), destroys.clone())),
                "user",
            )
            .unwrap();
        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert!(registry.get(&Identity::new("org.example.a").unwrap()).is_some());

        assert!(registry.uninstall(&Identity::new("org.example.a").unwrap()).unwrap());
        assert_eq!(destroys.load(Ordering::SeqCst), 1);
        assert!(!registry.uninstall(&Identity::new("org.example.a").unwrap()).unwrap());
    }

    #[test]
    fn duplicate_install_rejected() {
        let registry = AppRegistry::new(Arc::new(InterfaceRegistry::new()));
        registry.install(bundle("a"), Box::new(BundleOnly), "user").unwrap();
        assert!(registry.install(bundle("a"), Box::new(BundleOnly), "user").is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn failed_init_leaves_nothing_installed() {
        let registry = AppRegistry::new(Arc::new(InterfaceRegistry::new()));
        assert!(registry.install(bundle("a"), Box::new(FailingInit), "user").is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn ad_hoc_locations_released_after_shutdown() {
        let registry = AppRegistry::new(Arc::new(InterfaceRegistry::new()));
        registry.install(bundle("a"), Box::new(BundleOnly), "sdcard2").unwrap();
        assert_eq!(registry.locations().cached_len(), 1);
        registry.shutdown();
        assert!(registry.is_empty());
        assert_eq!(registry.locations().cached_len(), 0);
    }

    #[test]
    fn interfaces_are_typed() {
        let interfaces = InterfaceRegistry::new();
        assert!(!interfaces.register("clock", Arc::new(42u32)).unwrap());
        assert_eq!(interfaces.get::<u32>("clock").as_deref(), Some(&42));
        assert!(interfaces.get::<String>("clock").is_none());
        assert!(interfaces.register("", Arc::new(1u8)).is_err());
        assert!(interfaces.unregister("clock").unwrap());
        assert!(interfaces.is_empty());
    }
}
