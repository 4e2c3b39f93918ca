#![forbid(unsafe_code)]

//! Applications, their bundles, and activity instantiation.
//!
//! An installed app is an [`AppInstance`]: the app's [`Bundle`] (static
//! activity details plus an explicit factory table) and its live
//! [`Application`] object. Instantiation asks the application first and
//! falls back to the bundle factory; every fault on that path is caught and
//! logged so a broken app can never take the stack down.

use crate::activity::Activity;
use crate::error::{ActivityError, ActivityResult};
use crate::instance::{ActivityInstance, DefaultAction};
use crate::marshal::panic_message;
use crate::registry::InterfaceRegistry;
use actstack_core::{ActivityId, Error, Identity, Location};
use rustc_hash::FxHashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

/// Produces a fresh activity object.
pub type ActivityFactory = Arc<dyn Fn() -> ActivityResult<Box<dyn Activity>> + Send + Sync>;

/// What an app is given when it starts.
#[derive(Debug, Clone)]
pub struct Environment {
    pub identity: Identity,
    pub location: Location,
    pub interfaces: Arc<InterfaceRegistry>,
}

/// App-level callbacks.
pub trait Application: Send {
    /// Called once when the app starts.
    fn init(&mut self, env: &Environment) -> ActivityResult<()> {
        let _ = env;
        Ok(())
    }

    /// Build the activity for `id`, or `Ok(None)` to use the bundle factory.
    fn create_activity(&mut self, id: &ActivityId) -> ActivityResult<Option<Box<dyn Activity>>> {
        let _ = id;
        Ok(None)
    }

    /// Called once when the app stops.
    fn destroy(&mut self) {}
}

/// Application with no behaviour of its own.
#[derive(Debug, Default)]
pub struct BundleOnly;

impl Application for BundleOnly {}

/// Static description of one activity an app provides.
#[derive(Debug, Clone)]
pub struct ActivityDetails {
    pub id: ActivityId,
    /// Factory key in the bundle.
    pub kind: String,
    pub default_action: DefaultAction,
}

/// An app's declared activities and factories.
pub struct Bundle {
    identity: Identity,
    details: FxHashMap<ActivityId, ActivityDetails>,
    factories: FxHashMap<String, ActivityFactory>,
}

impl Bundle {
    pub fn builder(identity: Identity) -> BundleBuilder {
        BundleBuilder {
            identity,
            details: FxHashMap::default(),
            factories: FxHashMap::default(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn details(&self, id: &ActivityId) -> Option<&ActivityDetails> {
        self.details.get(id)
    }

    pub fn factory(&self, kind: &str) -> Option<&ActivityFactory> {
        self.factories.get(kind)
    }

    pub fn activity_ids(&self) -> impl Iterator<Item = &ActivityId> {
        self.details.keys()
    }
}

impl fmt::Debug for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundle")
            .field("identity", &self.identity)
            .field("activities", &self.details.len())
            .field("factories", &self.factories.len())
            .finish()
    }
}

/// Builder for [`Bundle`].
#[must_use]
pub struct BundleBuilder {
    identity: Identity,
    details: FxHashMap<ActivityId, ActivityDetails>,
    factories: FxHashMap<String, ActivityFactory>,
}

impl BundleBuilder {
    /// Declare activity `id`, built by the factory registered as `kind`.
    pub fn activity(self, id: ActivityId, kind: impl Into<String>) -> Self {
        self.activity_with_action(id, kind, DefaultAction::Conclude)
    }

    pub fn activity_with_action(
        mut self,
        id: ActivityId,
        kind: impl Into<String>,
        default_action: DefaultAction,
    ) -> Self {
        self.details.insert(
            id.clone(),
            ActivityDetails {
                id,
                kind: kind.into(),
                default_action,
            },
        );
        self
    }

    pub fn factory(
        mut self,
        kind: impl Into<String>,
        f: impl Fn() -> ActivityResult<Box<dyn Activity>> + Send + Sync + 'static,
    ) -> Self {
        self.factories.insert(kind.into(), Arc::new(f));
        self
    }

    /// Fails on an empty factory kind.
    pub fn build(self) -> ActivityResult<Bundle> {
        if let Some(d) = self.details.values().find(|d| d.kind.is_empty()) {
            return Err(Error::InvalidArgument(format!("activity {} has an empty kind", d.id)).into());
        }
        Ok(Bundle {
            identity: self.identity,
            details: self.details,
            factories: self.factories,
        })
    }
}

/// A live installed app.
pub struct AppInstance {
    serial: u64,
    bundle: Bundle,
    location: Location,
    application: Mutex<Box<dyn Application>>,
}

impl AppInstance {
    pub(crate) fn new(
        serial: u64,
        bundle: Bundle,
        location: Location,
        application: Box<dyn Application>,
    ) -> Self {
        Self {
            serial,
            bundle,
            location,
            application: Mutex::new(application),
        }
    }

    pub fn identity(&self) -> &Identity {
        self.bundle.identity()
    }

    /// Registry-assigned instance number, unique per process.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    pub(crate) fn start(&self, env: &Environment) -> ActivityResult<()> {
        let mut app = self
            .application
            .lock()
            .map_err(|_| ActivityError::failed("application lock poisoned"))?;
        match panic::catch_unwind(AssertUnwindSafe(|| app.init(env))) {
            Ok(result) => result,
            Err(payload) => Err(ActivityError::failed(format!(
                "init panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }

    pub(crate) fn stop(&self) {
        let Ok(mut app) = self.application.lock() else {
            tracing::error!(app = %self.identity(), "application lock poisoned, skipping destroy");
            return;
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| app.destroy())) {
            tracing::error!(
                app = %self.identity(),
                panic = %panic_message(payload.as_ref()),
                "application destroy panicked"
            );
        }
    }

    /// Build a fresh instance of `activity_id`, or `None` if this app
    /// cannot provide one. Never panics.
    pub fn instantiate_activity(&self, activity_id: &ActivityId) -> Option<ActivityInstance> {
        let Some(details) = self.bundle.details(activity_id) else {
            tracing::info!(
                activity = %activity_id,
                app = %self.identity(),
                "no activity details in bundle"
            );
            return None;
        };

        let from_app = {
            let Ok(mut app) = self.application.lock() else {
                self.log_fault(activity_id, "application lock poisoned");
                return None;
            };
            panic::catch_unwind(AssertUnwindSafe(|| app.create_activity(activity_id)))
        };
        let activity = match from_app {
            Ok(Ok(Some(activity))) => activity,
            Ok(Ok(None)) => self.from_factory(details)?,
            Ok(Err(e)) => {
                self.log_fault(activity_id, &e.to_string());
                return None;
            }
            Err(payload) => {
                self.log_fault(activity_id, &panic_message(payload.as_ref()));
                return None;
            }
        };

        Some(ActivityInstance::new(
            Some(self.identity().clone()),
            activity,
            details.default_action.clone(),
        ))
    }

    fn from_factory(&self, details: &ActivityDetails) -> Option<Box<dyn Activity>> {
        let Some(factory) = self.bundle.factory(&details.kind) else {
            self.log_fault(&details.id, &format!("no factory for kind {:?}", details.kind));
            return None;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| factory())) {
            Ok(Ok(activity)) => Some(activity),
            Ok(Err(e)) => {
                self.log_fault(&details.id, &e.to_string());
                None
            }
            Err(payload) => {
                self.log_fault(&details.id, &panic_message(payload.as_ref()));
                None
            }
        }
    }

    fn log_fault(&self, activity_id: &ActivityId, reason: &str) {
        tracing::error!(
            activity = %activity_id,
            app = %self.identity(),
            app_instance = self.serial,
            reason,
            "activity instantiation failed"
        );
    }
}

impl fmt::Debug for AppInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppInstance")
            .field("serial", &self.serial)
            .field("identity", self.identity())
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ActivityContext;
    use actstack_core::DataInput;
    use tracing_test::traced_test;

    struct Blank;

    impl Activity for Blank {
        fn open(&mut self, _: &mut ActivityContext, _: Option<&DataInput>) -> ActivityResult<()> {
            Ok(())
        }
    }

    struct Panicky;

    impl Application for Panicky {
        fn create_activity(&mut self, id: &ActivityId) -> ActivityResult<Option<Box<dyn Activity>>> {
            match id.as_str() {
                "boom" => panic!("create_activity exploded"),
                "err" => Err(ActivityError::failed("refused")),
                "own" => Ok(Some(Box::new(Blank))),
                _ => Ok(None),
            }
        }
    }

    fn id(s: &str) -> ActivityId {
        ActivityId::new(s).unwrap()
    }

    fn app(application: Box<dyn Application>) -> AppInstance {
        let bundle = Bundle::builder(Identity::new("org.example.app").unwrap())
            .activity(id("main"), "blank")
            .activity(id("boom"), "blank")
            .activity(id("err"), "blank")
            .activity(id("own"), "unregistered")
            .activity(id("broken"), "faulty")
            .activity(id("orphan"), "unregistered")
            .factory("blank", || Ok(Box::new(Blank)))
            .factory("faulty", || panic!("factory exploded"))
            .build()
            .unwrap();
        AppInstance::new(7, bundle, Location::user(), application)
    }

    #[test]
    #[traced_test]
    fn missing_activity_logs_once_at_info() {
        let app = app(Box::new(BundleOnly));
        assert!(app.instantiate_activity(&id("missing_activity")).is_none());
        logs_assert(|lines: &[&str]| {
            let hits = lines
                .iter()
                .filter(|l| l.contains(" INFO ") && l.contains("missing_activity"))
                .count();
            if hits == 1 {
                Ok(())
            } else {
                Err(format!("expected one info line, got {hits}"))
            }
        });
    }

    #[test]
    fn factory_fallback_when_app_declines() {
        let app = app(Box::new(BundleOnly));
        let inst = app.instantiate_activity(&id("main")).unwrap();
        assert_eq!(inst.identity().map(Identity::as_str), Some("org.example.app"));
    }

    #[test]
    fn app_provided_activity_skips_factory() {
        let app = app(Box::new(Panicky));
        assert!(app.instantiate_activity(&id("own")).is_some());
    }

    #[test]
    #[traced_test]
    fn faults_are_contained() {
        let app = app(Box::new(Panicky));
        assert!(app.instantiate_activity(&id("boom")).is_none());
        assert!(app.instantiate_activity(&id("err")).is_none());
        assert!(app.instantiate_activity(&id("broken")).is_none());
        assert!(app.instantiate_activity(&id("orphan")).is_none());
        assert!(logs_contain("activity instantiation failed"));
        assert!(logs_contain("create_activity exploded"));

        // The lock survived the panic.
        assert!(app.instantiate_activity(&id("main")).is_some());
    }

    #[test]
    fn empty_kind_rejected() {
        let err = Bundle::builder(Identity::new("a").unwrap())
            .activity(id("x"), "")
            .build()
            .unwrap_err();
        assert!(matches!(err, ActivityError::Core(Error::InvalidArgument(_))));
    }
}
