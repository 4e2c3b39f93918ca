#![forbid(unsafe_code)]

//! The explicitly constructed root object.
//!
//! A [`Runtime`] owns the app registry, the interface registry, and the
//! built-in table. Stacks and task runners are created from it and share
//! those tables. Nothing here is global: tearing a runtime down is an
//! explicit [`Runtime::shutdown`].

use crate::app::{AppInstance, Application, Bundle};
use crate::builtins::Builtins;
use crate::config::RuntimeConfig;
use crate::error::ActivityResult;
use crate::marshal::Performer;
use crate::registry::{AppRegistry, InterfaceRegistry};
use crate::stack::ActivityStack;
use crate::task::TaskRunner;
use actstack_core::Identity;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
pub struct Runtime {
    config: RuntimeConfig,
    interfaces: Arc<InterfaceRegistry>,
    apps: Arc<AppRegistry>,
    builtins: Arc<Builtins>,
    shut_down: AtomicBool,
}

impl Runtime {
    /// A runtime with the standard built-ins.
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_builtins(config, Builtins::standard())
    }

    pub fn with_builtins(config: RuntimeConfig, builtins: Builtins) -> Self {
        let interfaces = Arc::new(InterfaceRegistry::new());
        let apps = Arc::new(AppRegistry::new(Arc::clone(&interfaces)));
        tracing::info!(
            max_depth = config.max_depth,
            max_requests = config.max_requests_per_turn,
            builtins = builtins.len(),
            "runtime started"
        );
        Self {
            config,
            interfaces,
            apps,
            builtins: Arc::new(builtins),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn interfaces(&self) -> &Arc<InterfaceRegistry> {
        &self.interfaces
    }

    pub fn apps(&self) -> &Arc<AppRegistry> {
        &self.apps
    }

    pub fn builtins(&self) -> &Arc<Builtins> {
        &self.builtins
    }

    pub fn install(
        &self,
        bundle: Bundle,
        application: Box<dyn Application>,
        location: &str,
    ) -> ActivityResult<Arc<AppInstance>> {
        self.apps.install(bundle, application, location)
    }

    pub fn uninstall(&self, identity: &Identity) -> ActivityResult<bool> {
        self.apps.uninstall(identity)
    }

    /// A new empty stack sharing this runtime's tables.
    pub fn stack(&self) -> ActivityStack {
        ActivityStack::new(
            self.config.clone(),
            Arc::clone(&self.apps),
            Arc::clone(&self.builtins),
        )
    }

    /// A task runner whose workers use the configured thread name.
    pub fn task_runner<T: 'static>(&self, performer: Performer<T>) -> TaskRunner<T> {
        TaskRunner::new(performer, self.config.task_thread_name.clone())
    }

    /// Stop every app and clear the interface registry. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.apps.shutdown();
        self.interfaces.clear();
        tracing::info!("runtime shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
