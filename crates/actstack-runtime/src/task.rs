#![forbid(unsafe_code)]

//! Background task bridge.
//!
//! A [`Task`] does its work on a worker thread and reports back on the
//! owning thread through a [`Performer`]. A task spawned with its own toggle
//! ([`TaskRunner::spawn_with_toggle`]) makes the owner observe, in order:
//!
//! 1. the task's [`Toggle`] switched on,
//! 2. the toggle switched off (always, whatever `process` did),
//! 3. exactly one of [`Task::process_success`] or [`Task::process_failure`].
//!
//! The runner-wide toggle ([`TaskRunner::with_toggle`]) is shared, so it is
//! switched on when the first task starts and off when the last in-flight
//! task finishes. Steps 2 and 3 keep their order for every task.
//!
//! A panic inside `process` is caught and reported as
//! [`TaskFailure::Panicked`]. If the worker thread cannot even be spawned
//! the task is recovered and steps 2 and 3 still happen, with
//! [`TaskFailure::Spawn`].

use crate::marshal::{Performer, panic_message};
use actstack_models::Toggle;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Boxed error returned by [`Task::process`].
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Why a task did not succeed.
#[derive(Debug)]
pub enum TaskFailure {
    /// `process` returned an error.
    Error(BoxError),
    /// `process` panicked.
    Panicked(String),
    /// No worker thread could be started.
    Spawn(io::Error),
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Error(e) => write!(f, "task failed: {e}"),
            TaskFailure::Panicked(msg) => write!(f, "task panicked: {msg}"),
            TaskFailure::Spawn(e) => write!(f, "task thread spawn failed: {e}"),
        }
    }
}

impl StdError for TaskFailure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            TaskFailure::Error(e) => Some(e.as_ref()),
            TaskFailure::Spawn(e) => Some(e),
            TaskFailure::Panicked(_) => None,
        }
    }
}

/// Work split between a worker thread and the owning thread.
pub trait Task<T>: Send + 'static {
    type Output: Send + 'static;

    /// Runs on the worker thread.
    fn process(&mut self) -> Result<Self::Output, BoxError>;

    /// Runs on the owning thread after a successful `process`.
    fn process_success(self, target: &mut T, output: Self::Output);

    /// Runs on the owning thread after a failed or panicking `process`.
    fn process_failure(self, target: &mut T, failure: TaskFailure);
}

/// Locates the busy toggle inside the owner's state.
pub type ToggleAccess<T> = fn(&mut T) -> &mut Toggle;

/// Which toggle a task drives, and how.
enum Busy<T> {
    /// Owned by one task: on at start, off at finish.
    Task(ToggleAccess<T>),
    /// Shared by a runner: flips only when the in-flight count leaves or
    /// returns to zero. The count lives on the owning thread's side.
    Runner(ToggleAccess<T>, Arc<AtomicUsize>),
}

impl<T> Clone for Busy<T> {
    fn clone(&self) -> Self {
        match self {
            Busy::Task(access) => Busy::Task(*access),
            Busy::Runner(access, count) => Busy::Runner(*access, Arc::clone(count)),
        }
    }
}

/// Spawns tasks and tracks their worker threads.
pub struct TaskRunner<T> {
    performer: Performer<T>,
    toggle: Option<Busy<T>>,
    thread_name: String,
    handles: Vec<JoinHandle<()>>,
}

impl<T: 'static> TaskRunner<T> {
    pub fn new(performer: Performer<T>, thread_name: impl Into<String>) -> Self {
        Self {
            performer,
            toggle: None,
            thread_name: thread_name.into(),
            handles: Vec::new(),
        }
    }

    /// Drive `access(target)` on while any task of this runner runs.
    #[must_use]
    pub fn with_toggle(mut self, access: ToggleAccess<T>) -> Self {
        self.toggle = Some(Busy::Runner(access, Arc::new(AtomicUsize::new(0))));
        self
    }

    /// Start `task` on a new worker thread, bracketed by the runner toggle.
    pub fn spawn<K: Task<T>>(&mut self, task: K) {
        let toggle = self.toggle.clone();
        self.start(task, toggle);
    }

    /// Start `task` bracketed by its own toggle instead of the runner's.
    pub fn spawn_with_toggle<K: Task<T>>(&mut self, task: K, access: ToggleAccess<T>) {
        self.start(task, Some(Busy::Task(access)));
    }

    fn start<K: Task<T>>(&mut self, task: K, toggle: Option<Busy<T>>) {
        self.reap_finished();
        set_busy(&self.performer, toggle.clone(), true);

        let slot = Arc::new(Mutex::new(Some(task)));
        let worker_slot = Arc::clone(&slot);
        let performer = self.performer.clone();
        let worker_toggle = toggle.clone();
        let spawned = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                let Some(mut task) = worker_slot.lock().ok().and_then(|mut t| t.take()) else {
                    return;
                };
                let outcome = match panic::catch_unwind(AssertUnwindSafe(|| task.process())) {
                    Ok(Ok(output)) => Ok(output),
                    Ok(Err(e)) => Err(TaskFailure::Error(e)),
                    Err(payload) => {
                        let msg = panic_message(payload.as_ref());
                        tracing::error!(panic = %msg, "background task panicked");
                        Err(TaskFailure::Panicked(msg))
                    }
                };
                finish(&performer, worker_toggle, task, outcome);
            });

        match spawned {
            Ok(handle) => self.handles.push(handle),
            Err(e) => {
                tracing::warn!(error = %e, thread = %self.thread_name, "cannot spawn task thread");
                let recovered = slot.lock().ok().and_then(|mut t| t.take());
                if let Some(task) = recovered {
                    finish(&self.performer, toggle, task, Err(TaskFailure::Spawn(e)));
                }
            }
        }
    }

    /// Number of workers not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.handles.len()
    }

    /// Join finished workers, logging any that died outside `process`.
    pub fn reap_finished(&mut self) -> usize {
        if self.handles.is_empty() {
            return 0;
        }
        let mut reaped = 0;
        let mut remaining = Vec::with_capacity(self.handles.len());
        for handle in self.handles.drain(..) {
            if handle.is_finished() {
                if let Err(payload) = handle.join() {
                    let msg = panic_message(payload.as_ref());
                    tracing::error!("task thread panicked: {msg}");
                }
                reaped += 1;
            } else {
                remaining.push(handle);
            }
        }
        self.handles = remaining;
        reaped
    }

    /// Block until every worker has exited.
    pub fn join_all(&mut self) {
        for handle in self.handles.drain(..) {
            if let Err(payload) = handle.join() {
                let msg = panic_message(payload.as_ref());
                tracing::error!("task thread panicked: {msg}");
            }
        }
    }
}

impl<T> fmt::Debug for TaskRunner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRunner")
            .field("thread_name", &self.thread_name)
            .field("in_flight", &self.handles.len())
            .field("toggle", &self.toggle.is_some())
            .finish()
    }
}

fn set_busy<T: 'static>(performer: &Performer<T>, toggle: Option<Busy<T>>, busy: bool) {
    let Some(toggle) = toggle else {
        return;
    };
    let queued = performer.perform(move |target| {
        let access = match toggle {
            Busy::Task(access) => access,
            Busy::Runner(access, count) => {
                let edge = if busy {
                    count.fetch_add(1, Ordering::AcqRel) == 0
                } else {
                    count.fetch_sub(1, Ordering::AcqRel) == 1
                };
                if !edge {
                    return;
                }
                access
            }
        };
        if let Err(e) = access(target).checked(busy) {
            tracing::warn!(error = %e, busy, "cannot update task toggle");
        }
    });
    if queued.is_err() {
        tracing::debug!(busy, "main loop gone, toggle update dropped");
    }
}

fn finish<T: 'static, K: Task<T>>(
    performer: &Performer<T>,
    toggle: Option<Busy<T>>,
    task: K,
    outcome: Result<K::Output, TaskFailure>,
) {
    set_busy(performer, toggle, false);
    let queued = performer.perform(move |target| match outcome {
        Ok(output) => task.process_success(target, output),
        Err(failure) => task.process_failure(target, failure),
    });
    if queued.is_err() {
        tracing::debug!("main loop gone, task result dropped");
    }
}
