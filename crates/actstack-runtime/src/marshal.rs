#![forbid(unsafe_code)]

//! Marshaling work onto the owning thread.
//!
//! [`channel`] returns a [`Performer`] that any thread may clone and use to
//! queue closures, and a [`MainLoop`] that runs them against the owner's
//! state. Jobs from one performer run in the order they were queued.
//!
//! The main loop remembers the thread that created it and refuses to run
//! jobs anywhere else, so a closure handed `&mut T` is always on the same
//! thread as the models it touches.

use actstack_core::{Error, Result};
use std::any::Any;
use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::thread::{self, ThreadId};
use std::time::Duration;

/// A queued closure.
pub type Job<T> = Box<dyn FnOnce(&mut T) + Send>;

/// Create a connected performer and main loop owned by the calling thread.
pub fn channel<T>() -> (Performer<T>, MainLoop<T>) {
    let (tx, rx) = mpsc::channel();
    (
        Performer { tx },
        MainLoop {
            rx,
            owner: thread::current().id(),
        },
    )
}

/// Send side. `Send + Clone`.
pub struct Performer<T> {
    tx: mpsc::Sender<Job<T>>,
}

impl<T> Clone for Performer<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Performer<T> {
    /// Queue `job` to run on the owning thread.
    ///
    /// Fails with [`Error::IllegalState`] once the main loop is gone.
    pub fn perform(&self, job: impl FnOnce(&mut T) + Send + 'static) -> Result<()> {
        self.tx
            .send(Box::new(job))
            .map_err(|_| Error::IllegalState("main loop is gone".into()))
    }
}

impl<T> fmt::Debug for Performer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Performer").finish_non_exhaustive()
    }
}

/// Receive side, bound to the thread that called [`channel`].
pub struct MainLoop<T> {
    rx: mpsc::Receiver<Job<T>>,
    owner: ThreadId,
}

impl<T> MainLoop<T> {
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    fn check_owner(&self) -> Result<()> {
        if thread::current().id() != self.owner {
            return Err(Error::IllegalState(
                "main loop driven off its owning thread".into(),
            ));
        }
        Ok(())
    }

    /// Run every job queued so far. Returns how many ran.
    pub fn run_pending(&self, target: &mut T) -> Result<usize> {
        self.check_owner()?;
        let mut ran = 0;
        loop {
            match self.rx.try_recv() {
                Ok(job) => {
                    job(target);
                    ran += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return Ok(ran),
            }
        }
    }

    /// Block until one job runs. `Ok(false)` once every performer is gone.
    pub fn run_one(&self, target: &mut T) -> Result<bool> {
        self.check_owner()?;
        match self.rx.recv() {
            Ok(job) => {
                job(target);
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    /// Wait up to `timeout` for one job. `Ok(false)` on timeout or when
    /// every performer is gone.
    pub fn run_one_timeout(&self, target: &mut T, timeout: Duration) -> Result<bool> {
        self.check_owner()?;
        match self.rx.recv_timeout(timeout) {
            Ok(job) => {
                job(target);
                Ok(true)
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => Ok(false),
        }
    }
}

impl<T> fmt::Debug for MainLoop<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainLoop")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_run_in_order() {
        let (performer, main) = channel::<Vec<u32>>();
        for i in 0..5 {
            performer.perform(move |v| v.push(i)).unwrap();
        }
        let mut seen = Vec::new();
        assert_eq!(main.run_pending(&mut seen).unwrap(), 5);
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn jobs_from_workers_run_on_owner() {
        let (performer, main) = channel::<Vec<ThreadId>>();
        let worker = thread::spawn(move || {
            performer
                .perform(|v| v.push(thread::current().id()))
                .unwrap();
        });
        worker.join().unwrap();
        let mut threads = Vec::new();
        assert!(main.run_one(&mut threads).unwrap());
        assert_eq!(threads, vec![thread::current().id()]);
        assert!(!main.run_one(&mut threads).unwrap());
    }

    #[test]
    fn foreign_thread_cannot_drive() {
        let (_performer, main) = channel::<u32>();
        let result = thread::spawn(move || main.run_pending(&mut 0)).join().unwrap();
        assert!(matches!(result, Err(Error::IllegalState(_))));
    }

    #[test]
    fn perform_after_main_loop_dropped() {
        let (performer, main) = channel::<u32>();
        drop(main);
        assert!(performer.perform(|_| {}).is_err());
    }

    #[test]
    fn timeout_returns_false() {
        let (_performer, main) = channel::<u32>();
        assert!(
            !main
                .run_one_timeout(&mut 0, Duration::from_millis(5))
                .unwrap()
        );
    }
}
