#![forbid(unsafe_code)]

//! The activity contract and its lifecycle state machine.
//!
//! ```text
//! Constructed ──init──▶ Initialized ──open──▶ Open ◀──passivate── Active
//!                                              │  ──activate──▶
//!                                              └──close──▶ Closed
//!   any live state ──destroy──▶ Destroyed
//! ```
//!
//! The stack drives every transition through [`Lifecycle`], which rejects
//! out-of-order calls with [`ActivityError::IllegalTransition`]. Activities
//! only implement the callbacks; they never see an invalid sequence.

use crate::context::ActivityContext;
use crate::error::{ActivityError, ActivityResult};
use crate::launch::{ActivityLaunch, ActivityResponse};
use actstack_core::{DataInput, DataOutput};

/// Lifecycle position of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityState {
    Constructed,
    Initialized,
    Open,
    Active,
    Closed,
    Destroyed,
}

impl ActivityState {
    /// Open or Active.
    #[inline]
    pub fn is_live(self) -> bool {
        matches!(self, ActivityState::Open | ActivityState::Active)
    }
}

/// Transition validator for one activity.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: ActivityState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: ActivityState::Constructed,
        }
    }
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> ActivityState {
        self.state
    }

    /// Whether `to` is reachable from the current state in one step.
    pub fn allows(&self, to: ActivityState) -> bool {
        use ActivityState::*;
        matches!(
            (self.state, to),
            (Constructed, Initialized)
                | (Initialized, Open)
                | (Open, Active)
                | (Active, Open)
                | (Open, Closed)
                | (Constructed | Initialized | Open | Active | Closed, Destroyed)
        )
    }

    /// Move to `to`, or report the illegal transition.
    pub fn advance(&mut self, to: ActivityState) -> ActivityResult<()> {
        if !self.allows(to) {
            return Err(ActivityError::IllegalTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

/// A stack-managed unit of interaction.
///
/// Only [`open`](Activity::open) is mandatory. Every callback runs on the
/// owning thread with the activity's context, through which it binds models,
/// requests launches, and concludes itself.
pub trait Activity {
    /// Called once after construction, before any display exists.
    ///
    /// An error here fails the launch.
    fn init(&mut self, ctx: &mut ActivityContext) -> ActivityResult<()> {
        let _ = ctx;
        Ok(())
    }

    /// Establish display contents from the launch input and, when restoring,
    /// from the payload written by an earlier [`close`](Activity::close).
    fn open(&mut self, ctx: &mut ActivityContext, saved: Option<&DataInput>) -> ActivityResult<()>;

    /// Entered the foreground. May be called many times.
    fn activate(&mut self, ctx: &mut ActivityContext) {
        let _ = ctx;
    }

    /// Left the foreground. May be called many times.
    fn passivate(&mut self, ctx: &mut ActivityContext) {
        let _ = ctx;
    }

    /// Last chance to write state before teardown.
    fn close(&mut self, ctx: &mut ActivityContext, out: &mut DataOutput) -> ActivityResult<()> {
        let _ = (ctx, out);
        Ok(())
    }

    /// Final teardown. Must not fail.
    fn destroy(&mut self, ctx: &mut ActivityContext) {
        let _ = ctx;
    }

    /// Asked to take over a new launch instead of a fresh instance.
    ///
    /// Return `Some(Open)` or `Some(Active)` to accept. `None` or any other
    /// state refuses, and the launch builds a fresh instance.
    fn relaunch(
        &mut self,
        ctx: &mut ActivityContext,
        launch: &ActivityLaunch,
    ) -> Option<ActivityState> {
        let _ = (ctx, launch);
        None
    }

    /// A reply to a launch this activity requested for `component`.
    fn on_response(
        &mut self,
        ctx: &mut ActivityContext,
        component: &str,
        response: ActivityResponse,
    ) {
        let _ = (ctx, component, response);
    }

    /// Host input addressed to this activity (key, pointer, or widget
    /// events already reduced to key-value form).
    fn on_input(&mut self, ctx: &mut ActivityContext, input: &DataInput) -> ActivityResult<()> {
        let _ = (ctx, input);
        Ok(())
    }

    /// Called once per host turn on the owning thread; drain marshaled work
    /// here.
    fn poll(&mut self, ctx: &mut ActivityContext) {
        let _ = ctx;
    }
}
