#![forbid(unsafe_code)]

//! The activity stack.
//!
//! Owns every live activity of one display and turns [`DeferredActivity`]
//! requests into stack transitions.
//!
//! # Launch resolution
//!
//! ```text
//! DeferredActivity
//!   │ anchor: top slot, or last live ancestor (fallback: top)
//!   │ relaunch?  ── live match accepts ──▶ move to top, activate  (Relaunched)
//!   │            └─ refused / none ──▶ fresh instance, not_relaunch
//!   │ instantiate (built-in, target app, or requester's app)
//!   │   └─ failure ──▶ BadAppActivity                           (Placeholder)
//!   └ place: succeed/respond above anchor, replace anchor, detach off-stack
//! ```
//!
//! # Invariants
//!
//! 1. At most one slot is `Active`, and when the stack is non-empty it is the
//!    top slot.
//! 2. A response is delivered only when its request id matches a pending
//!    registration made for the concluding instance, and only to a
//!    requester that is still live. Everything else is dropped silently.
//! 3. Activities never re-enter the stack: requests they make through their
//!    context are queued and drained after the callback returns, at most
//!    `max_requests_per_turn` per drain.
//! 4. Instantiation faults never escape; they become placeholders.

use crate::activity::{Activity, ActivityState, Lifecycle};
use crate::app::AppInstance;
use crate::builtins::{self, Builtins};
use crate::config::RuntimeConfig;
use crate::context::{ActivityContext, Ancestors, ContextRequest};
use crate::error::{ActivityError, ActivityResult};
use crate::instance::{ActivityInstance, DefaultAction};
use crate::launch::{ActivityLaunch, ActivityResponse, DeferredActivity, LaunchBinding, ResponseTarget};
use crate::marshal::panic_message;
use crate::registry::AppRegistry;
use crate::saved_state::{SnapshotEntry, StackSnapshot};
use actstack_core::{ActivityId, DataInput, DataOutput, Error, Identity, InstanceId, Payload, RequestId};
use rustc_hash::FxHashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// How a launch was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// A fresh instance was placed.
    Created(InstanceId),
    /// An existing instance accepted the launch.
    Relaunched(InstanceId),
    /// Instantiation failed and a diagnostic placeholder was placed.
    Placeholder(InstanceId),
}

impl LaunchOutcome {
    pub fn instance(self) -> InstanceId {
        match self {
            LaunchOutcome::Created(id)
            | LaunchOutcome::Relaunched(id)
            | LaunchOutcome::Placeholder(id) => id,
        }
    }
}

struct Slot {
    id: InstanceId,
    identity: Option<Identity>,
    activity_id: ActivityId,
    activity: Box<dyn Activity>,
    default_action: DefaultAction,
    lifecycle: Lifecycle,
    ctx: ActivityContext,
    detached: bool,
}

fn guarded<R>(f: impl FnOnce() -> ActivityResult<R>) -> ActivityResult<R> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(ActivityError::failed(format!(
            "panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}

impl Slot {
    fn start(&mut self, saved: Option<&DataInput>) -> ActivityResult<()> {
        let Slot {
            activity,
            ctx,
            lifecycle,
            ..
        } = self;
        let _span = ctx.span().clone().entered();
        guarded(|| activity.init(ctx))?;
        lifecycle.advance(ActivityState::Initialized)?;
        guarded(|| activity.open(ctx, saved))?;
        lifecycle.advance(ActivityState::Open)
    }

    /// Bring an open slot to the foreground. The slot only becomes `Active`
    /// once the callback returns.
    fn activate(&mut self) -> ActivityResult<()> {
        if self.lifecycle.state() != ActivityState::Open {
            return Ok(());
        }
        let Slot {
            activity,
            ctx,
            lifecycle,
            ..
        } = self;
        let _span = ctx.span().clone().entered();
        guarded(|| {
            activity.activate(ctx);
            Ok(())
        })?;
        lifecycle.advance(ActivityState::Active)?;
        tracing::trace!("activated");
        Ok(())
    }

    fn passivate(&mut self) {
        if self.lifecycle.state() == ActivityState::Active
            && self.lifecycle.advance(ActivityState::Open).is_ok()
        {
            let Slot { activity, ctx, .. } = self;
            let _span = ctx.span().clone().entered();
            let result = guarded(|| {
                activity.passivate(ctx);
                Ok(())
            });
            match result {
                Ok(()) => tracing::trace!("passivated"),
                Err(e) => tracing::error!(error = %e, "passivate failed"),
            }
        }
    }

    /// Passivate, close and destroy. Returns what `close` wrote.
    fn teardown(&mut self) -> Payload {
        self.passivate();
        let _span = self.ctx.span().clone().entered();
        let mut out = DataOutput::new();
        if self.lifecycle.advance(ActivityState::Closed).is_ok() {
            let Slot { activity, ctx, .. } = self;
            if let Err(e) = guarded(|| activity.close(ctx, &mut out)) {
                tracing::warn!(error = %e, "close failed");
            }
        }
        if self.lifecycle.advance(ActivityState::Destroyed).is_ok() {
            let Slot { activity, ctx, .. } = self;
            let destroyed = panic::catch_unwind(AssertUnwindSafe(|| activity.destroy(ctx)));
            if let Err(payload) = destroyed {
                tracing::error!(panic = %panic_message(payload.as_ref()), "destroy panicked");
            }
        }
        let dropped = self.ctx.discard_requests();
        if dropped > 0 {
            tracing::debug!(dropped, "discarded requests of destroyed activity");
        }
        out.finish()
    }
}

enum Place {
    Stack(usize),
    Detached(usize),
}

enum Provider {
    Builtin,
    App(Arc<AppInstance>),
    Missing(String),
}

impl Provider {
    fn identity(&self) -> Option<Identity> {
        match self {
            Provider::App(app) => Some(app.identity().clone()),
            Provider::Builtin | Provider::Missing(_) => None,
        }
    }
}

#[derive(Debug)]
struct PendingRequest {
    requester: InstanceId,
    component: String,
    request_id: RequestId,
}

enum Relaunch {
    Accepted(LaunchOutcome),
    Refused(ActivityLaunch),
    NoCandidate,
}

/// Where a freshly built slot goes.
#[derive(Clone, Copy)]
enum Placement {
    Above(Option<usize>),
    Replace(Option<usize>),
    Detached,
}

/// Stack of activities for one display, plus detached activities.
pub struct ActivityStack {
    config: RuntimeConfig,
    apps: Arc<AppRegistry>,
    builtins: Arc<Builtins>,
    slots: Vec<Slot>,
    detached: Vec<Slot>,
    /// Response routes keyed by the responding instance.
    pending: FxHashMap<InstanceId, PendingRequest>,
    active: Option<InstanceId>,
    next_id: u64,
}

impl ActivityStack {
    pub fn new(config: RuntimeConfig, apps: Arc<AppRegistry>, builtins: Arc<Builtins>) -> Self {
        Self {
            config,
            apps,
            builtins,
            slots: Vec::new(),
            detached: Vec::new(),
            pending: FxHashMap::default(),
            active: None,
            next_id: 1,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// On-stack slot count.
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty() && self.detached.is_empty()
    }

    pub fn top(&self) -> Option<InstanceId> {
        self.slots.last().map(|s| s.id)
    }

    /// On-stack instance ids, bottom first.
    pub fn ids(&self) -> Vec<InstanceId> {
        self.slots.iter().map(|s| s.id).collect()
    }

    pub fn detached_ids(&self) -> Vec<InstanceId> {
        self.detached.iter().map(|s| s.id).collect()
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.locate(id).is_some()
    }

    pub fn state(&self, id: InstanceId) -> Option<ActivityState> {
        self.slot(id).map(|s| s.lifecycle.state())
    }

    pub fn activity_id(&self, id: InstanceId) -> Option<&ActivityId> {
        self.slot(id).map(|s| &s.activity_id)
    }

    pub fn context(&self, id: InstanceId) -> Option<&ActivityContext> {
        self.slot(id).map(|s| &s.ctx)
    }

    /// Number of responses still awaited.
    pub fn pending_responses(&self) -> usize {
        self.pending.len()
    }

    /// Resolve and place `deferred`, then drain any requests it caused.
    pub fn launch(&mut self, deferred: DeferredActivity) -> ActivityResult<LaunchOutcome> {
        let outcome = self.launch_inner(deferred)?;
        self.drain_requests();
        Ok(outcome)
    }

    /// Conclude `id`, delivering `response` if it answers a pending request.
    pub fn conclude(
        &mut self,
        id: InstanceId,
        response: Option<ActivityResponse>,
    ) -> ActivityResult<()> {
        self.conclude_inner(id, response)?;
        self.drain_requests();
        Ok(())
    }

    /// Conclude the top slot without a response. `false` on an empty stack.
    pub fn back(&mut self) -> ActivityResult<bool> {
        let Some(top) = self.top() else {
            return Ok(false);
        };
        self.conclude(top, None)?;
        Ok(true)
    }

    /// Run the top slot's default action.
    pub fn default_action(&mut self) -> ActivityResult<bool> {
        let Some(slot) = self.slots.last_mut() else {
            return Ok(false);
        };
        let action = slot.default_action.clone();
        let ctx = &mut slot.ctx;
        let _span = ctx.span().clone().entered();
        let result = guarded(|| {
            action.run(ctx);
            Ok(())
        });
        drop(_span);
        if let Err(e) = &result {
            tracing::error!(error = %e, "default action failed");
        }
        self.drain_requests();
        result.map(|()| true)
    }

    /// Deliver host input to `id`.
    pub fn send_input(&mut self, id: InstanceId, input: &DataInput) -> ActivityResult<()> {
        let slot = self.slot_mut(id).ok_or(ActivityError::UnknownInstance(id))?;
        let Slot { activity, ctx, .. } = slot;
        let _span = ctx.span().clone().entered();
        let result = guarded(|| activity.on_input(ctx, input));
        drop(_span);
        if let Err(e) = &result {
            tracing::warn!(instance = id.0, error = %e, "input handling failed");
        }
        self.drain_requests();
        result
    }

    /// One host turn: poll every live activity and drain requests.
    ///
    /// Returns the number of requests processed.
    pub fn poll(&mut self) -> usize {
        let ids: Vec<InstanceId> = self
            .slots
            .iter()
            .chain(self.detached.iter())
            .map(|s| s.id)
            .collect();
        for id in ids {
            if let Some(slot) = self.slot_mut(id) {
                let Slot { activity, ctx, .. } = slot;
                let _span = ctx.span().clone().entered();
                let polled = guarded(|| {
                    activity.poll(ctx);
                    Ok(())
                });
                if let Err(e) = polled {
                    tracing::error!(instance = id.0, error = %e, "poll failed");
                }
            }
        }
        self.drain_requests()
    }

    /// Passivate, close and destroy everything, top first, returning what
    /// each activity wrote.
    pub fn suspend(&mut self) -> StackSnapshot {
        if let Some(prev) = self.active.take() {
            if let Some(slot) = self.slot_mut(prev) {
                slot.passivate();
            }
        }
        let mut entries = Vec::with_capacity(self.slots.len() + self.detached.len());
        while let Some(mut slot) = self.slots.pop() {
            entries.push(Self::entry_for(&mut slot));
        }
        entries.reverse();
        for mut slot in std::mem::take(&mut self.detached) {
            entries.push(Self::entry_for(&mut slot));
        }
        self.pending.clear();
        tracing::info!(entries = entries.len(), "stack suspended");
        StackSnapshot { entries }
    }

    fn entry_for(slot: &mut Slot) -> SnapshotEntry {
        let saved = slot.teardown();
        SnapshotEntry {
            app: slot.identity.clone(),
            activity_id: slot.activity_id.clone(),
            detached: slot.detached,
            saved,
        }
    }

    /// Rebuild a suspended stack. The stack must be empty, and the
    /// snapshot's on-stack entries must fit within `max_depth`.
    pub fn resume(&mut self, snapshot: StackSnapshot) -> ActivityResult<Vec<LaunchOutcome>> {
        if !self.is_empty() {
            return Err(Error::IllegalState("resume into a non-empty stack".into()).into());
        }
        let on_stack = snapshot.entries.iter().filter(|e| !e.detached).count();
        if on_stack > self.config.max_depth {
            tracing::warn!(entries = on_stack, max_depth = self.config.max_depth, "snapshot too deep to resume");
            return Err(ActivityError::StackFull {
                depth: self.config.max_depth,
            });
        }
        let mut outcomes = Vec::with_capacity(snapshot.len());
        for entry in snapshot.entries {
            let provider = match &entry.app {
                Some(app) => match self.apps.get(app) {
                    Some(app) => Provider::App(app),
                    None => Provider::Missing(format!("{app} is not installed")),
                },
                None => Provider::Builtin,
            };
            let ancestors: Ancestors = if entry.detached {
                Ancestors::new()
            } else {
                self.slots
                    .last()
                    .map(|s| s.ctx.ancestors().iter().copied().collect())
                    .unwrap_or_default()
            };
            let saved = match entry.saved.decode() {
                Ok(saved) => Ok(saved),
                Err(e) => Err(format!("saved state unreadable: {e}")),
            };
            let placement = if entry.detached {
                Placement::Detached
            } else {
                Placement::Above(self.slots.len().checked_sub(1))
            };
            let instance = match &saved {
                Ok(_) => self.instantiate(&provider, &entry.activity_id),
                Err(reason) => Err(reason.clone()),
            };
            let (outcome, _) = self.build_and_place(
                instance,
                &entry.activity_id,
                ancestors,
                DataInput::default(),
                None,
                saved.as_ref().ok(),
                placement,
            )?;
            outcomes.push(outcome);
        }
        if let Some((failed, placeholder)) = self.refresh_active() {
            for outcome in &mut outcomes {
                if outcome.instance() == failed {
                    *outcome = LaunchOutcome::Placeholder(placeholder);
                }
            }
        }
        tracing::info!(slots = self.slots.len(), detached = self.detached.len(), "stack resumed");
        Ok(outcomes)
    }

    fn launch_inner(&mut self, deferred: DeferredActivity) -> ActivityResult<LaunchOutcome> {
        let mode = deferred.mode();
        let provider = self.resolve_provider(&deferred);

        let mut refused = None;
        if mode.relaunch() {
            match self.try_relaunch(&deferred, &provider)? {
                Relaunch::Accepted(outcome) => return Ok(outcome),
                Relaunch::Refused(launch) => refused = Some(launch),
                Relaunch::NoCandidate => {}
            }
        }

        let anchor = if mode.detach() {
            None
        } else if mode.current() {
            self.current_anchor(deferred.ancestors())
        } else {
            self.slots.len().checked_sub(1)
        };
        let placement = if mode.detach() {
            Placement::Detached
        } else if mode.replace() {
            Placement::Replace(anchor)
        } else {
            Placement::Above(anchor)
        };
        let grows = match placement {
            Placement::Above(_) | Placement::Replace(None) => true,
            Placement::Replace(Some(_)) | Placement::Detached => false,
        };
        if grows && self.slots.len() >= self.config.max_depth {
            return Err(ActivityError::StackFull {
                depth: self.config.max_depth,
            });
        }

        let anchor_id = anchor.and_then(|idx| self.slots.get(idx)).map(|s| s.id);
        let ancestors: Ancestors = match (placement, anchor) {
            (Placement::Detached, _) => deferred.ancestors().iter().copied().collect(),
            (Placement::Above(_), Some(idx)) => {
                self.slots[idx].ctx.ancestors().iter().copied().collect()
            }
            (Placement::Replace(_), Some(idx)) => {
                let chain = self.slots[idx].ctx.ancestors();
                chain[..chain.len().saturating_sub(1)].iter().copied().collect()
            }
            (_, None) => Ancestors::new(),
        };

        let resolved = match self.instantiate(&provider, deferred.activity_id()) {
            Ok(instance) => match &refused {
                Some(launch) => Ok(launch.not_relaunch(instance)),
                None => ActivityLaunch::fresh(&deferred, instance)
                    .map_err(|e| format!("launch payload unreadable: {e}")),
            },
            Err(reason) => Err(reason),
        };
        let (input, instance) = match resolved {
            Ok(launch) => {
                tracing::debug!(
                    activity = %launch.activity_id(),
                    mode = %launch.mode(),
                    relaunch = launch.is_relaunch(),
                    "launch resolved"
                );
                let (binding, input, _) = launch.into_parts();
                match binding {
                    LaunchBinding::Fresh(instance) => (input, Ok(instance)),
                    LaunchBinding::Existing(id) => {
                        (input, Err(format!("fresh launch bound to existing {id}")))
                    }
                }
            }
            Err(reason) => (DataInput::default(), Err(reason)),
        };

        let response = deferred.response_target().cloned();
        let (outcome, id) = self.build_and_place(
            instance,
            deferred.activity_id(),
            ancestors,
            input,
            response.as_ref().map(|t| t.request_id().clone()),
            None,
            placement,
        )?;

        if let Some(target) = response.filter(|_| mode.respond()) {
            match anchor_id {
                Some(requester) => self.register_pending(requester, id, target),
                None => tracing::debug!(
                    request_id = %target.request_id(),
                    "respond launch without requester, response will be dropped"
                ),
            }
        }
        Ok(self.settle(outcome))
    }

    fn resolve_provider(&self, deferred: &DeferredActivity) -> Provider {
        match deferred.target() {
            Some(app) => match self.apps.get(app) {
                Some(app) => Provider::App(app),
                None => Provider::Missing(format!("{app} is not installed")),
            },
            None if self.builtins.contains(deferred.activity_id()) => Provider::Builtin,
            None => match self.apps.get(deferred.requester()) {
                Some(app) => Provider::App(app),
                None => Provider::Missing(format!(
                    "no provider for {} requested by {}",
                    deferred.activity_id(),
                    deferred.requester()
                )),
            },
        }
    }

    fn instantiate(
        &self,
        provider: &Provider,
        activity_id: &ActivityId,
    ) -> Result<ActivityInstance, String> {
        let built = match provider {
            Provider::Builtin => self.builtins.instantiate(activity_id),
            Provider::App(app) => app.instantiate_activity(activity_id),
            Provider::Missing(reason) => return Err(reason.clone()),
        };
        built.ok_or_else(|| match provider {
            Provider::App(app) => format!("{} cannot provide {activity_id}", app.identity()),
            _ => format!("{activity_id} is not available"),
        })
    }

    fn try_relaunch(
        &mut self,
        deferred: &DeferredActivity,
        provider: &Provider,
    ) -> ActivityResult<Relaunch> {
        if matches!(provider, Provider::Missing(_)) {
            return Ok(Relaunch::NoCandidate);
        }
        let identity = provider.identity();
        let candidate = self
            .slots
            .iter()
            .rev()
            .chain(self.detached.iter())
            .find(|s| {
                s.identity == identity
                    && &s.activity_id == deferred.activity_id()
                    && s.lifecycle.state().is_live()
            })
            .map(|s| s.id);
        let Some(existing) = candidate else {
            return Ok(Relaunch::NoCandidate);
        };
        let launch = match ActivityLaunch::relaunch_of(deferred, identity, existing) {
            Ok(launch) => launch,
            Err(e) => {
                tracing::warn!(error = %e, "relaunch payload unreadable");
                return Ok(Relaunch::NoCandidate);
            }
        };

        let Some(slot) = self.slot_mut(existing) else {
            return Ok(Relaunch::NoCandidate);
        };
        let Slot { activity, ctx, .. } = slot;
        let _span = ctx.span().clone().entered();
        let answer = panic::catch_unwind(AssertUnwindSafe(|| activity.relaunch(ctx, &launch)))
            .unwrap_or_else(|payload| {
                tracing::error!(panic = %panic_message(payload.as_ref()), "relaunch panicked");
                None
            });
        drop(_span);
        if !matches!(answer, Some(ActivityState::Open | ActivityState::Active)) {
            tracing::debug!(instance = existing.0, ?answer, "relaunch refused");
            return Ok(Relaunch::Refused(launch));
        }

        match self.locate(existing) {
            Some(Place::Stack(idx)) => {
                let slot = self.slots.remove(idx);
                self.slots.push(slot);
            }
            Some(Place::Detached(idx)) => {
                if self.slots.len() >= self.config.max_depth {
                    return Err(ActivityError::StackFull {
                        depth: self.config.max_depth,
                    });
                }
                let mut slot = self.detached.remove(idx);
                slot.detached = false;
                self.slots.push(slot);
            }
            None => return Ok(Relaunch::NoCandidate),
        }
        tracing::info!(instance = existing.0, activity = %deferred.activity_id(), "activity relaunched");
        let outcome = self.settle(LaunchOutcome::Relaunched(existing));
        Ok(Relaunch::Accepted(outcome))
    }

    /// Last live ancestor on the stack, falling back to the top.
    fn current_anchor(&self, ancestors: &[InstanceId]) -> Option<usize> {
        ancestors
            .iter()
            .rev()
            .find_map(|id| self.slots.iter().position(|s| s.id == *id))
            .or_else(|| self.slots.len().checked_sub(1))
    }

    #[allow(clippy::too_many_arguments)]
    fn build_and_place(
        &mut self,
        instance: Result<ActivityInstance, String>,
        activity_id: &ActivityId,
        ancestors: Ancestors,
        input: DataInput,
        request_id: Option<RequestId>,
        saved: Option<&DataInput>,
        placement: Placement,
    ) -> ActivityResult<(LaunchOutcome, InstanceId)> {
        let failure = match instance {
            Ok(instance) => {
                let (identity, activity, default_action) = instance.into_parts();
                let mut slot = self.new_slot(
                    identity,
                    activity_id.clone(),
                    activity,
                    default_action,
                    ancestors.clone(),
                    input,
                    request_id.clone(),
                    placement,
                );
                match slot.start(saved) {
                    Ok(()) => {
                        let id = slot.id;
                        tracing::info!(
                            instance = id.0,
                            activity = %activity_id,
                            app = slot.identity.as_ref().map_or("builtin", Identity::as_str),
                            "activity launched"
                        );
                        self.place(slot, placement);
                        return Ok((LaunchOutcome::Created(id), id));
                    }
                    Err(e) => {
                        slot.teardown();
                        format!("{activity_id} failed to start: {e}")
                    }
                }
            }
            Err(reason) => reason,
        };

        tracing::warn!(activity = %activity_id, reason = %failure, "substituting placeholder");
        let placeholder = Builtins::placeholder(failure);
        let (_, activity, default_action) = placeholder.into_parts();
        let mut slot = self.new_slot(
            None,
            ActivityId::new(builtins::BAD_APP)?,
            activity,
            default_action,
            ancestors,
            DataInput::default(),
            request_id,
            placement,
        );
        slot.start(saved)?;
        let id = slot.id;
        self.place(slot, placement);
        Ok((LaunchOutcome::Placeholder(id), id))
    }

    #[allow(clippy::too_many_arguments)]
    fn new_slot(
        &mut self,
        identity: Option<Identity>,
        activity_id: ActivityId,
        activity: Box<dyn Activity>,
        default_action: DefaultAction,
        ancestors: Ancestors,
        input: DataInput,
        request_id: Option<RequestId>,
        placement: Placement,
    ) -> Slot {
        let id = InstanceId(self.next_id);
        self.next_id += 1;
        let ctx = ActivityContext::new(
            id,
            identity.clone(),
            activity_id.clone(),
            ancestors,
            input,
            request_id,
        );
        Slot {
            id,
            identity,
            activity_id,
            activity,
            default_action,
            lifecycle: Lifecycle::new(),
            ctx,
            detached: matches!(placement, Placement::Detached),
        }
    }

    fn place(&mut self, slot: Slot, placement: Placement) {
        match placement {
            Placement::Detached => self.detached.push(slot),
            Placement::Above(anchor) => {
                let at = anchor.map_or(0, |idx| idx + 1).min(self.slots.len());
                self.slots.insert(at, slot);
            }
            Placement::Replace(Some(idx)) if idx < self.slots.len() => {
                let mut old = std::mem::replace(&mut self.slots[idx], slot);
                if self.active == Some(old.id) {
                    self.active = None;
                }
                let discarded = old.teardown();
                tracing::debug!(
                    instance = old.id.0,
                    discarded = discarded.len(),
                    "replaced activity closed"
                );
                self.forget_routes(old.id);
            }
            Placement::Replace(_) => self.slots.push(slot),
        }
    }

    fn register_pending(&mut self, requester: InstanceId, responder: InstanceId, target: ResponseTarget) {
        let entry = PendingRequest {
            requester,
            component: target.component().to_owned(),
            request_id: target.request_id().clone(),
        };
        tracing::debug!(
            request_id = %entry.request_id,
            requester = requester.0,
            responder = responder.0,
            component = %entry.component,
            "response route registered"
        );
        if let Some(old) = self.pending.insert(responder, entry) {
            tracing::warn!(
                request_id = %old.request_id,
                responder = responder.0,
                "responder re-registered, older route superseded"
            );
        }
    }

    /// Drop the route answered by `id`, if any.
    fn forget_routes(&mut self, id: InstanceId) {
        if let Some(route) = self.pending.remove(&id) {
            tracing::debug!(request_id = %route.request_id, responder = id.0, "response route dropped");
        }
    }

    fn conclude_inner(
        &mut self,
        id: InstanceId,
        response: Option<ActivityResponse>,
    ) -> ActivityResult<()> {
        let mut slot = match self.locate(id) {
            Some(Place::Stack(idx)) => self.slots.remove(idx),
            Some(Place::Detached(idx)) => self.detached.remove(idx),
            None => return Err(ActivityError::UnknownInstance(id)),
        };
        if self.active == Some(id) {
            self.active = None;
        }
        let discarded = slot.teardown();
        tracing::info!(
            instance = id.0,
            activity = %slot.activity_id,
            discarded = discarded.len(),
            "activity concluded"
        );

        let registered = self.pending.remove(&id);
        let route = match (registered, response) {
            (Some(pending), Some(resp)) if &pending.request_id == resp.request_id() => {
                Some((pending, resp))
            }
            (_, Some(resp)) => {
                tracing::debug!(
                    request_id = %resp.request_id(),
                    responder = id.0,
                    "no matching pending request, response dropped"
                );
                None
            }
            (_, None) => None,
        };
        self.refresh_active();

        if let Some((pending, resp)) = route {
            match self.slot_mut(pending.requester) {
                Some(requester) if requester.lifecycle.state().is_live() => {
                    let Slot { activity, ctx, .. } = requester;
                    let _span = ctx.span().clone().entered();
                    tracing::debug!(request_id = %resp.request_id(), component = %pending.component, "routing response");
                    let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
                        activity.on_response(ctx, &pending.component, resp)
                    }));
                    if let Err(payload) = delivered {
                        tracing::error!(panic = %panic_message(payload.as_ref()), "on_response panicked");
                    }
                }
                _ => tracing::debug!(
                    request_id = %resp.request_id(),
                    requester = pending.requester.0,
                    "requester gone, response dropped"
                ),
            }
        }
        Ok(())
    }

    /// Keep exactly the top slot active.
    ///
    /// A top slot whose activation fails is torn down and a placeholder takes
    /// its position. Returns `(failed, placeholder)` for the first such swap.
    fn refresh_active(&mut self) -> Option<(InstanceId, InstanceId)> {
        let top = self.top();
        if self.active == top {
            return None;
        }
        if let Some(prev) = self.active.take() {
            if let Some(slot) = self.slot_mut(prev) {
                slot.passivate();
            }
        }
        let mut swapped = None;
        while let Some(slot) = self.slots.last_mut() {
            let error = match slot.activate() {
                Ok(()) => {
                    self.active = Some(slot.id);
                    break;
                }
                Err(e) => e,
            };
            let Some(mut failed) = self.slots.pop() else {
                break;
            };
            tracing::error!(
                instance = failed.id.0,
                activity = %failed.activity_id,
                error = %error,
                "activation failed, tearing down"
            );
            failed.teardown();
            self.forget_routes(failed.id);
            if failed.activity_id.as_str() == builtins::BAD_APP {
                continue;
            }
            let placed = self.build_and_place(
                Err(format!("{} failed to activate: {error}", failed.activity_id)),
                &failed.activity_id,
                failed.ctx.ancestors().iter().copied().collect(),
                DataInput::default(),
                failed.ctx.request_id().cloned(),
                None,
                Placement::Above(self.slots.len().checked_sub(1)),
            );
            match placed {
                Ok((_, placeholder)) => {
                    swapped.get_or_insert((failed.id, placeholder));
                }
                Err(e) => tracing::error!(error = %e, "placeholder failed to start"),
            }
        }
        swapped
    }

    /// Refresh activation and report a placeholder if `outcome`'s instance
    /// failed to activate.
    fn settle(&mut self, outcome: LaunchOutcome) -> LaunchOutcome {
        match self.refresh_active() {
            Some((failed, placeholder)) if failed == outcome.instance() => {
                LaunchOutcome::Placeholder(placeholder)
            }
            _ => outcome,
        }
    }

    /// Process queued context requests, bounded per call.
    fn drain_requests(&mut self) -> usize {
        let budget = self.config.max_requests_per_turn;
        let mut processed = 0;
        while processed < budget {
            let Some(id) = self
                .slots
                .iter()
                .chain(self.detached.iter())
                .find(|s| s.ctx.has_requests())
                .map(|s| s.id)
            else {
                return processed;
            };
            while processed < budget {
                let Some(request) = self.slot_mut(id).and_then(|s| s.ctx.next_request()) else {
                    break;
                };
                processed += 1;
                match request {
                    ContextRequest::Launch(deferred) => {
                        let activity = deferred.activity_id().clone();
                        if let Err(e) = self.launch_inner(deferred) {
                            tracing::warn!(requester = id.0, activity = %activity, error = %e, "launch request failed");
                        }
                    }
                    ContextRequest::Conclude(response) => {
                        if let Err(e) = self.conclude_inner(id, response) {
                            tracing::debug!(instance = id.0, error = %e, "conclude request ignored");
                        }
                        break;
                    }
                }
            }
        }
        let waiting = self
            .slots
            .iter()
            .chain(self.detached.iter())
            .any(|s| s.ctx.has_requests());
        if waiting {
            tracing::warn!(budget, "request budget exhausted, remaining requests wait for next turn");
        }
        processed
    }

    fn locate(&self, id: InstanceId) -> Option<Place> {
        if let Some(idx) = self.slots.iter().position(|s| s.id == id) {
            return Some(Place::Stack(idx));
        }
        self.detached
            .iter()
            .position(|s| s.id == id)
            .map(Place::Detached)
    }

    fn slot(&self, id: InstanceId) -> Option<&Slot> {
        match self.locate(id)? {
            Place::Stack(idx) => self.slots.get(idx),
            Place::Detached(idx) => self.detached.get(idx),
        }
    }

    fn slot_mut(&mut self, id: InstanceId) -> Option<&mut Slot> {
        match self.locate(id)? {
            Place::Stack(idx) => self.slots.get_mut(idx),
            Place::Detached(idx) => self.detached.get_mut(idx),
        }
    }
}

impl fmt::Debug for ActivityStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityStack")
            .field("slots", &self.ids())
            .field("detached", &self.detached_ids())
            .field("active", &self.active)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Drop for ActivityStack {
    fn drop(&mut self) {
        while let Some(mut slot) = self.slots.pop() {
            slot.teardown();
        }
        for mut slot in self.detached.drain(..) {
            slot.teardown();
        }
    }
}
