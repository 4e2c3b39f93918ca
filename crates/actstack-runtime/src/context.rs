#![forbid(unsafe_code)]

//! Per-activity context.
//!
//! The context owns the activity's [`Ledger`] outright; models hold only a
//! [`Binding`] that names the context by id. Launch and conclusion requests
//! are queued here and drained by the stack once the current callback
//! returns, so an activity never re-enters the stack from inside itself.

use crate::launch::{ActivityResponse, DeferredActivity, DeferredBuilder};
use actstack_core::{
    ActivityId, ActivityMode, Binding, DataInput, DataOutput, Identity, InstanceId, Ledger,
    RequestId,
};
use smallvec::SmallVec;
use std::collections::VecDeque;
use tracing::Span;

/// Chain of instance ids from the stack root to an activity, inclusive.
pub type Ancestors = SmallVec<[InstanceId; 4]>;

/// Something an activity asked the stack to do.
#[derive(Debug)]
pub(crate) enum ContextRequest {
    Launch(DeferredActivity),
    Conclude(Option<ActivityResponse>),
}

/// What an activity sees of the runtime.
#[derive(Debug)]
pub struct ActivityContext {
    instance: InstanceId,
    identity: Option<Identity>,
    activity_id: ActivityId,
    ancestors: Ancestors,
    ledger: Ledger,
    input: DataInput,
    request_id: Option<RequestId>,
    requests: VecDeque<ContextRequest>,
    span: Span,
}

impl ActivityContext {
    pub(crate) fn new(
        instance: InstanceId,
        identity: Option<Identity>,
        activity_id: ActivityId,
        mut ancestors: Ancestors,
        input: DataInput,
        request_id: Option<RequestId>,
    ) -> Self {
        ancestors.push(instance);
        let span = tracing::info_span!(
            "activity",
            activity = %activity_id,
            instance = instance.0,
            app = identity.as_ref().map_or("builtin", Identity::as_str),
        );
        Self {
            instance,
            identity,
            activity_id,
            ancestors,
            ledger: Ledger::new(),
            input,
            request_id,
            requests: VecDeque::new(),
            span,
        }
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// App identity, `None` for built-ins.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn activity_id(&self) -> &ActivityId {
        &self.activity_id
    }

    /// Root-first chain ending with this activity.
    pub fn ancestors(&self) -> &[InstanceId] {
        &self.ancestors
    }

    /// The ledger every model of this context shares.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// A new binding for a model owned by this context.
    pub fn bind(&self) -> Binding {
        Binding::bound(self.instance.into(), self.ledger.clone())
    }

    /// Launch input, empty when restored from saved state.
    pub fn input(&self) -> &DataInput {
        &self.input
    }

    /// Request id this activity must answer, if launched to respond.
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Start describing a launch issued by this activity.
    pub fn defer(&self, activity_id: ActivityId, mode: ActivityMode) -> DeferredBuilder {
        let requester = self.identity.clone().unwrap_or_else(Identity::system);
        DeferredActivity::builder(activity_id, requester, mode)
            .ancestors(self.ancestors.iter().copied())
    }

    /// Queue a launch.
    pub fn launch(&mut self, deferred: DeferredActivity) {
        self.requests.push_back(ContextRequest::Launch(deferred));
    }

    /// Finish without a reply.
    pub fn conclude(&mut self) {
        self.requests.push_back(ContextRequest::Conclude(None));
    }

    /// Finish and reply to the pending request with `output`.
    ///
    /// Without a pending request this is a plain [`conclude`](Self::conclude).
    pub fn respond(&mut self, output: DataOutput) {
        let response = self
            .request_id
            .clone()
            .map(|id| ActivityResponse::new(id, output.finish()));
        self.requests.push_back(ContextRequest::Conclude(response));
    }

    /// Finish with an explicit response.
    pub fn conclude_with(&mut self, response: ActivityResponse) {
        self.requests.push_back(ContextRequest::Conclude(Some(response)));
    }

    pub(crate) fn next_request(&mut self) -> Option<ContextRequest> {
        self.requests.pop_front()
    }

    pub(crate) fn discard_requests(&mut self) -> usize {
        let n = self.requests.len();
        self.requests.clear();
        n
    }

    pub(crate) fn has_requests(&self) -> bool {
        !self.requests.is_empty()
    }
}
