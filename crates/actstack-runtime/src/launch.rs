#![forbid(unsafe_code)]

//! Launch requests, their resolution, and responses.
//!
//! A [`DeferredActivity`] is what an activity asks for: an activity id, a
//! mode, a payload, and the requester's position in the stack. The stack
//! resolves it into an [`ActivityLaunch`] bound either to an existing slot
//! (relaunch) or to a fresh [`ActivityInstance`].

use crate::context::Ancestors;
use crate::instance::ActivityInstance;
use actstack_core::{
    ActivityId, ActivityMode, DataInput, DataOutput, Error, Identity, InstanceId, Payload,
    RequestId, Result,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a response should be delivered inside the requester.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResponseTarget {
    component: String,
    request_id: RequestId,
}

impl ResponseTarget {
    pub fn new(component: impl Into<String>, request_id: RequestId) -> Result<Self> {
        let component = component.into();
        if component.is_empty() {
            return Err(Error::InvalidArgument(
                "response component must not be empty".into(),
            ));
        }
        Ok(Self {
            component,
            request_id,
        })
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }
}

/// An unresolved launch request.
#[derive(Debug, Clone)]
pub struct DeferredActivity {
    activity_id: ActivityId,
    requester: Identity,
    target: Option<Identity>,
    ancestors: Ancestors,
    mode: ActivityMode,
    payload: Payload,
    response: Option<ResponseTarget>,
}

impl DeferredActivity {
    pub fn builder(activity_id: ActivityId, requester: Identity, mode: ActivityMode) -> DeferredBuilder {
        DeferredBuilder {
            activity_id,
            requester,
            target: None,
            ancestors: Ancestors::new(),
            mode,
            payload: Payload::empty(),
            response: None,
        }
    }

    pub fn activity_id(&self) -> &ActivityId {
        &self.activity_id
    }

    pub fn requester(&self) -> &Identity {
        &self.requester
    }

    /// App that should provide the activity; `None` means built-in first,
    /// then the requester's own app.
    pub fn target(&self) -> Option<&Identity> {
        self.target.as_ref()
    }

    /// Root-first chain ending with the requesting instance.
    pub fn ancestors(&self) -> &[InstanceId] {
        &self.ancestors
    }

    pub fn mode(&self) -> ActivityMode {
        self.mode
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn response_target(&self) -> Option<&ResponseTarget> {
        self.response.as_ref()
    }
}

/// Validating builder for [`DeferredActivity`].
#[derive(Debug, Clone)]
#[must_use]
pub struct DeferredBuilder {
    activity_id: ActivityId,
    requester: Identity,
    target: Option<Identity>,
    ancestors: Ancestors,
    mode: ActivityMode,
    payload: Payload,
    response: Option<ResponseTarget>,
}

impl DeferredBuilder {
    pub fn target(mut self, app: Identity) -> Self {
        self.target = Some(app);
        self
    }

    pub fn ancestors(mut self, chain: impl IntoIterator<Item = InstanceId>) -> Self {
        self.ancestors = chain.into_iter().collect();
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Encode `output` as the launch payload.
    pub fn input(mut self, output: &DataOutput) -> Self {
        self.payload = output.finish();
        self
    }

    /// Ask for a response delivered to `component` under `request_id`.
    pub fn respond_to(mut self, target: ResponseTarget) -> Self {
        self.response = Some(target);
        self
    }

    pub fn build(self) -> Result<DeferredActivity> {
        match (self.mode.respond(), &self.response) {
            (true, None) => {
                return Err(Error::InvalidArgument(format!(
                    "{} requires a response target",
                    self.mode
                )));
            }
            (false, Some(_)) => {
                return Err(Error::InvalidArgument(format!(
                    "{} does not carry a response target",
                    self.mode
                )));
            }
            _ => {}
        }
        Ok(DeferredActivity {
            activity_id: self.activity_id,
            requester: self.requester,
            target: self.target,
            ancestors: self.ancestors,
            mode: self.mode,
            payload: self.payload,
            response: self.response,
        })
    }
}

/// What a launch is bound to.
pub enum LaunchBinding {
    /// A live slot asked to take the launch over.
    Existing(InstanceId),
    /// A freshly created instance not yet on the stack.
    Fresh(ActivityInstance),
}

impl fmt::Debug for LaunchBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchBinding::Existing(id) => f.debug_tuple("Existing").field(id).finish(),
            LaunchBinding::Fresh(inst) => f.debug_tuple("Fresh").field(inst).finish(),
        }
    }
}

/// A deferred launch resolved against a concrete provider.
#[derive(Debug)]
pub struct ActivityLaunch {
    activity_id: ActivityId,
    mode: ActivityMode,
    requester: Identity,
    app: Option<Identity>,
    relaunch: bool,
    input: DataInput,
    response: Option<ResponseTarget>,
    binding: LaunchBinding,
}

impl ActivityLaunch {
    /// Resolve `deferred` as a relaunch of the live slot `existing`.
    ///
    /// Fails with [`Error::Corruption`] when the payload cannot be decoded.
    pub fn relaunch_of(
        deferred: &DeferredActivity,
        app: Option<Identity>,
        existing: InstanceId,
    ) -> Result<Self> {
        Ok(Self {
            activity_id: deferred.activity_id.clone(),
            mode: deferred.mode,
            requester: deferred.requester.clone(),
            app,
            relaunch: true,
            input: deferred.payload.decode()?,
            response: deferred.response.clone(),
            binding: LaunchBinding::Existing(existing),
        })
    }

    /// Resolve `deferred` against a freshly created instance.
    pub fn fresh(deferred: &DeferredActivity, instance: ActivityInstance) -> Result<Self> {
        Ok(Self {
            activity_id: deferred.activity_id.clone(),
            mode: deferred.mode,
            requester: deferred.requester.clone(),
            app: instance.identity().cloned(),
            relaunch: false,
            input: deferred.payload.decode()?,
            response: deferred.response.clone(),
            binding: LaunchBinding::Fresh(instance),
        })
    }

    /// A new launch with the same request, bound to `instance` and marked
    /// as not a relaunch.
    pub fn not_relaunch(&self, instance: ActivityInstance) -> Self {
        Self {
            activity_id: self.activity_id.clone(),
            mode: self.mode,
            requester: self.requester.clone(),
            app: instance.identity().cloned(),
            relaunch: false,
            input: self.input.clone(),
            response: self.response.clone(),
            binding: LaunchBinding::Fresh(instance),
        }
    }

    pub fn activity_id(&self) -> &ActivityId {
        &self.activity_id
    }

    pub fn mode(&self) -> ActivityMode {
        self.mode
    }

    pub fn requester(&self) -> &Identity {
        &self.requester
    }

    /// Providing app, `None` for built-ins.
    pub fn app(&self) -> Option<&Identity> {
        self.app.as_ref()
    }

    pub fn is_relaunch(&self) -> bool {
        self.relaunch
    }

    pub fn input(&self) -> &DataInput {
        &self.input
    }

    pub fn response_target(&self) -> Option<&ResponseTarget> {
        self.response.as_ref()
    }

    pub fn binding(&self) -> &LaunchBinding {
        &self.binding
    }

    pub(crate) fn into_parts(self) -> (LaunchBinding, DataInput, Option<ResponseTarget>) {
        (self.binding, self.input, self.response)
    }
}

/// Reply from a responding activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityResponse {
    request_id: RequestId,
    payload: Payload,
}

impl ActivityResponse {
    pub fn new(request_id: RequestId, payload: Payload) -> Self {
        Self {
            request_id,
            payload,
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn decode(&self) -> Result<DataInput> {
        self.payload.decode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::Activity;
    use crate::context::ActivityContext;
    use crate::error::ActivityResult;
    use crate::instance::DefaultAction;

    struct Blank;

    impl Activity for Blank {
        fn open(&mut self, _: &mut ActivityContext, _: Option<&DataInput>) -> ActivityResult<()> {
            Ok(())
        }
    }

    fn id(s: &str) -> ActivityId {
        ActivityId::new(s).unwrap()
    }

    fn rid(s: &str) -> RequestId {
        RequestId::new(s).unwrap()
    }

    #[test]
    fn respond_mode_needs_target() {
        let err = DeferredActivity::builder(id("pick"), Identity::system(), ActivityMode::RespondToTop)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn target_only_on_respond_modes() {
        let target = ResponseTarget::new("list", rid("r1")).unwrap();
        let err = DeferredActivity::builder(id("pick"), Identity::system(), ActivityMode::SucceedTop)
            .respond_to(target)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn empty_component_rejected() {
        assert!(ResponseTarget::new("", rid("r1")).is_err());
    }

    #[test]
    fn not_relaunch_keeps_request_and_binds_fresh() {
        let mut out = DataOutput::new();
        out.put_str("query", "abc").unwrap();
        let deferred = DeferredActivity::builder(
            id("search"),
            Identity::system(),
            ActivityMode::RelaunchExistingOrSucceedTop,
        )
        .input(&out)
        .build()
        .unwrap();
        let app = Identity::new("org.example.search").unwrap();
        let launch = ActivityLaunch::relaunch_of(&deferred, Some(app.clone()), InstanceId(4)).unwrap();
        assert!(launch.is_relaunch());

        let fresh = launch.not_relaunch(ActivityInstance::new(
            Some(app.clone()),
            Box::new(Blank),
            DefaultAction::Conclude,
        ));
        assert!(!fresh.is_relaunch());
        assert!(matches!(fresh.binding(), LaunchBinding::Fresh(_)));
        assert_eq!(fresh.app(), Some(&app));
        assert_eq!(fresh.input().get_str("query"), Some("abc"));
        assert_eq!(fresh.mode(), ActivityMode::RelaunchExistingOrSucceedTop);
    }

    #[test]
    fn malformed_payload_is_corruption() {
        let deferred = DeferredActivity::builder(id("x"), Identity::system(), ActivityMode::SucceedTop)
            .payload(Payload::from_bytes(b"{not json".to_vec()))
            .build()
            .unwrap();
        let err = ActivityLaunch::relaunch_of(&deferred, None, InstanceId(1)).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }
}
