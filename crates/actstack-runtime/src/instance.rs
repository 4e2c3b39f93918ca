#![forbid(unsafe_code)]

//! A constructed activity paired with its owner and default action.

use crate::activity::Activity;
use crate::context::ActivityContext;
use actstack_core::Identity;
use std::fmt;
use std::sync::Arc;

/// Custom default-action handler.
pub type ActionHandler = Arc<dyn Fn(&mut ActivityContext) + Send + Sync>;

/// What the host's generic "default action" input does to an activity.
#[derive(Clone, Default)]
pub enum DefaultAction {
    /// Conclude without a response.
    #[default]
    Conclude,
    /// Do nothing.
    Ignore,
    /// Run a handler against the activity's context.
    Handler(ActionHandler),
}

impl DefaultAction {
    /// Wrap a closure as a handler action.
    pub fn handler(f: impl Fn(&mut ActivityContext) + Send + Sync + 'static) -> Self {
        Self::Handler(Arc::new(f))
    }

    pub(crate) fn run(&self, ctx: &mut ActivityContext) {
        match self {
            DefaultAction::Conclude => ctx.conclude(),
            DefaultAction::Ignore => {}
            DefaultAction::Handler(f) => f(ctx),
        }
    }
}

impl fmt::Debug for DefaultAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultAction::Conclude => f.write_str("Conclude"),
            DefaultAction::Ignore => f.write_str("Ignore"),
            DefaultAction::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

/// An activity object ready to be placed on the stack.
///
/// Built-ins carry no identity.
pub struct ActivityInstance {
    identity: Option<Identity>,
    activity: Box<dyn Activity>,
    default_action: DefaultAction,
}

impl ActivityInstance {
    pub fn new(
        identity: Option<Identity>,
        activity: Box<dyn Activity>,
        default_action: DefaultAction,
    ) -> Self {
        Self {
            identity,
            activity,
            default_action,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn default_action(&self) -> &DefaultAction {
        &self.default_action
    }

    pub(crate) fn into_parts(self) -> (Option<Identity>, Box<dyn Activity>, DefaultAction) {
        (self.identity, self.activity, self.default_action)
    }
}

impl fmt::Debug for ActivityInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityInstance")
            .field("identity", &self.identity)
            .field("default_action", &self.default_action)
            .finish_non_exhaustive()
    }
}
