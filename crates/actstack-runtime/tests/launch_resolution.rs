//! Launch Resolution Tests
//!
//! Drives a real [`ActivityStack`] through every placement path.
//!
//! # Running Tests
//!
//! ```sh
//! cargo test -p actstack-runtime --test launch_resolution
//! ```
//!
//! # Invariants
//!
//! 1. **Relaunch-or-create**: no live match means a fresh instance, never reuse
//! 2. **Single active**: only the top slot is `Active`
//! 3. **Fault containment**: instantiation failures become placeholders
//! 4. **Depth bound**: growth past `max_depth` is rejected, replacement is not
//! 5. **Panic containment**: a panicking callback never unwinds out of the stack

#![cfg(test)]

use actstack_core::{ActivityId, ActivityMode, DataInput, DataOutput, Identity, InstanceId};
use actstack_runtime::{
    Activity, ActivityContext, ActivityError, ActivityLaunch, ActivityResult, ActivityStack,
    ActivityState, Bundle, BundleOnly, DefaultAction, DeferredActivity, LaunchOutcome, Runtime,
    RuntimeConfig, builtins,
};
use std::sync::{Arc, Mutex};

// ============================================================================
// Test Utilities
// ============================================================================

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, line: String) {
        self.0.lock().unwrap().push(line);
    }

    fn has(&self, line: &str) -> bool {
        self.0.lock().unwrap().iter().any(|l| l == line)
    }

    fn count(&self, suffix: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.ends_with(suffix))
            .count()
    }
}

struct Tracer {
    journal: Journal,
    accept_relaunch: bool,
    fail_open: bool,
}

impl Tracer {
    fn log(&self, ctx: &ActivityContext, event: &str) {
        self.journal
            .push(format!("{}{}:{event}", ctx.activity_id(), ctx.instance()));
    }
}

impl Activity for Tracer {
    fn init(&mut self, ctx: &mut ActivityContext) -> ActivityResult<()> {
        self.log(ctx, "init");
        Ok(())
    }

    fn open(&mut self, ctx: &mut ActivityContext, _saved: Option<&DataInput>) -> ActivityResult<()> {
        if self.fail_open {
            return Err(ActivityError::failed("cannot open"));
        }
        self.log(ctx, "open");
        Ok(())
    }

    fn destroy(&mut self, ctx: &mut ActivityContext) {
        self.log(ctx, "destroy");
    }

    fn relaunch(
        &mut self,
        ctx: &mut ActivityContext,
        launch: &ActivityLaunch,
    ) -> Option<ActivityState> {
        self.log(ctx, &format!("relaunch:{}", launch.is_relaunch()));
        self.accept_relaunch.then_some(ActivityState::Active)
    }
}

/// Which callback of a [`Fragile`] activity panics.
#[derive(Clone, Copy)]
enum Fault {
    Activate,
    Input,
}

struct Fragile {
    journal: Journal,
    fault: Fault,
}

impl Activity for Fragile {
    fn open(&mut self, _ctx: &mut ActivityContext, _saved: Option<&DataInput>) -> ActivityResult<()> {
        Ok(())
    }

    fn activate(&mut self, _ctx: &mut ActivityContext) {
        if matches!(self.fault, Fault::Activate) {
            panic!("activate exploded");
        }
    }

    fn on_input(&mut self, _ctx: &mut ActivityContext, _input: &DataInput) -> ActivityResult<()> {
        panic!("input exploded");
    }

    fn poll(&mut self, _ctx: &mut ActivityContext) {
        if matches!(self.fault, Fault::Input) {
            panic!("poll exploded");
        }
    }

    fn destroy(&mut self, _ctx: &mut ActivityContext) {
        self.journal.push("fragile:destroy".into());
    }
}

fn fragile_factory(
    journal: &Journal,
    fault: Fault,
) -> impl Fn() -> ActivityResult<Box<dyn Activity>> + Send + Sync + 'static {
    let journal = journal.clone();
    move || {
        Ok(Box::new(Fragile {
            journal: journal.clone(),
            fault,
        }) as Box<dyn Activity>)
    }
}

fn notes() -> Identity {
    Identity::new("org.example.notes").unwrap()
}

fn aid(raw: &str) -> ActivityId {
    ActivityId::new(raw).unwrap()
}

fn tracer_factory(
    journal: &Journal,
    accept_relaunch: bool,
    fail_open: bool,
) -> impl Fn() -> ActivityResult<Box<dyn Activity>> + Send + Sync + 'static {
    let journal = journal.clone();
    move || {
        Ok(Box::new(Tracer {
            journal: journal.clone(),
            accept_relaunch,
            fail_open,
        }) as Box<dyn Activity>)
    }
}

fn setup(config: RuntimeConfig) -> (Runtime, ActivityStack, Journal) {
    let journal = Journal::default();
    let bundle = Bundle::builder(notes())
        .activity(aid("notes.list"), "list")
        .activity(aid("notes.edit"), "edit")
        .activity(aid("notes.broken"), "broken")
        .activity(aid("notes.ghost"), "ghost")
        .activity_with_action(aid("notes.sticky"), "edit", DefaultAction::Ignore)
        .activity(aid("notes.fragile"), "fragile")
        .activity(aid("notes.jumpy"), "jumpy")
        .activity_with_action(
            aid("notes.trap"),
            "edit",
            DefaultAction::handler(|_ctx| panic!("handler exploded")),
        )
        .factory("fragile", fragile_factory(&journal, Fault::Activate))
        .factory("jumpy", fragile_factory(&journal, Fault::Input))
        .factory("list", tracer_factory(&journal, true, false))
        .factory("edit", tracer_factory(&journal, false, false))
        .factory("broken", tracer_factory(&journal, false, true))
        .build()
        .unwrap();
    let runtime = Runtime::new(config);
    runtime.install(bundle, Box::new(BundleOnly), "system").unwrap();
    let stack = runtime.stack();
    (runtime, stack, journal)
}

fn root(activity: &str, mode: ActivityMode) -> DeferredActivity {
    DeferredActivity::builder(aid(activity), Identity::system(), mode)
        .target(notes())
        .build()
        .unwrap()
}

fn from(stack: &ActivityStack, requester: InstanceId, activity: &str, mode: ActivityMode) -> DeferredActivity {
    stack
        .context(requester)
        .unwrap()
        .defer(aid(activity), mode)
        .build()
        .unwrap()
}

fn created(outcome: LaunchOutcome) -> InstanceId {
    match outcome {
        LaunchOutcome::Created(id) => id,
        other => panic!("expected Created, got {other:?}"),
    }
}

// ============================================================================
// 1. Relaunch Tests
// ============================================================================

#[test]
fn relaunch_or_succeed_without_existing_creates_fresh_instance() {
    let (_rt, mut stack, journal) = setup(RuntimeConfig::default());
    let edit = created(stack.launch(root("notes.edit", ActivityMode::SucceedTop)).unwrap());

    let outcome = stack
        .launch(root("notes.list", ActivityMode::RelaunchExistingOrSucceedTop))
        .unwrap();
    let list = created(outcome);

    assert_ne!(list, edit);
    assert_eq!(stack.ids(), vec![edit, list]);
    assert_eq!(stack.state(list), Some(ActivityState::Active));
    assert_eq!(journal.count(":relaunch:true"), 0);
}

#[test]
fn accepted_relaunch_moves_existing_to_top() {
    let (_rt, mut stack, journal) = setup(RuntimeConfig::default());
    let list = created(stack.launch(root("notes.list", ActivityMode::SucceedTop)).unwrap());
    let edit = created(stack.launch(root("notes.edit", ActivityMode::SucceedTop)).unwrap());
    assert_eq!(stack.state(list), Some(ActivityState::Open));

    let outcome = stack
        .launch(root("notes.list", ActivityMode::RelaunchExistingOrSucceedTop))
        .unwrap();

    assert_eq!(outcome, LaunchOutcome::Relaunched(list));
    assert_eq!(stack.ids(), vec![edit, list]);
    assert_eq!(stack.state(list), Some(ActivityState::Active));
    assert_eq!(stack.state(edit), Some(ActivityState::Open));
    assert!(journal.has(&format!("notes.list{list}:relaunch:true")));
    assert_eq!(journal.count(":init"), 2);
}

#[test]
fn refused_relaunch_creates_fresh_instance() {
    let (_rt, mut stack, journal) = setup(RuntimeConfig::default());
    let first = created(stack.launch(root("notes.edit", ActivityMode::SucceedTop)).unwrap());

    let outcome = stack
        .launch(root("notes.edit", ActivityMode::RelaunchExistingOrSucceedTop))
        .unwrap();
    let second = created(outcome);

    assert_ne!(first, second);
    assert!(journal.has(&format!("notes.edit{first}:relaunch:true")));
    assert!(journal.has(&format!("notes.edit{second}:open")));
    assert_eq!(stack.ids(), vec![first, second]);
}

#[test]
fn relaunch_of_detached_instance_brings_it_onto_stack() {
    let (_rt, mut stack, _journal) = setup(RuntimeConfig::default());
    let bottom = created(stack.launch(root("notes.edit", ActivityMode::SucceedTop)).unwrap());
    let detached = created(stack.launch(root("notes.list", ActivityMode::Detach)).unwrap());
    assert_eq!(stack.detached_ids(), vec![detached]);
    assert_eq!(stack.state(detached), Some(ActivityState::Open));

    let outcome = stack
        .launch(root("notes.list", ActivityMode::RelaunchExistingOrReplaceTop))
        .unwrap();

    assert_eq!(outcome, LaunchOutcome::Relaunched(detached));
    assert!(stack.detached_ids().is_empty());
    assert_eq!(stack.ids(), vec![bottom, detached]);
    assert_eq!(stack.top(), Some(detached));
}

// ============================================================================
// 2. Placement Tests
// ============================================================================

#[test]
fn succeed_current_inserts_above_requester() {
    let (_rt, mut stack, _journal) = setup(RuntimeConfig::default());
    let a = created(stack.launch(root("notes.list", ActivityMode::SucceedTop)).unwrap());
    let b = created(stack.launch(root("notes.edit", ActivityMode::SucceedTop)).unwrap());
    let request = from(&stack, a, "notes.edit", ActivityMode::SucceedCurrent);
    let c = created(stack.launch(request).unwrap());

    assert_eq!(stack.ids(), vec![a, c, b]);
    assert_eq!(stack.top(), Some(b));
    assert_eq!(stack.state(c), Some(ActivityState::Open));
    assert_eq!(stack.context(c).unwrap().ancestors(), &[a, c]);
}

#[test]
fn replace_current_tears_down_requester_only() {
    let (_rt, mut stack, journal) = setup(RuntimeConfig::default());
    let a = created(stack.launch(root("notes.list", ActivityMode::SucceedTop)).unwrap());
    let b = created(stack.launch(root("notes.edit", ActivityMode::SucceedTop)).unwrap());
    let c = created(stack.launch(root("notes.edit", ActivityMode::SucceedTop)).unwrap());

    let request = from(&stack, b, "notes.list", ActivityMode::ReplaceCurrent);
    let x = created(stack.launch(request).unwrap());

    assert_eq!(stack.ids(), vec![a, x, c]);
    assert!(!stack.contains(b));
    assert!(journal.has(&format!("notes.edit{b}:destroy")));
    assert!(!journal.has(&format!("notes.edit{c}:destroy")));
    assert_eq!(stack.top(), Some(c));
}

#[test]
fn replace_top_swaps_active_slot() {
    let (_rt, mut stack, journal) = setup(RuntimeConfig::default());
    let a = created(stack.launch(root("notes.list", ActivityMode::SucceedTop)).unwrap());
    let b = created(stack.launch(root("notes.edit", ActivityMode::SucceedTop)).unwrap());

    let x = created(stack.launch(root("notes.edit", ActivityMode::ReplaceTop)).unwrap());

    assert_eq!(stack.ids(), vec![a, x]);
    assert_eq!(stack.state(x), Some(ActivityState::Active));
    assert!(journal.has(&format!("notes.edit{b}:destroy")));
}

#[test]
fn replace_on_empty_stack_pushes() {
    let (_rt, mut stack, _journal) = setup(RuntimeConfig::default());
    let x = created(stack.launch(root("notes.edit", ActivityMode::ReplaceTop)).unwrap());
    assert_eq!(stack.ids(), vec![x]);
    assert_eq!(stack.state(x), Some(ActivityState::Active));
}

#[test]
fn detach_leaves_stack_alone() {
    let (_rt, mut stack, _journal) = setup(RuntimeConfig::default());
    let a = created(stack.launch(root("notes.list", ActivityMode::SucceedTop)).unwrap());
    let d = created(stack.launch(root("notes.edit", ActivityMode::Detach)).unwrap());

    assert_eq!(stack.ids(), vec![a]);
    assert_eq!(stack.detached_ids(), vec![d]);
    assert_eq!(stack.state(a), Some(ActivityState::Active));
    assert_eq!(stack.state(d), Some(ActivityState::Open));

    stack.conclude(d, None).unwrap();
    assert!(stack.detached_ids().is_empty());
}

#[test]
fn only_top_is_ever_active() {
    let (_rt, mut stack, _journal) = setup(RuntimeConfig::default());
    let mut ids = Vec::new();
    for _ in 0..4 {
        ids.push(created(stack.launch(root("notes.edit", ActivityMode::SucceedTop)).unwrap()));
        let active: Vec<_> = stack
            .ids()
            .into_iter()
            .filter(|id| stack.state(*id) == Some(ActivityState::Active))
            .collect();
        assert_eq!(active, vec![*ids.last().unwrap()]);
    }
}

// ============================================================================
// 3. Fault Containment Tests
// ============================================================================

#[test]
fn unknown_activity_becomes_placeholder() {
    let (_rt, mut stack, _journal) = setup(RuntimeConfig::default());
    let outcome = stack.launch(root("notes.missing", ActivityMode::SucceedTop)).unwrap();
    let LaunchOutcome::Placeholder(id) = outcome else {
        panic!("expected placeholder, got {outcome:?}");
    };
    assert_eq!(stack.activity_id(id).map(ActivityId::as_str), Some(builtins::BAD_APP));
    assert_eq!(stack.state(id), Some(ActivityState::Active));
}

#[test]
fn missing_factory_becomes_placeholder() {
    let (_rt, mut stack, _journal) = setup(RuntimeConfig::default());
    let outcome = stack.launch(root("notes.ghost", ActivityMode::SucceedTop)).unwrap();
    assert!(matches!(outcome, LaunchOutcome::Placeholder(_)));
}

#[test]
fn failing_open_becomes_placeholder_and_is_torn_down() {
    let (_rt, mut stack, journal) = setup(RuntimeConfig::default());
    let outcome = stack.launch(root("notes.broken", ActivityMode::SucceedTop)).unwrap();
    assert!(matches!(outcome, LaunchOutcome::Placeholder(_)));
    assert_eq!(journal.count(":init"), 1);
    assert_eq!(journal.count(":destroy"), 1);
    assert_eq!(stack.depth(), 1);
}

#[test]
fn uninstalled_target_becomes_placeholder() {
    let (_rt, mut stack, _journal) = setup(RuntimeConfig::default());
    let request = DeferredActivity::builder(aid("x.main"), Identity::system(), ActivityMode::SucceedTop)
        .target(Identity::new("org.example.absent").unwrap())
        .build()
        .unwrap();
    assert!(matches!(stack.launch(request).unwrap(), LaunchOutcome::Placeholder(_)));
}

#[test]
fn builtins_resolve_without_target() {
    let (_rt, mut stack, _journal) = setup(RuntimeConfig::default());
    let mut input = DataOutput::new();
    input.put_str("message", "Delete note?").unwrap();
    let request = DeferredActivity::builder(aid(builtins::DIALOG), notes(), ActivityMode::SucceedTop)
        .input(&input)
        .build()
        .unwrap();
    let id = created(stack.launch(request).unwrap());
    let ctx = stack.context(id).unwrap();
    assert!(ctx.identity().is_none());
    assert_eq!(ctx.input().get_str("message"), Some("Delete note?"));
}

// ============================================================================
// 4. Depth and Navigation Tests
// ============================================================================

#[test]
fn depth_limit_rejects_growth_but_allows_replace() {
    let (_rt, mut stack, _journal) = setup(RuntimeConfig::default().with_max_depth(2));
    stack.launch(root("notes.list", ActivityMode::SucceedTop)).unwrap();
    stack.launch(root("notes.edit", ActivityMode::SucceedTop)).unwrap();

    let err = stack
        .launch(root("notes.edit", ActivityMode::SucceedTop))
        .unwrap_err();
    assert!(matches!(err, ActivityError::StackFull { depth: 2 }));

    stack.launch(root("notes.edit", ActivityMode::ReplaceTop)).unwrap();
    assert_eq!(stack.depth(), 2);
}

#[test]
fn back_concludes_top_and_reactivates_previous() {
    let (_rt, mut stack, journal) = setup(RuntimeConfig::default());
    let a = created(stack.launch(root("notes.list", ActivityMode::SucceedTop)).unwrap());
    let b = created(stack.launch(root("notes.edit", ActivityMode::SucceedTop)).unwrap());

    assert!(stack.back().unwrap());
    assert_eq!(stack.ids(), vec![a]);
    assert_eq!(stack.state(a), Some(ActivityState::Active));
    assert!(journal.has(&format!("notes.edit{b}:destroy")));

    assert!(stack.back().unwrap());
    assert!(!stack.back().unwrap());
}

#[test]
fn default_action_follows_bundle_details() {
    let (_rt, mut stack, _journal) = setup(RuntimeConfig::default());
    let a = created(stack.launch(root("notes.list", ActivityMode::SucceedTop)).unwrap());
    let sticky = created(stack.launch(root("notes.sticky", ActivityMode::SucceedTop)).unwrap());

    assert!(stack.default_action().unwrap());
    assert_eq!(stack.top(), Some(sticky));

    stack.conclude(sticky, None).unwrap();
    assert!(stack.default_action().unwrap());
    assert!(!stack.contains(a));
    assert!(stack.is_empty());
}

#[test]
fn unknown_instance_is_an_error() {
    let (_rt, mut stack, _journal) = setup(RuntimeConfig::default());
    let err = stack.conclude(InstanceId(999), None).unwrap_err();
    assert!(matches!(err, ActivityError::UnknownInstance(InstanceId(999))));
}

#[test]
fn instance_ids_are_never_reused() {
    let (_rt, mut stack, _journal) = setup(RuntimeConfig::default());
    let a = created(stack.launch(root("notes.edit", ActivityMode::SucceedTop)).unwrap());
    stack.back().unwrap();
    let b = created(stack.launch(root("notes.edit", ActivityMode::SucceedTop)).unwrap());
    assert_ne!(a, b);
}

// ============================================================================
// 5. Panic Containment Tests
// ============================================================================

#[test]
fn activation_panic_swaps_in_placeholder() {
    let (_rt, mut stack, journal) = setup(RuntimeConfig::default());
    let edit = created(stack.launch(root("notes.edit", ActivityMode::SucceedTop)).unwrap());

    let outcome = stack
        .launch(root("notes.fragile", ActivityMode::SucceedTop))
        .unwrap();

    let LaunchOutcome::Placeholder(placeholder) = outcome else {
        panic!("expected a placeholder, got {outcome:?}");
    };
    assert_eq!(stack.ids(), vec![edit, placeholder]);
    assert_eq!(
        stack.activity_id(placeholder).map(ActivityId::as_str),
        Some(builtins::BAD_APP)
    );
    assert_eq!(stack.state(placeholder), Some(ActivityState::Active));
    assert_eq!(stack.state(edit), Some(ActivityState::Open));
    assert!(journal.has("fragile:destroy"));

    assert!(stack.back().unwrap());
    assert_eq!(stack.state(edit), Some(ActivityState::Active));
}

#[test]
fn input_panic_is_reported_and_activity_survives() {
    let (_rt, mut stack, _journal) = setup(RuntimeConfig::default());
    let jumpy = created(stack.launch(root("notes.jumpy", ActivityMode::SucceedTop)).unwrap());

    let err = stack.send_input(jumpy, &DataInput::default()).unwrap_err();

    assert!(matches!(err, ActivityError::Failed(ref msg) if msg.contains("input exploded")));
    assert_eq!(stack.state(jumpy), Some(ActivityState::Active));
    assert_eq!(stack.poll(), 0);
    assert!(stack.contains(jumpy));
}

#[test]
fn default_action_panic_is_reported() {
    let (_rt, mut stack, _journal) = setup(RuntimeConfig::default());
    let trap = created(stack.launch(root("notes.trap", ActivityMode::SucceedTop)).unwrap());

    let err = stack.default_action().unwrap_err();

    assert!(matches!(err, ActivityError::Failed(_)));
    assert_eq!(stack.top(), Some(trap));
    assert_eq!(stack.state(trap), Some(ActivityState::Active));
}
