#![forbid(unsafe_code)]

//! Built-in activities.
//!
//! Built-ins have no app identity. They are consulted before any app when a
//! launch names no target app, and they talk to their requester only through
//! the launch input and the response payload:
//!
//! | Id | Input | Host input | Response |
//! |----|-------|------------|----------|
//! | `builtin.select` | `options: [str]` | `select: int`, `confirm: bool` | `selected: int` |
//! | `builtin.dialog` | `message: str` | `confirm: bool` | `confirmed: bool` |
//! | `builtin.keyboard` | `text: str` | `text`, `append: str`, `backspace`, `submit` | `text: str` |
//!
//! [`BadAppActivity`] stands in for anything that failed to instantiate.

use crate::activity::Activity;
use crate::context::ActivityContext;
use crate::error::{ActivityError, ActivityResult};
use crate::instance::{ActivityInstance, DefaultAction};
use crate::marshal::panic_message;
use actstack_core::{ActivityId, DataInput, DataOutput, Value};
use actstack_models::{Selection, Text};
use rustc_hash::FxHashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

pub const SELECT: &str = "builtin.select";
pub const DIALOG: &str = "builtin.dialog";
pub const KEYBOARD: &str = "builtin.keyboard";
/// Activity id of placeholder slots.
pub const BAD_APP: &str = "builtin.bad_app";

/// Registry metadata for a built-in.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinMeta {
    pub id: &'static str,
    pub title: &'static str,
    pub blurb: &'static str,
    make: fn() -> Box<dyn Activity>,
}

/// Standard built-ins, in registration order.
pub const BUILTIN_REGISTRY: &[BuiltinMeta] = &[
    BuiltinMeta {
        id: SELECT,
        title: "Select",
        blurb: "Choose one entry from a list.",
        make: make_select,
    },
    BuiltinMeta {
        id: DIALOG,
        title: "Dialog",
        blurb: "Show a message and ask for confirmation.",
        make: make_dialog,
    },
    BuiltinMeta {
        id: KEYBOARD,
        title: "Keyboard",
        blurb: "Edit a line of text.",
        make: make_keyboard,
    },
];

fn make_select() -> Box<dyn Activity> {
    Box::new(SelectActivity::default())
}

fn make_dialog() -> Box<dyn Activity> {
    Box::new(DialogActivity::default())
}

fn make_keyboard() -> Box<dyn Activity> {
    Box::new(KeyboardActivity::default())
}

type BuiltinFactory = Box<dyn Fn() -> Box<dyn Activity> + Send + Sync>;

/// Lookup table of built-in activities.
pub struct Builtins {
    table: FxHashMap<ActivityId, BuiltinFactory>,
}

impl Builtins {
    /// An empty table.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            table: FxHashMap::default(),
        }
    }

    /// The [`BUILTIN_REGISTRY`] entries.
    #[must_use]
    pub fn standard() -> Self {
        let mut builtins = Self::empty();
        for meta in BUILTIN_REGISTRY {
            let make = meta.make;
            if let Ok(id) = ActivityId::new(meta.id) {
                builtins.table.insert(id, Box::new(make));
            }
        }
        builtins
    }

    /// Add or replace a built-in.
    pub fn register(
        &mut self,
        id: ActivityId,
        make: impl Fn() -> Box<dyn Activity> + Send + Sync + 'static,
    ) {
        self.table.insert(id, Box::new(make));
    }

    pub fn contains(&self, id: &ActivityId) -> bool {
        self.table.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Build `id`, or `None` when it is not a built-in or its factory panics.
    pub fn instantiate(&self, id: &ActivityId) -> Option<ActivityInstance> {
        let make = self.table.get(id)?;
        match panic::catch_unwind(AssertUnwindSafe(|| make())) {
            Ok(activity) => Some(ActivityInstance::new(None, activity, DefaultAction::Conclude)),
            Err(payload) => {
                tracing::error!(
                    activity = %id,
                    panic = %panic_message(payload.as_ref()),
                    "built-in instantiation failed"
                );
                None
            }
        }
    }

    /// Diagnostic stand-in for a failed launch.
    pub fn placeholder(reason: impl Into<String>) -> ActivityInstance {
        ActivityInstance::new(
            None,
            Box::new(BadAppActivity::new(reason)),
            DefaultAction::Conclude,
        )
    }
}

impl Default for Builtins {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for Builtins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&str> = self.table.keys().map(ActivityId::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("Builtins").field("ids", &ids).finish()
    }
}

fn not_open() -> ActivityError {
    ActivityError::failed("input before open")
}

/// `builtin.select`.
#[derive(Debug, Default)]
pub struct SelectActivity {
    selection: Option<Selection>,
}

impl SelectActivity {
    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }
}

impl Activity for SelectActivity {
    fn open(&mut self, ctx: &mut ActivityContext, saved: Option<&DataInput>) -> ActivityResult<()> {
        let source = saved.unwrap_or(ctx.input());
        let options = source.get_str_list("options").unwrap_or_default();
        let selected = source
            .get_int("selected")
            .and_then(|i| usize::try_from(i).ok())
            .filter(|i| *i < options.len());
        let mut selection = Selection::new(ctx.bind(), options);
        if selected.is_some() {
            selection.select(selected)?;
        }
        self.selection = Some(selection);
        Ok(())
    }

    fn on_input(&mut self, ctx: &mut ActivityContext, input: &DataInput) -> ActivityResult<()> {
        let selection = self.selection.as_mut().ok_or_else(not_open)?;
        if let Some(index) = input.get_int("select") {
            let index = usize::try_from(index)
                .map_err(|_| ActivityError::failed(format!("negative selection {index}")))?;
            selection.select(Some(index))?;
        }
        if input.get_bool("confirm") == Some(true) {
            let mut out = DataOutput::new();
            if let Some(i) = selection.selected() {
                out.put_int("selected", i as i64)?;
            }
            ctx.respond(out);
        }
        Ok(())
    }

    fn close(&mut self, _ctx: &mut ActivityContext, out: &mut DataOutput) -> ActivityResult<()> {
        if let Some(selection) = &self.selection {
            let options = selection
                .options()
                .iter()
                .map(|o| Value::Str(o.clone()))
                .collect();
            out.put_list("options", options)?;
            if let Some(i) = selection.selected() {
                out.put_int("selected", i as i64)?;
            }
        }
        Ok(())
    }
}

/// `builtin.dialog`.
#[derive(Debug, Default)]
pub struct DialogActivity {
    message: Option<Text>,
}

impl DialogActivity {
    pub fn message(&self) -> Option<&str> {
        self.message.as_ref().map(Text::value)
    }
}

impl Activity for DialogActivity {
    fn open(&mut self, ctx: &mut ActivityContext, saved: Option<&DataInput>) -> ActivityResult<()> {
        let source = saved.unwrap_or(ctx.input());
        let message = source.get_str("message").unwrap_or_default().to_owned();
        self.message = Some(Text::new(ctx.bind(), message));
        Ok(())
    }

    fn on_input(&mut self, ctx: &mut ActivityContext, input: &DataInput) -> ActivityResult<()> {
        if let Some(confirmed) = input.get_bool("confirm") {
            let mut out = DataOutput::new();
            out.put_bool("confirmed", confirmed)?;
            ctx.respond(out);
        }
        Ok(())
    }

    fn close(&mut self, _ctx: &mut ActivityContext, out: &mut DataOutput) -> ActivityResult<()> {
        if let Some(message) = &self.message {
            out.put_str("message", message.value())?;
        }
        Ok(())
    }
}

/// `builtin.keyboard`.
#[derive(Debug, Default)]
pub struct KeyboardActivity {
    text: Option<Text>,
}

impl KeyboardActivity {
    pub fn text(&self) -> Option<&str> {
        self.text.as_ref().map(Text::value)
    }
}

impl Activity for KeyboardActivity {
    fn open(&mut self, ctx: &mut ActivityContext, saved: Option<&DataInput>) -> ActivityResult<()> {
        let source = saved.unwrap_or(ctx.input());
        let mut text = Text::new(ctx.bind(), source.get_str("text").unwrap_or_default());
        if let Some(max) = ctx.input().get_int("max_chars") {
            let max = usize::try_from(max)
                .map_err(|_| ActivityError::failed(format!("negative max_chars {max}")))?;
            text = text.with_max_chars(max);
        }
        self.text = Some(text);
        Ok(())
    }

    fn on_input(&mut self, ctx: &mut ActivityContext, input: &DataInput) -> ActivityResult<()> {
        let text = self.text.as_mut().ok_or_else(not_open)?;
        if let Some(value) = input.get_str("text") {
            text.set(value)?;
        }
        if let Some(more) = input.get_str("append") {
            text.push_str(more)?;
        }
        if input.get_bool("backspace") == Some(true) {
            text.pop()?;
        }
        if input.get_bool("submit") == Some(true) {
            let mut out = DataOutput::new();
            out.put_str("text", text.value())?;
            ctx.respond(out);
        }
        Ok(())
    }

    fn close(&mut self, _ctx: &mut ActivityContext, out: &mut DataOutput) -> ActivityResult<()> {
        if let Some(text) = &self.text {
            out.put_str("text", text.value())?;
        }
        Ok(())
    }
}

/// Placeholder shown when an activity could not be launched.
#[derive(Debug)]
pub struct BadAppActivity {
    reason: String,
    shown: Option<Text>,
}

impl BadAppActivity {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            shown: None,
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Text currently on display, once opened.
    pub fn displayed(&self) -> Option<&str> {
        self.shown.as_ref().map(Text::value)
    }
}

impl Activity for BadAppActivity {
    fn open(&mut self, ctx: &mut ActivityContext, saved: Option<&DataInput>) -> ActivityResult<()> {
        if let Some(reason) = saved.and_then(|s| s.get_str("reason")) {
            self.reason = reason.to_owned();
        }
        self.shown = Some(Text::new(ctx.bind(), self.reason.clone()));
        Ok(())
    }

    fn close(&mut self, _ctx: &mut ActivityContext, out: &mut DataOutput) -> ActivityResult<()> {
        out.put_str("reason", &self.reason)?;
        Ok(())
    }
}
