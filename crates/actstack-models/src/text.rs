#![forbid(unsafe_code)]

//! Single-string model with an optional character limit.

use actstack_core::{Binding, Error, Model, Result};

#[derive(Debug)]
pub struct Text {
    binding: Binding,
    value: String,
    max_chars: Option<usize>,
}

impl Text {
    pub fn new(binding: Binding, value: impl Into<String>) -> Self {
        Self {
            binding,
            value: value.into(),
            max_chars: None,
        }
    }

    /// Limit the number of characters accepted by later writes.
    ///
    /// The current value is not truncated.
    #[must_use]
    pub fn with_max_chars(mut self, max: usize) -> Self {
        self.max_chars = Some(max);
        self
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    fn check_len(&self, candidate: &str) -> Result<()> {
        match self.max_chars {
            Some(max) if candidate.chars().count() > max => Err(Error::InvalidArgument(format!(
                "text longer than {max} characters"
            ))),
            _ => Ok(()),
        }
    }

    /// Replace the value. Returns whether it changed.
    pub fn set(&mut self, value: impl Into<String>) -> Result<bool> {
        let value = value.into();
        self.binding.ensure_mutable()?;
        self.check_len(&value)?;
        self.binding.update(&mut self.value, value)
    }

    /// Append text; appending nothing is a no-op.
    pub fn push_str(&mut self, more: &str) -> Result<bool> {
        self.binding.ensure_mutable()?;
        if more.is_empty() {
            return Ok(false);
        }
        let mut next = String::with_capacity(self.value.len() + more.len());
        next.push_str(&self.value);
        next.push_str(more);
        self.check_len(&next)?;
        self.value = next;
        self.binding.commit();
        Ok(true)
    }

    /// Remove the last character, if any.
    pub fn pop(&mut self) -> Result<Option<char>> {
        self.binding.ensure_mutable()?;
        let popped = self.value.pop();
        if popped.is_some() {
            self.binding.commit();
        }
        Ok(popped)
    }
}

impl Model for Text {
    fn binding(&self) -> &Binding {
        &self.binding
    }

    fn copy(&self, binding: Binding) -> Self {
        Self {
            binding,
            value: self.value.clone(),
            max_chars: self.max_chars,
        }
    }
}
