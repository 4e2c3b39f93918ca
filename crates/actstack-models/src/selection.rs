#![forbid(unsafe_code)]

//! Option list with an optional selected index.
//!
//! Replacing the options and clearing the selection is one logical change
//! and bumps the ledger once.

use actstack_core::{Binding, Error, Model, Result};

#[derive(Debug)]
pub struct Selection {
    binding: Binding,
    options: Vec<String>,
    selected: Option<usize>,
}

impl Selection {
    pub fn new(binding: Binding, options: Vec<String>) -> Self {
        Self {
            binding,
            options,
            selected: None,
        }
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_label(&self) -> Option<&str> {
        self.selected
            .and_then(|i| self.options.get(i))
            .map(String::as_str)
    }

    /// Select an index, or clear with `None`.
    pub fn select(&mut self, index: Option<usize>) -> Result<bool> {
        if let Some(i) = index {
            if i >= self.options.len() {
                return Err(Error::InvalidArgument(format!(
                    "selection {i} out of range for {} options",
                    self.options.len()
                )));
            }
        }
        self.binding.update(&mut self.selected, index)
    }

    /// Replace the option list, clearing the selection.
    pub fn set_options(&mut self, options: Vec<String>) -> Result<bool> {
        self.binding.ensure_mutable()?;
        if options == self.options && self.selected.is_none() {
            return Ok(false);
        }
        self.options = options;
        self.selected = None;
        self.binding.commit();
        Ok(true)
    }
}

impl Model for Selection {
    fn binding(&self) -> &Binding {
        &self.binding
    }

    fn copy(&self, binding: Binding) -> Self {
        Self {
            binding,
            options: self.options.clone(),
            selected: self.selected,
        }
    }
}
