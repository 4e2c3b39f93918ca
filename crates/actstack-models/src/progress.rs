#![forbid(unsafe_code)]

//! Progress fraction model.

use actstack_core::{Binding, Error, Model, Result};

/// Either a known fraction or "working, amount unknown".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressValue {
    Fraction(f32),
    Indeterminate,
}

#[derive(Debug)]
pub struct Progress {
    binding: Binding,
    value: ProgressValue,
}

impl Progress {
    pub fn new(binding: Binding) -> Self {
        Self {
            binding,
            value: ProgressValue::Fraction(0.0),
        }
    }

    pub fn value(&self) -> ProgressValue {
        self.value
    }

    pub fn fraction(&self) -> Option<f32> {
        match self.value {
            ProgressValue::Fraction(f) => Some(f),
            ProgressValue::Indeterminate => None,
        }
    }

    /// Set a fraction in `[0, 1]`. NaN and out-of-range values are rejected.
    pub fn set_fraction(&mut self, fraction: f32) -> Result<bool> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(Error::InvalidArgument(format!(
                "progress fraction {fraction} outside [0, 1]"
            )));
        }
        self.binding
            .update(&mut self.value, ProgressValue::Fraction(fraction))
    }

    pub fn set_indeterminate(&mut self) -> Result<bool> {
        self.binding
            .update(&mut self.value, ProgressValue::Indeterminate)
    }
}

impl Model for Progress {
    fn binding(&self) -> &Binding {
        &self.binding
    }

    fn copy(&self, binding: Binding) -> Self {
        Self {
            binding,
            value: self.value,
        }
    }
}
