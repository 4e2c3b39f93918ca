#![forbid(unsafe_code)]

//! Checkbox-like boolean model.

use actstack_core::{Binding, Model, Result};

/// A boolean that records each flip on its ledger.
#[derive(Debug)]
pub struct Toggle {
    binding: Binding,
    checked: bool,
}

impl Toggle {
    pub fn new(binding: Binding, checked: bool) -> Self {
        Self { binding, checked }
    }

    #[inline]
    pub fn is_checked(&self) -> bool {
        self.checked
    }

    /// Set the state. Returns whether it changed.
    pub fn checked(&mut self, checked: bool) -> Result<bool> {
        self.binding.update(&mut self.checked, checked)
    }

    /// Flip the state.
    pub fn toggle(&mut self) -> Result<()> {
        let next = !self.checked;
        self.checked(next).map(|_| ())
    }
}

impl Model for Toggle {
    fn binding(&self) -> &Binding {
        &self.binding
    }

    fn copy(&self, binding: Binding) -> Self {
        Self::new(binding, self.checked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actstack_core::{ContextId, Error, Ledger};

    #[test]
    fn second_identical_check_is_a_no_op() {
        let ledger = Ledger::new();
        let mut toggle = Toggle::new(Binding::bound(ContextId(1), ledger.clone()), false);

        assert!(toggle.checked(true).unwrap());
        assert!(!toggle.checked(true).unwrap());
        assert_eq!(ledger.revision(), 1);
    }

    #[test]
    fn toggle_flips() {
        let ledger = Ledger::new();
        let mut toggle = Toggle::new(Binding::bound(ContextId(1), ledger.clone()), true);
        toggle.toggle().unwrap();
        assert!(!toggle.is_checked());
        toggle.toggle().unwrap();
        assert!(toggle.is_checked());
        assert_eq!(ledger.revision(), 2);
    }

    #[test]
    fn snapshot_is_frozen() {
        let ledger = Ledger::new();
        let toggle = Toggle::new(Binding::bound(ContextId(1), ledger), true);
        let mut snap = toggle.snapshot();
        assert!(snap.is_detached());
        assert!(snap.is_checked());
        assert!(matches!(snap.checked(false), Err(Error::IllegalState(_))));
        assert!(snap.is_checked());
    }
}
