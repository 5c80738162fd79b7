//! The state the user asked for.

use circuit_protocol::{CircuitState, SetCircuitStateArgs, MAX_LEVEL};
use serde::Serialize;

use crate::error::{SwitchError, SwitchResult};

/// Desired light state held by the switch.
///
/// `change_pending` is set while a requested change has not yet been handed to a
/// ready binding. There is only ever one pending value: the latest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DesiredState {
    state: CircuitState,
    level: u8,
    change_pending: bool,
}

impl DesiredState {
    /// OFF at `level`, nothing pending.
    pub fn new(level: u8) -> SwitchResult<Self> {
        if level > MAX_LEVEL {
            return Err(SwitchError::InvalidLevel(level));
        }
        Ok(DesiredState {
            state: CircuitState::Off,
            level,
            change_pending: false,
        })
    }

    /// Desired circuit state. Always ON or OFF.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Desired level.
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Whether a change is waiting for the binding.
    pub fn change_pending(&self) -> bool {
        self.change_pending
    }

    /// Whether `(state, level)` equals the desired values.
    pub fn matches(&self, state: CircuitState, level: u8) -> bool {
        self.state == state && self.level == level
    }

    /// Replace the desired values. The caller validates them.
    pub(crate) fn update(&mut self, state: CircuitState, level: u8) {
        self.state = state;
        self.level = level;
    }

    /// Flip ON and OFF.
    pub(crate) fn toggle(&mut self) {
        self.state = self.state.toggled();
    }

    /// Mark the current values pending. Returns whether a change was already pending.
    pub(crate) fn mark_pending(&mut self) -> bool {
        std::mem::replace(&mut self.change_pending, true)
    }

    /// The current values are being sent.
    pub(crate) fn clear_pending(&mut self) {
        self.change_pending = false;
    }

    /// Command arguments carrying the desired values.
    pub fn args(&self) -> SetCircuitStateArgs {
        SetCircuitStateArgs::new(self.state, self.level)
    }
}
