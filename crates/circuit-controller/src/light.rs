//! Light state model.

use std::fmt;

use circuit_protocol::{CircuitState, MAX_LEVEL};
use serde::Serialize;

use crate::error::{ControllerError, ControllerResult};

/// Circuit state and brightness of the light. The level is always within 0-100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LightState {
    state: CircuitState,
    level: u8,
}

impl LightState {
    /// Validate and build a light state.
    pub fn new(state: CircuitState, level: u8) -> ControllerResult<Self> {
        if level > MAX_LEVEL {
            return Err(ControllerError::InvalidLevel(level));
        }
        Ok(LightState { state, level })
    }

    /// Circuit state.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Brightness level.
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Whether the circuit is energised.
    pub fn is_on(&self) -> bool {
        self.state == CircuitState::On
    }
}

impl fmt::Display for LightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, level {}", self.state, self.level)
    }
}

/// The physical line the light hangs off.
pub trait CircuitOutput: Send {
    /// Drive the line high (`true`) or low.
    fn drive(&mut self, energised: bool);
}

/// Holds the light state and drives the optional output line.
///
/// The model does not publish anything itself; the controller pairs every mutation
/// with a dirty notification.
pub struct LightModel {
    current: LightState,
    output: Option<Box<dyn CircuitOutput>>,
}

impl LightModel {
    /// Create a model with no output line.
    pub fn new(initial: LightState) -> Self {
        LightModel {
            current: initial,
            output: None,
        }
    }

    /// Attach an output line and drive it to the current state.
    pub fn attach_output(&mut self, mut output: Box<dyn CircuitOutput>) {
        output.drive(self.current.is_on());
        self.output = Some(output);
    }

    /// Current state.
    pub fn current(&self) -> LightState {
        self.current
    }

    /// Replace the state. Always succeeds; `next` is valid by construction.
    pub fn apply(&mut self, next: LightState) {
        self.current = next;
        if let Some(output) = self.output.as_mut() {
            output.drive(next.is_on());
        }
    }

    /// State a toggle would produce. `None` while the circuit is INCONSISTENT.
    pub fn toggled(&self) -> Option<LightState> {
        match self.current.state {
            CircuitState::Inconsistent => None,
            state => Some(LightState {
                state: state.toggled(),
                level: self.current.level,
            }),
        }
    }
}

impl fmt::Debug for LightModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LightModel")
            .field("current", &self.current)
            .field("has_output", &self.output.is_some())
            .finish()
    }
}
