//! Controller configuration.

use circuit_protocol::{CircuitState, DEFAULT_TRAIT_INSTANCE};
use serde::{Deserialize, Serialize};

/// Configuration for a light controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Controller name, used in logs and metric labels.
    pub name: String,
    /// Instance id both traits are published on.
    pub instance_id: u32,
    /// State at power-up.
    pub initial_state: CircuitState,
    /// Level at power-up.
    pub initial_level: u8,
    /// Publication version of the state trait at power-up.
    pub initial_version: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            name: "LightController".to_string(),
            instance_id: DEFAULT_TRAIT_INSTANCE,
            initial_state: CircuitState::Off,
            initial_level: 100,
            initial_version: 1,
        }
    }
}
