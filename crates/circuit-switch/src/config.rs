//! Switch configuration.

use circuit_common::{NodeId, RetryPolicy, SecurityMode};
use serde::{Deserialize, Serialize};

/// Configuration for a light switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    /// Switch name, used in logs and metric labels.
    pub name: String,
    /// Node the light controller runs on.
    pub controller_node_id: NodeId,
    /// Retransmission policy of the binding.
    pub retry: RetryPolicy,
    /// Message security of the binding.
    pub security: SecurityMode,
    /// Level sent with the first change.
    pub initial_level: u8,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        SwitchConfig {
            name: "LightSwitch".to_string(),
            controller_node_id: NodeId(0),
            retry: RetryPolicy::default(),
            security: SecurityMode::None,
            initial_level: 100,
        }
    }
}
