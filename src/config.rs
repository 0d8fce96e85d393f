//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

/// Tunables for the stream orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Delay between a playback close and the power-domain stop
    /// notification, in milliseconds. Debounces rapid close/open cycles so
    /// power cycling does not cause audible pops between tracks.
    pub power_down_delay_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            power_down_delay_ms: 5000,
        }
    }
}
