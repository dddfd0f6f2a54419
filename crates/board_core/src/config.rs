use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Extra attempts for a failed write step before the mutation is undone.
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 2,
            retry_delay_ms: 50,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// No retries and no delay; used where failures must surface at once.
    pub fn fail_fast() -> Self {
        Self {
            retry_attempts: 0,
            retry_delay_ms: 0,
            ..Self::default()
        }
    }
}
