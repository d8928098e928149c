//! Runtime Configuration
//!
//! Tunables for a [`Runtime`](crate::reactive::Runtime). The struct derives
//! serde so hosts can embed it in their own configuration files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReactiveError, Result};

/// Default cap on how often one updatable may be enqueued per flush session.
pub const DEFAULT_MAX_UPDATES_PER_SESSION: usize = 100;

/// Default frame interval (roughly 60 frames per second).
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;

/// Configuration for a reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How many times a single updatable may be (re-)enqueued within one
    /// flush session before further enqueues are rejected as a runaway cycle.
    pub max_updates_per_session: usize,

    /// Delay used by [`TokioFrameClock`](crate::queue::TokioFrameClock)
    /// between a frame request and the flush it triggers.
    pub frame_interval_ms: u64,
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_updates_per_session == 0 {
            return Err(ReactiveError::InvalidConfig(
                "max_updates_per_session must be at least 1".into(),
            ));
        }
        if self.frame_interval_ms == 0 {
            return Err(ReactiveError::InvalidConfig(
                "frame_interval_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The frame interval as a [`Duration`].
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_updates_per_session: DEFAULT_MAX_UPDATES_PER_SESSION,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
        }
    }
}
