//! Device acquisition retry settings

use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::engine::{RetryBudget, DEFAULT_MAX_TRIES, DEFAULT_TIMEOUT};

/// Retry budget as written in a task config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Acquisition attempts before giving up
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,

    /// Wait per attempt in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
}

fn default_max_tries() -> u32 {
    DEFAULT_MAX_TRIES
}

fn default_timeout_secs() -> f64 {
    DEFAULT_TIMEOUT.as_secs_f64()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_tries: default_max_tries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RetryConfig {
    /// Per-attempt wait; must be a finite, non-negative number of seconds
    pub fn timeout(&self) -> Result<Duration> {
        let secs = self.timeout_secs;
        if !secs.is_finite() || secs < 0.0 {
            return Err(anyhow!("retry timeout_secs must be finite and >= 0, got {}", secs));
        }
        Duration::try_from_secs_f64(secs)
            .map_err(|e| anyhow!("retry timeout_secs {} out of range: {}", secs, e))
    }

    pub fn budget(&self) -> Result<RetryBudget> {
        Ok(RetryBudget::new(self.max_tries, self.timeout()?)?)
    }
}
