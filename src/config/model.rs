//! Model selection

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{Identity, Linear, ModelHandle};

/// Which model a task runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelConfig {
    /// Pass-through model, optionally slowed down to simulate device work
    Identity {
        #[serde(default)]
        latency_ms: Option<u64>,
    },
    /// Dense layer with weights from a safetensors file
    Linear { weights: PathBuf },
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig::Identity { latency_ms: None }
    }
}

impl ModelConfig {
    /// Load the host-resident model
    pub fn build(&self) -> Result<ModelHandle> {
        match self {
            ModelConfig::Identity { latency_ms } => {
                let mut model = Identity::new();
                if let Some(ms) = latency_ms {
                    model = model.with_latency(Duration::from_millis(*ms));
                }
                Ok(Arc::new(model))
            }
            ModelConfig::Linear { weights } => {
                let model = Linear::load(weights)
                    .with_context(|| format!("loading weights from {}", weights.display()))?;
                tracing::info!(
                    "Loaded linear model {} -> {} from {}",
                    model.in_features(),
                    model.out_features(),
                    weights.display()
                );
                Ok(Arc::new(model))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelConfig::Identity { .. } => "identity",
            ModelConfig::Linear { .. } => "linear",
        }
    }
}
