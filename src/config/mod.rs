//! Configuration system for modeltask
//!
//! `TaskConfig` mirrors the constructor surface of [`ModelTask`] and adds the
//! device pool inventory, so a whole run can be described in one YAML or JSON
//! file.

mod model;
mod pool;
mod retry;
mod transform;

pub use model::ModelConfig;
pub use pool::{DeviceEntry, PoolConfig};
pub use retry::RetryConfig;
pub use transform::{build_transforms, TransformConfig};

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Result};
use candle_core::DType;
use serde::{Deserialize, Serialize};

use crate::engine::ModelTask;
use crate::model::{ArgValue, FunctionSelector};
use crate::tensor::OneOrMany;

/// Parse a dtype string into a `DType`.
///
/// Accepts short and long forms: "f32"/"float32", "f16"/"float16",
/// "bf16"/"bfloat16", "f64"/"float64", plus the integer types "u8", "u32", "i64".
pub fn parse_dtype(s: &str) -> Result<DType> {
    match s {
        "f32" | "float32" => Ok(DType::F32),
        "f16" | "float16" => Ok(DType::F16),
        "bf16" | "bfloat16" => Ok(DType::BF16),
        "f64" | "float64" => Ok(DType::F64),
        "u8" | "uint8" => Ok(DType::U8),
        "u32" | "uint32" => Ok(DType::U32),
        "i64" | "int64" => Ok(DType::I64),
        other => Err(anyhow!("unknown dtype: '{}'", other)),
    }
}

/// Task configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Input field name, or list of names
    pub input: OneOrMany<String>,

    /// Output field name, or list of names
    pub output: OneOrMany<String>,

    /// Model to run
    #[serde(default)]
    pub model: ModelConfig,

    /// Named model function (default: standard call)
    #[serde(default)]
    pub function: Option<String>,

    /// Extra positional arguments
    #[serde(default)]
    pub args: Vec<ArgValue>,

    /// Extra keyword arguments
    #[serde(default)]
    pub kwargs: BTreeMap<String, ArgValue>,

    /// Transform(s) applied before the dtype cast
    #[serde(default)]
    pub input_transform: Option<OneOrMany<TransformConfig>>,

    /// Transform(s) applied to the model output
    #[serde(default)]
    pub output_transform: Option<OneOrMany<TransformConfig>>,

    /// Element type for model inputs
    #[serde(default = "default_dtype")]
    pub dtype: String,

    /// Samples per device call (unset = whole input at once)
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Must stay false; sharing device memory is not supported
    #[serde(default)]
    pub shared_device_memory: bool,

    /// Device acquisition retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Device pool inventory
    #[serde(default)]
    pub pool: PoolConfig,
}

fn default_dtype() -> String {
    "f32".to_string()
}

impl TaskConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load by file extension (`.json`, otherwise YAML)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(path),
            _ => Self::from_yaml(path),
        }
    }

    /// Get the input dtype
    pub fn dtype(&self) -> Result<DType> {
        parse_dtype(&self.dtype)
    }

    /// Build the task described by this config
    pub fn build_task(&self) -> Result<ModelTask> {
        let model = self.model.build()?;
        let mut builder = ModelTask::builder(model)
            .input(self.input.clone())
            .output(self.output.clone())
            .function(FunctionSelector::from_option(self.function.as_deref()))
            .dtype(self.dtype()?)
            .batch_size(self.batch_size)
            .shared_device_memory(self.shared_device_memory)
            .retry(self.retry.budget()?);

        for arg in &self.args {
            builder = builder.arg(arg.clone().into_arg()?);
        }
        for (name, arg) in &self.kwargs {
            builder = builder.kwarg(name.clone(), arg.clone().into_arg()?);
        }
        if let Some(transforms) = &self.input_transform {
            builder = builder.input_transform(build_transforms(transforms));
        }
        if let Some(transforms) = &self.output_transform {
            builder = builder.output_transform(build_transforms(transforms));
        }
        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_config_yaml() {
        let yaml = r#"
input: [image, mask]
output: [image_out, mask_out]

model:
  type: identity
  latency_ms: 1

function: forward
kwargs:
  scale: 0.5

input_transform:
  - type: scale
    factor: 2.0
  - type: identity

dtype: f16
batch_size: 4

retry:
  max_tries: 5
  timeout_secs: 0.5

pool:
  devices:
    - cpu:0
    - cpu:1
"#;
        let config: TaskConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.input.len(), 2);
        assert_eq!(config.dtype().unwrap(), DType::F16);
        assert_eq!(config.retry.max_tries, 5);
        assert_eq!(config.pool.devices.len(), 2);
        assert!(!config.shared_device_memory);

        let task = config.build_task().unwrap();
        assert_eq!(task.batch_size().map(|n| n.get()), Some(4));
        assert_eq!(task.retry_budget().max_tries(), 5);
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config: TaskConfig = serde_json::from_str(r#"{"input": "x", "output": "y"}"#).unwrap();
        assert_eq!(config.dtype().unwrap(), DType::F32);
        assert_eq!(config.retry.max_tries, 33);
        assert_eq!(config.batch_size, None);
        let task = config.build_task().unwrap();
        assert_eq!(task.retry_budget().timeout(), std::time::Duration::from_secs(3));
    }

    #[test]
    fn test_shared_memory_rejected() {
        let config: TaskConfig = serde_yaml::from_str(
            "input: x\noutput: y\nshared_device_memory: true\n",
        )
        .unwrap();
        assert!(config.build_task().is_err());
    }

    #[test]
    fn test_infinite_timeout_rejected() {
        let config: TaskConfig = serde_yaml::from_str(
            "input: x\noutput: y\nretry:\n  timeout_secs: .inf\n",
        )
        .unwrap();
        let err = config.build_task().unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.json");
        std::fs::write(&path, r#"{"input": "x", "output": "y", "batch_size": 2}"#).unwrap();
        assert_eq!(TaskConfig::load(&path).unwrap().batch_size, Some(2));
    }

    #[test]
    fn test_parse_dtype_f32() {
        assert_eq!(parse_dtype("f32").unwrap(), DType::F32);
        assert_eq!(parse_dtype("float32").unwrap(), DType::F32);
    }

    #[test]
    fn test_parse_dtype_half() {
        assert_eq!(parse_dtype("f16").unwrap(), DType::F16);
        assert_eq!(parse_dtype("bfloat16").unwrap(), DType::BF16);
    }

    #[test]
    fn test_parse_dtype_unknown() {
        assert!(parse_dtype("int8").is_err());
        assert!(parse_dtype("").is_err());
        assert!(parse_dtype("F32").is_err());
    }
}
