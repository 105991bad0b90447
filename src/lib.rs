//! modeltask - run models on records over a shared device pool
//!
//! A `ModelTask` reads tensor fields from a record, runs a model function on
//! them using one device borrowed from a bounded pool, and writes the result
//! back. Many workers can share one pool: each invocation waits a bounded
//! time for a device, retries a bounded number of times, and always returns
//! the device, even if the model fails.
//!
//! # Architecture
//!
//! - **device**: device identifiers, in-process and cross-process pools, scoped leases
//! - **tensor**: single-or-list values, transforms, host/model conversion
//! - **model**: model traits plus built-in identity and linear models
//! - **engine**: batched execution, acquisition loop, the task itself
//! - **record**: record store interface and an in-memory record
//! - **config**: YAML/JSON task description
//!
//! # Example
//!
//! ```bash
//! # One record through a task
//! modeltask run --config task.yaml --record in.safetensors --out out.safetensors
//!
//! # Many concurrent workers against one pool
//! modeltask stress --config task.yaml --workers 8 --devices cpu:0,cpu:1
//! ```

pub mod cli;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod model;
pub mod record;
pub mod tensor;

// Re-export key types
pub use config::TaskConfig;
pub use device::{DeviceId, DeviceLease, DevicePool, QueuePool};
#[cfg(unix)]
pub use device::FileLockPool;
pub use engine::{CancelToken, ModelTask, RetryBudget, TaskReport};
pub use error::{Phase, Result, TaskError};
pub use model::{FunctionSelector, Model, ModelHandle};
pub use record::{MemoryRecord, Record};
pub use tensor::{OneOrMany, Transform};
