//! Core execution engine
//!
//! This module provides the device-arbitrated execution pipeline:
//! - Executor: runs a request on a device-resident model, optionally batched
//! - Acquisition: borrows a device with bounded retries and always returns it
//! - Task: record-level entry point gluing fields, adapters and execution

mod acquisition;
mod executor;
mod task;

pub use acquisition::{
    CancelToken, DeviceAcquisitionLoop, ExecutionOutput, LoopState, RetryBudget,
    DEFAULT_MAX_TRIES, DEFAULT_TIMEOUT,
};
pub use executor::{plan_batches, BatchOutput, BatchedExecutor, ExecutionRequest};
pub use task::{ModelTask, ModelTaskBuilder, TaskReport};
