//! Record-level entry point
//!
//! `ModelTask` reads input fields from a record, adapts them, runs the model
//! on a pooled device and writes the outputs back.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::time::Duration;

use candle_core::{DType, Tensor};

use super::acquisition::{CancelToken, DeviceAcquisitionLoop, RetryBudget};
use super::executor::ExecutionRequest;
use crate::device::{DeviceId, DevicePool};
use crate::error::{Phase, Result, TaskError};
use crate::model::{Arg, FunctionSelector, ModelHandle};
use crate::record::Record;
use crate::tensor::{sample_count, OneOrMany, TensorAdapter, Transform};

/// Summary of one successful invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskReport {
    pub device: DeviceId,
    pub attempts: u32,
    pub batches: usize,
}

/// Runs one model function over fields of a record using a shared device pool
pub struct ModelTask {
    inputs: OneOrMany<String>,
    outputs: OneOrMany<String>,
    model: ModelHandle,
    function: FunctionSelector,
    args: Vec<Arg>,
    kwargs: BTreeMap<String, Arg>,
    input_transform: Option<OneOrMany<Transform>>,
    output_transform: Option<OneOrMany<Transform>>,
    adapter: TensorAdapter,
    batch_size: Option<NonZeroUsize>,
    acquisition: DeviceAcquisitionLoop,
}

impl ModelTask {
    pub fn builder(model: ModelHandle) -> ModelTaskBuilder {
        ModelTaskBuilder::new(model)
    }

    pub fn inputs(&self) -> &OneOrMany<String> {
        &self.inputs
    }

    pub fn outputs(&self) -> &OneOrMany<String> {
        &self.outputs
    }

    pub fn batch_size(&self) -> Option<NonZeroUsize> {
        self.batch_size
    }

    pub fn retry_budget(&self) -> RetryBudget {
        self.acquisition.budget()
    }

    /// Run the task on `record`, writing the output field(s) in place
    pub fn execute<'r, R: Record + ?Sized>(
        &self,
        record: &'r mut R,
        pool: &dyn DevicePool,
    ) -> Result<&'r mut R> {
        self.run(record, pool, None)?;
        Ok(record)
    }

    /// Like [`ModelTask::execute`], with cancellation between acquisition
    /// attempts and a report of how the run went.
    ///
    /// On error the output fields are left untouched.
    pub fn run<R: Record + ?Sized>(
        &self,
        record: &mut R,
        pool: &dyn DevicePool,
        cancel: Option<&CancelToken>,
    ) -> Result<TaskReport> {
        let inputs = self.read_inputs(record)?;
        let inputs = self.adapter.forward(inputs, self.input_transform.as_ref())?;
        if self.batch_size.is_some() {
            sample_count(&inputs)?;
        }

        let request = ExecutionRequest {
            input: inputs,
            function: self.function.clone(),
            args: self.args.clone(),
            kwargs: self.kwargs.clone(),
            batch_size: self.batch_size,
        };
        let output = self
            .acquisition
            .run(pool, self.model.as_ref(), &request, cancel)?;

        let tensors = self
            .adapter
            .inverse(output.tensors, self.output_transform.as_ref())?;
        self.write_outputs(record, tensors)?;

        Ok(TaskReport {
            device: output.device,
            attempts: output.attempts,
            batches: output.batches,
        })
    }

    fn read_inputs<R: Record + ?Sized>(&self, record: &R) -> Result<OneOrMany<Tensor>> {
        self.inputs.as_ref().try_map(|_, field| {
            record.get(field).ok_or_else(|| TaskError::MissingField {
                field: field.clone(),
            })
        })
    }

    fn write_outputs<R: Record + ?Sized>(
        &self,
        record: &mut R,
        tensors: OneOrMany<Tensor>,
    ) -> Result<()> {
        // Check everything before touching the record
        let pairs = tensors.pair_with(&self.outputs, Phase::Output)?;
        for (tensor, field) in pairs.into_vec() {
            record.set(field, tensor);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ModelTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelTask")
            .field("model", &self.model.name())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("function", &self.function)
            .field("batch_size", &self.batch_size)
            .field("retry", &self.acquisition.budget())
            .finish()
    }
}

/// Builder for [`ModelTask`]; validation happens in [`ModelTaskBuilder::build`]
pub struct ModelTaskBuilder {
    model: ModelHandle,
    inputs: Option<OneOrMany<String>>,
    outputs: Option<OneOrMany<String>>,
    function: FunctionSelector,
    args: Vec<Arg>,
    kwargs: BTreeMap<String, Arg>,
    input_transform: Option<OneOrMany<Transform>>,
    output_transform: Option<OneOrMany<Transform>>,
    dtype: DType,
    batch_size: Option<usize>,
    shared_device_memory: bool,
    max_tries: u32,
    timeout: Duration,
}

impl ModelTaskBuilder {
    fn new(model: ModelHandle) -> Self {
        let budget = RetryBudget::default();
        Self {
            model,
            inputs: None,
            outputs: None,
            function: FunctionSelector::Call,
            args: Vec::new(),
            kwargs: BTreeMap::new(),
            input_transform: None,
            output_transform: None,
            dtype: DType::F32,
            batch_size: None,
            shared_device_memory: false,
            max_tries: budget.max_tries(),
            timeout: budget.timeout(),
        }
    }

    pub fn input(mut self, fields: impl Into<OneOrMany<String>>) -> Self {
        self.inputs = Some(fields.into());
        self
    }

    pub fn output(mut self, fields: impl Into<OneOrMany<String>>) -> Self {
        self.outputs = Some(fields.into());
        self
    }

    pub fn function(mut self, function: FunctionSelector) -> Self {
        self.function = function;
        self
    }

    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, arg: impl Into<Arg>) -> Self {
        self.kwargs.insert(name.into(), arg.into());
        self
    }

    pub fn input_transform(mut self, transform: OneOrMany<Transform>) -> Self {
        self.input_transform = Some(transform);
        self
    }

    pub fn output_transform(mut self, transform: OneOrMany<Transform>) -> Self {
        self.output_transform = Some(transform);
        self
    }

    /// Element type inputs are cast to (default f32)
    pub fn dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn batch_size(mut self, batch_size: Option<usize>) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sharing device memory across invocations is not supported; setting
    /// this makes `build` fail.
    pub fn shared_device_memory(mut self, shared: bool) -> Self {
        self.shared_device_memory = shared;
        self
    }

    pub fn max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set both retry settings from an already validated budget
    pub fn retry(self, budget: RetryBudget) -> Self {
        self.max_tries(budget.max_tries()).timeout(budget.timeout())
    }

    pub fn build(self) -> Result<ModelTask> {
        if self.shared_device_memory {
            return Err(TaskError::config(
                "shared device memory is not supported",
            ));
        }
        let budget = RetryBudget::new(self.max_tries, self.timeout)?;
        let batch_size = match self.batch_size {
            None => None,
            Some(n) => Some(
                NonZeroUsize::new(n)
                    .ok_or_else(|| TaskError::config("batch_size must be at least 1"))?,
            ),
        };
        let inputs = require_fields(self.inputs, "input")?;
        let outputs = require_fields(self.outputs, "output")?;
        check_transform(&inputs, self.input_transform.as_ref())?;
        check_transform(&outputs, self.output_transform.as_ref())?;

        tracing::debug!(
            "Built task for '{}' ({} -> {}, batch size {:?})",
            self.model.name(),
            inputs.describe(),
            outputs.describe(),
            batch_size
        );

        Ok(ModelTask {
            inputs,
            outputs,
            model: self.model,
            function: self.function,
            args: self.args,
            kwargs: self.kwargs,
            input_transform: self.input_transform,
            output_transform: self.output_transform,
            adapter: TensorAdapter::new(self.dtype, batch_size.is_some()),
            batch_size,
            acquisition: DeviceAcquisitionLoop::new(budget),
        })
    }
}

fn require_fields(fields: Option<OneOrMany<String>>, what: &str) -> Result<OneOrMany<String>> {
    match fields {
        None => Err(TaskError::config(format!("no {} field given", what))),
        Some(fields) if fields.is_empty() => {
            Err(TaskError::config(format!("empty {} field list", what)))
        }
        Some(fields) => Ok(fields),
    }
}

fn check_transform(fields: &OneOrMany<String>, transform: Option<&OneOrMany<Transform>>) -> Result<()> {
    match transform {
        Some(transform) if !fields.matches(transform) => Err(TaskError::Cardinality {
            phase: Phase::Configuration,
            left: format!("{} field", fields.describe()),
            right: format!("{} transform", transform.describe()),
        }),
        _ => Ok(()),
    }
}
