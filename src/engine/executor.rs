//! Batched execution on a borrowed device
//!
//! Runs one request against a device-resident model, optionally splitting the
//! input along the sample axis so that only one batch lives on the device at
//! a time.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::ops::Range;

use candle_core::{Device, Tensor};

use crate::model::{Arg, DeviceModel, FunctionSelector};
use crate::tensor::OneOrMany;

/// Everything needed to run the model once
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Adapted input tensor(s), host resident
    pub input: OneOrMany<Tensor>,
    /// Function to invoke
    pub function: FunctionSelector,
    /// Extra positional arguments
    pub args: Vec<Arg>,
    /// Extra keyword arguments
    pub kwargs: BTreeMap<String, Arg>,
    /// Samples per device call; `None` runs the whole input in one pass
    pub batch_size: Option<NonZeroUsize>,
}

impl ExecutionRequest {
    pub fn new(input: OneOrMany<Tensor>) -> Self {
        Self {
            input,
            function: FunctionSelector::Call,
            args: Vec::new(),
            kwargs: BTreeMap::new(),
            batch_size: None,
        }
    }

    pub fn with_function(mut self, function: FunctionSelector) -> Self {
        self.function = function;
        self
    }

    pub fn with_batch_size(mut self, batch_size: Option<NonZeroUsize>) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Host-resident model output
#[derive(Debug, Clone)]
pub struct BatchOutput {
    /// Output tensor(s), shaped as the model returned them
    pub tensors: OneOrMany<Tensor>,
    /// Number of device calls made
    pub batches: usize,
}

/// Split `n` samples into consecutive ranges of at most `batch_size`
pub fn plan_batches(n: usize, batch_size: NonZeroUsize) -> Vec<Range<usize>> {
    let size = batch_size.get();
    let count = n.div_ceil(size);
    (0..count)
        .map(|p| p * size..((p + 1) * size).min(n))
        .collect()
}

/// Runs requests against one device-resident model
pub struct BatchedExecutor<'m> {
    model: &'m dyn DeviceModel,
}

impl<'m> BatchedExecutor<'m> {
    pub fn new(model: &'m dyn DeviceModel) -> Self {
        Self { model }
    }

    /// Execute `request` and return the output in host memory.
    ///
    /// With a batch size every list element is sliced to the same range;
    /// callers guarantee the elements agree on their leading dimension.
    pub fn run(&self, request: &ExecutionRequest) -> candle_core::Result<BatchOutput> {
        let device = self.model.device();
        let args = request
            .args
            .iter()
            .map(|arg| arg.to_device(device))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let kwargs = request
            .kwargs
            .iter()
            .map(|(name, arg)| Ok((name.clone(), arg.to_device(device)?)))
            .collect::<candle_core::Result<BTreeMap<_, _>>>()?;

        let samples = request
            .input
            .first()
            .and_then(|t| t.dims().first().copied())
            .unwrap_or(0);

        let batch_size = match request.batch_size {
            Some(size) if samples > 0 => size,
            _ => {
                let tensors =
                    self.call(&request.function, request.input.clone(), &args, &kwargs)?;
                return Ok(BatchOutput {
                    tensors,
                    batches: 1,
                });
            }
        };

        let ranges = plan_batches(samples, batch_size);
        let mut outputs = Vec::with_capacity(ranges.len());
        for (p, range) in ranges.iter().enumerate() {
            tracing::debug!(
                "Batch {}/{}: samples {}..{}",
                p + 1,
                ranges.len(),
                range.start,
                range.end
            );
            let slice = request
                .input
                .as_ref()
                .try_map(|_, t| t.narrow(0, range.start, range.len()))?;
            outputs.push(self.call(&request.function, slice, &args, &kwargs)?);
        }

        Ok(BatchOutput {
            tensors: concat_batches(outputs)?,
            batches: ranges.len(),
        })
    }

    /// Move input to the device, invoke, bring the result back to host
    fn call(
        &self,
        function: &FunctionSelector,
        input: OneOrMany<Tensor>,
        args: &[Arg],
        kwargs: &BTreeMap<String, Arg>,
    ) -> candle_core::Result<OneOrMany<Tensor>> {
        let device = self.model.device();
        let input = input.try_map(|_, t| t.to_device(device))?;
        let output = self.model.call(function, input, args, kwargs)?;
        output.try_map(|_, t| Ok(t.to_device(&Device::Cpu)?.detach()))
    }
}

/// Concatenate per-batch outputs along axis 0, element-wise for list outputs
fn concat_batches(batches: Vec<OneOrMany<Tensor>>) -> candle_core::Result<OneOrMany<Tensor>> {
    let Some(first) = batches.first() else {
        candle_core::bail!("no batches to concatenate");
    };
    let shape = first.describe();
    if batches.iter().any(|b| !b.matches(first)) {
        candle_core::bail!("model output changed shape between batches (first was {})", shape);
    }

    let many = first.is_many();
    let width = first.len();
    let mut columns: Vec<Vec<Tensor>> = vec![Vec::with_capacity(batches.len()); width];
    for batch in batches {
        for (i, tensor) in batch.into_vec().into_iter().enumerate() {
            columns[i].push(tensor);
        }
    }
    let joined = columns
        .iter()
        .map(|column| Tensor::cat(column, 0))
        .collect::<candle_core::Result<Vec<_>>>()?;

    if many {
        Ok(OneOrMany::Many(joined))
    } else {
        joined
            .into_iter()
            .next()
            .map(OneOrMany::One)
            .ok_or_else(|| candle_core::Error::Msg("empty batch output".to_string()))
    }
}
