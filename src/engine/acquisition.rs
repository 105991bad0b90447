//! Device acquisition with bounded retries
//!
//! One invocation moves through `Trying -> Running -> Done`, or ends in
//! `FailedFatal` when the retry budget runs out before any device is
//! obtained. Once a device is held it is returned to the pool exactly once,
//! whatever happens while the model runs.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use candle_core::Tensor;

use super::executor::{BatchOutput, BatchedExecutor, ExecutionRequest};
use crate::device::{DeviceId, DeviceLease, DevicePool};
use crate::error::{Result, TaskError};
use crate::model::Model;
use crate::tensor::OneOrMany;

/// Default number of acquisition attempts
pub const DEFAULT_MAX_TRIES: u32 = 33;

/// Default wait per acquisition attempt
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// How long and how often to wait for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    max_tries: u32,
    timeout: Duration,
}

impl RetryBudget {
    /// Fails unless `max_tries >= 1`
    pub fn new(max_tries: u32, timeout: Duration) -> Result<Self> {
        if max_tries < 1 {
            return Err(TaskError::config("max_tries must be at least 1"));
        }
        Ok(Self { max_tries, timeout })
    }

    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            max_tries: DEFAULT_MAX_TRIES,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Caller-side cancellation, checked between acquisition attempts
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// States of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Trying { attempt: u32 },
    Running(DeviceId),
    Done,
    FailedFatal,
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    /// Host-resident output, shaped as the model returned it
    pub tensors: OneOrMany<Tensor>,
    /// Device that ran the model
    pub device: DeviceId,
    /// Acquisition attempts used, including the successful one
    pub attempts: u32,
    /// Device calls made
    pub batches: usize,
}

/// Acquires a device, runs the model on it, and always gives it back
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceAcquisitionLoop {
    budget: RetryBudget,
}

impl DeviceAcquisitionLoop {
    pub fn new(budget: RetryBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> RetryBudget {
        self.budget
    }

    /// Wait for a device, trying at most `max_tries` times.
    ///
    /// Returns the lease and the number of attempts it took.
    pub fn acquire<'p>(
        &self,
        pool: &'p dyn DevicePool,
        cancel: Option<&CancelToken>,
    ) -> Result<(DeviceLease<'p>, u32)> {
        let mut failed = 0;
        loop {
            enter(LoopState::Trying {
                attempt: failed + 1,
            });
            if cancel.is_some_and(CancelToken::is_cancelled) {
                enter(LoopState::FailedFatal);
                return Err(TaskError::Cancelled { tries: failed });
            }
            if let Some(lease) = DeviceLease::acquire(pool, self.budget.timeout) {
                return Ok((lease, failed + 1));
            }
            failed += 1;
            if failed >= self.budget.max_tries {
                enter(LoopState::FailedFatal);
                tracing::warn!(
                    "No device after {} tries of {:?}, giving up",
                    failed,
                    self.budget.timeout
                );
                return Err(TaskError::Exhausted {
                    tries: failed,
                    timeout: self.budget.timeout,
                });
            }
            tracing::debug!(
                "No device available (try {}/{}), retrying",
                failed,
                self.budget.max_tries
            );
        }
    }

    /// Acquire a device and execute `request` with `model` on it
    pub fn run(
        &self,
        pool: &dyn DevicePool,
        model: &dyn Model,
        request: &ExecutionRequest,
        cancel: Option<&CancelToken>,
    ) -> Result<ExecutionOutput> {
        let (lease, attempts) = self.acquire(pool, cancel)?;
        let device = lease.id();
        enter(LoopState::Running(device));

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            run_on_device(device, model, request)
        }));
        // The device-resident model and tensors are dropped inside
        // `run_on_device`, so only the identifier is left to return.
        lease.release();

        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(TaskError::Execution {
                device,
                message: format!("model panicked: {}", panic_message(payload.as_ref())),
            }),
        };
        match result {
            Ok(output) => {
                enter(LoopState::Done);
                Ok(ExecutionOutput {
                    tensors: output.tensors,
                    device,
                    attempts,
                    batches: output.batches,
                })
            }
            Err(e) => {
                tracing::warn!("Execution on {} failed: {}", device, e);
                Err(e)
            }
        }
    }
}

fn enter(state: LoopState) {
    tracing::debug!("Acquisition state: {:?}", state);
}

fn run_on_device(
    device: DeviceId,
    model: &dyn Model,
    request: &ExecutionRequest,
) -> Result<BatchOutput> {
    let compute = device
        .open()
        .map_err(|source| TaskError::DeviceOpen { device, source })?;
    let resident = model
        .to_device(&compute)
        .map_err(|e| TaskError::Execution {
            device,
            message: format!("moving '{}' to device failed: {}", model.name(), e),
        })?;
    tracing::debug!("Running '{}' on {}", model.name(), device);
    BatchedExecutor::new(resident.as_ref())
        .run(request)
        .map_err(|e| TaskError::Execution {
            device,
            message: e.to_string(),
        })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::QueuePool;
    use crate::model::Identity;
    use candle_core::Device;
    use std::time::Instant;

    fn request() -> ExecutionRequest {
        ExecutionRequest::new(OneOrMany::One(
            Tensor::ones((2, 2), candle_core::DType::F32, &Device::Cpu).unwrap(),
        ))
    }

    #[test]
    fn test_budget_rejects_zero_tries() {
        let err = RetryBudget::new(0, Duration::from_secs(1)).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(RetryBudget::default().max_tries(), 33);
        assert_eq!(RetryBudget::default().timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_run_releases_device() {
        let pool = QueuePool::cpu(1);
        let acquisition = DeviceAcquisitionLoop::new(
            RetryBudget::new(1, Duration::from_millis(10)).unwrap(),
        );
        let out = acquisition
            .run(&pool, &Identity::new(), &request(), None)
            .unwrap();
        assert_eq!(out.device, DeviceId::cpu(0));
        assert_eq!(out.attempts, 1);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_exhaustion_takes_every_window() {
        let pool = QueuePool::new(Vec::new());
        let acquisition = DeviceAcquisitionLoop::new(
            RetryBudget::new(3, Duration::from_millis(20)).unwrap(),
        );
        let start = Instant::now();
        let err = acquisition
            .run(&pool, &Identity::new(), &request(), None)
            .unwrap_err();
        assert!(start.elapsed() >= Duration::from_millis(60));
        assert!(matches!(err, TaskError::Exhausted { tries: 3, .. }));
    }

    #[test]
    fn test_cancel_stops_retrying() {
        let pool = QueuePool::new(Vec::new());
        let acquisition = DeviceAcquisitionLoop::new(
            RetryBudget::new(100, Duration::from_millis(5)).unwrap(),
        );
        let token = CancelToken::new();
        token.cancel();
        let err = acquisition
            .run(&pool, &Identity::new(), &request(), Some(&token))
            .unwrap_err();
        assert!(matches!(err, TaskError::Cancelled { tries: 0 }));
    }

    #[test]
    fn test_unopenable_device_is_released() {
        // Without CUDA support (or hardware) cuda:63 cannot be opened
        let pool = QueuePool::new([DeviceId::cuda(63)]);
        let acquisition = DeviceAcquisitionLoop::new(
            RetryBudget::new(1, Duration::from_millis(10)).unwrap(),
        );
        let err = acquisition
            .run(&pool, &Identity::new(), &request(), None)
            .unwrap_err();
        assert!(matches!(err, TaskError::DeviceOpen { .. }));
        assert_eq!(pool.available(), 1);
    }
}
