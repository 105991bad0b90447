//! Concurrent workers sharing one pool

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use candle_core::{Device, Tensor};
use rand::Rng;

use super::resolve_pool;
use crate::config::TaskConfig;
use crate::engine::TaskReport;
use crate::error::TaskError;
use crate::record::{MemoryRecord, Record};

/// Fire `workers` invocations at once, each on a random record
pub async fn stress(
    config: PathBuf,
    workers: usize,
    samples: usize,
    width: usize,
    devices: Option<String>,
    lock_dir: Option<PathBuf>,
) -> Result<()> {
    let task_config = TaskConfig::load(&config)?;
    let pool = resolve_pool(&task_config, devices.as_deref(), lock_dir)?;
    let task = Arc::new(task_config.build_task()?);

    tracing::info!(
        "Starting {} worker(s) on {} device(s)",
        workers,
        pool.capacity()
    );
    let start = Instant::now();

    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let task = Arc::clone(&task);
        let pool = Arc::clone(&pool);
        handles.push(tokio::task::spawn_blocking(
            move || -> Result<TaskReport, TaskError> {
                let n = rand::thread_rng().gen_range(1..=samples.max(1));
                let mut record = MemoryRecord::new();
                for field in task.inputs().iter() {
                    let value = Tensor::randn(0f32, 1f32, (n, width), &Device::Cpu)
                        .map_err(|e| TaskError::config(format!("generating '{}': {}", field, e)))?;
                    record.set(field, value);
                }
                let report = task.run(&mut record, pool.as_ref(), None)?;
                tracing::debug!(
                    "Worker {} ran {} sample(s) on {} after {} attempt(s)",
                    worker,
                    n,
                    report.device,
                    report.attempts
                );
                Ok(report)
            },
        ));
    }

    let mut succeeded = 0usize;
    let mut batches = 0usize;
    let mut max_attempts = 0u32;
    let mut per_device: BTreeMap<String, usize> = BTreeMap::new();
    let mut failures: BTreeMap<String, usize> = BTreeMap::new();

    for handle in handles {
        match handle.await? {
            Ok(report) => {
                succeeded += 1;
                batches += report.batches;
                max_attempts = max_attempts.max(report.attempts);
                *per_device.entry(report.device.to_string()).or_default() += 1;
            }
            Err(e) => {
                tracing::warn!("Worker failed: {}", e);
                *failures.entry(e.phase().to_string()).or_default() += 1;
            }
        }
    }

    println!("Workers: {} ({} ok) in {:.2?}", workers, succeeded, start.elapsed());
    println!("Batches: {}", batches);
    println!("Max attempts: {}", max_attempts);
    for (device, count) in &per_device {
        println!("  {}: {} run(s)", device, count);
    }
    for (phase, count) in &failures {
        println!("  failed in {}: {}", phase, count);
    }

    let available = pool.available();
    if available != pool.capacity() {
        bail!(
            "pool holds {} of {} devices after all workers finished",
            available,
            pool.capacity()
        );
    }
    println!("Pool back at full capacity ({})", available);

    Ok(())
}
