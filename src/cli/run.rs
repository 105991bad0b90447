//! Single-record run command

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};

use super::resolve_pool;
use crate::config::TaskConfig;
use crate::record::MemoryRecord;

/// Run the configured task on one record
pub async fn run(
    config: PathBuf,
    record: PathBuf,
    out: Option<PathBuf>,
    devices: Option<String>,
    lock_dir: Option<PathBuf>,
) -> Result<()> {
    let task_config = TaskConfig::load(&config)
        .with_context(|| format!("reading config {}", config.display()))?;
    let pool = resolve_pool(&task_config, devices.as_deref(), lock_dir)?;
    let task = task_config.build_task()?;

    tracing::info!(
        "Running '{}' with {} device(s) in the pool",
        task_config.model.name(),
        pool.capacity()
    );

    let mut data = MemoryRecord::load_safetensors(&record)?;
    let start = Instant::now();

    // Acquisition blocks on the pool, keep it off the async workers
    let (report, data) = tokio::task::spawn_blocking(move || {
        task.run(&mut data, pool.as_ref(), None).map(|report| (report, data))
    })
    .await??;

    let out = out.unwrap_or(record);
    data.save_safetensors(&out)?;

    println!(
        "Done on {} in {:.2?} ({} attempt(s), {} batch(es))",
        report.device,
        start.elapsed(),
        report.attempts,
        report.batches
    );
    println!("Wrote {} field(s) to {}", data.len(), out.display());

    Ok(())
}
