//! CLI commands
//!
//! Drives a task described by a config file against a device pool.

mod info;
mod run;
mod stress;

pub use info::info;
pub use run::run;
pub use stress::stress;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::{PoolConfig, TaskConfig};
use crate::device::DevicePool;

/// modeltask - batched model execution over a shared device pool
#[derive(Parser)]
#[command(name = "modeltask")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a task on one record
    Run {
        /// Task config (YAML or JSON)
        #[arg(long, short)]
        config: PathBuf,

        /// Record to read inputs from (safetensors)
        #[arg(long, short)]
        record: PathBuf,

        /// Where to write the updated record (default: overwrite the input)
        #[arg(long, short)]
        out: Option<PathBuf>,

        /// Override the pool, e.g. "cuda:0,cuda:1"
        #[arg(long)]
        devices: Option<String>,

        /// Share the pool with other processes through lock files here
        #[arg(long)]
        lock_dir: Option<PathBuf>,
    },

    /// Run many concurrent workers against one pool
    Stress {
        /// Task config (YAML or JSON)
        #[arg(long, short)]
        config: PathBuf,

        /// Number of concurrent invocations
        #[arg(long, short, default_value = "8")]
        workers: usize,

        /// Upper bound on samples per generated record
        #[arg(long, default_value = "16")]
        samples: usize,

        /// Features per sample
        #[arg(long, default_value = "4")]
        width: usize,

        /// Override the pool, e.g. "cpu:0,cpu:0,cpu:1"
        #[arg(long)]
        devices: Option<String>,

        /// Share the pool with other processes through lock files here
        #[arg(long)]
        lock_dir: Option<PathBuf>,
    },

    /// Show what a task config resolves to
    Info {
        /// Task config (YAML or JSON)
        #[arg(long, short)]
        config: PathBuf,
    },
}

/// Pool from the config, with `--devices` and `--lock-dir` taking precedence
pub(crate) fn resolve_pool(
    config: &TaskConfig,
    devices: Option<&str>,
    lock_dir: Option<PathBuf>,
) -> Result<Arc<dyn DevicePool>> {
    let mut pool = match devices {
        Some(list) => PoolConfig::from_list(list),
        None => config.pool.clone(),
    };
    if lock_dir.is_some() {
        pool.lock_dir = lock_dir;
    } else if devices.is_some() {
        pool.lock_dir = config.pool.lock_dir.clone();
    }
    pool.build()
}
