//! Device pool configuration

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::device::{DeviceId, DevicePool, QueuePool};

/// One pool entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceEntry {
    /// Simple device string (e.g., "cuda:0", "cpu:1")
    Simple(String),
    /// Detailed device configuration
    Detailed {
        /// Device type: "cuda", "cpu"
        device_type: String,
        /// Device ID (CUDA ordinal or CPU slot)
        #[serde(default)]
        device_id: usize,
    },
}

impl DeviceEntry {
    pub fn device_id(&self) -> Result<DeviceId> {
        match self {
            DeviceEntry::Simple(s) => Ok(s.parse()?),
            DeviceEntry::Detailed {
                device_type,
                device_id,
            } => match device_type.as_str() {
                "cpu" => Ok(DeviceId::cpu(*device_id)),
                "cuda" | "gpu" => Ok(DeviceId::cuda(*device_id)),
                other => Err(anyhow!("unknown device type: '{}'", other)),
            },
        }
    }
}

/// Devices the shared pool is created with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Inventory; an entry listed twice admits two concurrent users
    #[serde(default = "default_devices")]
    pub devices: Vec<DeviceEntry>,

    /// Share the pool with other processes through lock files in this
    /// directory (unix only). Unset keeps the pool inside this process.
    #[serde(default)]
    pub lock_dir: Option<PathBuf>,
}

fn default_devices() -> Vec<DeviceEntry> {
    vec![DeviceEntry::Simple("cpu:0".to_string())]
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            devices: default_devices(),
            lock_dir: None,
        }
    }
}

impl PoolConfig {
    /// Pool from a comma-separated list, e.g. `cuda:0,cuda:1`
    pub fn from_list(list: &str) -> Self {
        Self {
            devices: list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| DeviceEntry::Simple(s.to_string()))
                .collect(),
            lock_dir: None,
        }
    }

    pub fn device_ids(&self) -> Result<Vec<DeviceId>> {
        self.devices.iter().map(DeviceEntry::device_id).collect()
    }

    /// Create the shared pool
    pub fn build(&self) -> Result<Arc<dyn DevicePool>> {
        let ids = self.device_ids()?;
        if ids.is_empty() {
            return Err(anyhow!("device pool needs at least one device"));
        }
        match &self.lock_dir {
            None => Ok(Arc::new(QueuePool::new(ids))),
            Some(dir) => open_locked(dir, ids),
        }
    }
}

#[cfg(unix)]
fn open_locked(dir: &std::path::Path, ids: Vec<DeviceId>) -> Result<Arc<dyn DevicePool>> {
    let pool = crate::device::FileLockPool::open(dir, ids)
        .with_context(|| format!("opening device locks in {}", dir.display()))?;
    tracing::info!("Sharing {} device slot(s) through {}", pool.capacity(), dir.display());
    Ok(Arc::new(pool))
}

#[cfg(not(unix))]
fn open_locked(dir: &std::path::Path, _ids: Vec<DeviceId>) -> Result<Arc<dyn DevicePool>> {
    Err(anyhow!(
        "lock_dir {} needs a unix host; leave it unset for an in-process pool",
        dir.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_from_yaml() {
        let yaml = r#"
devices:
  - cuda:0
  - device_type: cuda
    device_id: 1
  - cpu
"#;
        let config: PoolConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.device_ids().unwrap(),
            vec![DeviceId::cuda(0), DeviceId::cuda(1), DeviceId::cpu(0)]
        );
    }

    #[test]
    fn test_from_list() {
        let pool = PoolConfig::from_list("cpu:0, cpu:1,").build().unwrap();
        assert_eq!(pool.capacity(), 2);
    }

    #[test]
    fn test_rejects_bad_entries() {
        assert!(PoolConfig::from_list("").build().is_err());
        assert!(PoolConfig::from_list("tpu:0").build().is_err());
        let detailed = DeviceEntry::Detailed {
            device_type: "fpga".into(),
            device_id: 0,
        };
        assert!(detailed.device_id().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_lock_dir_pools_share_slots() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = format!("devices: [cpu]\nlock_dir: {}\n", dir.path().display());
        let config: PoolConfig = serde_yaml::from_str(&yaml).unwrap();
        let a = config.build().unwrap();
        let b = config.build().unwrap();

        let id = a.acquire(std::time::Duration::from_millis(10)).unwrap();
        assert_eq!(b.acquire(std::time::Duration::from_millis(20)), None);
        a.release(id);
        assert_eq!(b.acquire(std::time::Duration::from_millis(20)), Some(id));
    }

    #[test]
    fn test_default_is_one_cpu() {
        assert_eq!(
            PoolConfig::default().device_ids().unwrap(),
            vec![DeviceId::cpu(0)]
        );
    }
}
