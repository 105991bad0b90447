//! Device identifiers

use std::fmt;
use std::str::FromStr;

use candle_core::Device;

/// Opaque handle for one unit of compute hardware in a pool
///
/// CPU identifiers carry a slot number so a CPU-only host can still run a
/// pool with more than one lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceId {
    /// Host CPU lane
    Cpu { slot: usize },
    /// CUDA device by ordinal
    Cuda { ordinal: usize },
}

impl DeviceId {
    pub fn cpu(slot: usize) -> Self {
        DeviceId::Cpu { slot }
    }

    pub fn cuda(ordinal: usize) -> Self {
        DeviceId::Cuda { ordinal }
    }

    /// Resolve the identifier to a compute device.
    ///
    /// Fails for CUDA identifiers when the crate is built without the `cuda`
    /// feature or the ordinal does not exist.
    pub fn open(&self) -> candle_core::Result<Device> {
        match self {
            DeviceId::Cpu { .. } => Ok(Device::Cpu),
            DeviceId::Cuda { ordinal } => Device::new_cuda(*ordinal),
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceId::Cpu { slot } => write!(f, "cpu:{}", slot),
            DeviceId::Cuda { ordinal } => write!(f, "cuda:{}", ordinal),
        }
    }
}

/// Error for unparseable device strings
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid device '{0}', expected cpu[:N] or cuda[:N]")]
pub struct ParseDeviceError(pub String);

impl FromStr for DeviceId {
    type Err = ParseDeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (kind, index) = match s.split_once(':') {
            Some((kind, index)) => (kind, Some(index)),
            None => (s, None),
        };
        let index = match index {
            Some(index) => index
                .parse::<usize>()
                .map_err(|_| ParseDeviceError(s.to_string()))?,
            None => 0,
        };
        match kind {
            "cpu" => Ok(DeviceId::cpu(index)),
            "cuda" | "gpu" => Ok(DeviceId::cuda(index)),
            _ => Err(ParseDeviceError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_strings() {
        assert_eq!("cpu".parse::<DeviceId>().unwrap(), DeviceId::cpu(0));
        assert_eq!("cpu:3".parse::<DeviceId>().unwrap(), DeviceId::cpu(3));
        assert_eq!("cuda".parse::<DeviceId>().unwrap(), DeviceId::cuda(0));
        assert_eq!("cuda:1".parse::<DeviceId>().unwrap(), DeviceId::cuda(1));
        assert!("tpu:0".parse::<DeviceId>().is_err());
        assert!("cuda:x".parse::<DeviceId>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for id in [DeviceId::cpu(2), DeviceId::cuda(0)] {
            assert_eq!(id.to_string().parse::<DeviceId>().unwrap(), id);
        }
    }

    #[test]
    fn test_cpu_opens() {
        assert!(DeviceId::cpu(5).open().unwrap().is_cpu());
    }
}
