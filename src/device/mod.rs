//! Device identifiers and the shared device pool
//!
//! - `DeviceId`: opaque handle resolvable to a compute device
//! - `DevicePool`: bounded pool with timed acquisition
//! - `QueuePool`: in-process pool; `FileLockPool`: pool shared between processes
//! - `DeviceLease`: scoped claim that always returns its device

#[cfg(unix)]
mod file_lock;
mod id;
mod lease;
mod pool;

#[cfg(unix)]
pub use file_lock::FileLockPool;
pub use id::{DeviceId, ParseDeviceError};
pub use lease::DeviceLease;
pub use pool::{DevicePool, QueuePool};
