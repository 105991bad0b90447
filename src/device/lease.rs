//! Scoped ownership of a borrowed device

use super::{DeviceId, DevicePool};

/// Exclusive claim on one identifier from a [`DevicePool`].
///
/// The identifier goes back to the pool exactly once: on [`DeviceLease::release`]
/// or when the lease is dropped, including during unwinding.
pub struct DeviceLease<'p> {
    pool: &'p dyn DevicePool,
    id: DeviceId,
    released: bool,
}

impl<'p> DeviceLease<'p> {
    /// Wrap an identifier that was just acquired from `pool`
    pub fn new(pool: &'p dyn DevicePool, id: DeviceId) -> Self {
        Self {
            pool,
            id,
            released: false,
        }
    }

    /// Try to acquire from `pool` within `timeout`
    pub fn acquire(pool: &'p dyn DevicePool, timeout: std::time::Duration) -> Option<Self> {
        pool.acquire(timeout).map(|id| Self::new(pool, id))
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Return the device to the pool now
    pub fn release(mut self) {
        self.give_back();
    }

    fn give_back(&mut self) {
        if !self.released {
            self.released = true;
            tracing::debug!("Releasing {}", self.id);
            self.pool.release(self.id);
        }
    }
}

impl Drop for DeviceLease<'_> {
    fn drop(&mut self) {
        self.give_back();
    }
}

impl std::fmt::Debug for DeviceLease<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLease").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::QueuePool;
    use std::time::Duration;

    #[test]
    fn test_drop_releases() {
        let pool = QueuePool::cpu(1);
        {
            let lease = DeviceLease::acquire(&pool, Duration::from_millis(10)).unwrap();
            assert_eq!(lease.id(), DeviceId::cpu(0));
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_explicit_release_happens_once() {
        let pool = QueuePool::cpu(2);
        let lease = DeviceLease::acquire(&pool, Duration::from_millis(10)).unwrap();
        lease.release();
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_release_on_panic() {
        let pool = QueuePool::cpu(1);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _lease = DeviceLease::acquire(&pool, Duration::from_millis(10)).unwrap();
            panic!("model blew up");
        }));
        assert!(result.is_err());
        assert_eq!(pool.available(), 1);
    }
}
