//! Shared device pool
//!
//! A pool is created once with the full device inventory and handed to every
//! invocation. Identifiers are never created or destroyed afterwards, only
//! borrowed and returned.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::DeviceId;

/// Bounded, concurrently shared set of device identifiers.
///
/// Implementations must be safe to call from any number of threads. Pools
/// shared across processes implement this trait over their own transport.
pub trait DevicePool: Send + Sync {
    /// Take an identifier, waiting at most `timeout`.
    ///
    /// Returns `None` when the timeout expires with nothing available.
    fn acquire(&self, timeout: Duration) -> Option<DeviceId>;

    /// Return an identifier obtained from [`DevicePool::acquire`].
    fn release(&self, id: DeviceId);

    /// Fixed inventory size
    fn capacity(&self) -> usize;

    /// Identifiers currently waiting in the pool
    fn available(&self) -> usize;

    /// Identifiers currently borrowed
    fn outstanding(&self) -> usize {
        self.capacity().saturating_sub(self.available())
    }
}

/// In-memory FIFO pool.
///
/// Released identifiers go to the back of the queue and acquirers take from
/// the front. Waiting callers are woken in no particular order.
pub struct QueuePool {
    queue: Mutex<VecDeque<DeviceId>>,
    freed: Condvar,
    /// How many copies of each identifier the pool owns
    inventory: HashMap<DeviceId, usize>,
    capacity: usize,
}

impl QueuePool {
    /// Create a pool holding `devices`. Listing an identifier twice lets two
    /// invocations share that device.
    pub fn new(devices: impl IntoIterator<Item = DeviceId>) -> Self {
        let queue: VecDeque<DeviceId> = devices.into_iter().collect();
        let mut inventory = HashMap::new();
        for id in &queue {
            *inventory.entry(*id).or_insert(0) += 1;
        }
        let capacity = queue.len();
        tracing::debug!("Device pool created with {} devices", capacity);
        Self {
            queue: Mutex::new(queue),
            freed: Condvar::new(),
            inventory,
            capacity,
        }
    }

    /// Pool of `n` CPU lanes (`cpu:0` .. `cpu:n-1`)
    pub fn cpu(n: usize) -> Self {
        Self::new((0..n).map(DeviceId::cpu))
    }

    /// Snapshot of the queued identifiers, front first
    pub fn snapshot(&self) -> Vec<DeviceId> {
        self.queue.lock().iter().copied().collect()
    }
}

impl DevicePool for QueuePool {
    fn acquire(&self, timeout: Duration) -> Option<DeviceId> {
        // No representable deadline means wait until something is released
        let deadline = Instant::now().checked_add(timeout);
        let mut queue = self.queue.lock();
        loop {
            if let Some(id) = queue.pop_front() {
                return Some(id);
            }
            match deadline {
                Some(deadline) => {
                    if self.freed.wait_until(&mut queue, deadline).timed_out() {
                        // A release may have landed right at the deadline
                        return queue.pop_front();
                    }
                }
                None => self.freed.wait(&mut queue),
            }
        }
    }

    fn release(&self, id: DeviceId) {
        let owned = self.inventory.get(&id).copied().unwrap_or(0);
        let mut queue = self.queue.lock();
        let queued = queue.iter().filter(|q| **q == id).count();
        if queued >= owned {
            tracing::error!(
                "Rejected release of {}: pool owns {} and {} already queued",
                id,
                owned,
                queued
            );
            return;
        }
        queue.push_back(id);
        drop(queue);
        self.freed.notify_one();
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn available(&self) -> usize {
        self.queue.lock().len()
    }
}

impl std::fmt::Debug for QueuePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuePool")
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .finish()
    }
}
