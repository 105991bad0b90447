//! Device pool shared between processes
//!
//! Every inventory slot is a lock file in a shared directory, and a slot is
//! held while its file carries an exclusive `flock`. Processes that open the
//! same directory with the same inventory see the same slots. The kernel
//! drops a lock when its holder exits, so a crashed worker never strands a
//! device.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{DeviceId, DevicePool};

/// Interval between lock attempts while waiting for another process
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

struct Slot {
    id: DeviceId,
    path: PathBuf,
    file: File,
}

/// [`DevicePool`] backed by one advisory file lock per inventory slot.
///
/// Each handle opens its own lock files, so two handles in one process
/// exclude each other just like two processes do. Releases from this handle
/// wake its own waiters at once; releases from other processes are noticed
/// on the next poll.
pub struct FileLockPool {
    dir: PathBuf,
    slots: Vec<Slot>,
    /// Slots locked through this handle
    held: Mutex<Vec<bool>>,
    freed: Condvar,
    poll: Duration,
}

impl FileLockPool {
    /// Open (creating if needed) the slot files for `devices` under `dir`.
    ///
    /// Every process sharing the pool must pass the same inventory in the
    /// same order.
    pub fn open(
        dir: impl AsRef<Path>,
        devices: impl IntoIterator<Item = DeviceId>,
    ) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let slots = devices
            .into_iter()
            .enumerate()
            .map(|(index, id)| {
                let path = dir.join(format!("slot-{}-{}.lock", index, id).replace(':', "-"));
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(&path)?;
                Ok(Slot { id, path, file })
            })
            .collect::<io::Result<Vec<_>>>()?;

        tracing::debug!(
            "File-locked device pool at {} with {} slots",
            dir.display(),
            slots.len()
        );
        Ok(Self {
            dir,
            held: Mutex::new(vec![false; slots.len()]),
            slots,
            freed: Condvar::new(),
            poll: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll.max(Duration::from_millis(1));
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn try_take(&self, held: &mut [bool]) -> Option<DeviceId> {
        for (index, slot) in self.slots.iter().enumerate() {
            if held[index] {
                continue;
            }
            match try_lock(&slot.file) {
                Ok(true) => {
                    held[index] = true;
                    return Some(slot.id);
                }
                Ok(false) => {}
                Err(e) => tracing::warn!("Cannot lock {}: {}", slot.path.display(), e),
            }
        }
        None
    }
}

impl DevicePool for FileLockPool {
    fn acquire(&self, timeout: Duration) -> Option<DeviceId> {
        let deadline = Instant::now().checked_add(timeout);
        let mut held = self.held.lock();
        loop {
            if let Some(id) = self.try_take(&mut held) {
                return Some(id);
            }
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    (deadline - now).min(self.poll)
                }
                None => self.poll,
            };
            self.freed.wait_for(&mut held, wait);
        }
    }

    fn release(&self, id: DeviceId) {
        let mut held = self.held.lock();
        let index = (0..self.slots.len()).find(|&i| held[i] && self.slots[i].id == id);
        let Some(index) = index else {
            tracing::error!("Rejected release of {}: not held through this pool", id);
            return;
        };
        let slot = &self.slots[index];
        if let Err(e) = unlock(&slot.file) {
            tracing::error!("Cannot unlock {}: {}", slot.path.display(), e);
        }
        held[index] = false;
        drop(held);
        self.freed.notify_one();
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slots no process holds right now; each free lock is taken briefly to
    /// find out.
    fn available(&self) -> usize {
        let held = self.held.lock();
        let mut free = 0;
        for (index, slot) in self.slots.iter().enumerate() {
            if held[index] {
                continue;
            }
            if let Ok(true) = try_lock(&slot.file) {
                free += 1;
                if let Err(e) = unlock(&slot.file) {
                    tracing::error!("Cannot unlock {}: {}", slot.path.display(), e);
                }
            }
        }
        free
    }
}

impl std::fmt::Debug for FileLockPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLockPool")
            .field("dir", &self.dir)
            .field("capacity", &self.slots.len())
            .finish()
    }
}

/// Non-blocking exclusive lock; `Ok(false)` when another holder has it
fn try_lock(file: &File) -> io::Result<bool> {
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Ok(false)
    } else {
        Err(err)
    }
}

fn unlock(file: &File) -> io::Result<()> {
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
