//! Pool accounting under many threads

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use modeltask::{DeviceId, DeviceLease, DevicePool, QueuePool};

#[test]
fn test_outstanding_never_exceeds_capacity() {
    // cpu:0 listed twice admits two users of the same device
    let pool = Arc::new(QueuePool::new([
        DeviceId::cpu(0),
        DeviceId::cpu(0),
        DeviceId::cpu(1),
    ]));
    let in_use = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let in_use = Arc::clone(&in_use);
            let peak = Arc::clone(&peak);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut acquired = 0;
                while acquired < 50 {
                    let Some(lease) = DeviceLease::acquire(pool.as_ref(), Duration::from_millis(50))
                    else {
                        continue;
                    };
                    let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::yield_now();
                    in_use.fetch_sub(1, Ordering::SeqCst);
                    drop(lease);
                    acquired += 1;
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(pool.available(), 3);
    assert_eq!(pool.outstanding(), 0);

    let mut left = pool.snapshot();
    left.sort();
    assert_eq!(left, vec![DeviceId::cpu(0), DeviceId::cpu(0), DeviceId::cpu(1)]);
}

#[test]
fn test_no_device_held_twice() {
    let pool = Arc::new(QueuePool::cpu(3));
    let held: Arc<Vec<AtomicBool>> = Arc::new((0..3).map(|_| AtomicBool::new(false)).collect());
    let threads = 10;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let held = Arc::clone(&held);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut acquired = 0;
                while acquired < 100 {
                    let Some(id) = pool.acquire(Duration::from_millis(50)) else {
                        continue;
                    };
                    let DeviceId::Cpu { slot } = id else {
                        panic!("unexpected device {id}");
                    };
                    assert!(
                        !held[slot].swap(true, Ordering::SeqCst),
                        "{id} handed out while already held"
                    );
                    assert!(pool.available() <= pool.capacity());
                    thread::yield_now();
                    held[slot].store(false, Ordering::SeqCst);
                    pool.release(id);
                    acquired += 1;
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(held.iter().all(|h| !h.load(Ordering::SeqCst)));
    assert_eq!(pool.available(), 3);
    let mut left = pool.snapshot();
    left.sort();
    assert_eq!(left, vec![DeviceId::cpu(0), DeviceId::cpu(1), DeviceId::cpu(2)]);
}

#[test]
fn test_waiters_all_served_by_one_device() {
    let pool = Arc::new(QueuePool::cpu(1));
    let served = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let served = Arc::clone(&served);
            thread::spawn(move || {
                let id = pool
                    .acquire(Duration::from_secs(5))
                    .expect("device within timeout");
                thread::sleep(Duration::from_millis(10));
                served.fetch_add(1, Ordering::SeqCst);
                pool.release(id);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(served.load(Ordering::SeqCst), 4);
    assert_eq!(pool.available(), 1);
}
