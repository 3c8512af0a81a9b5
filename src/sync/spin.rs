//! A bare test-and-set spin lock.
//!
//! This is the per-node lock described in spec.md §3 ("spin: a per-node
//! test-and-set lock, held only for the duration of child-list mutations").
//! Unlike a general-purpose mutex it guards no data of its own — the data it
//! serializes access to (a node's sibling/child pointers) is itself stored
//! in atomically-swappable cells, so all `SpinLock` needs to provide is
//! mutual exclusion between concurrent mutators of the same node.

use core::hint::spin_loop;
use std::sync::atomic::{AtomicBool, Ordering};

/// A minimal CAS-loop spin lock. No data is wrapped; callers hold the guard
/// for the duration of a multi-step read-modify-write sequence on some other
/// atomically-shared state.
#[derive(Debug, Default)]
pub struct SpinLock {
    locked: AtomicBool,
}

/// RAII guard released on drop.
pub struct SpinGuard<'a> {
    lock: &'a SpinLock,
}

impl SpinLock {
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Spin until the lock is acquired.
    pub fn lock(&self) -> SpinGuard<'_> {
        loop {
            match self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => break SpinGuard { lock: self },
                Err(_) => spin_loop(),
            }
        }
    }

    /// Attempt to acquire the lock without blocking.
    pub fn try_lock(&self) -> Option<SpinGuard<'_>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinGuard { lock: self })
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn uncontended_lock_unlock() {
        let lck = SpinLock::new();
        assert!(!lck.is_locked());
        {
            let _g = lck.lock();
            assert!(lck.is_locked());
        }
        assert!(!lck.is_locked());
    }

    #[test]
    fn try_lock_fails_when_held() {
        let lck = SpinLock::new();
        let _g = lck.lock();
        assert!(lck.try_lock().is_none());
    }

    #[test]
    fn serializes_concurrent_increments() {
        let lock = Arc::new(SpinLock::new());
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut handles = vec![];
        for _ in 0..8 {
            let lock = lock.clone();
            let counter = counter.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let _g = lock.lock();
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 8000);
    }
}
