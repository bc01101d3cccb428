//! Concurrency Guard Module
//!
//! Reader/writer lock over the index and size accounting. Builds with
//! `debug_assertions` also track whether a writer is held, so code that
//! rewrites shared state can assert the lock discipline it relies on.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

// == Audited RwLock ==
/// Cloneable handle to a shared `tokio::sync::RwLock` with a debug-only
/// writer audit.
#[derive(Debug)]
pub struct AuditedRwLock<T> {
    inner: Arc<RwLock<T>>,
    #[cfg(debug_assertions)]
    writer: Arc<AtomicBool>,
}

impl<T> AuditedRwLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value)),
            #[cfg(debug_assertions)]
            writer: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Acquires shared read access.
    pub async fn read(&self) -> OwnedRwLockReadGuard<T> {
        Arc::clone(&self.inner).read_owned().await
    }

    /// Acquires exclusive write access.
    ///
    /// The returned guard is owned, so it can be handed to another task and
    /// returned once that task is done with it.
    pub async fn write(&self) -> AuditedWriteGuard<T> {
        let guard = Arc::clone(&self.inner).write_owned().await;

        #[cfg(debug_assertions)]
        flip_writer(&self.writer, false, "write lock already held");

        AuditedWriteGuard {
            guard,
            #[cfg(debug_assertions)]
            writer: Arc::clone(&self.writer),
        }
    }

    /// Panics if no writer currently holds the lock. Compiled out in release
    /// builds.
    #[inline]
    pub fn assert_write_held(&self) {
        #[cfg(debug_assertions)]
        assert!(self.writer.load(Ordering::Acquire), "write lock is not held");
    }
}

impl<T> Clone for AuditedRwLock<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            #[cfg(debug_assertions)]
            writer: Arc::clone(&self.writer),
        }
    }
}

// == Write Guard ==
/// Exclusive access to the locked value. Releases the lock on drop.
#[derive(Debug)]
pub struct AuditedWriteGuard<T> {
    guard: OwnedRwLockWriteGuard<T>,
    #[cfg(debug_assertions)]
    writer: Arc<AtomicBool>,
}

impl<T> Deref for AuditedWriteGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for AuditedWriteGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for AuditedWriteGuard<T> {
    fn drop(&mut self) {
        // The flag is cleared before the inner guard releases the lock.
        #[cfg(debug_assertions)]
        flip_writer(&self.writer, true, "unlock called when no write lock is held");
    }
}

#[cfg(debug_assertions)]
fn flip_writer(writer: &AtomicBool, expected: bool, violation: &str) {
    let flipped = writer
        .compare_exchange(expected, !expected, Ordering::AcqRel, Ordering::Acquire)
        .is_ok();
    if !flipped && !std::thread::panicking() {
        panic!("{violation}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_guard_sets_and_clears_writer() {
        let lock = AuditedRwLock::new(0u64);

        {
            let mut guard = lock.write().await;
            *guard += 5;
            lock.assert_write_held();
        }

        assert_eq!(*lock.read().await, 5);
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    #[should_panic(expected = "write lock is not held")]
    async fn test_assert_without_writer_panics() {
        let lock = AuditedRwLock::new(());
        let _reader = lock.read().await;
        lock.assert_write_held();
    }

    #[tokio::test]
    async fn test_guard_can_cross_tasks() {
        let lock = AuditedRwLock::new(Vec::<u32>::new());
        let audit = lock.clone();

        let guard = lock.write().await;
        let guard = tokio::spawn(async move {
            audit.assert_write_held();
            let mut guard = guard;
            guard.push(7);
            guard
        })
        .await
        .unwrap();
        drop(guard);

        assert_eq!(*lock.read().await, vec![7]);
    }
}
