//! Cache Entry Module
//!
//! Defines the unit of storage: key, value, cost, optional expiry, the
//! recency-list slot it occupies, and its tombstone flag.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::time::Instant;

/// Slot value of an entry that is not linked into the recency list.
pub(crate) const DETACHED: usize = usize::MAX;

// == Cache Entry ==
/// A single cache entry.
///
/// Entries are shared between the index (by key) and the recency list (by
/// slot). Key, value, cost and expiry never change after construction; a
/// new `set` for the same key replaces the entry instead of mutating it.
///
/// The slot and tombstone fields are written only by the mutation
/// processor. They are atomics so the entry can be shared across tasks, not
/// because they are contended.
#[derive(Debug)]
pub struct Entry<K, V> {
    /// Key the entry is indexed under
    pub key: K,
    /// The stored value
    pub value: V,
    /// Caller-defined cost, always at least 1
    pub cost: u64,
    /// Expiry instant, None = never expires
    pub expires_at: Option<Instant>,
    slot: AtomicUsize,
    tombstoned: AtomicBool,
}

impl<K, V> Entry<K, V> {
    // == Constructor ==
    /// Creates a detached, live entry.
    pub fn new(key: K, value: V, cost: u64, expires_at: Option<Instant>) -> Self {
        Self {
            key,
            value,
            cost,
            expires_at,
            slot: AtomicUsize::new(DETACHED),
            tombstoned: AtomicBool::new(false),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired as of `now`.
    ///
    /// An entry is expired once `now` reaches its expiry instant, so it is
    /// never live at `expires_at` itself.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    /// Checks if the entry has expired as of the current instant.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    // == Tombstone ==
    /// Returns true once the entry has been logically removed.
    pub fn is_tombstoned(&self) -> bool {
        self.tombstoned.load(Ordering::Acquire)
    }

    pub(crate) fn tombstone(&self) {
        self.tombstoned.store(true, Ordering::Release);
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot.load(Ordering::Relaxed)
    }

    pub(crate) fn set_slot(&self, slot: usize) {
        self.slot.store(slot, Ordering::Relaxed);
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_entry_creation_no_expiry() {
        let entry = Entry::new(1, "test_value", 1, None);

        assert_eq!(entry.value, "test_value");
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired());
        assert!(!entry.is_tombstoned());
        assert_eq!(entry.slot(), DETACHED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expiration() {
        let expires = Instant::now() + Duration::from_secs(1);
        let entry = Entry::new(1, "test_value", 1, Some(expires));

        assert!(!entry.is_expired());

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(entry.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiration_boundary_condition() {
        let now = Instant::now();
        let entry = Entry::new(1, "test", 1, Some(now));

        // Expired exactly at the expiry instant
        assert!(entry.is_expired_at(now));
        assert!(!entry.is_expired_at(now - Duration::from_millis(1)));
    }

    #[test]
    fn test_tombstone_is_sticky() {
        let entry = Entry::new("k", 0u8, 3, None);
        entry.tombstone();
        assert!(entry.is_tombstoned());
        entry.tombstone();
        assert!(entry.is_tombstoned());
    }
}
