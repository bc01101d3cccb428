//! Mutation Serializer Module
//!
//! All changes to recency order go through one event channel consumed by a
//! single processor task. The processor owns the recency list outright, so
//! list links are never touched from anywhere else and need no locking.
//!
//! Structural events carry the issuer's write guard. The processor mutates
//! the index and size through it and hands it back on the event's completion
//! channel, so a structural change can only be requested while the write
//! lock is held.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cache::entry::Entry;
use crate::cache::lock::{AuditedRwLock, AuditedWriteGuard};
use crate::cache::lru::RecencyList;
use crate::cache::stats::StatsCounters;
use crate::error::{CacheError, Result};

// == Shared State ==
/// Index and size accounting, protected by the concurrency guard.
#[derive(Debug)]
pub(crate) struct Shared<K, V> {
    pub index: HashMap<K, Arc<Entry<K, V>>>,
    /// Sum of the costs of entries in `index`
    pub size: u64,
}

impl<K, V> Shared<K, V> {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            size: 0,
        }
    }
}

pub(crate) type SharedLock<K, V> = AuditedRwLock<Shared<K, V>>;
pub(crate) type WriteGuard<K, V> = AuditedWriteGuard<Shared<K, V>>;

// == Events ==
/// Structural changes. Always awaited by their issuer.
#[derive(Debug)]
pub(crate) enum StructuralOp<K, V> {
    /// Unlink, unindex and tombstone one entry
    Remove(Arc<Entry<K, V>>),
    /// Evict from the tail until `cost` fits
    MakeSpaceFor(u64),
    /// Purge every expired entry
    RemoveExpired,
}

#[derive(Debug)]
pub(crate) enum Event<K, V> {
    /// Move an entry to the most recently used position
    Touch {
        entry: Arc<Entry<K, V>>,
        done: Option<oneshot::Sender<()>>,
    },
    Structural {
        op: StructuralOp<K, V>,
        guard: WriteGuard<K, V>,
        done: oneshot::Sender<WriteGuard<K, V>>,
    },
    /// Report linked keys, most recent first. Answered after every event
    /// queued ahead of it has been applied.
    Snapshot { reply: oneshot::Sender<Vec<K>> },
}

// == Submission ==
/// Sends a structural event and waits for the processor to hand the guard back.
pub(crate) async fn submit_structural<K, V>(
    events: &mpsc::Sender<Event<K, V>>,
    op: StructuralOp<K, V>,
    guard: WriteGuard<K, V>,
) -> Result<WriteGuard<K, V>> {
    let (done, ack) = oneshot::channel();
    events
        .send(Event::Structural { op, guard, done })
        .await
        .map_err(|_| CacheError::Closed)?;
    ack.await.map_err(|_| {
        CacheError::Internal("mutation processor dropped a structural event".to_string())
    })
}

/// Queues a touch into an already reserved slot.
///
/// Returns the acknowledgement to await when `wait` is set. Nothing here
/// suspends, so an entry can be indexed and have its placement queued
/// without a cancellation point in between.
pub(crate) fn enqueue_touch<K, V>(
    permit: mpsc::Permit<'_, Event<K, V>>,
    entry: Arc<Entry<K, V>>,
    wait: bool,
) -> Option<oneshot::Receiver<()>> {
    if !wait {
        permit.send(Event::Touch { entry, done: None });
        return None;
    }

    let (done, ack) = oneshot::channel();
    permit.send(Event::Touch {
        entry,
        done: Some(done),
    });
    Some(ack)
}

/// Waits for a touch acknowledgement.
pub(crate) async fn await_touch(ack: oneshot::Receiver<()>) -> Result<()> {
    ack.await
        .map_err(|_| CacheError::Internal("mutation processor dropped a touch".to_string()))
}

/// Sends a touch. With `wait` set, returns only once the touch is applied.
pub(crate) async fn submit_touch<K, V>(
    events: &mpsc::Sender<Event<K, V>>,
    entry: Arc<Entry<K, V>>,
    wait: bool,
) -> Result<()> {
    let permit = events.reserve().await.map_err(|_| CacheError::Closed)?;
    match enqueue_touch(permit, entry, wait) {
        Some(ack) => await_touch(ack).await,
        None => Ok(()),
    }
}

// == Processor ==
/// The single consumer of the event channel.
pub(crate) struct Processor<K, V> {
    list: RecencyList<K, V>,
    lock: SharedLock<K, V>,
    capacity: u64,
    counters: Arc<StatsCounters>,
}

impl<K, V> Processor<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(lock: SharedLock<K, V>, capacity: u64, counters: Arc<StatsCounters>) -> Self {
        Self {
            list: RecencyList::new(),
            lock,
            capacity,
            counters,
        }
    }

    /// Applies events in arrival order until shutdown is signalled (or its
    /// sender dropped), then closes the channel and drains what is left.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<Event<K, V>>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(event) => self.apply(event),
                    None => break,
                },
                _ = &mut shutdown => {
                    events.close();
                    while let Some(event) = events.recv().await {
                        self.apply(event);
                    }
                    break;
                }
            }
        }
        info!(linked = self.list.len(), "mutation processor stopped");
    }

    fn apply(&mut self, event: Event<K, V>) {
        match event {
            Event::Touch { entry, done } => {
                // A tombstoned entry was removed after this touch was queued.
                if !entry.is_tombstoned() {
                    self.list.link_after_head(&entry);
                }
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
            Event::Structural { op, mut guard, done } => {
                match op {
                    StructuralOp::Remove(entry) => self.remove(&mut guard, &entry),
                    StructuralOp::MakeSpaceFor(cost) => self.make_space_for(&mut guard, cost),
                    StructuralOp::RemoveExpired => self.remove_expired(&mut guard),
                }
                // An issuer that gave up just drops the guard, releasing the lock.
                let _ = done.send(guard);
            }
            Event::Snapshot { reply } => {
                let keys = self.list.iter().map(|entry| entry.key.clone()).collect();
                let _ = reply.send(keys);
            }
        }
    }

    fn remove(&mut self, shared: &mut Shared<K, V>, entry: &Arc<Entry<K, V>>) {
        self.lock.assert_write_held();
        if entry.is_tombstoned() {
            return;
        }

        if shared
            .index
            .get(&entry.key)
            .is_some_and(|indexed| Arc::ptr_eq(indexed, entry))
        {
            shared.index.remove(&entry.key);
        }
        self.list.unlink(entry);
        shared.size -= entry.cost;
        entry.tombstone();
    }

    fn make_space_for(&mut self, shared: &mut Shared<K, V>, cost: u64) {
        let mut evicted = 0u64;
        while self.capacity.saturating_sub(shared.size) < cost {
            self.lock.assert_write_held();

            let Some(victim) = self.list.unlink_tail() else {
                panic!(
                    "recency list exhausted with size {} while making space for cost {}",
                    shared.size, cost
                );
            };
            shared.index.remove(&victim.key);
            shared.size -= victim.cost;
            victim.tombstone();
            evicted += 1;
        }

        if evicted > 0 {
            debug!(evicted, cost, size = shared.size, "evicted least recently used entries");
            self.counters.record_evictions(evicted);
        }
    }

    fn remove_expired(&mut self, shared: &mut Shared<K, V>) {
        self.lock.assert_write_held();

        let now = Instant::now();
        let Shared { index, size } = shared;
        let list = &mut self.list;
        let before = index.len();

        index.retain(|_, entry| {
            if !entry.is_expired_at(now) {
                return true;
            }
            list.unlink(entry);
            *size -= entry.cost;
            entry.tombstone();
            false
        });

        let purged = (before - index.len()) as u64;
        if purged > 0 {
            debug!(purged, size = *size, "purged expired entries");
            self.counters.record_expirations(purged);
        }
    }
}
