//! Cache Store Module
//!
//! Public cache handle: admission, lookup, deletion and shutdown on top of
//! the concurrency guard and the mutation processor.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, trace, warn};

use crate::cache::entry::Entry;
use crate::cache::event::{
    await_touch, enqueue_touch, submit_structural, submit_touch, Event, Processor, Shared,
    SharedLock, StructuralOp, WriteGuard,
};
use crate::cache::lock::AuditedRwLock;
use crate::cache::stats::{CacheStats, StatsCounters};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_expiry_sweeper, SweeperHandle};

struct Background {
    processor: JoinHandle<()>,
    stop_processor: oneshot::Sender<()>,
    sweeper: Option<SweeperHandle>,
}

// == LRU Cache ==
/// Capacity-bounded LRU cache with per-entry cost and optional expiry.
///
/// Reads take a shared lock only for the index lookup and hand the recency
/// update to the mutation processor. Writes hold the exclusive lock for
/// their whole duration and wait for every structural change they request.
///
/// Must be created inside a tokio runtime. Dropping the cache without
/// calling [`close`](Self::close) also stops the background tasks, but does
/// not wait for them.
pub struct LruCache<K, V> {
    config: CacheConfig,
    state: SharedLock<K, V>,
    events: mpsc::Sender<Event<K, V>>,
    counters: Arc<StatsCounters>,
    background: Mutex<Option<Background>>,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a cache and starts its mutation processor, plus the expiry
    /// sweeper when `config.purge_interval` is non-zero.
    pub fn new(config: CacheConfig) -> Self {
        let state = AuditedRwLock::new(Shared::new());
        let counters = Arc::new(StatsCounters::default());

        // A zero-depth buffer still needs one slot; touches are then awaited.
        let (events, rx) = mpsc::channel(config.touch_buffer.max(1));
        let (stop_processor, stop) = oneshot::channel();
        let processor = Processor::new(state.clone(), config.capacity, Arc::clone(&counters));
        let processor = tokio::spawn(processor.run(rx, stop));

        let sweeper = (!config.purge_interval.is_zero()).then(|| {
            spawn_expiry_sweeper(state.clone(), events.clone(), config.purge_interval)
        });

        info!(
            capacity = config.capacity,
            touch_buffer = config.touch_buffer,
            purge_interval_ms = config.purge_interval.as_millis() as u64,
            purge_expired_when_full = config.purge_expired_when_full,
            "cache started"
        );

        Self {
            config,
            state,
            events,
            counters,
            background: Mutex::new(Some(Background {
                processor,
                stop_processor,
                sweeper,
            })),
        }
    }

    /// Creates a cache with the given capacity and default options.
    pub fn with_capacity(capacity: u64) -> Self {
        Self::new(CacheConfig::new(capacity))
    }

    // == Set ==
    /// Stores a value with cost 1 and no expiry.
    pub async fn set(&self, key: K, value: V) -> Result<()> {
        self.set_with_size_and_expiry(key, value, 1, None).await
    }

    /// Stores a value with the given cost and no expiry.
    pub async fn set_with_size(&self, key: K, value: V, cost: u64) -> Result<()> {
        self.set_with_size_and_expiry(key, value, cost, None).await
    }

    /// Stores a value with cost 1 that expires at `expires_at`.
    pub async fn set_with_expiry(&self, key: K, value: V, expires_at: Instant) -> Result<()> {
        self.set_with_size_and_expiry(key, value, 1, Some(expires_at))
            .await
    }

    /// Stores a value with cost 1 that expires `ttl` from now.
    ///
    /// A `ttl` too large to represent as an instant stores the value with no
    /// expiry.
    pub async fn set_with_ttl(&self, key: K, value: V, ttl: Duration) -> Result<()> {
        let expires_at = Instant::now().checked_add(ttl);
        self.set_with_size_and_expiry(key, value, 1, expires_at)
            .await
    }

    /// Stores a value with the given cost and optional expiry.
    ///
    /// Rejected without touching any state if `cost` is zero, `cost` exceeds
    /// the capacity, or `expires_at` has already been reached. An existing
    /// entry for `key` is removed first so its cost is freed. If the entry
    /// still does not fit, least recently used entries are evicted until it
    /// does (after purging expired entries, when configured to).
    pub async fn set_with_size_and_expiry(
        &self,
        key: K,
        value: V,
        cost: u64,
        expires_at: Option<Instant>,
    ) -> Result<()> {
        self.validate(cost, expires_at)?;
        if self.events.is_closed() {
            return Err(CacheError::Closed);
        }

        let entry = Arc::new(Entry::new(key, value, cost, expires_at));
        let mut guard = self.state.write().await;

        if let Some(existing) = guard.index.get(&entry.key).cloned() {
            guard = self.structural(StructuralOp::Remove(existing), guard).await?;
        }

        if self.config.capacity.saturating_sub(guard.size) < cost {
            if self.config.purge_expired_when_full {
                guard = self.structural(StructuralOp::RemoveExpired, guard).await?;
            }
            guard = self.structural(StructuralOp::MakeSpaceFor(cost), guard).await?;
        }

        // The placement touch is queued before the lock is released, so no
        // later structural event can overtake it.
        let permit = self.events.reserve().await.map_err(|_| CacheError::Closed)?;
        guard.index.insert(entry.key.clone(), Arc::clone(&entry));
        guard.size += cost;
        let ack = enqueue_touch(permit, entry, self.strict_touches());
        drop(guard);

        match ack {
            Some(ack) => await_touch(ack).await,
            None => Ok(()),
        }
    }

    // == Get ==
    /// Retrieves a clone of the value stored under `key`.
    ///
    /// Returns None for missing keys and for expired entries. An expired
    /// entry is left in place here; it is reclaimed by a later purge or
    /// eviction so the read path never needs the write lock.
    pub async fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entry = self.state.read().await.index.get(key).cloned();

        let entry = match entry {
            Some(entry) if !entry.is_expired() => entry,
            _ => {
                self.counters.record_miss();
                return None;
            }
        };
        self.counters.record_hit();

        let value = entry.value.clone();
        if let Err(err) = self.touch(entry).await {
            trace!(%err, "dropped recency touch");
        }
        Some(value)
    }

    // == Delete ==
    /// Removes the entry for `key`, if any.
    ///
    /// Once this returns, no `get` for the key succeeds, whatever the touch
    /// buffer depth.
    pub async fn delete<Q>(&self, key: &Q) -> Result<()>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = self.state.write().await;
        if let Some(existing) = guard.index.get(key).cloned() {
            drop(self.structural(StructuralOp::Remove(existing), guard).await?);
        }
        Ok(())
    }

    // == Accessors ==
    /// Returns the current total cost of live entries.
    pub async fn size(&self) -> u64 {
        self.state.read().await.size
    }

    /// Returns the fixed capacity.
    pub fn capacity(&self) -> u64 {
        self.config.capacity
    }

    /// Returns the number of entries in the index.
    pub async fn entry_count(&self) -> usize {
        self.state.read().await.index.len()
    }

    /// Returns the configuration the cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let guard = self.state.read().await;
        self.counters
            .snapshot(guard.index.len(), guard.size, self.config.capacity)
    }

    // == Recency Order ==
    /// Returns the keys in recency order, most recently used first.
    ///
    /// Every touch queued before this call has been applied by the time it
    /// returns.
    pub async fn keys_by_recency(&self) -> Result<Vec<K>> {
        let (reply, keys) = oneshot::channel();
        self.events
            .send(Event::Snapshot { reply })
            .await
            .map_err(|_| CacheError::Closed)?;
        keys.await
            .map_err(|_| CacheError::Internal("mutation processor dropped a snapshot".to_string()))
    }

    /// Waits until every touch queued so far has been applied.
    pub async fn flush(&self) -> Result<()> {
        self.keys_by_recency().await.map(drop)
    }

    // == Close ==
    /// Stops the expiry sweeper, then closes the event queue and waits for
    /// the processor to drain it.
    ///
    /// Calling it again is a no-op. Operations must not run concurrently
    /// with `close`; writes issued afterwards fail with [`CacheError::Closed`].
    pub async fn close(&self) {
        let Some(background) = self.background.lock().await.take() else {
            return;
        };

        if let Some(sweeper) = background.sweeper {
            sweeper.stop().await;
        }

        let _ = background.stop_processor.send(());
        if let Err(err) = background.processor.await {
            warn!(%err, "mutation processor ended abnormally");
        }
        info!("cache closed");
    }

    fn validate(&self, cost: u64, expires_at: Option<Instant>) -> Result<()> {
        if cost == 0 {
            return Err(CacheError::ItemTooSmall { size: cost });
        }
        if cost > self.config.capacity {
            return Err(CacheError::ItemTooBig {
                size: cost,
                capacity: self.config.capacity,
            });
        }
        if let Some(expires_at) = expires_at {
            let now = Instant::now();
            if expires_at <= now {
                return Err(CacheError::PastExpiry {
                    elapsed_ms: (now - expires_at).as_millis(),
                });
            }
        }
        Ok(())
    }

    async fn structural(
        &self,
        op: StructuralOp<K, V>,
        guard: WriteGuard<K, V>,
    ) -> Result<WriteGuard<K, V>> {
        submit_structural(&self.events, op, guard).await
    }

    async fn touch(&self, entry: Arc<Entry<K, V>>) -> Result<()> {
        submit_touch(&self.events, entry, self.strict_touches()).await
    }

    fn strict_touches(&self) -> bool {
        self.config.touch_buffer == 0
    }
}
