//! Recency Cache - workload driver
//!
//! Runs a concurrent mixed workload against a cache built from environment
//! configuration and prints the final statistics as JSON.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recency_cache::{CacheConfig, CacheError, LruCache};

const WORKERS: u64 = 8;
const OPS_PER_WORKER: u64 = 10_000;
const KEY_SPACE: u64 = 4_096;

/// Main entry point.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Run writers, readers and deleters concurrently
/// 4. Close the cache on completion or Ctrl+C
/// 5. Print final statistics
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recency_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env();
    info!(?config, "configuration loaded");

    let cache = Arc::new(LruCache::<u64, String>::new(config));

    let mut workers = JoinSet::new();
    for worker in 0..WORKERS {
        workers.spawn(run_worker(Arc::clone(&cache), worker));
    }

    let interrupted = tokio::select! {
        _ = drain(&mut workers) => false,
        _ = signal::ctrl_c() => true,
    };
    if interrupted {
        info!("received Ctrl+C, stopping workload");
        workers.abort_all();
    } else {
        info!("workload complete");
    }

    let stats = cache.stats().await;
    cache.close().await;

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn drain(workers: &mut JoinSet<anyhow::Result<()>>) {
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(%err, "worker stopped with an error"),
            Err(err) => warn!(%err, "worker task failed"),
        }
    }
}

async fn run_worker(cache: Arc<LruCache<u64, String>>, worker: u64) -> anyhow::Result<()> {
    // Cheap per-worker LCG so runs are repeatable
    let mut state = worker.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    for _ in 0..OPS_PER_WORKER {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        let key = (state >> 33) % KEY_SPACE;

        match state % 10 {
            0..=2 => {
                let cost = 1 + (state >> 20) % 8;
                let stored = cache.set_with_size(key, format!("value-{key}"), cost).await;
                skip_rejected(worker, stored)?;
            }
            3 => {
                let ttl = Duration::from_millis(1 + (state >> 24) % 50);
                let stored = cache.set_with_ttl(key, format!("short-{key}"), ttl).await;
                skip_rejected(worker, stored)?;
            }
            4 => cache.delete(&key).await?,
            _ => {
                cache.get(&key).await;
            }
        }
    }
    Ok(())
}

/// Logs and swallows per-item rejections; a closed or broken cache still
/// stops the worker.
fn skip_rejected(worker: u64, result: recency_cache::Result<()>) -> anyhow::Result<()> {
    match result {
        Err(
            err @ (CacheError::ItemTooSmall { .. }
            | CacheError::ItemTooBig { .. }
            | CacheError::PastExpiry { .. }),
        ) => {
            debug!(worker, %err, "set rejected");
            Ok(())
        }
        other => Ok(other?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_items_do_not_stop_worker() {
        let too_big = Err(CacheError::ItemTooBig { size: 8, capacity: 4 });
        assert!(skip_rejected(0, too_big).is_ok());
        assert!(skip_rejected(0, Err(CacheError::PastExpiry { elapsed_ms: 2 })).is_ok());
        assert!(skip_rejected(0, Ok(())).is_ok());
    }

    #[test]
    fn test_closed_cache_stops_worker() {
        assert!(skip_rejected(0, Err(CacheError::Closed)).is_err());
    }

    #[tokio::test]
    async fn test_worker_survives_tiny_capacity() {
        let cache = Arc::new(LruCache::with_capacity(2));
        assert!(run_worker(Arc::clone(&cache), 3).await.is_ok());
        assert!(cache.size().await <= 2);
        cache.close().await;
    }
}
