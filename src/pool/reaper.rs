//! Idle reaper: periodic eviction of stale workers and eager `min` top-up.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::factory::WorkerFactory;
use super::pool::{spawn_destroy, PoolInner};

/// Start the reaper task for a pool. It holds only a weak back-reference, so
/// dropping the pool stops it; `close()` aborts it explicitly.
pub(super) fn spawn<F: WorkerFactory>(inner: Weak<PoolInner<F>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = match inner.upgrade() {
            Some(pool) => pool.config.eviction_run_interval,
            None => return,
        };
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so workers get a full
        // interval before their first eviction check.
        interval.tick().await;
        loop {
            interval.tick().await;
            let Some(pool) = inner.upgrade() else { break };
            if !tick(&pool) {
                break;
            }
        }
    })
}

/// One eviction pass. Returns `false` once the pool has closed.
fn tick<F: WorkerFactory>(inner: &Arc<PoolInner<F>>) -> bool {
    let now = Instant::now();
    let mut evict = Vec::new();
    {
        let mut state = inner.state.lock();
        if state.closed {
            return false;
        }
        // Oldest-idle-first: the queue is ordered by release time, so once
        // the front entry is fresh the rest are too. A worker claimed by
        // `acquire` has already left the idle queue and cannot be seen here.
        while state.total() > inner.config.min {
            let expired = state
                .idle
                .front()
                .is_some_and(|idle| now.duration_since(idle.released_at) >= inner.config.idle_timeout);
            if !expired {
                break;
            }
            if let Some(idle) = state.idle.pop_front() {
                evict.push(idle.worker);
            }
        }
        // Eager top-up: backfill toward `min` so a prior destroy or eviction
        // elsewhere does not leave the pool short until the next acquire.
        inner.spawn_creates_for_demand(&mut state);
    }
    if !evict.is_empty() {
        inner.evicted.fetch_add(evict.len() as u64, Ordering::Relaxed);
        tracing::debug!(count = evict.len(), "evicting workers past their idle timeout");
        for worker in evict {
            spawn_destroy(inner.clone(), worker);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::pool::{FactoryError, PoolConfig, WorkerFactory, WorkerPool};

    #[derive(Clone, Default)]
    struct CountingFactory {
        created: Arc<AtomicUsize>,
        destroyed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl WorkerFactory for CountingFactory {
        type Worker = usize;

        async fn create(&self) -> Result<usize, FactoryError> {
            Ok(self.created.fetch_add(1, Ordering::SeqCst))
        }

        async fn destroy(&self, _worker: usize) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config(min: usize, max: usize) -> PoolConfig {
        PoolConfig {
            min,
            max,
            idle_timeout: Duration::from_millis(5_000),
            eviction_run_interval: Duration::from_millis(5_000),
            acquire_timeout: Duration::from_millis(30_000),
        }
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_eager_top_up_reaches_min_without_load() {
        let factory = CountingFactory::default();
        let pool = WorkerPool::new(config(2, 4), factory.clone());
        assert_eq!(pool.stats().idle, 0);

        // First reaper pass backfills to min.
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        settle().await;
        assert_eq!(pool.stats().idle, 2);
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);

        // Min workers are never evicted, however long they idle.
        tokio::time::sleep(Duration::from_millis(60_000)).await;
        settle().await;
        assert_eq!(pool.stats().idle, 2);
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_worker_evicted_on_second_tick() {
        // idle_timeout=5000, interval=5000, min=0: a worker released
        // mid-interval survives the first (partial) tick and is evicted by
        // the second, well within 11 seconds of going idle.
        let factory = CountingFactory::default();
        let pool = WorkerPool::new(config(0, 2), factory.clone());

        let lease = pool.acquire(Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        drop(lease);
        settle().await;
        assert_eq!(pool.stats().idle, 1);

        // First tick at t=5s: idle for 3s, below the timeout.
        tokio::time::sleep(Duration::from_millis(4_000)).await;
        settle().await;
        assert_eq!(pool.stats().idle, 1);
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 0);

        // Second tick at t=10s: idle for 8s, evicted.
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        settle().await;
        assert_eq!(pool.stats().idle, 0);
        assert_eq!(pool.stats().evicted, 1);
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_never_drops_below_min() {
        let factory = CountingFactory::default();
        let pool = WorkerPool::new(config(1, 4), factory.clone());

        let a = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let b = pool.acquire(Duration::from_secs(1)).await.unwrap();
        drop(a);
        drop(b);
        settle().await;
        assert_eq!(pool.stats().idle, 2);

        // Both exceed the idle timeout, but eviction stops at the floor.
        tokio::time::sleep(Duration::from_millis(20_000)).await;
        settle().await;
        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.evicted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_wins_race_against_eviction() {
        let factory = CountingFactory::default();
        let pool = WorkerPool::new(config(0, 2), factory.clone());

        let lease = pool.acquire(Duration::from_secs(1)).await.unwrap();
        drop(lease);
        settle().await;

        // Claimed right before its timeout elapses: the worker has left the
        // idle queue, so the tick that follows cannot touch it.
        tokio::time::sleep(Duration::from_millis(4_900)).await;
        let lease = pool.acquire(Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10_000)).await;
        settle().await;

        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 0);
        assert_eq!(pool.stats().busy, 1);
        drop(lease);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_stops_on_close() {
        let factory = CountingFactory::default();
        let pool = WorkerPool::new(config(2, 4), factory.clone());
        pool.close();

        // No top-up happens after close.
        tokio::time::sleep(Duration::from_millis(30_000)).await;
        settle().await;
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
    }
}
