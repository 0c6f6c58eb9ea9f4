//! Pool orchestration: acquire/release/invalidate/close.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;

use super::factory::{FactoryError, WorkerFactory};
use super::{reaper, PoolConfig};

/// Errors surfaced by [`WorkerPool::acquire`].
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The factory could not spawn or validate a worker. Not retried beyond
    /// the single attempt made for the failing acquire.
    #[error("worker creation failed: {0}")]
    WorkerCreation(#[from] FactoryError),
    /// The caller waited past its deadline in the queue.
    #[error("timed out waiting for a worker")]
    Timeout,
    /// The pool is shutting down.
    #[error("pool is closed")]
    Closed,
}

/// Point-in-time gauges plus lifetime counters, exposed on `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub idle: usize,
    pub busy: usize,
    pub pending_creates: usize,
    pub waiting: usize,
    pub min: usize,
    pub max: usize,
    pub created: u64,
    pub destroyed: u64,
    pub evicted: u64,
    pub timed_out: u64,
}

/// A worker parked in the idle queue. The queue is ordered oldest release
/// first, so reuse and eviction both drain from the front.
pub(super) struct IdleWorker<W> {
    pub(super) worker: W,
    pub(super) released_at: Instant,
}

/// A queued acquisition request, fulfilled by a releasing or creating
/// operation.
struct Waiter<W> {
    id: u64,
    tx: oneshot::Sender<Result<W, PoolError>>,
}

impl<W> Waiter<W> {
    /// Hand a worker to this waiter. Returns the worker back when the waiter
    /// gave up (timed out or dropped) between queueing and now.
    fn fulfill(self, worker: W) -> Option<W> {
        match self.tx.send(Ok(worker)) {
            Ok(()) => None,
            Err(rejected) => rejected.ok(),
        }
    }

    fn fail(self, err: PoolError) {
        let _ = self.tx.send(Err(err));
    }
}

pub(super) struct PoolState<W> {
    pub(super) idle: VecDeque<IdleWorker<W>>,
    pub(super) busy: usize,
    pub(super) pending_creates: usize,
    waiters: VecDeque<Waiter<W>>,
    pub(super) closed: bool,
    next_waiter_id: u64,
    reaper: Option<tokio::task::JoinHandle<()>>,
}

impl<W> PoolState<W> {
    /// Workers the pool currently accounts for, including in-flight creations.
    /// The admission-control invariant is `total() <= max`.
    pub(super) fn total(&self) -> usize {
        self.idle.len() + self.busy + self.pending_creates
    }
}

pub(super) struct PoolInner<F: WorkerFactory> {
    pub(super) factory: Arc<F>,
    pub(super) config: PoolConfig,
    pub(super) state: Mutex<PoolState<F::Worker>>,
    /// Signalled when a closed pool has no busy workers or pending creations
    /// left; `close_with_grace` waits on it.
    drained: Notify,
    created: AtomicU64,
    destroyed: AtomicU64,
    pub(super) evicted: AtomicU64,
    timed_out: AtomicU64,
}

/// Bounded pool of workers produced by `F`.
///
/// Cheap to clone; all clones share the same workers and queue.
pub struct WorkerPool<F: WorkerFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: WorkerFactory> Clone for WorkerPool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<F: WorkerFactory> WorkerPool<F> {
    /// Create an empty pool and start its reaper. `config` must have passed
    /// [`PoolConfig::validate`]. Workers are created on demand; the reaper's
    /// first tick tops the pool up to `min`.
    pub fn new(config: PoolConfig, factory: F) -> Self {
        let inner = Arc::new(PoolInner {
            factory: Arc::new(factory),
            config,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                busy: 0,
                pending_creates: 0,
                waiters: VecDeque::new(),
                closed: false,
                next_waiter_id: 0,
                reaper: None,
            }),
            drained: Notify::new(),
            created: AtomicU64::new(0),
            destroyed: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
        });

        let handle = reaper::spawn(Arc::downgrade(&inner));
        inner.state.lock().reaper = Some(handle);

        Self { inner }
    }

    /// Acquire a worker, waiting up to `timeout` when the pool is saturated.
    ///
    /// Resolution order: oldest idle worker, then a fresh worker while
    /// `total < max` (single creation attempt, failure propagated), otherwise
    /// the caller queues FIFO behind earlier waiters.
    pub async fn acquire(&self, timeout: Duration) -> Result<WorkerLease<F>, PoolError> {
        let waiting = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(PoolError::Closed);
            }
            if let Some(idle) = state.idle.pop_front() {
                state.busy += 1;
                return Ok(WorkerLease::new(self.inner.clone(), idle.worker));
            }
            if state.total() < self.inner.config.max {
                state.pending_creates += 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                let id = state.next_waiter_id;
                state.next_waiter_id += 1;
                state.waiters.push_back(Waiter { id, tx });
                Some((id, rx))
            }
        };

        match waiting {
            None => self.create_for_caller().await,
            Some((id, rx)) => self.wait_for_worker(id, rx, timeout).await,
        }
    }

    /// Creation path of `acquire`: a capacity slot is already reserved via
    /// `pending_creates`. The reservation is guarded so a caller that goes
    /// away mid-creation (a dropped request future on client disconnect)
    /// still gives the slot back.
    async fn create_for_caller(&self) -> Result<WorkerLease<F>, PoolError> {
        let mut reservation = CreateReservation {
            inner: self.inner.clone(),
            armed: true,
        };
        let result = create_validated(&self.inner.factory).await;
        let mut state = self.inner.state.lock();
        reservation.armed = false;
        state.pending_creates -= 1;
        match result {
            Ok(worker) => {
                self.inner.created.fetch_add(1, Ordering::Relaxed);
                if state.closed {
                    self.inner.notify_if_drained(&state);
                    drop(state);
                    spawn_destroy(self.inner.clone(), worker);
                    return Err(PoolError::Closed);
                }
                state.busy += 1;
                drop(state);
                Ok(WorkerLease::new(self.inner.clone(), worker))
            }
            Err(err) => {
                // The reserved slot is free again; queued demand may now fit
                // under max.
                self.inner.spawn_creates_for_demand(&mut state);
                self.inner.notify_if_drained(&state);
                drop(state);
                Err(PoolError::WorkerCreation(err))
            }
        }
    }

    /// Queued path of `acquire`: suspend until fulfilled, failed, or timed
    /// out. A timed-out waiter removes its own queue entry so it can never be
    /// handed a worker later.
    async fn wait_for_worker(
        &self,
        id: u64,
        mut rx: oneshot::Receiver<Result<F::Worker, PoolError>>,
        timeout: Duration,
    ) -> Result<WorkerLease<F>, PoolError> {
        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(Ok(worker))) => Ok(WorkerLease::new(self.inner.clone(), worker)),
            Ok(Ok(Err(err))) => Err(err),
            // Sender dropped without a message: the pool closed underneath us.
            Ok(Err(_)) => Err(PoolError::Closed),
            Err(_) => {
                let still_queued = {
                    let mut state = self.inner.state.lock();
                    let before = state.waiters.len();
                    state.waiters.retain(|w| w.id != id);
                    state.waiters.len() != before
                };
                if still_queued {
                    self.inner.timed_out.fetch_add(1, Ordering::Relaxed);
                    return Err(PoolError::Timeout);
                }
                // A fulfiller removed the entry just before the deadline; the
                // message is already in the channel (fulfillers and creation
                // failures send under the state lock) and beats the timeout.
                match rx.try_recv() {
                    Ok(Ok(worker)) => Ok(WorkerLease::new(self.inner.clone(), worker)),
                    Ok(Err(err)) => Err(err),
                    // `close()` drains entries first and sends `Closed` after
                    // unlocking; the deadline has passed either way.
                    Err(oneshot::error::TryRecvError::Empty) => Err(PoolError::Timeout),
                    Err(oneshot::error::TryRecvError::Closed) => Err(PoolError::Closed),
                }
            }
        }
    }

    /// Stop accepting acquires, abort queued waiters with
    /// [`PoolError::Closed`], destroy idle workers, and cancel the reaper.
    /// Busy workers are destroyed as their leases drop.
    pub fn close(&self) {
        let (reaper, idle, waiters) = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let reaper = state.reaper.take();
            let idle: Vec<_> = state.idle.drain(..).collect();
            let waiters: Vec<_> = state.waiters.drain(..).collect();
            self.inner.notify_if_drained(&state);
            (reaper, idle, waiters)
        };
        if let Some(handle) = reaper {
            handle.abort();
        }
        let aborted = waiters.len();
        for waiter in waiters {
            waiter.fail(PoolError::Closed);
        }
        if aborted > 0 {
            tracing::debug!(aborted, "aborted queued waiters on pool close");
        }
        for idle in idle {
            spawn_destroy(self.inner.clone(), idle.worker);
        }
    }

    /// [`WorkerPool::close`], then wait up to `grace` for busy workers and
    /// in-flight creations to drain.
    pub async fn close_with_grace(&self, grace: Duration) {
        self.close();
        let deadline = Instant::now() + grace;
        loop {
            let drained = self.inner.drained.notified();
            {
                let state = self.inner.state.lock();
                if state.busy == 0 && state.pending_creates == 0 {
                    return;
                }
            }
            if tokio::time::timeout_at(deadline, drained).await.is_err() {
                let state = self.inner.state.lock();
                tracing::warn!(
                    busy = state.busy,
                    pending_creates = state.pending_creates,
                    "pool close grace period elapsed with workers still busy"
                );
                return;
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            idle: state.idle.len(),
            busy: state.busy,
            pending_creates: state.pending_creates,
            waiting: state.waiters.len(),
            min: self.inner.config.min,
            max: self.inner.config.max,
            created: self.inner.created.load(Ordering::Relaxed),
            destroyed: self.inner.destroyed.load(Ordering::Relaxed),
            evicted: self.inner.evicted.load(Ordering::Relaxed),
            timed_out: self.inner.timed_out.load(Ordering::Relaxed),
        }
    }
}

/// Holds one `pending_creates` slot while `create_for_caller` awaits the
/// factory. Dropped while still armed (the acquire future was cancelled at
/// the creation await), it returns the slot and re-runs demand-driven
/// creation so queued waiters can claim the freed capacity.
struct CreateReservation<F: WorkerFactory> {
    inner: Arc<PoolInner<F>>,
    armed: bool,
}

impl<F: WorkerFactory> Drop for CreateReservation<F> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.inner.state.lock();
        state.pending_creates -= 1;
        self.inner.spawn_creates_for_demand(&mut state);
        self.inner.notify_if_drained(&state);
    }
}

impl<F: WorkerFactory> PoolInner<F> {
    /// Return a worker a caller is done with. Hands it to the head waiter
    /// when one is queued (idle set bypassed, FIFO preserved), otherwise
    /// parks it at the back of the idle queue with a fresh timestamp.
    fn release(self: &Arc<Self>, worker: F::Worker) {
        let mut state = self.state.lock();
        if state.closed {
            state.busy -= 1;
            self.notify_if_drained(&state);
            drop(state);
            spawn_destroy(self.clone(), worker);
            return;
        }
        let mut worker = worker;
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.fulfill(worker) {
                // Handed off directly; the worker stays busy.
                None => return,
                // Stale entry from a caller that gave up; try the next one.
                Some(w) => worker = w,
            }
        }
        state.busy -= 1;
        state.idle.push_back(IdleWorker {
            worker,
            released_at: Instant::now(),
        });
    }

    /// Remove a broken worker reported by its holder. The worker never
    /// rejoins the idle set; a replacement is created when demand or the
    /// `min` floor calls for one.
    fn invalidate(self: &Arc<Self>, worker: F::Worker) {
        let mut state = self.state.lock();
        state.busy -= 1;
        if !state.closed {
            self.spawn_creates_for_demand(&mut state);
        }
        self.notify_if_drained(&state);
        drop(state);
        spawn_destroy(self.clone(), worker);
    }

    /// Spawn background creations while queued waiters (or the eager `min`
    /// top-up) can be served within `max`. Must be called with the state lock
    /// held.
    pub(super) fn spawn_creates_for_demand(self: &Arc<Self>, state: &mut PoolState<F::Worker>) {
        if state.closed {
            return;
        }
        let demand = state.waiters.len().saturating_sub(state.pending_creates);
        let floor = self.config.min.saturating_sub(state.total());
        let capacity = self.config.max.saturating_sub(state.total());
        let want = demand.max(floor).min(capacity);
        for _ in 0..want {
            state.pending_creates += 1;
            spawn_create(self.clone());
        }
    }

    fn notify_if_drained(&self, state: &PoolState<F::Worker>) {
        if state.closed && state.busy == 0 && state.pending_creates == 0 {
            self.drained.notify_waiters();
        }
    }
}

async fn create_validated<F: WorkerFactory>(factory: &Arc<F>) -> Result<F::Worker, FactoryError> {
    let worker = factory.create().await?;
    if factory.validate(&worker).await {
        Ok(worker)
    } else {
        factory.destroy(worker).await;
        Err(FactoryError::new("worker failed liveness validation"))
    }
}

/// Background creation unit: one slot already reserved via `pending_creates`.
/// A finished worker goes to the head waiter or the idle set; a failure is
/// surfaced to the longest waiter rather than swallowed.
fn spawn_create<F: WorkerFactory>(inner: Arc<PoolInner<F>>) {
    tokio::spawn(async move {
        let result = create_validated(&inner.factory).await;
        let mut state = inner.state.lock();
        state.pending_creates -= 1;
        match result {
            Ok(worker) => {
                inner.created.fetch_add(1, Ordering::Relaxed);
                if state.closed {
                    inner.notify_if_drained(&state);
                    drop(state);
                    spawn_destroy(inner.clone(), worker);
                    return;
                }
                let mut worker = worker;
                while let Some(waiter) = state.waiters.pop_front() {
                    match waiter.fulfill(worker) {
                        None => {
                            state.busy += 1;
                            return;
                        }
                        Some(w) => worker = w,
                    }
                }
                state.idle.push_back(IdleWorker {
                    worker,
                    released_at: Instant::now(),
                });
            }
            Err(err) => match state.waiters.pop_front() {
                Some(waiter) => {
                    // Failing under the lock keeps the waiter's channel and
                    // its queue entry in step; remaining waiters get their
                    // own creation attempts while capacity allows.
                    waiter.fail(PoolError::WorkerCreation(err));
                    inner.spawn_creates_for_demand(&mut state);
                    inner.notify_if_drained(&state);
                }
                None => {
                    inner.notify_if_drained(&state);
                    drop(state);
                    tracing::warn!(error = %err, "background worker creation failed");
                }
            },
        }
    });
}

/// Destruction unit, off the bookkeeping path.
pub(super) fn spawn_destroy<F: WorkerFactory>(inner: Arc<PoolInner<F>>, worker: F::Worker) {
    tokio::spawn(async move {
        inner.factory.destroy(worker).await;
        inner.destroyed.fetch_add(1, Ordering::Relaxed);
    });
}

/// Exclusive hold on one worker.
///
/// Dropping the lease releases the worker back to the pool;
/// [`WorkerLease::invalidate`] reports it broken instead. Leases must be
/// dropped inside the tokio runtime (destruction is handed off to a task).
pub struct WorkerLease<F: WorkerFactory> {
    inner: Arc<PoolInner<F>>,
    worker: Option<F::Worker>,
}

impl<F: WorkerFactory> WorkerLease<F> {
    fn new(inner: Arc<PoolInner<F>>, worker: F::Worker) -> Self {
        Self {
            inner,
            worker: Some(worker),
        }
    }

    pub fn worker(&self) -> &F::Worker {
        // Only Drop and invalidate take the worker, both consume the lease.
        self.worker.as_ref().expect("lease holds a worker")
    }

    /// Report the worker as broken (e.g. its process crashed mid-job). It is
    /// destroyed without ever rejoining the idle set.
    pub fn invalidate(mut self) {
        if let Some(worker) = self.worker.take() {
            self.inner.invalidate(worker);
        }
    }
}

impl<F: WorkerFactory> std::fmt::Debug for WorkerLease<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerLease")
            .field("held", &self.worker.is_some())
            .finish()
    }
}

impl<F: WorkerFactory> Drop for WorkerLease<F> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.inner.release(worker);
        }
    }
}
