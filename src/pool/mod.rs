//! Bounded worker pool with admission control and idle eviction.
//!
//! The pool owns a set of long-lived OCR workers and schedules concurrent
//! access to them:
//!
//! - `acquire()` hands out an idle worker (oldest first), creates a new one
//!   while under `max`, or queues the caller in a FIFO of waiters.
//! - `release` (dropping the [`WorkerLease`]) hands the worker straight to the
//!   head waiter when one is queued, otherwise returns it to the idle set.
//! - A background reaper evicts workers idle past `idle_timeout`, never
//!   dropping the pool below `min`, and eagerly tops the pool back up to
//!   `min` after a destroy.
//!
//! All bookkeeping (`idle`/`busy`/`waiters`) is serialized behind one mutex;
//! worker creation, destruction, and job execution happen outside it so a
//! slow spawn or a slow job never stalls unrelated acquires and releases.
//!
//! Worker state is represented structurally by ownership: a worker lives in
//! exactly one of the idle queue, a caller's lease, or a destroy task.

mod factory;
#[allow(clippy::module_inception)]
mod pool;
mod reaper;

pub use factory::{FactoryError, WorkerFactory};
pub use pool::{PoolError, PoolStats, WorkerLease, WorkerPool};

use std::time::Duration;

/// Sizing and eviction settings for one pool.
///
/// Must pass [`PoolConfig::validate`] before being handed to
/// [`WorkerPool::new`]; the server validates at startup.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum number of workers to keep waiting in the pool.
    pub min: usize,
    /// Maximum number of workers, after which requests are queued.
    pub max: usize,
    /// Time a worker can stay idle before eviction.
    pub idle_timeout: Duration,
    /// Interval between eviction checks.
    pub eviction_run_interval: Duration,
    /// How long an `acquire` may wait in the queue before failing.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min: 0,
            max: 2,
            idle_timeout: Duration::from_millis(5_000),
            eviction_run_interval: Duration::from_millis(5_000),
            acquire_timeout: Duration::from_millis(30_000),
        }
    }
}

/// Rejected pool settings.
#[derive(Debug, thiserror::Error)]
pub enum PoolConfigError {
    #[error("pool max must be at least 1")]
    ZeroMax,
    #[error("pool max ({max}) must not be below min ({min})")]
    MaxBelowMin { min: usize, max: usize },
    #[error("eviction run interval must be greater than zero")]
    ZeroEvictionInterval,
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), PoolConfigError> {
        if self.max == 0 {
            return Err(PoolConfigError::ZeroMax);
        }
        if self.max < self.min {
            return Err(PoolConfigError::MaxBelowMin {
                min: self.min,
                max: self.max,
            });
        }
        if self.eviction_run_interval.is_zero() {
            return Err(PoolConfigError::ZeroEvictionInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PoolConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_max_rejected() {
        let config = PoolConfig {
            max: 0,
            ..PoolConfig::default()
        };
        assert!(matches!(config.validate(), Err(PoolConfigError::ZeroMax)));
    }

    #[test]
    fn test_max_below_min_rejected() {
        let config = PoolConfig {
            min: 3,
            max: 2,
            ..PoolConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PoolConfigError::MaxBelowMin { min: 3, max: 2 })
        ));
    }

    #[test]
    fn test_zero_eviction_interval_rejected() {
        let config = PoolConfig {
            eviction_run_interval: Duration::ZERO,
            ..PoolConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PoolConfigError::ZeroEvictionInterval)
        ));
    }
}
