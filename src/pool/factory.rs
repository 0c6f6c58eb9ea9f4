//! Worker lifecycle seam.

use async_trait::async_trait;

/// Error returned when a factory cannot produce a live worker.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct FactoryError(String);

impl FactoryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Creates and destroys the workers a pool manages.
#[async_trait]
pub trait WorkerFactory: Send + Sync + 'static {
    type Worker: Send + 'static;

    /// Spawn a new worker. The pool calls [`WorkerFactory::validate`] on the
    /// result before handing it to a caller.
    async fn create(&self) -> Result<Self::Worker, FactoryError>;

    /// Check that a freshly created worker is alive. A worker that fails
    /// validation is destroyed and the creation surfaces as [`FactoryError`].
    async fn validate(&self, worker: &Self::Worker) -> bool {
        let _ = worker;
        true
    }

    /// Tear down a worker. Must be safe to call on an already-dead worker;
    /// the crash/invalidate path reaches here too.
    async fn destroy(&self, worker: Self::Worker);
}
