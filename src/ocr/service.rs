//! OCR dispatch and the per-option-set pool registry.
//!
//! The original service promises one pool per distinct option combination:
//! requests with the same options share workers, requests with different
//! options never contend with each other. Pools are created lazily on first
//! use and live until shutdown.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::pool::{PoolConfig, PoolError, PoolStats, WorkerPool};
use crate::processor::LineEndings;

use super::factory::TesseractFactory;
use super::types::{OcrError, OcrOptions};

/// Errors surfaced to the HTTP layer by [`OcrService::process`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Ocr(#[from] OcrError),
}

/// Dispatcher: accepts a job, leases a worker from the right pool, runs the
/// job, and returns or invalidates the worker.
#[derive(Clone)]
pub struct OcrService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    bin: String,
    pool_config: PoolConfig,
    job_timeout: Duration,
    line_endings: LineEndings,
    pools: RwLock<HashMap<OcrOptions, WorkerPool<TesseractFactory>>>,
}

impl OcrService {
    /// `pool_config` must have passed [`PoolConfig::validate`]; the server
    /// validates all configuration at startup.
    pub fn new(
        bin: impl Into<String>,
        pool_config: PoolConfig,
        job_timeout: Duration,
        line_endings: LineEndings,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                bin: bin.into(),
                pool_config,
                job_timeout,
                line_endings,
                pools: RwLock::new(HashMap::new()),
            }),
        }
    }

    async fn pool_for(&self, options: &OcrOptions) -> WorkerPool<TesseractFactory> {
        if let Some(pool) = self.inner.pools.read().await.get(options) {
            return pool.clone();
        }
        let mut pools = self.inner.pools.write().await;
        pools
            .entry(options.clone())
            .or_insert_with(|| {
                tracing::info!(pool = %options.pool_key(), "creating worker pool");
                WorkerPool::new(
                    self.inner.pool_config.clone(),
                    TesseractFactory::new(
                        self.inner.bin.clone(),
                        options.clone(),
                        self.inner.job_timeout,
                    ),
                )
            })
            .clone()
    }

    /// Run one OCR job end to end. A crashed worker is invalidated so the
    /// pool replaces it; any other outcome releases the worker for reuse.
    pub async fn process(
        &self,
        image: &[u8],
        options: OcrOptions,
    ) -> Result<String, ServiceError> {
        options.validate()?;
        let pool = self.pool_for(&options).await;
        let lease = pool.acquire(self.inner.pool_config.acquire_timeout).await?;
        match lease.worker().run(image).await {
            Ok(text) => {
                drop(lease);
                Ok(self.inner.line_endings.normalize(&text))
            }
            Err(err @ OcrError::Crashed(_)) => {
                tracing::warn!(error = %err, "worker crashed mid-job, invalidating");
                lease.invalidate();
                Err(ServiceError::Ocr(err))
            }
            Err(err) => {
                drop(lease);
                Err(ServiceError::Ocr(err))
            }
        }
    }

    /// Per-pool statistics keyed by option-set label, for `/status`.
    pub async fn stats(&self) -> BTreeMap<String, PoolStats> {
        let pools = self.inner.pools.read().await;
        pools
            .iter()
            .map(|(options, pool)| (options.pool_key(), pool.stats()))
            .collect()
    }

    /// Close every pool, waiting up to `grace` for in-flight jobs.
    pub async fn shutdown(&self, grace: Duration) {
        let pools: Vec<_> = self.inner.pools.read().await.values().cloned().collect();
        tracing::info!(pools = pools.len(), "closing worker pools");
        futures::future::join_all(pools.iter().map(|pool| pool.close_with_grace(grace))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> OcrService {
        OcrService::new(
            "/nonexistent/tesseract-binary",
            PoolConfig::default(),
            Duration::from_secs(5),
            LineEndings::Auto,
        )
    }

    #[tokio::test]
    async fn test_invalid_options_rejected_before_pooling() {
        let svc = service();
        let options = OcrOptions {
            languages: vec![],
            ..OcrOptions::default()
        };
        let err = svc.process(b"image", options).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Ocr(OcrError::InvalidOptions(_))
        ));
        // No pool was created for the rejected request.
        assert!(svc.stats().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_binary_surfaces_creation_error() {
        let svc = service();
        let err = svc.process(b"image", OcrOptions::default()).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Pool(PoolError::WorkerCreation(_))
        ));
    }

    #[tokio::test]
    async fn test_one_pool_per_option_set() {
        let svc = service();
        let deu = OcrOptions {
            languages: vec!["deu".to_string()],
            ..OcrOptions::default()
        };
        // Both fail (no binary), but the pools stay registered.
        let _ = svc.process(b"image", OcrOptions::default()).await;
        let _ = svc.process(b"image", OcrOptions::default()).await;
        let _ = svc.process(b"image", deu).await;

        let stats = svc.stats().await;
        assert_eq!(stats.len(), 2);
        assert!(stats.contains_key("eng"));
        assert!(stats.contains_key("deu"));
    }
}
