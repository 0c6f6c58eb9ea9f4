//! Factory spawning and validating tesseract workers.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::pool::{FactoryError, WorkerFactory};

use super::types::OcrOptions;
use super::worker::TesseractWorker;

/// Produces workers bound to one option set.
pub struct TesseractFactory {
    bin: String,
    options: OcrOptions,
    job_timeout: Duration,
}

impl TesseractFactory {
    pub fn new(bin: impl Into<String>, options: OcrOptions, job_timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            options,
            job_timeout,
        }
    }
}

#[async_trait]
impl WorkerFactory for TesseractFactory {
    type Worker = TesseractWorker;

    async fn create(&self) -> Result<TesseractWorker, FactoryError> {
        Ok(TesseractWorker::new(
            self.bin.clone(),
            self.options.clone(),
            self.job_timeout,
        ))
    }

    /// Liveness check before the pool hands the worker out: probe the binary
    /// the way a health checker would.
    async fn validate(&self, worker: &TesseractWorker) -> bool {
        match Command::new(&self.bin).arg("--version").output().await {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                tracing::warn!(
                    worker_id = %worker.id(),
                    bin = %self.bin,
                    code = ?output.status.code(),
                    "tesseract version probe exited non-zero"
                );
                false
            }
            Err(err) => {
                tracing::warn!(
                    worker_id = %worker.id(),
                    bin = %self.bin,
                    error = %err,
                    "tesseract version probe failed"
                );
                false
            }
        }
    }

    /// Jobs run as short-lived children with `kill_on_drop`, so dropping the
    /// worker releases everything it owns. Trivially safe on dead workers.
    async fn destroy(&self, worker: TesseractWorker) {
        tracing::debug!(worker_id = %worker.id(), "destroying tesseract worker");
    }
}
