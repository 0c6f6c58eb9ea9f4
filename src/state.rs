//! Application state management.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::ocr::OcrService;

/// How long shutdown waits for in-flight OCR jobs before giving up.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    ocr: OcrService,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let ocr = OcrService::new(
            config.ocr.bin.clone(),
            config.pool.clone(),
            config.ocr.job_timeout,
            config.ocr.line_endings,
        );
        Self {
            inner: Arc::new(AppStateInner { config, ocr }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn ocr(&self) -> &OcrService {
        &self.inner.ocr
    }

    /// Close all worker pools, draining in-flight jobs within the grace
    /// period. Called after the HTTP server stops accepting connections.
    pub async fn shutdown(&self) {
        tracing::info!("shutting down application state");
        self.inner.ocr.shutdown(SHUTDOWN_GRACE).await;
    }
}
