//! Tesseract workers and the dispatching OCR service.

mod factory;
mod service;
mod types;
mod worker;

pub use factory::TesseractFactory;
pub use service::{OcrService, ServiceError};
pub use types::{OcrError, OcrOptions};
pub use worker::TesseractWorker;
