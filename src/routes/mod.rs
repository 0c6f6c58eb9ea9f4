//! HTTP route handlers.

pub mod ocr;
pub mod status;
