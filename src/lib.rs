//! Tesseract Server
//!
//! A small lightweight HTTP server exposing the `tesseract` binary as a
//! text-extraction service. Concurrent access to the binary is scheduled by a
//! bounded worker pool: one pool per distinct OCR option set, each with
//! admission control (`POOL_DEFAULT_MAX`), FIFO queueing of excess demand,
//! and periodic eviction of idle workers.
//!
//! # Modules
//!
//! - `pool`: generic bounded worker pool (acquire/release, idle reaper)
//! - `ocr`: tesseract workers, factory, and the dispatching service
//! - `processor`: output post-processing (line-ending policy)
//! - `routes`: HTTP handlers (`POST /`, `GET /status`)

pub mod config;
pub mod error;
pub mod ocr;
pub mod pool;
pub mod processor;
pub mod routes;
pub mod state;
