//! Folder batch processing.
//!
//! `files` orders the input screenshots, `queue` carries work and progress
//! over channels, `worker` runs the OCR pool, and `runner` drives the whole
//! pipeline end to end.

pub mod files;
pub mod queue;
pub mod runner;
pub mod worker;

pub use queue::{BatchEvent, BatchSummary, CancelToken};
pub use runner::{BatchOptions, run_batch};
pub use worker::OcrSettings;
