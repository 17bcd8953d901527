//! Frame analysis functions and the processors that run them
//!
//! This module provides:
//! - [`Analysis`] - the per-frame analysis function, serializable so the same
//!   value can run in a worker thread or be shipped to a pool process
//! - [`FrameProcessor`] - the seam workers call through, with in-process and
//!   process-pool implementations

pub mod ops;
pub mod processor;

pub use ops::Analysis;
pub use processor::{FnProcessor, FrameProcessor, LocalAnalysis, PooledAnalysis};
