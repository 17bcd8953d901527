//! Frame processors used by workers
//!
//! A worker does not know where its analysis runs. It calls
//! [`FrameProcessor::process`] and gets the processed frame back:
//!
//! - [`LocalAnalysis`] runs the analysis on the worker thread itself
//! - [`PooledAnalysis`] submits it to the shared [`ProcessPool`] and blocks
//!   until a pool process returns the result
//! - [`FnProcessor`] wraps any closure (handy for tests and custom kinds)

use crate::analysis::Analysis;
use crate::error::Result;
use crate::pool::ProcessPool;
use crate::types::Frame;
use std::sync::Arc;

/// Per-frame processing function shared by every worker of a kind
pub trait FrameProcessor: Send + Sync {
    /// Process one frame
    fn process(&self, frame: Frame) -> Result<Frame>;

    /// Short description for logs
    fn describe(&self) -> String {
        "custom".to_string()
    }
}

/// Runs the analysis directly on the calling thread
#[derive(Debug, Clone)]
pub struct LocalAnalysis {
    analysis: Analysis,
}

impl LocalAnalysis {
    pub fn new(analysis: Analysis) -> Self {
        Self { analysis }
    }
}

impl FrameProcessor for LocalAnalysis {
    fn process(&self, frame: Frame) -> Result<Frame> {
        self.analysis.apply(frame)
    }

    fn describe(&self) -> String {
        format!("{} (in-process)", self.analysis.label())
    }
}

/// Delegates the analysis to the process pool
pub struct PooledAnalysis {
    pool: Arc<ProcessPool>,
    analysis: Analysis,
}

impl PooledAnalysis {
    pub fn new(pool: Arc<ProcessPool>, analysis: Analysis) -> Self {
        Self { pool, analysis }
    }

    pub fn pool(&self) -> &Arc<ProcessPool> {
        &self.pool
    }
}

impl FrameProcessor for PooledAnalysis {
    fn process(&self, frame: Frame) -> Result<Frame> {
        self.pool.apply(&self.analysis, frame)
    }

    fn describe(&self) -> String {
        format!(
            "{} (process pool, {} processes)",
            self.analysis.label(),
            self.pool.process_count()
        )
    }
}

/// Adapter turning a closure into a [`FrameProcessor`]
pub struct FnProcessor<F>(pub F);

impl<F> FrameProcessor for FnProcessor<F>
where
    F: Fn(Frame) -> Result<Frame> + Send + Sync,
{
    fn process(&self, frame: Frame) -> Result<Frame> {
        (self.0)(frame)
    }
}
