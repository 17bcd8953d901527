//! Name-to-constructor registries for producer and worker kinds
//!
//! Kinds are selected by name in [`PipelineConfig`]. Built-in kinds are
//! registered by `with_builtins()`; callers can register their own before
//! building a pipeline.

use super::flags::RunFlags;
use super::producer::Producer;
use super::queue::{IngressReceiver, IngressSender};
use super::sink::SinkWriter;
use super::task::PipelineTask;
use super::worker::Worker;
use crate::analysis::{FrameProcessor, LocalAnalysis, PooledAnalysis};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::pool::ProcessPool;
use crate::source::open_source;
use crate::types::{Frame, TaggedUnit};
use std::collections::HashMap;
use std::sync::Arc;

/// Name of the built-in capture producer and analysis worker
pub const VIDEO_KIND: &str = "video";

/// Everything a producer constructor gets
pub struct ProducerContext<'a> {
    pub kind: &'a str,
    pub index: usize,
    pub config: &'a PipelineConfig,
    pub queue: IngressSender<TaggedUnit<Frame>>,
    pub flags: RunFlags,
}

/// Everything a worker constructor gets
pub struct WorkerContext<'a> {
    pub kind: &'a str,
    pub index: usize,
    pub config: &'a PipelineConfig,
    pub input: IngressReceiver<TaggedUnit<Frame>>,
    pub output: SinkWriter<Frame>,
    /// Present when the pipeline uses the process pool
    pub pool: Option<Arc<ProcessPool>>,
    pub flags: RunFlags,
}

pub type ProducerCtor =
    Arc<dyn Fn(ProducerContext<'_>) -> Result<Box<dyn PipelineTask>> + Send + Sync>;
pub type WorkerCtor = Arc<dyn Fn(WorkerContext<'_>) -> Result<Box<dyn PipelineTask>> + Send + Sync>;

/// Map from kind name to constructor
pub struct Registry<C> {
    role: &'static str,
    ctors: HashMap<String, C>,
}

pub type ProducerRegistry = Registry<ProducerCtor>;
pub type WorkerRegistry = Registry<WorkerCtor>;

impl<C: Clone> Registry<C> {
    fn empty(role: &'static str) -> Self {
        Self {
            role,
            ctors: HashMap::new(),
        }
    }

    /// Look up a constructor by kind name
    pub fn resolve(&self, name: &str) -> Result<C> {
        self.ctors
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownKind {
                role: self.role,
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ctors.contains_key(name)
    }

    /// Registered kind names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.ctors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Registry<ProducerCtor> {
    pub fn new() -> Self {
        Self::empty("producer")
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(VIDEO_KIND, video_producer);
        registry
    }

    /// Register (or replace) a producer kind
    pub fn register<F>(&mut self, name: &str, ctor: F)
    where
        F: Fn(ProducerContext<'_>) -> Result<Box<dyn PipelineTask>> + Send + Sync + 'static,
    {
        self.ctors.insert(name.to_string(), Arc::new(ctor));
    }
}

impl Registry<WorkerCtor> {
    pub fn new() -> Self {
        Self::empty("worker")
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(VIDEO_KIND, video_worker);
        registry
    }

    /// Register (or replace) a worker kind
    pub fn register<F>(&mut self, name: &str, ctor: F)
    where
        F: Fn(WorkerContext<'_>) -> Result<Box<dyn PipelineTask>> + Send + Sync + 'static,
    {
        self.ctors.insert(name.to_string(), Arc::new(ctor));
    }
}

impl Default for Registry<ProducerCtor> {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl Default for Registry<WorkerCtor> {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Capture producer reading from the configured source
fn video_producer(ctx: ProducerContext<'_>) -> Result<Box<dyn PipelineTask>> {
    let source = open_source(&ctx.config.source)?;
    Ok(Box::new(Producer::new(
        ctx.kind, ctx.index, source, ctx.queue, ctx.flags,
    )))
}

/// Analysis worker, in-process or delegating to the process pool
fn video_worker(ctx: WorkerContext<'_>) -> Result<Box<dyn PipelineTask>> {
    let analysis = ctx.config.analysis.clone();
    let processor: Arc<dyn FrameProcessor> = if ctx.config.use_process_pool {
        let pool = ctx
            .pool
            .ok_or(PipelineError::NotInitialized("process pool"))?;
        Arc::new(PooledAnalysis::new(pool, analysis))
    } else {
        Arc::new(LocalAnalysis::new(analysis))
    };

    if ctx.index == 0 {
        tracing::info!(processor = %processor.describe(), "Video workers configured");
    }

    Ok(Box::new(Worker::new(
        ctx.kind,
        ctx.index,
        ctx.input,
        ctx.output,
        processor,
        ctx.flags,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FnProcessor;

    #[test]
    fn test_builtins_registered() {
        assert_eq!(ProducerRegistry::with_builtins().names(), vec![VIDEO_KIND]);
        assert!(WorkerRegistry::with_builtins().contains(VIDEO_KIND));
    }

    #[test]
    fn test_unknown_kind() {
        let err = WorkerRegistry::with_builtins()
            .resolve("thermal")
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "Unknown worker kind 'thermal'");
    }

    #[test]
    fn test_custom_kind() {
        let mut registry = WorkerRegistry::new();
        registry.register("reverse", |ctx| {
            let processor = FnProcessor(|mut frame: Frame| -> Result<Frame> {
                frame.data.reverse();
                Ok(frame)
            });
            Ok(Box::new(Worker::new(
                ctx.kind,
                ctx.index,
                ctx.input,
                ctx.output,
                Arc::new(processor),
                ctx.flags,
            )) as Box<dyn PipelineTask>)
        });

        assert!(registry.resolve("reverse").is_ok());
        assert!(registry.resolve(VIDEO_KIND).is_err());
    }
}
