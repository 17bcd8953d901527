//! Pipeline assembly from a [`PipelineConfig`]

use super::consumer::OrderedConsumer;
use super::manager::{PoolManager, StopHandle, Target};
use super::queue::{ingress_queue, IngressReceiver};
use super::registry::{
    ProducerContext, ProducerRegistry, WorkerContext, WorkerCtor, WorkerRegistry,
};
use super::sink::ReorderingSink;
use crate::config::PipelineConfig;
use crate::error::{Result, ResultExt};
use crate::pool::ProcessPool;
use crate::types::{Frame, TaggedUnit};
use std::sync::Arc;
use std::time::Duration;

/// Builds a [`Pipeline`] from configuration and kind registries
pub struct PipelineBuilder {
    config: PipelineConfig,
    producers: ProducerRegistry,
    workers: WorkerRegistry,
    pool: Option<Arc<ProcessPool>>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            producers: ProducerRegistry::with_builtins(),
            workers: WorkerRegistry::with_builtins(),
            pool: None,
        }
    }

    pub fn with_producers(mut self, producers: ProducerRegistry) -> Self {
        self.producers = producers;
        self
    }

    pub fn with_workers(mut self, workers: WorkerRegistry) -> Self {
        self.workers = workers;
        self
    }

    /// Use an existing process pool instead of creating one from the config
    pub fn with_process_pool(mut self, pool: Arc<ProcessPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Validate the configuration, resolve kinds and create every task.
    ///
    /// Nothing runs until [`Pipeline::start`].
    pub fn build(self) -> Result<Pipeline> {
        let config = self.config;
        config.validate()?;

        let producer_ctor = self.producers.resolve(&config.producer_kind)?;
        let worker_ctor = self.workers.resolve(&config.worker_kind)?;

        let pool = if config.use_process_pool {
            Some(
                self.pool
                    .unwrap_or_else(|| Arc::new(ProcessPool::new(config.process_pool.clone()))),
            )
        } else {
            None
        };

        let (queue_tx, queue_rx) = ingress_queue(config.queue_capacity);
        let sink = Arc::new(ReorderingSink::new(config.sink_capacity));

        let mut manager = PoolManager::new().with_stack_size(config.thread_stack_size);
        if let Some(pool) = &pool {
            manager.attach_process_pool(pool.clone());
        }

        let worker_kind = format!("worker:{}", config.worker_kind);
        let producer_kind = format!("producer:{}", config.producer_kind);

        let mut pipeline = Pipeline {
            manager,
            sink,
            ingress: queue_rx,
            worker_ctor,
            worker_kind,
            producer_kind,
            pool,
            config,
        };
        pipeline.add_workers(pipeline.config.worker_count)?;

        // The producers hold the only senders, so workers see end of stream
        // once every producer has exited.
        let config = &pipeline.config;
        pipeline
            .manager
            .add(&pipeline.producer_kind, 1, |index, flags| {
                producer_ctor(ProducerContext {
                    kind: &config.producer_kind,
                    index,
                    config,
                    queue: queue_tx.clone(),
                    flags,
                })
            })
            .context("Failed to create producer")?;

        tracing::info!(
            producer = %pipeline.producer_kind,
            worker = %pipeline.worker_kind,
            workers = pipeline.config.worker_count,
            queue_capacity = pipeline.config.queue_capacity,
            sink_capacity = pipeline.config.sink_capacity,
            process_pool = pipeline.config.use_process_pool,
            "Pipeline built"
        );
        Ok(pipeline)
    }
}

/// A built pipeline: producer, workers, queues and the optional process pool
pub struct Pipeline {
    config: PipelineConfig,
    manager: PoolManager,
    sink: Arc<ReorderingSink<Frame>>,
    ingress: IngressReceiver<TaggedUnit<Frame>>,
    worker_ctor: WorkerCtor,
    worker_kind: String,
    producer_kind: String,
    pool: Option<Arc<ProcessPool>>,
}

impl Pipeline {
    /// Start the process pool (if used), then every task thread
    pub fn start(&mut self) -> Result<()> {
        if let Some(pool) = &self.pool {
            pool.start().context("Failed to start process pool")?;
        }
        // Workers first so the queue starts draining immediately
        self.manager.start(&Target::kind(self.worker_kind.as_str()));
        self.manager.start(&Target::kind(self.producer_kind.as_str()));
        Ok(())
    }

    /// Register `count` more workers; call [`Pipeline::start`] to run them
    pub fn add_workers(&mut self, count: usize) -> Result<()> {
        let ctor = self.worker_ctor.clone();
        let config = &self.config;
        let kind = config.worker_kind.as_str();
        let input = &self.ingress;
        let sink = &self.sink;
        let pool = &self.pool;

        self.manager
            .add(&self.worker_kind, count, |index, flags| {
                ctor(WorkerContext {
                    kind,
                    index,
                    config,
                    input: input.clone(),
                    output: sink.writer(),
                    pool: pool.clone(),
                    flags,
                })
            })
            .context("Failed to create workers")
    }

    /// Consumer yielding processed frames in sequence order
    pub fn consumer(&self) -> OrderedConsumer<Frame> {
        OrderedConsumer::new(self.sink.clone())
    }

    pub fn sink(&self) -> &Arc<ReorderingSink<Frame>> {
        &self.sink
    }

    pub fn ingress_len(&self) -> usize {
        self.ingress.len()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn manager(&self) -> &PoolManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut PoolManager {
        &mut self.manager
    }

    pub fn process_pool(&self) -> Option<&Arc<ProcessPool>> {
        self.pool.as_ref()
    }

    /// Manager key of the worker kind, e.g. `worker:video`
    pub fn worker_kind(&self) -> &str {
        &self.worker_kind
    }

    /// Manager key of the producer kind, e.g. `producer:video`
    pub fn producer_kind(&self) -> &str {
        &self.producer_kind
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.manager.stop_handle()
    }

    /// Ask every task to stop without waiting
    pub fn stop(&mut self) {
        self.manager.stop(&Target::All);
    }

    /// Stop every task, wait up to `timeout`, close the process pool and the sink
    pub fn shutdown(&mut self, timeout: Duration) -> Result<()> {
        let result = self.manager.shutdown(timeout);
        self.sink.close();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Analysis;
    use crate::config::SourceConfig;
    use crate::error::PipelineError;

    fn local_config(frames: u64, workers: usize) -> PipelineConfig {
        PipelineConfig::local(workers, SourceConfig::synthetic(8, 4).with_frame_limit(frames))
    }

    #[test]
    fn test_build_registers_tasks() {
        let pipeline = PipelineBuilder::new(local_config(1, 3)).build().unwrap();
        let manager = pipeline.manager();

        assert_eq!(manager.desired_count("worker:video"), 3);
        assert_eq!(manager.desired_count("producer:video"), 1);
        assert!(pipeline.process_pool().is_none());
        assert_eq!(pipeline.sink().writer_count(), 3);
    }

    #[test]
    fn test_unknown_worker_kind_fails_build() {
        let mut config = local_config(1, 1);
        config.worker_kind = "thermal".to_string();

        let err = PipelineBuilder::new(config).build().err().unwrap();
        assert!(matches!(err, PipelineError::UnknownKind { role: "worker", .. }));
    }

    #[test]
    fn test_invalid_config_fails_build() {
        let mut config = local_config(1, 1);
        config.sink_capacity = 0;
        assert!(PipelineBuilder::new(config).build().is_err());
    }

    #[test]
    fn test_finite_source_runs_to_end_of_stream() {
        let mut config = local_config(25, 4);
        config.analysis = Analysis::Invert;
        let mut pipeline = PipelineBuilder::new(config).build().unwrap();
        pipeline.start().unwrap();

        let mut consumer = pipeline.consumer();
        let sequences: Vec<_> = consumer.by_ref().map(|u| u.sequence).collect();

        assert_eq!(sequences.len(), 25);
        assert_eq!(consumer.stats().delivered, 25);
        pipeline.shutdown(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_small_thread_stacks() {
        let mut config = local_config(40, 16);
        config.thread_stack_size = Some(64 * 1024);
        let mut pipeline = PipelineBuilder::new(config).build().unwrap();
        assert_eq!(pipeline.manager().stack_size(), Some(64 * 1024));

        pipeline.start().unwrap();
        assert_eq!(pipeline.consumer().count(), 40);
        pipeline.shutdown(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_scale_up_after_start() {
        let mut pipeline = PipelineBuilder::new(local_config(5, 1)).build().unwrap();
        pipeline.start().unwrap();
        pipeline.add_workers(2).unwrap();
        pipeline.start().unwrap();

        assert_eq!(pipeline.manager().desired_count("worker:video"), 3);
        let delivered = pipeline.consumer().count();
        assert_eq!(delivered, 5);
        pipeline.shutdown(Duration::from_secs(2)).unwrap();
    }
}
