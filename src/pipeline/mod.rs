//! Ordered frame-processing pipeline.
//!
//! Frames flow from a data source through a pool of worker threads and come
//! back out in their original order:
//!
//! # Architecture
//!
//! ```text
//! [DataSource] ──► [Producer] ──► ingress queue ──► [Worker × N] ──► reordering sink ──► consumer
//!                                 (bounded FIFO)         │           (bounded min-heap)
//!                                                        └──► ProcessPool (optional)
//! ```
//!
//! # Design
//!
//! - **Sequence tagging**: the producer stamps each frame once; the sequence
//!   number is the only ordering key downstream.
//! - **Backpressure**: both queues are bounded and block instead of dropping.
//! - **Cooperative cancellation**: tasks check global and local
//!   [`RunFlags`] between units and while waiting on a queue.
//! - **Pool manager**: owns every task thread and the process pool teardown.

pub mod builder;
pub mod consumer;
pub mod flags;
pub mod manager;
pub mod producer;
pub mod queue;
pub mod registry;
pub mod sink;
pub mod task;
pub mod worker;

pub use builder::{Pipeline, PipelineBuilder};
pub use consumer::{ConsumerStats, OrderedConsumer};
pub use flags::{RunFlags, StopScope};
pub use manager::{PoolManager, StopHandle, Target};
pub use producer::Producer;
pub use queue::{ingress_queue, IngressReceiver, IngressSender, POLL_INTERVAL};
pub use registry::{
    ProducerContext, ProducerCtor, ProducerRegistry, WorkerContext, WorkerCtor, WorkerRegistry,
    VIDEO_KIND,
};
pub use sink::{ReorderingSink, SinkWriter};
pub use task::{log_task_error, run_task, PipelineTask};
pub use worker::Worker;
