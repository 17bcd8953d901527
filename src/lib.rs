//! # framepipe: ordered frame-processing pipeline
//!
//! Ingests a sequential stream of frames from a capture device, fans each
//! frame out to a pool of worker threads, and reassembles the results in their
//! original order for a consumer. CPU-heavy analysis can be delegated to a
//! fixed pool of child processes.
//!
//! ## Architecture
//!
//! - **Source**: [`source::DataSource`] implementations for synthetic
//!   patterns, raw frame files and ffmpeg capture
//! - **Pipeline**: producer and worker threads, the bounded ingress queue, the
//!   reordering sink and the pool manager that owns their lifecycle
//! - **Pool**: child processes running [`analysis::Analysis`] over a JSON
//!   header plus raw payload protocol on stdin/stdout
//! - **Config**: TOML configuration with defaults for every field
//!
//! ## Example
//!
//! ```no_run
//! use framepipe::config::{PipelineConfig, SourceConfig};
//! use framepipe::pipeline::PipelineBuilder;
//! use std::time::Duration;
//!
//! fn main() -> framepipe::Result<()> {
//!     let config = PipelineConfig::local(4, SourceConfig::synthetic(320, 240).with_frame_limit(100));
//!     let mut pipeline = PipelineBuilder::new(config).build()?;
//!     pipeline.start()?;
//!
//!     for unit in pipeline.consumer() {
//!         println!("frame {} ({} bytes)", unit.sequence, unit.payload.data.len());
//!     }
//!
//!     pipeline.shutdown(Duration::from_secs(5))
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use analysis::{Analysis, FnProcessor, FrameProcessor};
pub use config::{PipelineConfig, ProcessPoolConfig, SourceConfig};
pub use error::{PipelineError, Result};
pub use pipeline::{OrderedConsumer, Pipeline, PipelineBuilder, PoolManager, ReorderingSink};
pub use pool::ProcessPool;
pub use source::DataSource;
pub use types::{Frame, PixelFormat, Sequence, TaggedUnit};
