//! Configuration module for framepipe
//!
//! This module holds the pipeline construction surface:
//! - Which producer and worker kinds to instantiate (resolved by name)
//! - Bounded queue capacities for the ingress queue and the reordering sink
//! - Worker count and whether workers delegate to the process pool
//! - Capture source and analysis settings
//!
//! Configuration is stored as TOML. Every field has a default, so a file only
//! needs the keys it wants to override.
//!
//! # Example
//!
//! ```toml
//! producer_kind = "video"
//! worker_kind = "video"
//! queue_capacity = 60
//! sink_capacity = 60
//! worker_count = 8
//! use_process_pool = true
//!
//! [process_pool]
//! process_count = 2
//!
//! [source]
//! uri = "synthetic://"
//! width = 320
//! height = 240
//! frame_limit = 500
//!
//! [analysis]
//! type = "threshold"
//! level = 128
//! ```

use crate::analysis::Analysis;
use crate::error::{PipelineError, Result};
use crate::types::PixelFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming a config file for the binary
pub const CONFIG_ENV_VAR: &str = "FRAMEPIPE_CONFIG";

/// Default ingress queue and reordering sink capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 60;

/// Default number of worker threads
pub const DEFAULT_WORKER_COUNT: usize = 60;

/// Default capture source: the first video device
pub const DEFAULT_SOURCE_URI: &str = "0";

/// Default frame geometry
pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 480;

/// Smallest accepted `thread_stack_size`
pub const MIN_THREAD_STACK_SIZE: usize = 16 * 1024;

/// Default time to wait for a pool process to exit after the exit request
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 2_000;

/// Process pool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessPoolConfig {
    /// Number of analysis processes
    pub process_count: usize,

    /// Executable started in `--internal-worker` mode (defaults to the current executable)
    pub program: Option<PathBuf>,

    /// How long to wait for each process to exit on close (milliseconds)
    pub stop_timeout_ms: u64,
}

impl Default for ProcessPoolConfig {
    fn default() -> Self {
        Self {
            process_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            program: None,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
        }
    }
}

impl ProcessPoolConfig {
    pub fn with_process_count(mut self, process_count: usize) -> Self {
        self.process_count = process_count;
        self
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Capture source settings
///
/// `uri` selects the data source:
/// - `synthetic://` - generated test pattern
/// - `file://<path>` or a path ending in `.raw` - raw frames read from a file
/// - anything else - handed to ffmpeg (device index, `/dev/videoN`, RTSP URL, video file)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub uri: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Stop acquiring after this many frames (None = unbounded)
    pub frame_limit: Option<u64>,
    /// Pace acquisition to this rate (None = as fast as the device delivers)
    pub fps: Option<u32>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_SOURCE_URI.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            format: PixelFormat::Bgr8,
            frame_limit: None,
            fps: None,
        }
    }
}

impl SourceConfig {
    /// Synthetic test-pattern source with the given geometry
    pub fn synthetic(width: u32, height: u32) -> Self {
        Self {
            uri: "synthetic://".to_string(),
            width,
            height,
            format: PixelFormat::Rgb8,
            ..Default::default()
        }
    }

    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Producer kind, resolved through the producer registry
    pub producer_kind: String,

    /// Worker kind, resolved through the worker registry
    pub worker_kind: String,

    /// Capacity of the ingress queue between producer and workers
    pub queue_capacity: usize,

    /// Capacity of the reordering sink between workers and consumer
    pub sink_capacity: usize,

    /// Number of worker threads
    pub worker_count: usize,

    /// Delegate analysis to the process pool instead of running it in the worker thread
    pub use_process_pool: bool,

    pub process_pool: ProcessPoolConfig,

    /// Stack size in bytes for producer and worker threads (platform default when unset).
    /// Small stacks keep large worker counts cheap.
    pub thread_stack_size: Option<usize>,

    pub source: SourceConfig,

    pub analysis: Analysis,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            producer_kind: "video".to_string(),
            worker_kind: "video".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sink_capacity: DEFAULT_QUEUE_CAPACITY,
            worker_count: DEFAULT_WORKER_COUNT,
            use_process_pool: true,
            process_pool: ProcessPoolConfig::default(),
            thread_stack_size: None,
            source: SourceConfig::default(),
            analysis: Analysis::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::from_toml_str(&content)
            .map_err(|e| e.with_context(format!("Invalid config file {:?}", path)))
    }

    /// Save the configuration to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PipelineError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            PipelineError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Load from an explicit path, then `FRAMEPIPE_CONFIG`, then defaults
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::load(PathBuf::from(path)),
            None => Ok(Self::default()),
        }
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(PipelineError::Config(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.sink_capacity == 0 {
            return Err(PipelineError::Config(
                "sink_capacity must be at least 1".to_string(),
            ));
        }
        if self.worker_count == 0 {
            return Err(PipelineError::Config(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.use_process_pool && self.process_pool.process_count == 0 {
            return Err(PipelineError::Config(
                "process_pool.process_count must be at least 1".to_string(),
            ));
        }
        if self
            .thread_stack_size
            .is_some_and(|size| size < MIN_THREAD_STACK_SIZE)
        {
            return Err(PipelineError::Config(format!(
                "thread_stack_size must be at least {} bytes",
                MIN_THREAD_STACK_SIZE
            )));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(PipelineError::Config(format!(
                "source geometry {}x{} is empty",
                self.source.width, self.source.height
            )));
        }
        if self.source.fps == Some(0) {
            return Err(PipelineError::Config(
                "source.fps must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    /// In-process configuration suitable for tests and demos
    pub fn local(worker_count: usize, source: SourceConfig) -> Self {
        Self {
            worker_count,
            use_process_pool: false,
            source,
            ..Default::default()
        }
    }
}
