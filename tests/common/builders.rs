//! Test data builders for creating test objects

use framepipe::config::{PipelineConfig, ProcessPoolConfig, SourceConfig};
use framepipe::{Analysis, Frame, PixelFormat};

/// Builder for small pipeline configurations backed by the synthetic source
pub struct ConfigBuilder {
    config: PipelineConfig,
}

impl ConfigBuilder {
    pub fn new(frames: u64) -> Self {
        Self {
            config: PipelineConfig::local(4, SourceConfig::synthetic(8, 4).with_frame_limit(frames)),
        }
    }

    /// Synthetic source without a frame limit
    pub fn endless() -> Self {
        Self {
            config: PipelineConfig::local(4, SourceConfig::synthetic(8, 4)),
        }
    }

    pub fn workers(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn sink_capacity(mut self, capacity: usize) -> Self {
        self.config.sink_capacity = capacity;
        self
    }

    pub fn analysis(mut self, analysis: Analysis) -> Self {
        self.config.analysis = analysis;
        self
    }

    pub fn worker_kind(mut self, kind: &str) -> Self {
        self.config.worker_kind = kind.to_string();
        self
    }

    pub fn producer_kind(mut self, kind: &str) -> Self {
        self.config.producer_kind = kind.to_string();
        self
    }

    /// Route analysis through a process pool running `program`
    pub fn process_pool(mut self, processes: usize, program: &str) -> Self {
        self.config.use_process_pool = true;
        self.config.process_pool = ProcessPoolConfig::default()
            .with_process_count(processes)
            .with_program(program);
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

/// Builder for test frames
pub struct FrameBuilder {
    width: u32,
    height: u32,
    format: PixelFormat,
    fill: u8,
}

impl FrameBuilder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Gray8,
            fill: 0,
        }
    }

    pub fn format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    pub fn fill(mut self, fill: u8) -> Self {
        self.fill = fill;
        self
    }

    pub fn build(self) -> Frame {
        let len = Frame::expected_len(self.width, self.height, self.format);
        Frame::new(self.width, self.height, self.format, vec![self.fill; len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_builder() {
        let frame = FrameBuilder::new(4, 2)
            .format(PixelFormat::Rgb8)
            .fill(7)
            .build();

        assert!(frame.is_consistent());
        assert_eq!(frame.data.len(), 24);
        assert!(frame.data.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_config_builder_validates() {
        let config = ConfigBuilder::new(10).workers(2).sink_capacity(2).build();
        assert_eq!(config.worker_count, 2);
        assert!(config.validate().is_ok());
    }
}
