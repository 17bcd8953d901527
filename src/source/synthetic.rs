//! Generated test-pattern source

use super::DataSource;
use crate::config::SourceConfig;
use crate::error::{PipelineError, Result};
use crate::types::{Frame, PixelFormat};
use std::time::{Duration, Instant};

/// Produces a moving gradient, optionally paced and limited
#[derive(Debug)]
pub struct SyntheticSource {
    width: u32,
    height: u32,
    format: PixelFormat,
    frame_limit: Option<u64>,
    /// Time between frames when paced
    interval: Option<Duration>,
    next_due: Option<Instant>,
    produced: u64,
    released: bool,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            frame_limit: None,
            interval: None,
            next_due: None,
            produced: 0,
            released: false,
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        let mut source = Self::new(config.width, config.height, config.format);
        source.frame_limit = config.frame_limit;
        if let Some(fps) = config.fps {
            source = source.with_fps(fps);
        }
        source
    }

    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.interval = Some(Duration::from_secs(1) / fps.max(1));
        self
    }

    pub fn frames_produced(&self) -> u64 {
        self.produced
    }

    /// Bytes shift by one per frame so consecutive frames differ
    fn pattern(&self) -> Vec<u8> {
        let len = Frame::expected_len(self.width, self.height, self.format);
        let offset = self.produced;
        (0..len as u64).map(|i| (i + offset) as u8).collect()
    }

    fn pace(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            std::thread::sleep(due - now);
        }
        self.next_due = Some(due.max(now) + interval);
    }
}

impl DataSource for SyntheticSource {
    fn acquire(&mut self) -> Result<Option<Frame>> {
        if self.released {
            return Err(PipelineError::Closed("synthetic source"));
        }
        if self.frame_limit.is_some_and(|limit| self.produced >= limit) {
            return Err(PipelineError::EndOfStream("synthetic source"));
        }

        self.pace();
        let frame = Frame::new(self.width, self.height, self.format, self.pattern());
        self.produced += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        if !self.released {
            tracing::debug!(frames = self.produced, "Releasing synthetic source");
            self.released = true;
        }
    }

    fn describe(&self) -> String {
        format!(
            "synthetic {}x{} {}",
            self.width, self.height, self.format
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_match_geometry_and_differ() {
        let mut source = SyntheticSource::new(3, 2, PixelFormat::Rgb8);
        let first = source.acquire().unwrap().unwrap();
        let second = source.acquire().unwrap().unwrap();

        assert!(first.is_consistent());
        assert_eq!(first.data.len(), 18);
        assert_ne!(first.data, second.data);
        assert_eq!(source.frames_produced(), 2);
    }

    #[test]
    fn test_frame_limit() {
        let mut source = SyntheticSource::new(1, 1, PixelFormat::Gray8).with_frame_limit(2);
        assert!(source.acquire().unwrap().is_some());
        assert!(source.acquire().unwrap().is_some());
        assert!(matches!(
            source.acquire(),
            Err(PipelineError::EndOfStream(_))
        ));
    }

    #[test]
    fn test_release_closes() {
        let mut source = SyntheticSource::new(1, 1, PixelFormat::Gray8);
        source.release();
        source.release();
        assert!(matches!(source.acquire(), Err(PipelineError::Closed(_))));
    }

    #[test]
    fn test_fps_pacing() {
        let mut source = SyntheticSource::new(1, 1, PixelFormat::Gray8).with_fps(100);
        let start = Instant::now();
        for _ in 0..4 {
            source.acquire().unwrap();
        }
        // First frame is immediate, the next three wait 10ms each
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
