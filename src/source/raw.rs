//! Fixed-size raw frame source
//!
//! Reads `width * height * bytes_per_pixel` bytes per frame from any byte
//! stream: a file of concatenated frames, or the stdout of an `ffmpeg`
//! process decoding a camera, stream URL or video file to rawvideo.

use super::DataSource;
use crate::config::SourceConfig;
use crate::error::{PipelineError, Result};
use crate::types::{Frame, PixelFormat};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

/// Parse a capture device index from `"0"` or `"/dev/video0"`
pub fn parse_device_index(uri: &str) -> Option<u32> {
    if let Ok(index) = uri.parse::<u32>() {
        return Some(index);
    }
    let digits = uri.strip_prefix("/dev/video")?;
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        return digits.parse().ok();
    }
    None
}

/// Reads fixed-size frames from a byte stream
pub struct RawVideoSource {
    reader: Option<Box<dyn Read + Send>>,
    /// ffmpeg process feeding `reader`, if any
    child: Option<Child>,
    width: u32,
    height: u32,
    format: PixelFormat,
    frame_limit: Option<u64>,
    produced: u64,
    label: String,
}

impl RawVideoSource {
    pub fn from_reader(
        reader: impl Read + Send + 'static,
        width: u32,
        height: u32,
        format: PixelFormat,
        label: impl Into<String>,
    ) -> Self {
        Self {
            reader: Some(Box::new(reader)),
            child: None,
            width,
            height,
            format,
            frame_limit: None,
            produced: 0,
            label: label.into(),
        }
    }

    /// Read concatenated raw frames from a file
    pub fn open_file(path: PathBuf, config: &SourceConfig) -> Result<Self> {
        let file = File::open(&path).map_err(|e| {
            PipelineError::Acquisition(format!("Failed to open {:?}: {}", path, e))
        })?;

        let mut source = Self::from_reader(
            BufReader::new(file),
            config.width,
            config.height,
            config.format,
            format!("file {}", path.display()),
        );
        source.frame_limit = config.frame_limit;
        Ok(source)
    }

    /// Capture through ffmpeg, scaled to the configured geometry
    pub fn spawn_ffmpeg(config: &SourceConfig) -> Result<Self> {
        let (is_v4l, input) = match parse_device_index(&config.uri) {
            Some(index) => (true, format!("/dev/video{}", index)),
            None => (false, config.uri.clone()),
        };

        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-hide_banner").arg("-loglevel").arg("error");
        if is_v4l {
            cmd.arg("-f").arg("video4linux2");
        }
        if let Some(fps) = config.fps {
            cmd.arg("-r").arg(fps.to_string());
        }
        cmd.arg("-i")
            .arg(&input)
            .arg("-an")
            .arg("-vf")
            .arg(format!("scale={}:{}", config.width, config.height))
            .arg("-pix_fmt")
            .arg(config.format.ffmpeg_name())
            .arg("-f")
            .arg("rawvideo")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|e| {
            PipelineError::Acquisition(format!("Failed to start ffmpeg for {}: {}", input, e))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            PipelineError::Acquisition("Failed to capture ffmpeg stdout".to_string())
        })?;

        tracing::debug!(input = %input, pid = child.id(), "Started ffmpeg capture");

        let mut source = Self::from_reader(
            stdout,
            config.width,
            config.height,
            config.format,
            format!("ffmpeg {}", input),
        );
        source.child = Some(child);
        source.frame_limit = config.frame_limit;
        Ok(source)
    }

    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    pub fn frames_produced(&self) -> u64 {
        self.produced
    }
}

impl DataSource for RawVideoSource {
    fn acquire(&mut self) -> Result<Option<Frame>> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(PipelineError::Closed("raw video source"));
        };
        if self.frame_limit.is_some_and(|limit| self.produced >= limit) {
            return Err(PipelineError::EndOfStream("raw video source"));
        }

        let len = Frame::expected_len(self.width, self.height, self.format);
        let mut data = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match reader.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(PipelineError::Acquisition(format!(
                        "{}: read failed: {}",
                        self.label, e
                    )))
                }
            }
        }

        if filled == 0 {
            return Err(PipelineError::EndOfStream("raw video source"));
        }
        if filled < len {
            return Err(PipelineError::Acquisition(format!(
                "{}: truncated frame ({} of {} bytes)",
                self.label, filled, len
            )));
        }

        self.produced += 1;
        Ok(Some(Frame::new(self.width, self.height, self.format, data)))
    }

    fn release(&mut self) {
        if self.reader.take().is_none() {
            return;
        }
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        tracing::debug!(source = %self.label, frames = self.produced, "Released raw video source");
    }

    fn describe(&self) -> String {
        format!(
            "{} ({}x{} {})",
            self.label, self.width, self.height, self.format
        )
    }
}

impl Drop for RawVideoSource {
    fn drop(&mut self) {
        self.release();
    }
}
