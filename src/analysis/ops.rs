//! Built-in per-frame analysis functions
//!
//! Every analysis is a pure function of its input frame. Values of
//! [`Analysis`] are plain data, so the pool can send them to a child
//! process along with the frame.

use crate::error::{PipelineError, Result};
use crate::types::{Frame, PixelFormat};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Analysis applied by video workers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Analysis {
    /// Return the frame unchanged
    #[default]
    Passthrough,
    /// Invert every channel value
    Invert,
    /// Convert to single-channel luminance
    Grayscale,
    /// Luminance, then binarize: `>= level` becomes 255, everything else 0
    Threshold { level: u8 },
    /// Hold the frame for a fixed time, then pass it through.
    /// Stands in for CPU-heavy analysis when measuring throughput.
    Delay { millis: u64 },
}

impl Analysis {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            Analysis::Passthrough => "passthrough",
            Analysis::Invert => "invert",
            Analysis::Grayscale => "grayscale",
            Analysis::Threshold { .. } => "threshold",
            Analysis::Delay { .. } => "delay",
        }
    }

    /// Run the analysis on one frame
    pub fn apply(&self, frame: Frame) -> Result<Frame> {
        if !frame.is_consistent() {
            return Err(PipelineError::Processing(format!(
                "frame holds {} bytes, expected {} for {}x{} {}",
                frame.data.len(),
                Frame::expected_len(frame.width, frame.height, frame.format),
                frame.width,
                frame.height,
                frame.format
            )));
        }

        match self {
            Analysis::Passthrough => Ok(frame),
            Analysis::Invert => {
                let mut frame = frame;
                frame.data.iter_mut().for_each(|b| *b = !*b);
                Ok(frame)
            }
            Analysis::Grayscale => Ok(to_gray(frame)),
            Analysis::Threshold { level } => {
                let mut frame = to_gray(frame);
                let level = *level;
                frame
                    .data
                    .iter_mut()
                    .for_each(|b| *b = if *b >= level { u8::MAX } else { 0 });
                Ok(frame)
            }
            Analysis::Delay { millis } => {
                std::thread::sleep(Duration::from_millis(*millis));
                Ok(frame)
            }
        }
    }
}

/// BT.601 luma in 8.8 fixed point
#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

fn to_gray(frame: Frame) -> Frame {
    let data = match frame.format {
        PixelFormat::Gray8 => return frame,
        PixelFormat::Rgb8 => frame
            .data
            .chunks_exact(3)
            .map(|px| luma(px[0], px[1], px[2]))
            .collect(),
        PixelFormat::Bgr8 => frame
            .data
            .chunks_exact(3)
            .map(|px| luma(px[2], px[1], px[0]))
            .collect(),
    };

    Frame {
        format: PixelFormat::Gray8,
        data,
        ..frame
    }
}
