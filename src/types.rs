//! Core data types for framepipe
//!
//! This module contains the fundamental data structures that flow through
//! the pipeline:
//!
//! - [`Frame`] - A raw or processed image buffer
//! - [`PixelFormat`] - Layout of the bytes inside a frame
//! - [`TaggedUnit`] - A payload paired with its immutable sequence number
//!
//! # Ordering
//!
//! `TaggedUnit` orders by sequence number only. The reordering sink wraps
//! units in [`std::cmp::Reverse`] to turn `BinaryHeap` into a min-heap.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Sequence number assigned by a producer at ingestion
pub type Sequence = u64;

/// Pixel layout of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Single 8-bit luminance channel
    Gray8,
    /// Packed 8-bit red, green, blue
    #[default]
    Rgb8,
    /// Packed 8-bit blue, green, red (common capture device order)
    Bgr8,
}

impl PixelFormat {
    /// Number of bytes per pixel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
        }
    }

    /// Name understood by ffmpeg's `-pix_fmt`
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            PixelFormat::Gray8 => "gray",
            PixelFormat::Rgb8 => "rgb24",
            PixelFormat::Bgr8 => "bgr24",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Gray8 => write!(f, "gray8"),
            PixelFormat::Rgb8 => write!(f, "rgb8"),
            PixelFormat::Bgr8 => write!(f, "bgr8"),
        }
    }
}

/// An image buffer captured from a data source
///
/// Frames carry no identity beyond their arrival order; the sequence number
/// lives on the [`TaggedUnit`] that wraps them.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel layout of `data`
    pub format: PixelFormat,
    /// Capture time (Unix milliseconds, UTC)
    pub captured_at_ms: i64,
    /// Pixel bytes, row-major, `width * height * bytes_per_pixel` long
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a frame stamped with the current time
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            captured_at_ms: chrono::Utc::now().timestamp_millis(),
            data,
        }
    }

    /// Expected byte length for a frame of the given geometry
    pub fn expected_len(width: u32, height: u32, format: PixelFormat) -> usize {
        width as usize * height as usize * format.bytes_per_pixel()
    }

    /// Whether `data` matches the declared geometry
    pub fn is_consistent(&self) -> bool {
        self.data.len() == Self::expected_len(self.width, self.height, self.format)
    }

    /// Number of pixels
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

// Frames are large; keep Debug output to the header.
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("captured_at_ms", &self.captured_at_ms)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// A payload paired with the sequence number assigned at ingestion
#[derive(Debug, Clone)]
pub struct TaggedUnit<T> {
    /// Sole ordering key downstream of the producer
    pub sequence: Sequence,
    /// Raw frame or processed result
    pub payload: T,
}

impl<T> TaggedUnit<T> {
    pub fn new(sequence: Sequence, payload: T) -> Self {
        Self { sequence, payload }
    }

    /// Replace the payload, keeping the sequence number
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TaggedUnit<U> {
        TaggedUnit {
            sequence: self.sequence,
            payload: f(self.payload),
        }
    }

    /// Fallible variant of [`TaggedUnit::map`]
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<TaggedUnit<U>, E> {
        Ok(TaggedUnit {
            sequence: self.sequence,
            payload: f(self.payload)?,
        })
    }
}

impl<T> PartialEq for TaggedUnit<T> {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl<T> Eq for TaggedUnit<T> {}

impl<T> PartialOrd for TaggedUnit<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for TaggedUnit<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sequence.cmp(&other.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Reverse;
    use std::collections::BinaryHeap;

    #[test]
    fn test_pixel_format_sizes() {
        assert_eq!(PixelFormat::Gray8.bytes_per_pixel(), 1);
        assert_eq!(PixelFormat::Rgb8.bytes_per_pixel(), 3);
        assert_eq!(Frame::expected_len(4, 2, PixelFormat::Bgr8), 24);
    }

    #[test]
    fn test_frame_consistency() {
        let frame = Frame::new(2, 2, PixelFormat::Gray8, vec![0; 4]);
        assert!(frame.is_consistent());

        let frame = Frame::new(2, 2, PixelFormat::Rgb8, vec![0; 4]);
        assert!(!frame.is_consistent());
    }

    #[test]
    fn test_frame_debug_omits_pixels() {
        let mut frame = Frame::new(1, 1, PixelFormat::Gray8, vec![42]);
        frame.captured_at_ms = 0;
        let dbg = format!("{:?}", frame);
        assert!(dbg.contains("bytes: 1"));
        assert!(!dbg.contains("42"));
    }

    #[test]
    fn test_tagged_unit_orders_by_sequence_only() {
        let mut heap = BinaryHeap::new();
        for seq in [5u64, 1, 3] {
            heap.push(Reverse(TaggedUnit::new(seq, format!("payload {}", 10 - seq))));
        }
        let order: Vec<_> = std::iter::from_fn(|| heap.pop().map(|r| r.0.sequence)).collect();
        assert_eq!(order, vec![1, 3, 5]);
    }

    #[test]
    fn test_tagged_unit_map_keeps_sequence() {
        let unit = TaggedUnit::new(7, 2u32).map(|v| v * 10);
        assert_eq!(unit.sequence, 7);
        assert_eq!(unit.payload, 20);
    }
}
