//! IPC protocol between the process pool and its child processes.
//!
//! Each message is one JSON header line. Headers that describe a frame are
//! followed by exactly `len` raw pixel bytes, so frames never pass through
//! JSON. A child announces itself with `ready` once after startup.

use crate::analysis::Analysis;
use crate::error::{PipelineError, Result};
use crate::types::{Frame, PixelFormat};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Read, Write};

/// Upper bound on a single frame payload (256 MiB)
pub const MAX_PAYLOAD_LEN: usize = 256 * 1024 * 1024;

/// Frame geometry sent ahead of the pixel bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub captured_at_ms: i64,
    /// Number of payload bytes following the header line
    pub len: usize,
}

impl FrameHeader {
    pub fn of(frame: &Frame) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            format: frame.format,
            captured_at_ms: frame.captured_at_ms,
            len: frame.data.len(),
        }
    }

    pub fn into_frame(self, data: Vec<u8>) -> Frame {
        Frame {
            width: self.width,
            height: self.height,
            format: self.format,
            captured_at_ms: self.captured_at_ms,
            data,
        }
    }
}

/// Request from the pool to a child process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkRequest {
    /// Run `analysis` on the frame that follows the header.
    Apply {
        analysis: Analysis,
        frame: FrameHeader,
    },

    /// Graceful shutdown request.
    Exit,
}

/// Response from a child process to the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkResponse {
    /// Child is ready for work (sent once after startup).
    Ready,

    /// Processed frame follows the header.
    Result { frame: FrameHeader },

    /// Analysis failed; the child stays usable.
    Error { message: String },
}

impl WorkRequest {
    /// Send an apply request with its frame payload.
    pub fn send_apply<W: Write>(writer: &mut W, analysis: &Analysis, frame: &Frame) -> io::Result<()> {
        let header = WorkRequest::Apply {
            analysis: analysis.clone(),
            frame: FrameHeader::of(frame),
        };
        write_message(writer, &header, &frame.data)
    }

    /// Send the exit request.
    pub fn send_exit<W: Write>(writer: &mut W) -> io::Result<()> {
        write_message(writer, &WorkRequest::Exit, &[])
    }

    /// Read the next request and its frame, if any.
    ///
    /// Returns `None` on EOF.
    pub fn recv<R: BufRead>(reader: &mut R) -> Result<Option<(WorkRequest, Option<Frame>)>> {
        let Some(request) = read_header::<_, WorkRequest>(reader)? else {
            return Ok(None);
        };
        let frame = match &request {
            WorkRequest::Apply { frame, .. } => {
                let data = read_payload(reader, frame.len)?;
                Some(frame.clone().into_frame(data))
            }
            WorkRequest::Exit => None,
        };
        Ok(Some((request, frame)))
    }
}

impl WorkResponse {
    /// Create an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Send a response; `Result` responses carry the frame payload.
    pub fn send<W: Write>(writer: &mut W, response: &WorkResponse, payload: &[u8]) -> io::Result<()> {
        write_message(writer, response, payload)
    }

    /// Send a successful result carrying `frame`.
    pub fn send_result<W: Write>(writer: &mut W, frame: &Frame) -> io::Result<()> {
        let header = WorkResponse::Result {
            frame: FrameHeader::of(frame),
        };
        write_message(writer, &header, &frame.data)
    }

    /// Read the next response and its frame, if any.
    ///
    /// Returns `None` on EOF.
    pub fn recv<R: BufRead>(reader: &mut R) -> Result<Option<(WorkResponse, Option<Frame>)>> {
        let Some(response) = read_header::<_, WorkResponse>(reader)? else {
            return Ok(None);
        };
        let frame = match &response {
            WorkResponse::Result { frame } => {
                let data = read_payload(reader, frame.len)?;
                Some(frame.clone().into_frame(data))
            }
            WorkResponse::Ready | WorkResponse::Error { .. } => None,
        };
        Ok(Some((response, frame)))
    }
}

fn write_message<W: Write, M: Serialize>(writer: &mut W, header: &M, payload: &[u8]) -> io::Result<()> {
    let mut line = serde_json::to_vec(header).map_err(io::Error::other)?;
    line.push(b'\n');
    writer.write_all(&line)?;
    writer.write_all(payload)?;
    writer.flush()
}

fn read_header<R: BufRead, M: DeserializeOwned>(reader: &mut R) -> Result<Option<M>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let message = serde_json::from_str(line.trim_end())
        .map_err(|e| PipelineError::Serialization(format!("Invalid IPC header: {}", e)))?;
    Ok(Some(message))
}

fn read_payload<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    if len > MAX_PAYLOAD_LEN {
        return Err(PipelineError::Serialization(format!(
            "IPC payload of {} bytes exceeds limit of {}",
            len, MAX_PAYLOAD_LEN
        )));
    }
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_frame() -> Frame {
        Frame::new(2, 1, PixelFormat::Rgb8, vec![1, 2, 3, 4, 5, 6])
    }

    #[test]
    fn test_apply_request_carries_payload() {
        let sent = sample_frame();
        let mut buf = Vec::new();
        WorkRequest::send_apply(&mut buf, &Analysis::Invert, &sent).unwrap();

        // Header line is JSON and names the request type
        let newline = buf.iter().position(|&b| b == b'\n').unwrap();
        let header = std::str::from_utf8(&buf[..newline]).unwrap();
        assert!(header.contains(r#""type":"apply""#));
        assert_eq!(&buf[newline + 1..], &[1, 2, 3, 4, 5, 6]);

        let (request, frame) = WorkRequest::recv(&mut Cursor::new(buf)).unwrap().unwrap();
        match request {
            WorkRequest::Apply { analysis, .. } => assert_eq!(analysis, Analysis::Invert),
            WorkRequest::Exit => panic!("Expected Apply variant"),
        }
        assert_eq!(frame.unwrap(), sent);
    }

    #[test]
    fn test_back_to_back_messages() {
        let frame = sample_frame();
        let mut buf = Vec::new();
        WorkResponse::send(&mut buf, &WorkResponse::Ready, &[]).unwrap();
        WorkResponse::send_result(&mut buf, &frame).unwrap();
        WorkResponse::send(&mut buf, &WorkResponse::error("bad frame"), &[]).unwrap();

        let mut reader = Cursor::new(buf);
        assert!(matches!(
            WorkResponse::recv(&mut reader).unwrap(),
            Some((WorkResponse::Ready, None))
        ));
        let (_, result) = WorkResponse::recv(&mut reader).unwrap().unwrap();
        assert_eq!(result.unwrap().data, frame.data);
        match WorkResponse::recv(&mut reader).unwrap() {
            Some((WorkResponse::Error { message }, None)) => assert_eq!(message, "bad frame"),
            other => panic!("Expected Error response, got {:?}", other),
        }
        assert!(WorkResponse::recv(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_exit_request() {
        let mut buf = Vec::new();
        WorkRequest::send_exit(&mut buf).unwrap();
        let parsed = WorkRequest::recv(&mut Cursor::new(buf)).unwrap();
        assert!(matches!(parsed, Some((WorkRequest::Exit, None))));
    }

    #[test]
    fn test_truncated_payload_is_an_error() {
        let mut buf = Vec::new();
        WorkResponse::send_result(&mut buf, &sample_frame()).unwrap();
        buf.truncate(buf.len() - 2);
        assert!(WorkResponse::recv(&mut Cursor::new(buf)).is_err());
    }

    #[test]
    fn test_garbage_header_is_an_error() {
        let err = WorkRequest::recv(&mut Cursor::new(b"not json\n".to_vec())).unwrap_err();
        assert!(matches!(err, PipelineError::Serialization(_)));
    }
}
