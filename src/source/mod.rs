//! Data sources
//!
//! A [`DataSource`] wraps a capture device. Producers call
//! [`DataSource::acquire`] in a loop and [`DataSource::release`] exactly when
//! they stop.
//!
//! `acquire` results:
//! - `Ok(Some(frame))` - a frame was captured
//! - `Ok(None)` - the device delivered nothing (treated as an acquisition failure)
//! - `Err(EndOfStream)` - a finite source is exhausted
//! - `Err(Closed)` - the source was already released

mod raw;
mod synthetic;

pub use raw::{parse_device_index, RawVideoSource};
pub use synthetic::SyntheticSource;

use crate::config::SourceConfig;
use crate::error::Result;
use crate::types::Frame;
use std::path::PathBuf;

/// URI prefix selecting the generated test pattern
pub const SYNTHETIC_SCHEME: &str = "synthetic://";

/// URI prefix selecting a raw frame file
pub const FILE_SCHEME: &str = "file://";

/// Capture device capability used by producers
#[cfg_attr(test, mockall::automock)]
pub trait DataSource: Send {
    /// Capture the next frame
    fn acquire(&mut self) -> Result<Option<Frame>>;

    /// Release the device. Further `acquire` calls fail with `Closed`.
    fn release(&mut self);

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Open the source selected by `config.uri`
///
/// - `synthetic://` - [`SyntheticSource`]
/// - `file://<path>` or a path ending in `.raw` - [`RawVideoSource::open_file`]
/// - anything else - [`RawVideoSource::spawn_ffmpeg`] (device index, `/dev/videoN`, URL)
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn DataSource>> {
    let uri = config.uri.as_str();

    let source: Box<dyn DataSource> = if uri.starts_with(SYNTHETIC_SCHEME) {
        Box::new(SyntheticSource::from_config(config))
    } else if let Some(path) = uri.strip_prefix(FILE_SCHEME) {
        Box::new(RawVideoSource::open_file(PathBuf::from(path), config)?)
    } else if uri.ends_with(".raw") {
        Box::new(RawVideoSource::open_file(PathBuf::from(uri), config)?)
    } else {
        Box::new(RawVideoSource::spawn_ffmpeg(config)?)
    };

    tracing::info!(source = %source.describe(), "Opened data source");
    Ok(source)
}
