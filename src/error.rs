//! Error handling for framepipe
//!
//! This module defines the pipeline error type and a Result alias used
//! throughout the library. Tasks classify errors through
//! [`PipelineError::is_graceful`] to decide between an informational
//! shutdown message and an error log.

use thiserror::Error;

/// Main error type for framepipe operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The data source could not deliver a frame (exhausted or broken device)
    #[error("Acquisition error: {0}")]
    Acquisition(String),

    /// The analysis function failed for a frame
    #[error("Processing error: {0}")]
    Processing(String),

    /// A resource was used before it finished initializing
    #[error("{0} not initialized")]
    NotInitialized(&'static str),

    /// A resource was used after it was closed
    #[error("{0} is closed")]
    Closed(&'static str),

    /// An operator requested shutdown while the task was running or waiting
    #[error("Shutdown requested by operator")]
    Interrupted,

    /// The upstream stage finished and no more units will arrive
    #[error("End of stream: {0}")]
    EndOfStream(&'static str),

    /// No producer or worker is registered under this name
    #[error("Unknown {role} kind '{name}'")]
    UnknownKind { role: &'static str, name: String },

    /// Errors related to configuration loading/saving/validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to the process pool and its child processes
    #[error("Process pool error: {0}")]
    ProcessPool(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, with all context layers removed
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this error ends a task without indicating a fault
    ///
    /// Operator interrupts and end-of-stream are logged at info level.
    pub fn is_graceful(&self) -> bool {
        matches!(
            self.root(),
            PipelineError::Interrupted | PipelineError::EndOfStream(_)
        )
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

/// Result type alias for framepipe operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| PipelineError::Io(e).with_context(f()))
    }
}
