//! Centralized error handling for the landing pipeline.
//!
//! Errors are grouped by the stage of processing that produced them so the
//! orchestrator can report the failing stage and error kind to the notifier
//! without string matching:
//!
//! ```
//! use landing_pipeline::error::PipelineError;
//!
//! fn describe(err: &PipelineError) -> &'static str {
//!     match err {
//!         PipelineError::Config(_) => "fix the table parameters",
//!         PipelineError::Parse(_) => "inspect the source file",
//!         PipelineError::Transform { .. } => "inspect the stage configuration",
//!         _ => "check the logs",
//!     }
//! }
//! ```
//!
//! ## Context Extension Trait
//!
//! The `ResultExt` trait adds `.context()` to any `Result` whose error converts
//! into [`PipelineError`]:
//!
//! ```no_run
//! use landing_pipeline::error::ResultExt as _;
//!
//! fn load() -> landing_pipeline::error::Result<String> {
//!     let body = std::fs::read_to_string("parameters.json")
//!         .context("Failed to load table parameters")?;
//!     Ok(body)
//! }
//! ```

use std::fmt;

/// Main error type for pipeline operations.
#[derive(Debug)]
pub enum PipelineError {
    /// I/O errors (local files, directories)
    Io(std::io::Error),

    /// Missing or malformed table parameters, unresolvable schema
    Config(String),

    /// Decode failures and unreadable source files
    Parse(String),

    /// A transformation stage failed outside its per-cell fallbacks
    Transform { stage: String, message: String },

    /// Object store read/write/move failures
    Storage(String),

    /// Table engine errors (Polars)
    DataProcessing(String),

    /// Generic error with context
    Other(String),
}

impl PipelineError {
    pub fn transform(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transform {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Short error-type label used in failure notifications.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "IoError",
            Self::Config(_) => "ConfigurationError",
            Self::Parse(_) => "ParseError",
            Self::Transform { .. } => "TransformError",
            Self::Storage(_) => "StorageError",
            Self::DataProcessing(_) => "DataProcessingError",
            Self::Other(_) => "Error",
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Parse(msg) => write!(f, "Parse error: {msg}"),
            Self::Transform { stage, message } => {
                write!(f, "Transformation error in {stage}: {message}")
            }
            Self::Storage(msg) => write!(f, "Storage error: {msg}"),
            Self::DataProcessing(msg) => write!(f, "Data processing error: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {err}"))
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::DataProcessing(err.to_string())
    }
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<regex::Error> for PipelineError {
    fn from(err: regex::Error) -> Self {
        Self::Config(format!("Invalid regex: {err}"))
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<PipelineError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| with_prefix(e.into(), &msg.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| with_prefix(e.into(), &f()))
    }
}

/// Prefixes the message while keeping the variant, so the error kind survives.
fn with_prefix(err: PipelineError, prefix: &str) -> PipelineError {
    match err {
        PipelineError::Io(e) => PipelineError::Other(format!("{prefix}: I/O error: {e}")),
        PipelineError::Config(msg) => PipelineError::Config(format!("{prefix}: {msg}")),
        PipelineError::Parse(msg) => PipelineError::Parse(format!("{prefix}: {msg}")),
        PipelineError::Transform { stage, message } => PipelineError::Transform {
            stage,
            message: format!("{prefix}: {message}"),
        },
        PipelineError::Storage(msg) => PipelineError::Storage(format!("{prefix}: {msg}")),
        PipelineError::DataProcessing(msg) => {
            PipelineError::DataProcessing(format!("{prefix}: {msg}"))
        }
        PipelineError::Other(msg) => PipelineError::Other(format!("{prefix}: {msg}")),
    }
}
