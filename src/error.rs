//! Error taxonomy shared by every stage, buffer and driver.

use std::io;
use std::sync::Mutex;
use thiserror::Error;

/// Errors that can occur while describing, laying out or streaming points.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Buffer too small: {0}")]
    BufferTooSmall(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Schema validation error: {0}")]
    SchemaValidation(String),

    #[error("Schema parsing error: {0}")]
    SchemaParsing(String),

    #[error("Schema error (generic): {0}")]
    SchemaGeneric(String),

    #[error("Range error: {0}")]
    Range(String),

    #[error("Missing required option '{0}'")]
    MissingOption(String),

    #[error("Invalid value for option '{name}': {message}")]
    InvalidOption { name: String, message: String },

    #[error("Stage '{0}' has not been initialized")]
    Uninitialized(String),

    #[error("Point index {index} out of range (limit {limit})")]
    PointIndexOutOfRange { index: usize, limit: usize },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Severity attached to a report delivered to an [`ErrorSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Warning,
    Failure,
}

/// Receiver for non-fatal diagnostics raised by drivers.
///
/// Drivers take a sink at construction instead of registering a
/// process-wide callback.
pub trait ErrorSink: Send + Sync {
    fn report(&self, severity: Severity, message: &str);
}

/// Forwards every report to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Debug => log::debug!("{}", message),
            Severity::Warning => log::warn!("{}", message),
            Severity::Failure => log::error!("{}", message),
        }
    }
}

/// Keeps every report in memory, mostly useful in tests.
#[derive(Debug, Default)]
pub struct CollectingErrorSink {
    reports: Mutex<Vec<(Severity, String)>>,
}

impl CollectingErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the reports received so far.
    pub fn reports(&self) -> Vec<(Severity, String)> {
        match self.reports.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.reports().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ErrorSink for CollectingErrorSink {
    fn report(&self, severity: Severity, message: &str) {
        let mut guard = match self.reports.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push((severity, message.to_string()));
    }
}
