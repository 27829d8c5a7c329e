//! Sinks receive finalized records for emission.
//!
//! The aggregator only depends on the `Sink` capability. Concrete sinks:
//! - `ConsoleSink` - JSON lines or one-line summaries on stdout/stderr
//! - `FileSink` - JSON lines appended to a file
//! - `HttpSink` - JSON POSTed to a collector endpoint
//! - `CaptureSink` - in-memory buffer for tests

pub mod capture;
pub mod console;
pub mod dispatcher;
pub mod file;
pub mod http;

// Re-export main types
pub use capture::CaptureSink;
pub use console::{format_summary, ConsoleFormat, ConsoleSink};
pub use dispatcher::{DeliverySnapshot, DeliveryStats, SinkDispatcher};
pub use file::{read_records, FileSink};
pub use http::HttpSink;

use crate::record::FieldRecord;
use crate::utils::error::SinkError;
use std::path::Path;

/// Consumer of finalized records
///
/// Implementations must be shareable across threads; the dispatcher may call
/// `emit` from a worker thread. Errors are retried by the dispatcher and never
/// reach the instrumented code.
pub trait Sink: Send + Sync {
    /// Deliver one record
    fn emit(&self, record: &FieldRecord) -> Result<(), SinkError>;

    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Push out anything buffered
    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Common path validation for output files
pub fn validate_path(path: &Path) -> Result<(), SinkError> {
    if path.as_os_str().is_empty() {
        return Err(SinkError::InvalidPath("Path is empty".to_string()));
    }

    if path.exists() && path.is_dir() {
        return Err(SinkError::InvalidPath(format!(
            "Path is a directory: {}",
            path.display()
        )));
    }

    Ok(())
}
