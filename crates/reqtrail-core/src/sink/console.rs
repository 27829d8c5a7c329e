//! Console sink: JSON lines or one-line request summaries.

use super::Sink;
use crate::record::{FieldRecord, FieldValue};
use crate::utils::config::{EXCEPTION_FIELD, HALTED_CALLBACK_FIELD};
use crate::utils::error::SinkError;
use colored::*;
use parking_lot::Mutex;
use std::io::{self, IsTerminal, Write};

/// Line format written by `ConsoleSink`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleFormat {
    /// The full record as one JSON document
    #[default]
    Json,
    /// `Completed Controller#action in 12.3ms (200)` style line
    Summary,
}

/// Writes each record as a single line to a stream
pub struct ConsoleSink {
    writer: Mutex<Box<dyn Write + Send>>,
    format: ConsoleFormat,
    color: bool,
}

impl ConsoleSink {
    /// Write to any stream; colors off
    pub fn new(writer: impl Write + Send + 'static, format: ConsoleFormat) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            format,
            color: false,
        }
    }

    /// Write to stdout, colored when stdout is a terminal
    pub fn stdout(format: ConsoleFormat) -> Self {
        let color = io::stdout().is_terminal();
        Self::new(io::stdout(), format).with_color(color)
    }

    pub fn stderr(format: ConsoleFormat) -> Self {
        let color = io::stderr().is_terminal();
        Self::new(io::stderr(), format).with_color(color)
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    fn render(&self, record: &FieldRecord) -> Result<String, SinkError> {
        match self.format {
            ConsoleFormat::Json => Ok(serde_json::to_string(record)?),
            ConsoleFormat::Summary => Ok(format_summary(record, self.color)),
        }
    }
}

impl Sink for ConsoleSink {
    fn emit(&self, record: &FieldRecord) -> Result<(), SinkError> {
        let line = self.render(record)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }

    fn flush(&self) -> Result<(), SinkError> {
        self.writer.lock().flush()?;
        Ok(())
    }
}

/// One-line human summary of a finished request record
pub fn format_summary(record: &FieldRecord, color: bool) -> String {
    let target = match (record.get_str("controller"), record.get_str("action")) {
        (Some(controller), Some(action)) => format!("{}#{}", controller, action),
        (Some(controller), None) => controller.to_string(),
        _ => format!("context {}", record.context_id),
    };

    let mut line = format!("Completed {}", target);

    if let Some(millis) = record.get("controller_duration").and_then(FieldValue::as_millis) {
        line.push_str(&format!(" in {:.1}ms", millis));
    }

    if let Some(status) = record.get("status") {
        line.push_str(&format!(" ({})", status));
    }

    let mut notes = Vec::new();
    if let Some(hook) = record.get_str(HALTED_CALLBACK_FIELD) {
        notes.push(format!("halted by {}", hook));
    }
    if let Some(location) = record.get_str("redirect_to") {
        notes.push(format!("redirected to {}", location));
    }
    let cache_count = record.cache_entries().len();
    if cache_count > 0 {
        notes.push(format!("{} cache ops", cache_count));
    }
    if !notes.is_empty() {
        line.push_str(&format!(" [{}]", notes.join(", ")));
    }

    let exception = record
        .get(EXCEPTION_FIELD)
        .and_then(FieldValue::as_map)
        .and_then(|e| e.get("kind"))
        .and_then(FieldValue::as_str);

    match (exception, color) {
        (Some(kind), true) => format!("{} {}", line, format!("!! {}", kind).red().bold()),
        (Some(kind), false) => format!("{} !! {}", line, kind),
        (None, true) => line.green().to_string(),
        (None, false) => line,
    }
}
