use crate::sink::DeliverySnapshot;
use serde::Serialize;
use std::path::PathBuf;

/// Arguments for the replay command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct ReplayArgs {
    /// JSON-lines file of notifications
    pub input: PathBuf,

    /// JSON-lines file records are appended to (optional)
    pub output: Option<PathBuf>,

    /// Collector endpoint records are POSTed to (optional)
    pub endpoint: Option<String>,

    /// TOML aggregator configuration (optional)
    pub config: Option<PathBuf>,

    /// Extra parameter names to redact, on top of the configured ones
    pub filter_parameters: Vec<String>,

    /// Print one summary line per record to stdout
    pub print_summary: bool,
}

impl Default for ReplayArgs {
    fn default() -> Self {
        Self {
            input: PathBuf::from("events.jsonl"),
            output: None,
            endpoint: None,
            config: None,
            filter_parameters: Vec::new(),
            print_summary: false,
        }
    }
}

/// What a replay run did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReplayReport {
    /// Notifications parsed and applied
    pub notifications: usize,

    /// Lines that could not be parsed
    pub skipped_lines: usize,

    /// Records finalized and handed to the sinks
    pub records: usize,

    /// Contexts still open at end of input
    pub abandoned: usize,

    pub delivery: DeliverySnapshot,
}
