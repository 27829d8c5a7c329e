//! In-memory sink that keeps copies of every record it receives.

use super::Sink;
use crate::record::FieldRecord;
use crate::utils::error::SinkError;
use parking_lot::Mutex;
use std::sync::Arc;

/// Test-capture buffer; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct CaptureSink {
    records: Arc<Mutex<Vec<FieldRecord>>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of all records received so far
    pub fn records(&self) -> Vec<FieldRecord> {
        self.records.lock().clone()
    }

    pub fn last(&self) -> Option<FieldRecord> {
        self.records.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Sink for CaptureSink {
    fn emit(&self, record: &FieldRecord) -> Result<(), SinkError> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "capture"
    }
}
