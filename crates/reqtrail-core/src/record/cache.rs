//! Cache sub-records appended to the `cache` list field.
//!
//! Keys are carried verbatim. Matching compares whole strings, so a key such
//! as `views/foo%bar` never behaves as a pattern.

use super::value::{FieldValue, Fields};
use serde::{Deserialize, Serialize};

/// Kind of cache operation observed during a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOperation {
    ReadFragment,
    WriteFragment,
    ExpireFragment,
    ExistFragment,
    WritePage,
    ExpirePage,
}

impl CacheOperation {
    /// Human-readable label stored in the `type` key
    pub fn label(self) -> &'static str {
        match self {
            CacheOperation::ReadFragment => "Read fragment",
            CacheOperation::WriteFragment => "Write fragment",
            CacheOperation::ExpireFragment => "Expire fragment",
            CacheOperation::ExistFragment => "Exist fragment?",
            CacheOperation::WritePage => "Write page",
            CacheOperation::ExpirePage => "Expire page",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        [
            CacheOperation::ReadFragment,
            CacheOperation::WriteFragment,
            CacheOperation::ExpireFragment,
            CacheOperation::ExistFragment,
            CacheOperation::WritePage,
            CacheOperation::ExpirePage,
        ]
        .into_iter()
        .find(|op| op.label() == label)
    }
}

/// One cache operation with the key or page path it touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub operation: CacheOperation,
    pub key_or_path: String,
}

impl CacheEntry {
    pub fn new(operation: CacheOperation, key_or_path: impl Into<String>) -> Self {
        Self {
            operation,
            key_or_path: key_or_path.into(),
        }
    }

    /// Sub-record layout: `{"type": <label>, "key_or_path": <key>}`
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("type".to_string(), FieldValue::from(self.operation.label()));
        fields.insert(
            "key_or_path".to_string(),
            FieldValue::from(self.key_or_path.as_str()),
        );
        fields
    }

    pub fn from_fields(fields: &Fields) -> Option<Self> {
        let operation = CacheOperation::from_label(fields.get("type")?.as_str()?)?;
        let key_or_path = fields.get("key_or_path")?.as_str()?.to_string();
        Some(Self {
            operation,
            key_or_path,
        })
    }

    /// Exact match on operation and key
    pub fn matches(&self, operation: CacheOperation, key_or_path: &str) -> bool {
        self.operation == operation && self.key_or_path == key_or_path
    }
}
