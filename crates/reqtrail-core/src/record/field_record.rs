//! The aggregation target for one execution context.

use super::cache::{CacheEntry, CacheOperation};
use super::value::{FieldValue, Fields};
use crate::registry::ContextId;
use crate::utils::config::{CACHE_FIELD, DURATION_SUFFIX, RECORD_SCHEMA_VERSION};
use crate::utils::error::AggregatorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Structured data accumulated for one logical unit of work
///
/// Mutable while its context is active; once handed to the sinks it is
/// shared behind an `Arc` and never changed again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    /// Schema version for compatibility checking
    pub version: String,

    /// Context that produced this record
    pub context_id: ContextId,

    /// When the context began
    pub started_at: DateTime<Utc>,

    /// When the context was finalized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Accumulated fields, in first-write order
    #[serde(default)]
    pub fields: Fields,
}

impl FieldRecord {
    pub fn new(context_id: ContextId) -> Self {
        Self {
            version: RECORD_SCHEMA_VERSION.to_string(),
            context_id,
            started_at: Utc::now(),
            finished_at: None,
            fields: Fields::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Field is set and not blank
    pub fn is_present(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| !v.is_blank())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    /// Last write wins. Returns the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.fields.insert(name.into(), value.into())
    }

    /// Append one entry to a list field, creating the list if absent
    pub fn append(
        &mut self,
        name: &str,
        entry: impl Into<FieldValue>,
    ) -> Result<(), AggregatorError> {
        match self
            .fields
            .entry(name.to_string())
            .or_insert_with(|| FieldValue::List(Vec::new()))
        {
            FieldValue::List(items) => {
                items.push(entry.into());
                Ok(())
            }
            other => Err(AggregatorError::FieldTypeMismatch {
                field: name.to_string(),
                reason: format!("cannot append to a {} field", other.kind()),
            }),
        }
    }

    /// Write a value honouring list semantics
    ///
    /// Only a declared list-typed field appends: maps are pushed, lists are
    /// concatenated, anything else is rejected. Every other field is
    /// overwritten, whatever it currently holds.
    pub fn merge(
        &mut self,
        name: &str,
        value: FieldValue,
        list_typed: bool,
    ) -> Result<(), AggregatorError> {
        if !list_typed {
            self.set(name, value);
            return Ok(());
        }

        match value {
            FieldValue::Map(_) => self.append(name, value),
            FieldValue::List(items) => {
                for item in items {
                    self.append(name, item)?;
                }
                Ok(())
            }
            other => Err(AggregatorError::FieldTypeMismatch {
                field: name.to_string(),
                reason: format!("list field cannot take a {} value", other.kind()),
            }),
        }
    }

    /// Remove a field, returning it
    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.shift_remove(name)
    }

    /// Value of `{span}_duration`, if recorded in this process
    pub fn duration(&self, span: &str) -> Option<Duration> {
        self.get(&format!("{}{}", span, DURATION_SUFFIX))
            .and_then(FieldValue::as_duration)
    }

    /// Decoded entries of the `cache` list, in insertion order
    pub fn cache_entries(&self) -> Vec<CacheEntry> {
        self.get(CACHE_FIELD)
            .and_then(FieldValue::as_list)
            .unwrap_or_default()
            .iter()
            .filter_map(FieldValue::as_map)
            .filter_map(CacheEntry::from_fields)
            .collect()
    }

    /// First cache entry with exactly this operation and key
    pub fn find_cache(&self, operation: CacheOperation, key_or_path: &str) -> Option<CacheEntry> {
        self.cache_entries()
            .into_iter()
            .find(|entry| entry.matches(operation, key_or_path))
    }

    /// Stamp the finish time
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Wall-clock lifetime of the context, once finished
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}
