//! Sharded concurrent map from context id to in-flight record.
//!
//! Every operation locks only the shard holding its key, so work on distinct
//! contexts proceeds in parallel while operations on one context serialize.

use super::context::ContextId;
use crate::record::FieldRecord;
use crate::utils::error::AggregatorError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, warn};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// State held for one active context
#[derive(Debug)]
pub(crate) struct ContextEntry {
    pub(crate) record: FieldRecord,
    spans: HashMap<String, Instant>,
    last_activity: Instant,
}

impl ContextEntry {
    fn new(id: ContextId) -> Self {
        Self {
            record: FieldRecord::new(id),
            spans: HashMap::new(),
            last_activity: Instant::now(),
        }
    }

    /// Record a monotonic start time for `span`
    pub(crate) fn open_span(&mut self, span: &str) -> Result<Instant, AggregatorError> {
        if self.spans.contains_key(span) {
            return Err(AggregatorError::DuplicateSpan {
                context: self.record.context_id,
                span: span.to_string(),
            });
        }
        let started = Instant::now();
        self.spans.insert(span.to_string(), started);
        Ok(started)
    }

    /// Close `span`, returning its elapsed time
    pub(crate) fn close_span(&mut self, span: &str) -> Result<Duration, AggregatorError> {
        match self.spans.remove(span) {
            Some(started) => Ok(started.elapsed()),
            None => Err(AggregatorError::UnknownSpan {
                context: self.record.context_id,
                span: span.to_string(),
            }),
        }
    }

    fn into_record(mut self) -> FieldRecord {
        if !self.spans.is_empty() {
            let mut open: Vec<&String> = self.spans.keys().collect();
            open.sort();
            warn!(
                "Context {} finalized with open spans: {:?}",
                self.record.context_id, open
            );
        }
        self.record.finish();
        self.record
    }
}

/// Concurrent registry of active contexts
#[derive(Debug, Default)]
pub struct ContextRegistry {
    contexts: DashMap<ContextId, ContextEntry>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a context with an empty record
    ///
    /// # Errors
    /// * `AggregatorError::DuplicateContext` - `id` is already active; the
    ///   existing record is left untouched
    pub fn begin(&self, id: ContextId) -> Result<(), AggregatorError> {
        match self.contexts.entry(id) {
            Entry::Occupied(_) => Err(AggregatorError::DuplicateContext(id)),
            Entry::Vacant(slot) => {
                slot.insert(ContextEntry::new(id));
                debug!("Context {} started", id);
                Ok(())
            }
        }
    }

    /// Snapshot of the in-flight record
    pub fn get(&self, id: ContextId) -> Option<FieldRecord> {
        self.contexts.get(&id).map(|entry| entry.record.clone())
    }

    pub fn contains(&self, id: ContextId) -> bool {
        self.contexts.contains_key(&id)
    }

    /// Run `f` against the context's state under its shard lock
    pub(crate) fn with_entry<R>(
        &self,
        id: ContextId,
        f: impl FnOnce(&mut ContextEntry) -> R,
    ) -> Result<R, AggregatorError> {
        let mut entry = self
            .contexts
            .get_mut(&id)
            .ok_or(AggregatorError::UnknownContext(id))?;
        entry.last_activity = Instant::now();
        Ok(f(entry.value_mut()))
    }

    /// Refresh the activity timestamp without changing the record
    pub fn touch(&self, id: ContextId) -> Result<(), AggregatorError> {
        self.with_entry(id, |_| ())
    }

    /// Remove the context and return its finalized record
    ///
    /// # Errors
    /// * `AggregatorError::UnknownContext` - nothing to finalize
    pub fn end(&self, id: ContextId) -> Result<FieldRecord, AggregatorError> {
        let (_, entry) = self
            .contexts
            .remove(&id)
            .ok_or(AggregatorError::UnknownContext(id))?;
        debug!("Context {} finalized", id);
        Ok(entry.into_record())
    }

    /// Remove every context idle for at least `older_than`
    ///
    /// Returns the removed records, finalized, oldest context id first.
    pub fn sweep(&self, older_than: Duration) -> Vec<FieldRecord> {
        // Collect first: removing while iterating would deadlock on the shard
        let candidates: Vec<ContextId> = self
            .contexts
            .iter()
            .filter(|entry| entry.last_activity.elapsed() >= older_than)
            .map(|entry| *entry.key())
            .collect();

        let mut swept: Vec<FieldRecord> = candidates
            .into_iter()
            .filter_map(|id| {
                // Re-check under the lock; the context may have been touched since
                self.contexts
                    .remove_if(&id, |_, entry| entry.last_activity.elapsed() >= older_than)
            })
            .map(|(_, entry)| entry.into_record())
            .collect();

        swept.sort_by_key(|record| record.context_id);
        if !swept.is_empty() {
            debug!("Swept {} stale contexts", swept.len());
        }
        swept
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
