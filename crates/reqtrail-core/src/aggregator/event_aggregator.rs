//! The event aggregator: one structured record per execution context.
//!
//! Instrumented call sites hold an `EventAggregator` (usually behind an
//! `Arc`) and pass the `ContextId` of the work they belong to with every
//! call. Events for one context mutate that context's record; `end` removes
//! the record from the registry and hands it to the sinks exactly once.
//!
//! Nothing here is fatal to the observed code: every failure is logged at
//! `warn!` and returned so callers can inspect it, and sink failures never
//! come back at all.

use super::redaction::redact_parameters;
use super::span::SpanToken;
use crate::record::{CacheEntry, FieldRecord, FieldValue, Fields};
use crate::registry::{ContextId, ContextRegistry};
use crate::sink::{DeliverySnapshot, Sink, SinkDispatcher};
use crate::utils::config::{
    AggregatorConfig, SweepPolicy, ABANDONED_FIELD, CACHE_FIELD, DURATION_SUFFIX,
    EXCEPTION_FIELD, HALTED_CALLBACK_FIELD, PARAMETERS_FIELD,
};
use crate::utils::error::{AggregatorError, ConfigError};
use log::{debug, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Collects events per context and emits finalized records
pub struct EventAggregator {
    config: AggregatorConfig,
    registry: ContextRegistry,
    dispatcher: SinkDispatcher,
    finalized: AtomicUsize,
}

impl EventAggregator {
    /// Build an aggregator, logging a warning if `config` fails validation
    ///
    /// Use [`EventAggregator::try_new`] to reject invalid settings instead.
    pub fn new(config: AggregatorConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!("Aggregator configured with invalid settings: {}", e);
        }
        let dispatcher = SinkDispatcher::from_config(&config);
        Self {
            config,
            registry: ContextRegistry::new(),
            dispatcher,
            finalized: AtomicUsize::new(0),
        }
    }

    /// Build an aggregator from a validated configuration
    ///
    /// # Errors
    /// * `ConfigError::Invalid` - If a setting is out of range
    pub fn try_new(config: AggregatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &ContextRegistry {
        &self.registry
    }

    /// Add a sink; every record finalized from now on is delivered to it
    pub fn register_sink(&self, sink: impl Sink + 'static) {
        self.dispatcher.register(Arc::new(sink));
    }

    pub fn register_shared_sink(&self, sink: Arc<dyn Sink>) {
        self.dispatcher.register(sink);
    }

    /// Start a context with an empty record
    ///
    /// # Errors
    /// * `AggregatorError::DuplicateContext` - already active; existing state untouched
    pub fn begin(&self, context: ContextId) -> Result<(), AggregatorError> {
        warn_on_err("begin", self.registry.begin(context))
    }

    /// Snapshot of an in-flight record
    pub fn get(&self, context: ContextId) -> Option<FieldRecord> {
        self.registry.get(context)
    }

    /// Set a field, last write wins
    ///
    /// List-typed fields append instead. `parameters` must be a map and is
    /// redacted before it is stored.
    pub fn set_field(
        &self,
        context: ContextId,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> Result<(), AggregatorError> {
        let mut value = value.into();

        if name == PARAMETERS_FIELD {
            match &mut value {
                FieldValue::Map(params) => {
                    let redacted =
                        redact_parameters(params, &self.config.sensitive_parameter_names);
                    if redacted > 0 {
                        debug!("Redacted {} parameters for context {}", redacted, context);
                    }
                }
                other => {
                    return warn_on_err(
                        "set_field",
                        Err(AggregatorError::FieldTypeMismatch {
                            field: name.to_string(),
                            reason: format!("expected a map, got {}", other.kind()),
                        }),
                    );
                }
            }
        }

        let list_typed = self.config.is_list_field(name);
        let result = self
            .registry
            .with_entry(context, |entry| entry.record.merge(name, value, list_typed))
            .and_then(|inner| inner);
        warn_on_err("set_field", result)
    }

    /// Append one entry to a list field, creating the list if absent
    ///
    /// `cache` entries are skipped (but the context is still checked) when
    /// cache tracking is disabled.
    pub fn append_list_field(
        &self,
        context: ContextId,
        name: &str,
        entry: Fields,
    ) -> Result<(), AggregatorError> {
        if name == CACHE_FIELD && !self.config.cache_tracking_enabled {
            debug!("Cache tracking disabled, skipping entry for context {}", context);
            return warn_on_err("append_list_field", self.registry.touch(context));
        }

        let result = self
            .registry
            .with_entry(context, |state| {
                state.record.append(name, FieldValue::Map(entry))
            })
            .and_then(|inner| inner);
        warn_on_err("append_list_field", result)
    }

    /// Append a cache operation to the `cache` list
    pub fn record_cache(
        &self,
        context: ContextId,
        entry: &CacheEntry,
    ) -> Result<(), AggregatorError> {
        self.append_list_field(context, CACHE_FIELD, entry.to_fields())
    }

    /// Open a named span
    ///
    /// # Errors
    /// * `AggregatorError::DuplicateSpan` - same name already open; spans do not nest
    pub fn start_span(&self, context: ContextId, span: &str) -> Result<SpanToken, AggregatorError> {
        let result = self
            .registry
            .with_entry(context, |entry| entry.open_span(span))
            .and_then(|inner| inner)
            .map(|started| SpanToken::new(context, span, started));
        warn_on_err("start_span", result)
    }

    /// Close a named span and record `{span}_duration`
    ///
    /// # Errors
    /// * `AggregatorError::UnknownSpan` - no open span of that name; record unchanged
    pub fn finish_span(&self, context: ContextId, span: &str) -> Result<Duration, AggregatorError> {
        let result = self
            .registry
            .with_entry(context, |entry| {
                let elapsed = entry.close_span(span)?;
                entry
                    .record
                    .set(format!("{}{}", span, DURATION_SUFFIX), elapsed);
                Ok(elapsed)
            })
            .and_then(|inner| inner);
        warn_on_err("finish_span", result)
    }

    /// Note that a pre-processing hook stopped the request
    ///
    /// Informational only; later events for the context are still recorded.
    pub fn record_halt(&self, context: ContextId, hook: &str) -> Result<(), AggregatorError> {
        self.set_field(context, HALTED_CALLBACK_FIELD, hook)
    }

    /// Record `exception = {kind, rescued}`; does not finalize the context
    pub fn record_exception(
        &self,
        context: ContextId,
        kind: &str,
        rescued: bool,
    ) -> Result<(), AggregatorError> {
        let mut exception = Fields::new();
        exception.insert("kind".to_string(), FieldValue::from(kind));
        exception.insert("rescued".to_string(), FieldValue::from(rescued));
        self.set_field(context, EXCEPTION_FIELD, exception)
    }

    /// Finalize the context and hand its record to every sink
    ///
    /// # Errors
    /// * `AggregatorError::UnknownContext` - not active, nothing to finalize
    pub fn end(&self, context: ContextId) -> Result<Arc<FieldRecord>, AggregatorError> {
        let record = Arc::new(warn_on_err("end", self.registry.end(context))?);
        self.finalized.fetch_add(1, Ordering::Relaxed);
        self.dispatcher.dispatch(Arc::clone(&record));
        Ok(record)
    }

    /// Apply the sweep policy to contexts idle past the stale timeout
    ///
    /// Returns how many contexts were removed.
    pub fn sweep_stale(&self) -> usize {
        self.sweep_idle(self.config.stale_context_timeout())
    }

    /// Apply the sweep policy to contexts idle for at least `older_than`
    pub fn sweep_idle(&self, older_than: Duration) -> usize {
        let swept = self.registry.sweep(older_than);
        let count = swept.len();

        for mut record in swept {
            match self.config.sweep_policy {
                SweepPolicy::Finalize => {
                    warn!(
                        "Force-finalizing abandoned context {} ({} fields)",
                        record.context_id,
                        record.len()
                    );
                    record.set(ABANDONED_FIELD, true);
                    self.finalized.fetch_add(1, Ordering::Relaxed);
                    self.dispatcher.dispatch(Arc::new(record));
                }
                SweepPolicy::Discard => {
                    warn!(
                        "Discarding abandoned context {} ({} fields)",
                        record.context_id,
                        record.len()
                    );
                }
            }
        }

        count
    }

    /// Number of contexts begun but not yet finalized
    pub fn active_contexts(&self) -> usize {
        self.registry.len()
    }

    /// Records handed to the sinks so far, including force-finalized ones
    pub fn finalized_count(&self) -> usize {
        self.finalized.load(Ordering::Relaxed)
    }

    /// Block until all finalized records have reached the sinks
    pub fn flush(&self) {
        self.dispatcher.flush();
    }

    pub fn stats(&self) -> DeliverySnapshot {
        self.dispatcher.stats()
    }
}

/// Log a failed operation before handing the result back
fn warn_on_err<T>(operation: &str, result: Result<T, AggregatorError>) -> Result<T, AggregatorError> {
    if let Err(e) = &result {
        warn!("{} dropped: {}", operation, e);
    }
    result
}
