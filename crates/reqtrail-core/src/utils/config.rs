//! Configuration and constants for the aggregator.
//!
//! `AggregatorConfig` can be built in code or loaded from a TOML file:
//!
//! ```toml
//! sensitive_parameter_names = ["password", "amount"]
//! stale_context_timeout_ms = 120000
//! cache_tracking_enabled = true
//! sweep_policy = "finalize"
//! delivery = "background"
//! delivery_queue_capacity = 1024
//! ```

use super::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Current record schema version
pub const RECORD_SCHEMA_VERSION: &str = "1.0.0";

/// Value substituted for sensitive request parameters
pub const REDACTION_TOKEN: &str = "[FILTERED]";

// Well-known field names written by the aggregator and the request subscriber
pub const CACHE_FIELD: &str = "cache";
pub const PARAMETERS_FIELD: &str = "parameters";
pub const HALTED_CALLBACK_FIELD: &str = "halted_callback";
pub const EXCEPTION_FIELD: &str = "exception";
pub const ABANDONED_FIELD: &str = "abandoned";
pub const DURATION_SUFFIX: &str = "_duration";

/// Parameters the framework injects itself; never logged as request parameters
pub const INTERNAL_PARAMS: &[&str] = &["controller", "action", "format", "_method", "only_path"];

pub const DEFAULT_STALE_CONTEXT_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_EMIT_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Records the background worker may hold before new ones are dropped
pub const DEFAULT_DELIVERY_QUEUE_CAPACITY: usize = 1024;

/// Default timeout for the HTTP sink
pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(10);

/// What the sweep does with contexts that never saw their terminal event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepPolicy {
    /// Emit the partial record, flagged with `abandoned = true`
    #[default]
    Finalize,
    /// Drop the partial record
    Discard,
}

/// How finalized records reach the sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Deliver on the thread that finalized the context
    Inline,
    /// Deliver on a dedicated worker thread
    #[default]
    Background,
}

/// Complete aggregator configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Parameter names whose values are replaced by `REDACTION_TOKEN`
    pub sensitive_parameter_names: BTreeSet<String>,

    /// Idle time after which a context is considered abandoned
    pub stale_context_timeout_ms: u64,

    /// Whether cache entries are recorded at all
    pub cache_tracking_enabled: bool,

    /// Fields that append instead of overwrite
    pub list_fields: BTreeSet<String>,

    /// What the stale sweep does with abandoned contexts
    pub sweep_policy: SweepPolicy,

    /// Attempts per sink before a record is dropped for that sink
    pub max_emit_attempts: u32,

    /// Base delay between delivery attempts (multiplied by attempt number)
    pub retry_backoff_ms: u64,

    /// Inline or background delivery
    pub delivery: DeliveryMode,

    /// Bound on records queued for the background worker
    pub delivery_queue_capacity: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            sensitive_parameter_names: BTreeSet::new(),
            stale_context_timeout_ms: millis(DEFAULT_STALE_CONTEXT_TIMEOUT),
            cache_tracking_enabled: true,
            list_fields: BTreeSet::from([CACHE_FIELD.to_string()]),
            sweep_policy: SweepPolicy::default(),
            max_emit_attempts: DEFAULT_MAX_EMIT_ATTEMPTS,
            retry_backoff_ms: millis(DEFAULT_RETRY_BACKOFF),
            delivery: DeliveryMode::default(),
            delivery_queue_capacity: DEFAULT_DELIVERY_QUEUE_CAPACITY,
        }
    }
}

impl AggregatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sensitive_parameters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensitive_parameter_names
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_stale_context_timeout(mut self, timeout: Duration) -> Self {
        self.stale_context_timeout_ms = millis(timeout);
        self
    }

    pub fn with_cache_tracking(mut self, enabled: bool) -> Self {
        self.cache_tracking_enabled = enabled;
        self
    }

    pub fn with_sweep_policy(mut self, policy: SweepPolicy) -> Self {
        self.sweep_policy = policy;
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_emit_attempts = max_attempts;
        self.retry_backoff_ms = millis(backoff);
        self
    }

    pub fn with_delivery_queue_capacity(mut self, capacity: usize) -> Self {
        self.delivery_queue_capacity = capacity;
        self
    }

    pub fn stale_context_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_context_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Whether `name` must be treated as an append-only list
    pub fn is_list_field(&self, name: &str) -> bool {
        self.list_fields.contains(name)
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.sensitive_parameter_names.contains(name)
    }

    /// Reject settings the aggregator cannot honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_emit_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_emit_attempts must be at least 1".to_string(),
            ));
        }

        if self.stale_context_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "stale_context_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.delivery_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "delivery_queue_capacity must be at least 1".to_string(),
            ));
        }

        if let Some(name) = self.sensitive_parameter_names.iter().find(|n| n.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "sensitive parameter name cannot be empty ({:?})",
                name
            )));
        }

        Ok(())
    }
}

/// Whole milliseconds, rounding a non-zero sub-millisecond duration up to 1
fn millis(duration: Duration) -> u64 {
    let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    if ms == 0 && !duration.is_zero() {
        1
    } else {
        ms
    }
}

/// Load aggregator configuration from a TOML file
///
/// # Errors
/// * `ConfigError::ReadFailed` - If file cannot be read
/// * `ConfigError::ParseFailed` - If TOML is invalid
/// * `ConfigError::Invalid` - If values are out of range
pub fn load_config(path: impl AsRef<Path>) -> Result<AggregatorConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: AggregatorConfig = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}
