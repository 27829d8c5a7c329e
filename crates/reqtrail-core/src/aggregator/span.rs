//! Tokens returned when a named span is opened.

use super::event_aggregator::EventAggregator;
use crate::registry::ContextId;
use crate::utils::error::AggregatorError;
use std::time::{Duration, Instant};

/// Proof that a span was opened; finishing it records `{name}_duration`
///
/// Spans are keyed by name within a context, not stacked, so the token is a
/// convenience: `aggregator.finish_span(context, name)` works just as well.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a span that is never finished records no duration"]
pub struct SpanToken {
    context: ContextId,
    name: String,
    started: Instant,
}

impl SpanToken {
    pub(crate) fn new(context: ContextId, name: &str, started: Instant) -> Self {
        Self {
            context,
            name: name.to_string(),
            started,
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time since the span was opened
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Close the span on `aggregator`
    pub fn finish(self, aggregator: &EventAggregator) -> Result<Duration, AggregatorError> {
        aggregator.finish_span(self.context, &self.name)
    }
}
