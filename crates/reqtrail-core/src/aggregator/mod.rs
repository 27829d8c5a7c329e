//! Event aggregation: per-context field collection, spans, redaction, and
//! sweeping of contexts that never finished.

pub mod event_aggregator;
pub mod redaction;
pub mod span;
pub mod sweeper;

pub use event_aggregator::EventAggregator;
pub use redaction::redact_parameters;
pub use span::SpanToken;
pub use sweeper::Sweeper;
