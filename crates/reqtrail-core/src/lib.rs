//! Reqtrail library
//!
//! Aggregates instrumentation events from concurrent execution contexts into
//! one structured record per context, then hands each record to sinks.
//!
//! ```ignore
//! let aggregator = EventAggregator::new(AggregatorConfig::default());
//! aggregator.register_sink(ConsoleSink::stdout(ConsoleFormat::Summary));
//!
//! let context = ContextId::next();
//! aggregator.begin(context)?;
//! aggregator.set_field(context, "controller", "UsersController")?;
//! aggregator.end(context)?;
//! ```

pub mod aggregator;
pub mod commands;
pub mod record;
pub mod registry;
pub mod sink;
pub mod subscriber;
pub mod utils;

pub use aggregator::EventAggregator;
pub use record::{FieldRecord, FieldValue, Fields};
pub use registry::ContextId;
