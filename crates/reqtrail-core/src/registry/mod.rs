//! Registry of in-flight execution contexts.
//!
//! Maps each `ContextId` to the record being built for it. Contexts are
//! created by `begin`, mutated through the aggregator, and removed exactly
//! once by `end` or by the stale sweep.

pub mod context;
pub mod table;

pub use context::ContextId;
pub use table::ContextRegistry;
