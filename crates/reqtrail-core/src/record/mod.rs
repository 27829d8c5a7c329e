//! Structured records and the values they hold.
//!
//! A `FieldRecord` is an insertion-ordered map of field names to
//! `FieldValue`s, plus the bookkeeping (context id, timestamps) needed to
//! emit it as one log line per unit of work.

pub mod cache;
pub mod field_record;
pub mod value;

// Re-export main types
pub use cache::{CacheEntry, CacheOperation};
pub use field_record::FieldRecord;
pub use value::{FieldValue, Fields};
