//! CLI command implementations.
//!
//! Commands orchestrate the library components to perform user tasks.

pub mod models;
pub mod replay;
pub mod utils;

// Re-export main command functions
pub use models::{ReplayArgs, ReplayReport};
pub use replay::{execute_replay, validate_args};
pub use utils::{display_schema, display_version, validate_record_file};
