//! Execution-context identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Generated ids have the top bit set, external ids normally do not
const GENERATED_BASE: u64 = 1 << 63;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(GENERATED_BASE);

/// Opaque identifier of one in-flight unit of work
///
/// Passed by value through every instrumentation call. Ids from `next()` are
/// unique within the process and live in the upper half of the `u64` range,
/// so they never collide with external ids below `2^63` wrapped with `from`.
/// Callers wrapping their own ids must keep them unique among concurrently
/// active contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(u64);

impl ContextId {
    pub fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Allocated by `next()` rather than wrapped from an external id
    pub fn is_generated(self) -> bool {
        self.0 >= GENERATED_BASE
    }
}

impl From<u64> for ContextId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
