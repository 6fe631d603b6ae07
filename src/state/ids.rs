//! Per-process client identity generation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque, process-unique identifier for a connected client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out monotonically increasing [`ClientId`]s.
///
/// Cheap to share behind a shared reference: ids are drawn with a single
/// relaxed atomic increment, so concurrent sessions never collide.
#[derive(Debug, Default)]
pub struct ClientIdGen {
    next: AtomicU64,
}

impl ClientIdGen {
    /// Create a fresh generator starting from the first id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next unique client id.
    pub fn next(&self) -> ClientId {
        ClientId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
