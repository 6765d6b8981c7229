//! Service instance identity.
//!
//! Identities come from an explicitly injected allocator so that every
//! instance built from the same allocator gets a distinct id.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Immutable numeric identity of a service instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceIdentity(i64);

impl ServiceIdentity {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thread-safe allocator handing out monotonically increasing identities.
///
/// Clones share the same counter.
#[derive(Clone, Debug)]
pub struct IdentityAllocator {
    next: Arc<AtomicI64>,
}

impl IdentityAllocator {
    /// Create an allocator whose first identity is 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Create an allocator whose first identity is `first`.
    pub fn starting_at(first: i64) -> Self {
        Self {
            next: Arc::new(AtomicI64::new(first)),
        }
    }

    /// Assign a fresh identity. Called once per service instance.
    pub fn assign(&self) -> ServiceIdentity {
        ServiceIdentity(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdentityAllocator {
    fn default() -> Self {
        Self::new()
    }
}
