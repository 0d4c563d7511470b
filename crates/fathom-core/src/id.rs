//! Strongly-typed identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for unique [`ScopeId`] allocation.
static SCOPE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique per-lifetime identifier for a scope.
///
/// Allocated from a monotonic atomic counter via [`ScopeId::next`]. Two
/// distinct scopes always have different IDs, so the ID is a stable
/// identity for equality and hashing even after the scope has closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Allocate a fresh, unique scope ID. Thread-safe.
    pub fn next() -> Self {
        Self(SCOPE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = ScopeId::next();
        let b = ScopeId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn ids_are_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..100).map(|_| ScopeId::next()).collect::<Vec<_>>()))
            .collect();
        let mut all: Vec<ScopeId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let before = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), before);
    }

    #[test]
    fn display_format() {
        let id = ScopeId::next();
        assert_eq!(id.to_string(), format!("scope#{}", id.get()));
    }
}
