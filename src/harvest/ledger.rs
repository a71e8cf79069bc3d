//! Per-run deduplication ledger.

use std::collections::HashSet;

/// Set of normalized identity keys already emitted in this run.
///
/// Grows monotonically and is discarded with the run. A run executes as a
/// single cooperative task, so consult-then-insert is atomic by construction
/// and no locking is needed.
#[derive(Debug, Default)]
pub struct DedupLedger {
    seen: HashSet<String>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an identity. Returns `true` if it was new.
    pub fn accept(&mut self, identity: &str) -> bool {
        self.seen.insert(identity.to_string())
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.seen.contains(identity)
    }

    /// Count of distinct identities, the growth signal for the stall counter.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_is_first_wins() {
        let mut ledger = DedupLedger::new();
        assert!(ledger.accept("https://x.com/posts/1"));
        assert!(!ledger.accept("https://x.com/posts/1"));
        assert_eq!(ledger.len(), 1);
    }
}
