//! Symbol to priority bucket assignment.

use std::collections::HashMap;

use mercato_types::RequestPriority;

/// Partition of symbols into priority buckets.
///
/// Each symbol belongs to at most one bucket; unassigned symbols are `Standard`.
/// Symbols are matched case-insensitively and stored upper-case.
#[derive(Debug, Default, Clone)]
pub struct SymbolPriorities {
    buckets: HashMap<String, RequestPriority>,
}

impl SymbolPriorities {
    /// Empty assignment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(symbol: &str) -> String {
        symbol.trim().to_ascii_uppercase()
    }

    /// Move `symbol` into `priority`, removing it from any other bucket.
    ///
    /// Returns the previous bucket, if the symbol was assigned.
    pub fn set(&mut self, symbol: &str, priority: RequestPriority) -> Option<RequestPriority> {
        self.buckets.insert(Self::normalize(symbol), priority)
    }

    /// Bucket for `symbol`, defaulting to `Standard`.
    #[must_use]
    pub fn get(&self, symbol: &str) -> RequestPriority {
        self.buckets
            .get(&Self::normalize(symbol))
            .copied()
            .unwrap_or_default()
    }

    /// Drop an explicit assignment.
    pub fn remove(&mut self, symbol: &str) -> Option<RequestPriority> {
        self.buckets.remove(&Self::normalize(symbol))
    }

    /// Sorted symbols explicitly assigned to `priority`.
    #[must_use]
    pub fn symbols_in(&self, priority: RequestPriority) -> Vec<String> {
        let mut out: Vec<String> = self
            .buckets
            .iter()
            .filter(|(_, p)| **p == priority)
            .map(|(s, _)| s.clone())
            .collect();
        out.sort_unstable();
        out
    }
}
