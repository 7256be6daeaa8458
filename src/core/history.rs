//! History state bookkeeping.
//!
//! A history pseudo-state remembers which children of its parent were
//! active the last time the parent was exited. Memory is immutable: the
//! `record` method returns a new memory with the entry replaced.

use super::state::StateId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How much of the parent's configuration a history state remembers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryKind {
    /// Only the direct child that was active.
    Shallow,
    /// Every active atomic descendant.
    Deep,
}

/// Remembered configurations, keyed by history state.
///
/// # Example
///
/// ```rust
/// use machina::core::HistoryMemory;
///
/// let memory = HistoryMemory::new();
/// assert!(memory.is_empty());
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HistoryMemory {
    entries: BTreeMap<StateId, Vec<StateId>>,
}

impl HistoryMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record what `history` should restore, returning a new memory.
    ///
    /// The existing memory is left untouched.
    pub fn record(&self, history: StateId, states: Vec<StateId>) -> Self {
        let mut entries = self.entries.clone();
        entries.insert(history, states);
        Self { entries }
    }

    /// States to restore when `history` is targeted, if any were recorded.
    pub fn recall(&self, history: StateId) -> Option<&[StateId]> {
        self.entries.get(&history).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_is_pure() {
        let memory = HistoryMemory::new();
        let next = memory.record(StateId(3), vec![StateId(5)]);

        assert!(memory.is_empty());
        assert_eq!(next.recall(StateId(3)), Some(&[StateId(5)][..]));
    }

    #[test]
    fn record_replaces_previous_entry() {
        let memory = HistoryMemory::new()
            .record(StateId(3), vec![StateId(5)])
            .record(StateId(3), vec![StateId(6), StateId(8)]);

        assert_eq!(memory.len(), 1);
        assert_eq!(memory.recall(StateId(3)), Some(&[StateId(6), StateId(8)][..]));
    }

    #[test]
    fn unknown_history_has_nothing_to_recall() {
        assert_eq!(HistoryMemory::new().recall(StateId(1)), None);
    }
}
