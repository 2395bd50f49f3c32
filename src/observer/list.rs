//! Ordered Subscriber List
//!
//! Vec-based list with priority-ordered insertion (high to low, insertion
//! order breaking ties) and a capped bubble pass that moves declared
//! dependencies ahead of their dependents.

use std::collections::HashSet;
use std::sync::Arc;

use crate::data::RecordRef;
use crate::unit::UnitId;

/// Reserved priority that places a subscriber ahead of all others.
pub const PRIORITY_FIRST: i32 = i32::MAX;
/// Reserved priority that places a subscriber behind all others.
pub const PRIORITY_LAST: i32 = i32::MIN;
/// Priority used when a subscriber has no ordering preference.
pub const PRIORITY_DEFAULT: i32 = 0;

/// Subscriber callback. Invoked once per (name, record) delivery; returning
/// `false` cancels the remainder of the current cycle's dispatch.
pub type ProcessFn = Arc<dyn Fn(&str, &RecordRef) -> bool + Send + Sync>;

/// One subscription of one unit to one name.
pub struct ObserverEntry {
    pub subscriber: UnitId,
    pub subscriber_name: String,
    pub priority: i32,
    /// Subscriber names that must run before this entry.
    pub depends_on: HashSet<String>,
    pub process: ProcessFn,
}

/// Outcome of a dependency resolution pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderOutcome {
    /// A fixpoint was reached after this many moves.
    Resolved { moves: usize },
    /// The move cap was hit; the current order stands.
    GaveUp { moves: usize },
}

#[derive(Default)]
pub(crate) struct ObserverList {
    items: Vec<ObserverEntry>,
}

impl ObserverList {
    pub(crate) fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Insert in priority order, after existing entries of equal priority.
    /// The reserved FIRST/LAST priorities fall out of the same rule.
    pub(crate) fn insert(&mut self, entry: ObserverEntry) {
        let pos = self.items.partition_point(|e| e.priority >= entry.priority);
        self.items.insert(pos, entry);
    }

    pub(crate) fn remove(&mut self, subscriber: UnitId) -> Option<ObserverEntry> {
        let pos = self.items.iter().position(|e| e.subscriber == subscriber)?;
        Some(self.items.remove(pos))
    }

    pub(crate) fn contains(&self, subscriber: UnitId) -> bool {
        self.items.iter().any(|e| e.subscriber == subscriber)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    /// Callbacks in current order, for unlocked invocation.
    pub(crate) fn snapshot(&self) -> Vec<(UnitId, ProcessFn)> {
        self.items
            .iter()
            .map(|e| (e.subscriber, Arc::clone(&e.process)))
            .collect()
    }

    /// Subscriber names in current order.
    pub(crate) fn names(&self) -> Vec<String> {
        self.items.iter().map(|e| e.subscriber_name.clone()).collect()
    }

    /// Stable bubble pass: any entry listed in another entry's dependency
    /// set is moved ahead of that entry, repeating until no move occurs or
    /// `cap` moves have been made. A true dependency cycle never converges,
    /// so the cap turns it into a give-up instead of a hang.
    pub(crate) fn resolve_order(&mut self, cap: usize) -> ReorderOutcome {
        let mut moves = 0usize;
        loop {
            match self.next_violation() {
                None => return ReorderOutcome::Resolved { moves },
                Some((dependent, dependency)) => {
                    let entry = self.items.remove(dependency);
                    self.items.insert(dependent, entry);
                    moves += 1;
                    if moves >= cap {
                        return ReorderOutcome::GaveUp { moves };
                    }
                }
            }
        }
    }

    // First (dependent, dependency) index pair where the dependency is
    // positioned after the dependent.
    fn next_violation(&self) -> Option<(usize, usize)> {
        for (i, entry) in self.items.iter().enumerate() {
            if entry.depends_on.is_empty() {
                continue;
            }
            for (j, candidate) in self.items.iter().enumerate().skip(i + 1) {
                if entry.depends_on.contains(candidate.subscriber_name.as_str()) {
                    return Some((i, j));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, priority: i32, deps: &[&str]) -> ObserverEntry {
        ObserverEntry {
            subscriber: UnitId::new(),
            subscriber_name: name.to_string(),
            priority,
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            process: Arc::new(|_, _| true),
        }
    }

    #[test]
    fn test_priority_ordering() {
        let mut list = ObserverList::new();
        list.insert(entry("medium", 5, &[]));
        list.insert(entry("high", 10, &[]));
        list.insert(entry("low", 1, &[]));
        list.insert(entry("also_high", 10, &[]));

        // High to low; equal priorities keep insertion order.
        assert_eq!(list.names(), vec!["high", "also_high", "medium", "low"]);
    }

    #[test]
    fn test_reserved_priorities() {
        let mut list = ObserverList::new();
        list.insert(entry("normal", PRIORITY_DEFAULT, &[]));
        list.insert(entry("tail", PRIORITY_LAST, &[]));
        list.insert(entry("head", PRIORITY_FIRST, &[]));
        list.insert(entry("late", -50, &[]));

        assert_eq!(list.names(), vec!["head", "normal", "late", "tail"]);
    }

    #[test]
    fn test_dependency_moves_ahead() {
        // Declaration order should not matter for the resolved order.
        for reversed in [false, true] {
            let mut list = ObserverList::new();
            let a = entry("a", PRIORITY_DEFAULT, &[]);
            let b = entry("b", PRIORITY_DEFAULT, &["a"]);
            if reversed {
                list.insert(b);
                list.insert(a);
            } else {
                list.insert(a);
                list.insert(b);
            }

            let outcome = list.resolve_order(16);
            assert!(matches!(outcome, ReorderOutcome::Resolved { .. }));
            assert_eq!(list.names(), vec!["a", "b"]);
        }
    }

    #[test]
    fn test_dependency_chain() {
        let mut list = ObserverList::new();
        list.insert(entry("c", PRIORITY_DEFAULT, &["b"]));
        list.insert(entry("b", PRIORITY_DEFAULT, &["a"]));
        list.insert(entry("a", PRIORITY_DEFAULT, &[]));

        let outcome = list.resolve_order(32);
        assert!(matches!(outcome, ReorderOutcome::Resolved { .. }));
        assert_eq!(list.names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_dependency_cycle_gives_up() {
        let mut list = ObserverList::new();
        list.insert(entry("a", PRIORITY_DEFAULT, &["b"]));
        list.insert(entry("b", PRIORITY_DEFAULT, &["a"]));

        let before = list.len();
        let outcome = list.resolve_order(8);
        assert!(matches!(outcome, ReorderOutcome::GaveUp { .. }));
        // Membership is never changed by reordering.
        assert_eq!(list.len(), before);
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut list = ObserverList::new();
        let victim = entry("b", PRIORITY_DEFAULT, &[]);
        let victim_id = victim.subscriber;
        list.insert(entry("a", 1, &[]));
        list.insert(victim);
        list.insert(entry("c", -1, &[]));

        assert!(list.remove(victim_id).is_some());
        assert!(list.remove(victim_id).is_none());
        assert_eq!(list.names(), vec!["a", "c"]);
    }
}
