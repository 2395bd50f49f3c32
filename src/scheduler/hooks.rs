//! Cycle Hook Lists
//!
//! Hooks run at the boundaries of every cycle: the "before" list ahead of
//! dispatch, the "after" list behind it. Hooks are invoked in registration
//! order from a snapshot taken under the lock, so a hook may register or
//! unregister hooks without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Identifier of a registered hook, shared across both lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// A cycle-boundary callback.
pub type HookFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub(crate) struct HookLists {
    before: Mutex<Vec<(HookId, HookFn)>>,
    after: Mutex<Vec<(HookId, HookFn)>>,
    last_id: AtomicU64,
}

impl HookLists {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> HookId {
        HookId(self.last_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(crate) fn add_before(&self, hook: HookFn) -> HookId {
        let id = self.next_id();
        self.before.lock().push((id, hook));
        id
    }

    pub(crate) fn add_after(&self, hook: HookFn) -> HookId {
        let id = self.next_id();
        self.after.lock().push((id, hook));
        id
    }

    /// Remove a hook from whichever list holds it.
    pub(crate) fn remove(&self, id: HookId) -> bool {
        for list in [&self.before, &self.after] {
            let mut hooks = list.lock();
            if let Some(pos) = hooks.iter().position(|(hook_id, _)| *hook_id == id) {
                hooks.remove(pos);
                return true;
            }
        }
        false
    }

    pub(crate) fn before_snapshot(&self) -> Vec<HookFn> {
        self.before.lock().iter().map(|(_, h)| Arc::clone(h)).collect()
    }

    pub(crate) fn after_snapshot(&self) -> Vec<HookFn> {
        self.after.lock().iter().map(|(_, h)| Arc::clone(h)).collect()
    }
}
