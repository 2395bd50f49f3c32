//! Function Registry
//!
//! Named chains of callable entry points for direct plugin-to-plugin
//! calls. Registration order is the only order; there is no refcounting —
//! the owner vouches for call safety for as long as the entry is
//! registered. Lookup walks a name's chain, optionally continuing past a
//! cursor entry or restricting to one owner, and always skips entries
//! whose owning unit is currently disabled.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use log::debug;

use crate::function::error::{FunctionError, FunctionResult};
use crate::unit::UnitId;

/// Argument passed to a registered callable.
pub type CallArg = dyn Any + Send + Sync;

/// A registered callable. Takes an opaque argument the caller and callee
/// agree on out of band; may return an opaque shared value.
pub type CallableFn = Arc<dyn Fn(&CallArg) -> Option<Arc<dyn Any + Send + Sync>> + Send + Sync>;

/// Stable handle of a registered function, usable as a lookup cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionHandle(u64);

/// One entry in a name's chain.
#[derive(Clone)]
pub struct FunctionEntry {
    pub handle: FunctionHandle,
    pub owner: UnitId,
    pub owner_name: String,
    pub callable: CallableFn,
}

/// Registry of function chains, keyed by name.
pub struct FunctionRegistry {
    chains: DashMap<String, Vec<FunctionEntry>>,
    last_handle: AtomicU64,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self {
            chains: DashMap::new(),
            last_handle: AtomicU64::new(0),
        }
    }

    /// Append a callable to a name's chain.
    pub fn register(
        &self,
        name: &str,
        owner: UnitId,
        owner_name: &str,
        callable: CallableFn,
    ) -> FunctionHandle {
        assert!(!name.is_empty(), "function registration requires a non-empty name");
        let handle = FunctionHandle(self.last_handle.fetch_add(1, Ordering::Relaxed) + 1);
        self.chains.entry(name.to_string()).or_default().push(FunctionEntry {
            handle,
            owner,
            owner_name: owner_name.to_string(),
            callable,
        });
        debug!("Registered function '{}' owned by '{}'", name, owner_name);
        handle
    }

    /// Remove the first entry under `name` owned by `owner`.
    pub fn unregister(&self, name: &str, owner: UnitId) -> FunctionResult<()> {
        let removed = {
            let mut chain = self
                .chains
                .get_mut(name)
                .ok_or_else(|| FunctionError::function_not_found(name))?;
            match chain.iter().position(|e| e.owner == owner) {
                Some(pos) => {
                    chain.remove(pos);
                    true
                }
                None => false,
            }
        };
        if !removed {
            return Err(FunctionError::owner_not_found(name, owner.to_string()));
        }
        self.chains.remove_if(name, |_, chain| chain.is_empty());
        debug!("Unregistered function '{}' owned by {}", name, owner);
        Ok(())
    }

    /// Return the next matching entry in a name's chain.
    ///
    /// `after` continues past a previously returned entry; `owner_name`
    /// restricts to one owner. Entries whose owner `is_enabled` rejects are
    /// skipped. Absence is a normal outcome.
    pub fn lookup<F>(
        &self,
        name: &str,
        after: Option<FunctionHandle>,
        owner_name: Option<&str>,
        is_enabled: F,
    ) -> Option<FunctionEntry>
    where
        F: Fn(UnitId) -> bool,
    {
        let chain = self.chains.get(name)?;
        chain
            .iter()
            .find(|entry| {
                after.map_or(true, |cursor| entry.handle > cursor)
                    && owner_name.map_or(true, |owner| entry.owner_name == owner)
                    && is_enabled(entry.owner)
            })
            .cloned()
    }

    /// Remove every entry owned by a unit across all chains. Returns how
    /// many entries were removed.
    pub fn remove_owner(&self, owner: UnitId) -> usize {
        let mut removed = 0;
        for mut chain in self.chains.iter_mut() {
            let before = chain.len();
            chain.retain(|e| e.owner != owner);
            removed += before - chain.len();
        }
        self.chains.retain(|_, chain| !chain.is_empty());
        removed
    }

    /// Number of entries under a name.
    pub fn chain_len(&self, name: &str) -> usize {
        self.chains.get(name).map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
