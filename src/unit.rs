//! Unit Identity Table
//!
//! Tracks the processing units (plugins) that participate in the exchange.
//! Every producer, subscriber and function owner must be registered here
//! before it touches any registry; the id it receives is the identity used
//! across the whole core. Units can be disabled without being removed,
//! which suppresses their function-registry entries during lookup.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use uuid::Uuid;

/// Opaque identity of a registered unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(Uuid);

impl UnitId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptive record for a registered unit.
#[derive(Debug, Clone)]
pub struct UnitInfo {
    pub id: UnitId,
    pub name: String,
    pub enabled: bool,
}

/// Registry of live units, shared across the bus.
#[derive(Debug, Default)]
pub struct UnitTable {
    units: RwLock<HashMap<UnitId, UnitInfo>>,
}

impl UnitTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit under a human-readable name and issue its id.
    ///
    /// Names are not required to be unique; the id is the identity.
    pub fn register(&self, name: &str) -> UnitId {
        assert!(!name.is_empty(), "unit registration requires a non-empty name");
        let id = UnitId::new();
        let info = UnitInfo {
            id,
            name: name.to_string(),
            enabled: true,
        };
        self.units.write().insert(id, info);
        log::debug!("Registered unit '{}' as {}", name, id);
        id
    }

    /// Remove a unit, returning its info if it was registered.
    pub fn remove(&self, id: UnitId) -> Option<UnitInfo> {
        let removed = self.units.write().remove(&id);
        if let Some(info) = &removed {
            log::debug!("Removed unit '{}' ({})", info.name, info.id);
        }
        removed
    }

    /// Enable or disable a unit. Returns false if the id is unknown.
    pub fn set_enabled(&self, id: UnitId, enabled: bool) -> bool {
        let mut units = self.units.write();
        match units.get_mut(&id) {
            Some(info) => {
                info.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, id: UnitId) -> bool {
        self.units.read().contains_key(&id)
    }

    pub fn is_enabled(&self, id: UnitId) -> bool {
        self.units.read().get(&id).map(|u| u.enabled).unwrap_or(false)
    }

    pub fn name_of(&self, id: UnitId) -> Option<String> {
        self.units.read().get(&id).map(|u| u.name.clone())
    }

    pub fn len(&self) -> usize {
        self.units.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.read().is_empty()
    }
}
