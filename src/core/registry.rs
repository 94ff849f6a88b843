//! # Relay registry - maps native callback contexts to live relays.
//!
//! The native layer only hands back the [`Context`](crate::native::Context) it was
//! registered with. The context carries a stable integer key; the registry turns
//! that key into the relay, if it still exists.
//!
//! ## Architecture
//! ```text
//! native thread ── callback(payload, ctx) ──► bridge
//!                                              └─► ctx.registry.upgrade()?.lookup(ctx.key)?
//!                                                    └─► Weak<RelayCore>::upgrade()
//! ```
//!
//! ## Rules
//! - The registry never owns a relay: entries are `Weak`.
//! - Keys are never reused within one registry.
//! - A relay is inserted before its callback is registered and removed during
//!   teardown, before its native handle is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::relay::RelayCore;

/// Stable key identifying one relay inside a registry.
pub(crate) type RelayKey = u64;

/// Key-to-relay lookup table shared by a runtime and its relays.
pub(crate) struct Registry {
    relays: RwLock<HashMap<RelayKey, Weak<RelayCore>>>,
    next_key: AtomicU64,
}

impl Registry {
    /// Creates an empty registry.
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            relays: RwLock::new(HashMap::new()),
            next_key: AtomicU64::new(1),
        })
    }

    /// Hands out a key that has never been used in this registry.
    pub(crate) fn reserve_key(&self) -> RelayKey {
        self.next_key.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn insert(&self, key: RelayKey, relay: &Arc<RelayCore>) {
        self.relays.write().insert(key, Arc::downgrade(relay));
    }

    /// Resolves `key` to a live relay.
    pub(crate) fn lookup(&self, key: RelayKey) -> Option<Arc<RelayCore>> {
        self.relays.read().get(&key).and_then(Weak::upgrade)
    }

    /// Removes `key`; returns `false` if it was not present.
    pub(crate) fn remove(&self, key: RelayKey) -> bool {
        self.relays.write().remove(&key).is_some()
    }

    /// Returns sorted service names of the live relays.
    pub(crate) fn services(&self) -> Vec<String> {
        let relays = self.relays.read();
        let mut names: Vec<String> = relays
            .values()
            .filter_map(Weak::upgrade)
            .map(|core| core.service().to_string())
            .collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn len(&self) -> usize {
        self.relays.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_unique() {
        let registry = Registry::new();
        let a = registry.reserve_key();
        let b = registry.reserve_key();
        assert_ne!(a, b);
    }

    #[test]
    fn test_unknown_key_resolves_to_none() {
        let registry = Registry::new();
        assert!(registry.lookup(42).is_none());
        assert!(!registry.remove(42));
        assert_eq!(registry.len(), 0);
        assert!(registry.services().is_empty());
    }
}
