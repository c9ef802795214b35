//! Virtual-key storage: a `RwLock<HashMap<...>>` guarding entries, each
//! additionally wrapped in its own `Mutex` so governance checks and
//! commits serialize per virtual key without blocking lookups of
//! unrelated keys (spec §4.8: "a per-virtual-key mutex to avoid lost
//! updates under concurrent requests").

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use gw_core::VirtualKey;

/// Storage and per-key locking for virtual keys.
///
/// Implementations must guarantee that `with_key` observes a single,
/// internally consistent snapshot and that `with_key_mut`'s mutation is
/// applied atomically with respect to any other `with_key`/`with_key_mut`
/// call against the same key.
pub trait GovernanceStore: Send + Sync {
    /// Run `f` with read-only access to the key, if present.
    fn with_key<R>(&self, id: &str, f: impl FnOnce(&VirtualKey) -> R) -> Option<R>;

    /// Run `f` with mutable access to the key, if present.
    fn with_key_mut<R>(&self, id: &str, f: impl FnOnce(&mut VirtualKey) -> R) -> Option<R>;

    fn upsert(&self, key: VirtualKey);

    fn remove(&self, id: &str) -> bool;

    fn list(&self) -> Vec<VirtualKey>;
}

/// In-memory virtual-key store (suitable for development and for seeding
/// from a config file at startup; a production deployment would back this
/// with a database behind the same trait).
#[derive(Default)]
pub struct InMemoryGovernanceStore {
    keys: RwLock<HashMap<String, Mutex<VirtualKey>>>,
}

impl InMemoryGovernanceStore {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_keys(keys: impl IntoIterator<Item = VirtualKey>) -> Self {
        let store = Self::new();
        for key in keys {
            store.upsert(key);
        }
        store
    }
}

impl GovernanceStore for InMemoryGovernanceStore {
    fn with_key<R>(&self, id: &str, f: impl FnOnce(&VirtualKey) -> R) -> Option<R> {
        let keys = self.keys.read().unwrap();
        let entry = keys.get(id)?;
        let guard = entry.lock().unwrap();
        Some(f(&guard))
    }

    fn with_key_mut<R>(&self, id: &str, f: impl FnOnce(&mut VirtualKey) -> R) -> Option<R> {
        let keys = self.keys.read().unwrap();
        let entry = keys.get(id)?;
        let mut guard = entry.lock().unwrap();
        Some(f(&mut guard))
    }

    fn upsert(&self, key: VirtualKey) {
        let mut keys = self.keys.write().unwrap();
        keys.insert(key.id.clone(), Mutex::new(key));
    }

    fn remove(&self, id: &str) -> bool {
        let mut keys = self.keys.write().unwrap();
        keys.remove(id).is_some()
    }

    fn list(&self) -> Vec<VirtualKey> {
        let keys = self.keys.read().unwrap();
        keys.values().map(|m| m.lock().unwrap().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_then_lookup_round_trips() {
        let store = InMemoryGovernanceStore::new();
        store.upsert(VirtualKey::new("vk1", "test"));

        let active = store.with_key("vk1", |vk| vk.active);
        assert_eq!(active, Some(true));
    }

    #[test]
    fn missing_key_yields_none() {
        let store = InMemoryGovernanceStore::new();
        assert_eq!(store.with_key("missing", |vk| vk.active), None);
    }

    #[test]
    fn with_key_mut_persists_across_calls() {
        let store = InMemoryGovernanceStore::new();
        store.upsert(VirtualKey::new("vk1", "test"));

        store.with_key_mut("vk1", |vk| vk.active = false);
        assert_eq!(store.with_key("vk1", |vk| vk.active), Some(false));
    }

    #[test]
    fn remove_drops_the_entry() {
        let store = InMemoryGovernanceStore::new();
        store.upsert(VirtualKey::new("vk1", "test"));
        assert!(store.remove("vk1"));
        assert_eq!(store.with_key("vk1", |vk| vk.active), None);
    }
}
