//! Identifier-keyed store of capability instances.

use crate::id::is_valid_id;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Concurrent map from a unique identifier to a shared capability instance.
///
/// Structural changes (`add`/`remove`) take the write lock; lookups share the
/// read lock and never block each other. The registry holds the owning
/// reference: once an entry is removed, instances handed out by
/// [`Registry::get_by_id`] must not be kept around by callers.
pub struct Registry<T: ?Sized> {
    kind: &'static str,
    entries: RwLock<HashMap<String, Arc<T>>>,
}

impl<T: ?Sized> Registry<T> {
    /// Create an empty registry. `kind` only labels log records ("browser", "player").
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Register `instance` under `id`.
    ///
    /// Returns `false` without touching the registry when the identifier is
    /// not compliant or already taken.
    pub fn add(&self, id: &str, instance: Arc<T>) -> bool {
        if !is_valid_id(id) {
            tracing::error!(kind = self.kind, id, "identifier is not compliant");
            return false;
        }

        match self.write().entry(id.to_owned()) {
            Entry::Occupied(_) => {
                tracing::error!(kind = self.kind, id, "identifier is already registered");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(instance);
                tracing::info!(kind = self.kind, id, "registered");
                true
            }
        }
    }

    /// Unregister `id`. Returns `false` if it was not registered.
    pub fn remove(&self, id: &str) -> bool {
        self.take(id).is_some()
    }

    /// Unregister `id` and hand back the owning reference.
    pub fn take(&self, id: &str) -> Option<Arc<T>> {
        let removed = self.write().remove(id);
        match removed {
            Some(_) => tracing::info!(kind = self.kind, id, "unregistered"),
            None => tracing::warn!(kind = self.kind, id, "identifier is not registered"),
        }
        removed
    }

    pub fn get_by_id(&self, id: &str) -> Option<Arc<T>> {
        self.read().get(id).cloned()
    }

    pub fn has(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// Registered identifiers in lexical order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panic while holding the lock cannot leave the map half-updated, so a
    // poisoned lock is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<T>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<T>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("ids", &self.ids())
            .finish()
    }
}
