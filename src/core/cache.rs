use std::any::Any;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

type CachedValue = Arc<dyn Any + Send + Sync>;

/// Process-wide cache for expensive node resources (clients, compiled
/// templates, model handles).
///
/// Owned by the [`RuntimeContext`](super::runtime_context::RuntimeContext) and
/// handed to nodes through their execution context. Cloning shares the store.
#[derive(Clone, Default)]
pub struct ResourceCache {
    entries: Arc<DashMap<String, CachedValue>>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the entry under `key`, building it with `init` when it is absent.
    /// An entry of a different type is replaced.
    pub fn get_or_insert_with<T, F>(&self, key: &str, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                if let Ok(existing) = slot.get().clone().downcast::<T>() {
                    return existing;
                }
                let value = Arc::new(init());
                slot.insert(value.clone());
                value
            }
            Entry::Vacant(slot) => {
                let value = Arc::new(init());
                slot.insert(value.clone());
                value
            }
        }
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.entries
            .get(key)
            .and_then(|v| v.value().clone().downcast::<T>().ok())
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}
