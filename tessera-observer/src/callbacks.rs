//! Callback registry keyed by watched item.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_core::{Entity, EntityId, EntityKind};

/// Invoked with the freshly fetched entity whenever a watched item changes.
pub type ChangeCallback = Arc<dyn Fn(&Entity) + Send + Sync>;

/// Identity of a watched item.
pub type WatchKey = (EntityKind, EntityId);

/// Callbacks registered by one context.
///
/// Callbacks are compared by pointer: registering the same `Arc` twice for
/// one item keeps a single registration.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<WatchKey, Vec<ChangeCallback>>,
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.callbacks.iter().map(|(key, cbs)| (key, cbs.len())))
            .finish()
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. Returns false when it was already registered.
    pub fn add(&mut self, key: WatchKey, callback: ChangeCallback) -> bool {
        let callbacks = self.callbacks.entry(key).or_default();
        if callbacks.iter().any(|cb| Arc::ptr_eq(cb, &callback)) {
            return false;
        }
        callbacks.push(callback);
        true
    }

    /// Remove one callback, or all of them when `callback` is `None`.
    /// Returns how many remain for the key.
    pub fn remove(&mut self, key: &WatchKey, callback: Option<&ChangeCallback>) -> usize {
        let Some(callbacks) = self.callbacks.get_mut(key) else {
            return 0;
        };
        match callback {
            Some(target) => callbacks.retain(|cb| !Arc::ptr_eq(cb, target)),
            None => callbacks.clear(),
        }
        let remaining = callbacks.len();
        if remaining == 0 {
            self.callbacks.remove(key);
        }
        remaining
    }

    /// Snapshot of the callbacks of one item.
    pub fn get(&self, key: &WatchKey) -> Vec<ChangeCallback> {
        self.callbacks.get(key).cloned().unwrap_or_default()
    }

    pub fn contains(&self, key: &WatchKey) -> bool {
        self.callbacks.contains_key(key)
    }

    pub fn keys(&self) -> Vec<WatchKey> {
        self.callbacks.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn clear(&mut self) {
        self.callbacks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(id: &str) -> WatchKey {
        (EntityKind::Entry, id.to_string())
    }

    #[test]
    fn test_same_callback_registers_once() {
        let mut registry = CallbackRegistry::new();
        let cb: ChangeCallback = Arc::new(|_: &Entity| {});
        assert!(registry.add(key("e1"), cb.clone()));
        assert!(!registry.add(key("e1"), cb.clone()));
        assert_eq!(registry.get(&key("e1")).len(), 1);

        assert!(registry.add(key("e2"), cb));
        assert_eq!(registry.keys().len(), 2);
    }

    #[test]
    fn test_remove_only_target_callback() {
        let mut registry = CallbackRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counting: ChangeCallback = {
            let hits = hits.clone();
            Arc::new(move |_: &Entity| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let other: ChangeCallback = Arc::new(|_: &Entity| {});
        registry.add(key("e1"), counting.clone());
        registry.add(key("e1"), other.clone());

        assert_eq!(registry.remove(&key("e1"), Some(&other)), 1);
        for cb in registry.get(&key("e1")) {
            cb(&Entity::new(Default::default(), Default::default()));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert_eq!(registry.remove(&key("e1"), Some(&counting)), 0);
        assert!(!registry.contains(&key("e1")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_all_for_key() {
        let mut registry = CallbackRegistry::new();
        registry.add(key("e1"), Arc::new(|_: &Entity| {}));
        registry.add(key("e1"), Arc::new(|_: &Entity| {}));
        assert_eq!(registry.remove(&key("e1"), None), 0);
        assert_eq!(registry.remove(&key("missing"), None), 0);
    }
}
