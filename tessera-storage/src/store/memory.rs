//! In-memory store.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tessera_core::{Clock, StoreError, SystemClock, TesseraResult};
use tokio::sync::broadcast;

use super::{expiry_millis, new_context_id, KeyValueStore, StoreChange, CHANGE_CHANNEL_CAPACITY};

#[derive(Debug, Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Option<i64>,
}

impl StoredValue {
    fn is_live(&self, now_millis: i64) -> bool {
        self.expires_at.map_or(true, |at| at > now_millis)
    }
}

struct Shared {
    data: RwLock<HashMap<String, StoredValue>>,
    changes: broadcast::Sender<StoreChange>,
}

/// Store backed by a shared hash map.
///
/// Handles created with [`attach`](InMemoryStore::attach) behave like
/// separate browser tabs over the same storage.
#[derive(Clone)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
    clock: Arc<dyn Clock>,
    context_id: String,
}

impl fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("context_id", &self.context_id)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                data: RwLock::new(HashMap::new()),
                changes,
            }),
            clock,
            context_id: new_context_id(),
        }
    }

    /// Another context over the same data, with its own context id.
    pub fn attach(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            clock: Arc::clone(&self.clock),
            context_id: new_context_id(),
        }
    }

    /// Number of stored values, expired ones included.
    pub fn len(&self) -> usize {
        self.shared.data.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self, key: &str, old_value: Option<Vec<u8>>, new_value: Option<Vec<u8>>) {
        if old_value == new_value {
            return;
        }
        // No receivers is fine.
        let _ = self.shared.changes.send(StoreChange {
            key: key.to_string(),
            old_value,
            new_value,
            origin: self.context_id.clone(),
        });
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> TesseraResult<Option<Vec<u8>>> {
        let now = self.clock.now_millis();
        {
            let data = self.shared.data.read().map_err(|_| StoreError::LockPoisoned)?;
            match data.get(key) {
                None => return Ok(None),
                Some(value) if value.is_live(now) => return Ok(Some(value.bytes.clone())),
                Some(_) => {}
            }
        }
        let mut data = self.shared.data.write().map_err(|_| StoreError::LockPoisoned)?;
        if data.get(key).is_some_and(|v| !v.is_live(now)) {
            data.remove(key);
            tracing::trace!(key = %key, "Expired value dropped");
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> TesseraResult<()> {
        let now = self.clock.now_millis();
        let stored = StoredValue {
            bytes: value.clone(),
            expires_at: expiry_millis(now, ttl),
        };
        let old = {
            let mut data = self.shared.data.write().map_err(|_| StoreError::LockPoisoned)?;
            data.insert(key.to_string(), stored)
                .filter(|old| old.is_live(now))
                .map(|old| old.bytes)
        };
        self.notify(key, old, Some(value));
        Ok(())
    }

    fn remove(&self, key: &str) -> TesseraResult<()> {
        let now = self.clock.now_millis();
        let old = {
            let mut data = self.shared.data.write().map_err(|_| StoreError::LockPoisoned)?;
            data.remove(key).filter(|old| old.is_live(now)).map(|old| old.bytes)
        };
        self.notify(key, old, None);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> TesseraResult<Vec<String>> {
        let now = self.clock.now_millis();
        let data = self.shared.data.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(data
            .iter()
            .filter(|(key, value)| key.starts_with(prefix) && value.is_live(now))
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.shared.changes.subscribe()
    }

    fn context_id(&self) -> &str {
        &self.context_id
    }
}
