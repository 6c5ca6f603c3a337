//! Persisted key-value stores shared between contexts.
//!
//! A store is the Rust counterpart of browser local storage: byte values
//! under string keys, optional per-key expiry evaluated lazily at read time,
//! and change notifications delivered to every other context attached to the
//! same underlying data.

mod lmdb;
mod memory;

pub use lmdb::{LmdbStore, LmdbStoreError};
pub use memory::InMemoryStore;

use std::fmt::Debug;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tessera_core::{StoreError, TesseraResult};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Capacity of the change notification channel.
pub const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// A change to one key, as seen by other contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
    pub old_value: Option<Vec<u8>>,
    pub new_value: Option<Vec<u8>>,
    /// Context that made the change.
    pub origin: String,
}

/// Byte store with lazy expiry and cross-context change notifications.
///
/// Writes are last-write-wins. A change is broadcast only when the stored
/// bytes actually differ; listeners skip changes whose `origin` is their own
/// [`context_id`](KeyValueStore::context_id).
pub trait KeyValueStore: Send + Sync + Debug {
    /// Read a value. Expired values are removed and reported absent.
    fn get(&self, key: &str) -> TesseraResult<Option<Vec<u8>>>;

    /// Write a value, optionally expiring after `ttl`.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> TesseraResult<()>;

    fn remove(&self, key: &str) -> TesseraResult<()>;

    /// Keys of all live values starting with `prefix`.
    fn keys_with_prefix(&self, prefix: &str) -> TesseraResult<Vec<String>>;

    /// Change notifications of every context sharing this store's data.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;

    /// Identifier of this context.
    fn context_id(&self) -> &str;
}

/// JSON helpers available on every [`KeyValueStore`].
pub trait JsonStoreExt: KeyValueStore {
    /// Read and decode a JSON value. Undecodable bytes are an error.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> TesseraResult<Option<T>> {
        match self.get(key)? {
            Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                StoreError::Deserialization {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
                .into()
            }),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) -> TesseraResult<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.set(key, bytes, ttl)
    }
}

impl<S: KeyValueStore + ?Sized> JsonStoreExt for S {}

pub(crate) fn new_context_id() -> String {
    format!("context-{}", Uuid::now_v7())
}

pub(crate) fn expiry_millis(now_millis: i64, ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|ttl| now_millis.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)))
}
