//! LMDB-backed store.
//!
//! Uses the heed crate to keep persisted state on disk, so registrations and
//! cached entities survive a process restart within their TTL.
//!
//! # Value layout
//!
//! `[expires_at_ms: i64 LE][payload]`, with `i64::MAX` meaning "no expiry".

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tessera_core::{Clock, StoreError, SystemClock, TesseraError, TesseraResult};
use tokio::sync::broadcast;

use super::{expiry_millis, new_context_id, KeyValueStore, StoreChange, CHANGE_CHANNEL_CAPACITY};

const HEADER_LEN: usize = 8;
const NO_EXPIRY: i64 = i64::MAX;

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored bytes do not carry a valid header.
    #[error("Corrupt value for key {0}")]
    Corrupt(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for TesseraError {
    fn from(e: LmdbStoreError) -> Self {
        TesseraError::Store(StoreError::Backend { reason: e.to_string() })
    }
}

fn txn_err(e: heed::Error) -> LmdbStoreError {
    LmdbStoreError::Transaction(e.to_string())
}

fn encode(expires_at: Option<i64>, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&expires_at.unwrap_or(NO_EXPIRY).to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

/// Split stored bytes into expiry and payload.
fn decode<'a>(key: &str, bytes: &'a [u8]) -> Result<(i64, &'a [u8]), LmdbStoreError> {
    if bytes.len() < HEADER_LEN {
        return Err(LmdbStoreError::Corrupt(key.to_string()));
    }
    let (header, payload) = bytes.split_at(HEADER_LEN);
    let header: [u8; HEADER_LEN] = header
        .try_into()
        .map_err(|_| LmdbStoreError::Corrupt(key.to_string()))?;
    Ok((i64::from_le_bytes(header), payload))
}

/// Payload of a stored value if it has not expired.
fn live_payload(key: &str, bytes: &[u8], now_millis: i64) -> Result<Option<Vec<u8>>, LmdbStoreError> {
    let (expires_at, payload) = decode(key, bytes)?;
    Ok((expires_at > now_millis).then(|| payload.to_vec()))
}

struct Shared {
    env: Env,
    db: Database<Bytes, Bytes>,
    changes: broadcast::Sender<StoreChange>,
}

/// Store persisted in an LMDB environment.
#[derive(Clone)]
pub struct LmdbStore {
    shared: Arc<Shared>,
    clock: Arc<dyn Clock>,
    context_id: String,
}

impl fmt::Debug for LmdbStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LmdbStore")
            .field("context_id", &self.context_id)
            .finish_non_exhaustive()
    }
}

impl LmdbStore {
    /// Open (or create) a store at `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        Self::open_with_clock(path, max_size_mb, Arc::new(SystemClock))
    }

    pub fn open_with_clock<P: AsRef<Path>>(
        path: P,
        max_size_mb: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        tracing::debug!(path = %path.as_ref().display(), "Opened LMDB store");

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            shared: Arc::new(Shared { env, db, changes }),
            clock,
            context_id: new_context_id(),
        })
    }

    /// Another context over the same environment, with its own context id.
    pub fn attach(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            clock: Arc::clone(&self.clock),
            context_id: new_context_id(),
        }
    }

    /// Write `new` (or delete when `None`) and return the previous live value.
    fn replace(&self, key: &str, new: Option<Vec<u8>>) -> Result<Option<Vec<u8>>, LmdbStoreError> {
        let now = self.clock.now_millis();
        let mut wtxn = self.shared.env.write_txn().map_err(txn_err)?;

        let old = match self.shared.db.get(&wtxn, key.as_bytes()).map_err(txn_err)? {
            Some(bytes) => live_payload(key, bytes, now).unwrap_or(None),
            None => None,
        };

        match &new {
            Some(encoded) => self
                .shared
                .db
                .put(&mut wtxn, key.as_bytes(), encoded)
                .map_err(txn_err)?,
            None => {
                self.shared.db.delete(&mut wtxn, key.as_bytes()).map_err(txn_err)?;
            }
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(old)
    }

    fn notify(&self, key: &str, old_value: Option<Vec<u8>>, new_value: Option<Vec<u8>>) {
        if old_value == new_value {
            return;
        }
        let _ = self.shared.changes.send(StoreChange {
            key: key.to_string(),
            old_value,
            new_value,
            origin: self.context_id.clone(),
        });
    }
}

impl KeyValueStore for LmdbStore {
    fn get(&self, key: &str) -> TesseraResult<Option<Vec<u8>>> {
        let now = self.clock.now_millis();
        let stored = {
            let rtxn = self.shared.env.read_txn().map_err(txn_err)?;
            match self.shared.db.get(&rtxn, key.as_bytes()).map_err(txn_err)? {
                Some(bytes) => Some(live_payload(key, bytes, now)?),
                None => None,
            }
        };

        match stored {
            Some(Some(payload)) => Ok(Some(payload)),
            Some(None) => {
                let mut wtxn = self.shared.env.write_txn().map_err(txn_err)?;
                self.shared.db.delete(&mut wtxn, key.as_bytes()).map_err(txn_err)?;
                wtxn.commit().map_err(txn_err)?;
                tracing::trace!(key = %key, "Expired value dropped");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> TesseraResult<()> {
        let expires_at = expiry_millis(self.clock.now_millis(), ttl);
        let old = self.replace(key, Some(encode(expires_at, &value)))?;
        self.notify(key, old, Some(value));
        Ok(())
    }

    fn remove(&self, key: &str) -> TesseraResult<()> {
        let old = self.replace(key, None)?;
        self.notify(key, old, None);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> TesseraResult<Vec<String>> {
        let now = self.clock.now_millis();
        let rtxn = self.shared.env.read_txn().map_err(txn_err)?;
        let iter = self.shared.db.iter(&rtxn).map_err(txn_err)?;

        let mut keys = Vec::new();
        for result in iter {
            let Ok((key, bytes)) = result else {
                continue;
            };
            let Ok(key) = std::str::from_utf8(key) else {
                continue;
            };
            if !key.starts_with(prefix) {
                continue;
            }
            if matches!(live_payload(key, bytes, now), Ok(Some(_))) {
                keys.push(key.to_string());
            }
        }
        Ok(keys)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.shared.changes.subscribe()
    }

    fn context_id(&self) -> &str {
        &self.context_id
    }
}
