//! Read-through cache over the content API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tessera_core::{ContentApi, ContentType, Entity, EntityKind, StoreError, TesseraResult};

use super::{CacheBucket, CacheConfig, CacheStats};
use crate::store::{JsonStoreExt, KeyValueStore};

/// Read-through cache of entries, assets and content types.
///
/// A present, unexpired value is returned without touching the API. A miss
/// triggers exactly one fetch whose result is written back with the bucket's
/// TTL. Concurrent misses for the same id are not coalesced.
///
/// # Type Parameters
///
/// - `A`: the content API fetched from on a miss
/// - `S`: the persisted store holding cached values
pub struct ReadThroughCache<A: ?Sized, S: ?Sized> {
    api: Arc<A>,
    store: Arc<S>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl<A, S> ReadThroughCache<A, S>
where
    A: ContentApi + ?Sized,
    S: KeyValueStore + ?Sized,
{
    /// Create a new read-through cache.
    pub fn new(api: Arc<A>, store: Arc<S>, config: CacheConfig) -> Self {
        Self {
            api,
            store,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Create a new read-through cache with default configuration.
    pub fn with_defaults(api: Arc<A>, store: Arc<S>) -> Self {
        Self::new(api, store, CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn backing_store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    /// Persisted key of a cached value.
    pub fn key(&self, bucket: CacheBucket, id: &str) -> String {
        format!("{}-{}-{}", self.config.key_prefix, bucket, id)
    }

    fn ttl(&self, bucket: CacheBucket) -> Duration {
        match bucket {
            CacheBucket::ContentTypes => self.config.content_type_ttl,
            CacheBucket::Entries | CacheBucket::Assets => self.config.entry_ttl,
        }
    }

    fn read<T: DeserializeOwned>(&self, bucket: CacheBucket, id: &str) -> TesseraResult<Option<T>> {
        let key = self.key(bucket, id);
        let Some(bytes) = self.store.get(&key)? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding undecodable cache value");
                Ok(None)
            }
        }
    }

    fn write<T: Serialize>(&self, bucket: CacheBucket, id: &str, value: &T) -> TesseraResult<()> {
        self.store.set_json(&self.key(bucket, id), value, Some(self.ttl(bucket)))?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Cached entity of `kind`, fetching it on a miss.
    pub async fn get_entity(&self, kind: EntityKind, id: &str) -> TesseraResult<Option<Entity>> {
        let bucket = CacheBucket::for_kind(kind);
        if let Some(entity) = self.read::<Entity>(bucket, id)? {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(bucket = %bucket, id = %id, "Cache hit");
            return Ok(Some(entity));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(bucket = %bucket, id = %id, "Cache miss, fetching");

        let fetched = match kind {
            EntityKind::Entry => self.api.get_entry(id).await?,
            EntityKind::Asset => self.api.get_asset(id).await?,
        };
        if let Some(entity) = &fetched {
            self.write(bucket, id, entity)?;
        }
        Ok(fetched)
    }

    pub async fn get_entry(&self, id: &str) -> TesseraResult<Option<Entity>> {
        self.get_entity(EntityKind::Entry, id).await
    }

    pub async fn get_asset(&self, id: &str) -> TesseraResult<Option<Entity>> {
        self.get_entity(EntityKind::Asset, id).await
    }

    /// Cached content type. A miss refreshes every content type at once.
    pub async fn get_content_type(&self, id: &str) -> TesseraResult<Option<ContentType>> {
        if let Some(content_type) = self.read::<ContentType>(CacheBucket::ContentTypes, id)? {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(id = %id, "Content type cache hit");
            return Ok(Some(content_type));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let all = self.refresh_content_types().await?;
        Ok(all.into_iter().find(|t| t.id() == id))
    }

    /// Fetch all content types and cache each under its own id.
    pub async fn refresh_content_types(&self) -> TesseraResult<Vec<ContentType>> {
        let collection = self.api.get_content_types().await?;
        for content_type in &collection.items {
            self.write(CacheBucket::ContentTypes, content_type.id(), content_type)?;
        }
        tracing::debug!(count = collection.items.len(), "Cached content types");
        Ok(collection.items)
    }

    /// Cached value of any bucket as raw JSON.
    pub async fn get(&self, bucket: CacheBucket, id: &str) -> TesseraResult<Option<Value>> {
        let value = match bucket {
            CacheBucket::Entries => self.get_entry(id).await?.map(Entity::into_value),
            CacheBucket::Assets => self.get_asset(id).await?.map(Entity::into_value),
            CacheBucket::ContentTypes => match self.get_content_type(id).await? {
                Some(content_type) => Some(serde_json::to_value(content_type).map_err(|e| {
                    StoreError::Serialization {
                        key: self.key(bucket, id),
                        reason: e.to_string(),
                    }
                })?),
                None => None,
            },
        };
        Ok(value)
    }

    /// Push an externally obtained snapshot into the cache.
    ///
    /// Assets go to the asset bucket, everything else to the entry bucket.
    pub fn store(&self, id: &str, entity: &Entity) -> TesseraResult<()> {
        let bucket = match entity.kind() {
            Some(EntityKind::Asset) => CacheBucket::Assets,
            _ => CacheBucket::Entries,
        };
        tracing::debug!(bucket = %bucket, id = %id, "Storing pushed snapshot");
        self.write(bucket, id, entity)
    }

    pub fn invalidate(&self, bucket: CacheBucket, id: &str) -> TesseraResult<()> {
        self.store.remove(&self.key(bucket, id))
    }
}
