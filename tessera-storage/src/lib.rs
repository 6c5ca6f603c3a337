//! Tessera Storage - persisted stores and the read-through cache
//!
//! - [`store`]: byte stores with lazy TTL expiry and cross-context change
//!   notifications ([`InMemoryStore`], [`LmdbStore`])
//! - [`cache`]: the bucketed [`ReadThroughCache`] in front of a
//!   [`ContentApi`](tessera_core::ContentApi)

pub mod cache;
pub mod store;

pub use cache::{CacheBucket, CacheConfig, CacheStats, ReadThroughCache};
pub use store::{
    InMemoryStore, JsonStoreExt, KeyValueStore, LmdbStore, LmdbStoreError, StoreChange, CHANGE_CHANNEL_CAPACITY,
};
