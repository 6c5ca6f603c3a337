//! TTL-bounded read-through cache of entities and content types.
//!
//! Values are persisted as JSON in a [`KeyValueStore`](crate::KeyValueStore)
//! under `{prefix}-{bucket}-{id}`; expiry is left to the store.

mod config;
mod read_through;

pub use config::CacheConfig;
pub use read_through::ReadThroughCache;

use std::fmt;

use tessera_core::{EntityKind, SysType};

/// Cache namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheBucket {
    Entries,
    Assets,
    ContentTypes,
}

impl CacheBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheBucket::Entries => "entries",
            CacheBucket::Assets => "assets",
            CacheBucket::ContentTypes => "content-types",
        }
    }

    /// Bucket holding entities of `kind`.
    pub fn for_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Entry => CacheBucket::Entries,
            EntityKind::Asset => CacheBucket::Assets,
        }
    }

    /// Bucket for a `sys.type`, `None` for links and unknown types.
    pub fn for_sys_type(sys_type: SysType) -> Option<Self> {
        match sys_type {
            SysType::Entry => Some(CacheBucket::Entries),
            SysType::Asset => Some(CacheBucket::Assets),
            SysType::ContentType => Some(CacheBucket::ContentTypes),
            _ => None,
        }
    }
}

impl fmt::Display for CacheBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from the store.
    pub hits: u64,
    /// Reads that had to go to the API.
    pub misses: u64,
    /// Values written, fetched or pushed.
    pub writes: u64,
}

impl CacheStats {
    /// Hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
