//! Where the resolver gets linked entities from.

use async_trait::async_trait;
use tessera_core::{ContentApi, Entity, EntityKind, TesseraResult};
use tessera_storage::{KeyValueStore, ReadThroughCache};

/// Lookup of full entities by kind and id.
#[async_trait]
pub trait EntitySource: Send + Sync {
    /// Fetch an entity, `None` when it does not exist.
    async fn fetch(&self, kind: EntityKind, id: &str) -> TesseraResult<Option<Entity>>;
}

#[async_trait]
impl<A, S> EntitySource for ReadThroughCache<A, S>
where
    A: ContentApi + ?Sized,
    S: KeyValueStore + ?Sized,
{
    async fn fetch(&self, kind: EntityKind, id: &str) -> TesseraResult<Option<Entity>> {
        self.get_entity(kind, id).await
    }
}
