//! In-memory content API for tests and local development.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::api::{ApiOperation, Collection, ContentApi, Query};
use crate::entity::{ContentType, Entity};
use crate::enums::SysType;
use crate::error::{request_failed, ApiError, TesseraResult};
use crate::identity::Timestamp;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// Mock content API backed by hash maps.
///
/// Counts every call per operation and can be told to fail an operation
/// until it is recovered.
#[derive(Debug, Default)]
pub struct MockContentApi {
    entries: RwLock<HashMap<String, Entity>>,
    assets: RwLock<HashMap<String, Entity>>,
    content_types: RwLock<Vec<ContentType>>,
    calls: RwLock<HashMap<ApiOperation, u64>>,
    failing: RwLock<HashSet<ApiOperation>>,
    published: RwLock<Vec<String>>,
    strays: RwLock<Vec<Entity>>,
}

impl MockContentApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entity, routed by its `sys.type`.
    pub fn insert(&self, entity: Entity) {
        match entity.sys.sys_type {
            SysType::Asset => self.insert_asset(entity),
            _ => self.insert_entry(entity),
        }
    }

    pub fn insert_entry(&self, entry: Entity) {
        write(&self.entries).insert(entry.id().to_string(), entry);
    }

    pub fn insert_asset(&self, asset: Entity) {
        write(&self.assets).insert(asset.id().to_string(), asset);
    }

    pub fn insert_content_type(&self, content_type: ContentType) {
        let mut types = write(&self.content_types);
        types.retain(|t| t.id() != content_type.id());
        types.push(content_type);
    }

    pub fn remove_entry(&self, id: &str) -> Option<Entity> {
        write(&self.entries).remove(id)
    }

    pub fn remove_asset(&self, id: &str) -> Option<Entity> {
        write(&self.assets).remove(id)
    }

    /// Set `sys.updatedAt` of a stored entry or asset. Returns false if absent.
    pub fn touch(&self, id: &str, updated_at: Timestamp) -> bool {
        for map in [&self.entries, &self.assets] {
            if let Some(entity) = write(map).get_mut(id) {
                entity.sys.updated_at = Some(updated_at);
                return true;
            }
        }
        false
    }

    /// Append `entity` to every batch query result, whatever was asked for.
    ///
    /// Mimics an API that ignores part of a filter.
    pub fn add_stray(&self, entity: Entity) {
        write(&self.strays).push(entity);
    }

    /// Make every call of `operation` fail until [`recover`](Self::recover).
    pub fn fail(&self, operation: ApiOperation) {
        write(&self.failing).insert(operation);
    }

    pub fn recover(&self, operation: ApiOperation) {
        write(&self.failing).remove(&operation);
    }

    /// Number of calls made for `operation`, failed ones included.
    pub fn calls(&self, operation: ApiOperation) -> u64 {
        read(&self.calls).get(&operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u64 {
        read(&self.calls).values().sum()
    }

    pub fn reset_calls(&self) {
        write(&self.calls).clear();
    }

    /// Ids passed to `publish_entry`, in call order.
    pub fn published_ids(&self) -> Vec<String> {
        read(&self.published).clone()
    }

    fn record(&self, operation: ApiOperation) -> TesseraResult<()> {
        *write(&self.calls).entry(operation).or_insert(0) += 1;
        if read(&self.failing).contains(&operation) {
            return Err(request_failed(operation, "injected failure"));
        }
        Ok(())
    }

    fn select(&self, map: &RwLock<HashMap<String, Entity>>, query: &Query) -> Collection<Entity> {
        let map = read(map);
        let mut items: Vec<Entity> = match query.ids() {
            Some(ids) => ids.into_iter().filter_map(|id| map.get(id).cloned()).collect(),
            None => {
                let mut all: Vec<Entity> = map.values().cloned().collect();
                all.sort_by(|a, b| a.id().cmp(b.id()));
                all
            }
        };
        items.extend(read(&self.strays).iter().cloned());
        Collection::new(items)
    }
}

#[async_trait]
impl ContentApi for MockContentApi {
    async fn get_entry(&self, id: &str) -> TesseraResult<Option<Entity>> {
        self.record(ApiOperation::GetEntry)?;
        Ok(read(&self.entries).get(id).cloned())
    }

    async fn get_asset(&self, id: &str) -> TesseraResult<Option<Entity>> {
        self.record(ApiOperation::GetAsset)?;
        Ok(read(&self.assets).get(id).cloned())
    }

    async fn get_content_types(&self) -> TesseraResult<Collection<ContentType>> {
        self.record(ApiOperation::GetContentTypes)?;
        Ok(Collection::new(read(&self.content_types).clone()))
    }

    async fn get_entries(&self, query: &Query) -> TesseraResult<Collection<Entity>> {
        self.record(ApiOperation::GetEntries)?;
        Ok(self.select(&self.entries, query))
    }

    async fn get_assets(&self, query: &Query) -> TesseraResult<Collection<Entity>> {
        self.record(ApiOperation::GetAssets)?;
        Ok(self.select(&self.assets, query))
    }

    async fn publish_entry(&self, entry: &Entity) -> TesseraResult<()> {
        self.record(ApiOperation::PublishEntry)?;
        let mut entries = write(&self.entries);
        let Some(stored) = entries.get_mut(entry.id()) else {
            return Err(ApiError::PublishFailed {
                id: entry.id().to_string(),
                reason: "entry does not exist".to_string(),
            }
            .into());
        };
        stored.sys.published_version = Some(stored.sys.published_version.unwrap_or(0) + 1);
        stored.sys.published_at = stored.sys.updated_at;
        write(&self.published).push(entry.id().to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Sys;
    use crate::error::TesseraError;
    use serde_json::Map;

    fn entity(sys_type: SysType, id: &str) -> Entity {
        Entity::new(
            Sys {
                id: id.to_string(),
                sys_type,
                ..Default::default()
            },
            Map::new(),
        )
    }

    #[tokio::test]
    async fn test_lookup_counts_calls() {
        let api = MockContentApi::new();
        api.insert(entity(SysType::Entry, "e1"));
        api.insert(entity(SysType::Asset, "a1"));

        assert!(api.get_entry("e1").await.unwrap().is_some());
        assert!(api.get_entry("missing").await.unwrap().is_none());
        assert!(api.get_asset("a1").await.unwrap().is_some());

        assert_eq!(api.calls(ApiOperation::GetEntry), 2);
        assert_eq!(api.calls(ApiOperation::GetAsset), 1);
        assert_eq!(api.total_calls(), 3);
    }

    #[tokio::test]
    async fn test_ids_in_returns_requested_order() {
        let api = MockContentApi::new();
        for id in ["a", "b", "c"] {
            api.insert_entry(entity(SysType::Entry, id));
        }
        let found = api.get_entries(&Query::ids_in(&["c", "x", "a"])).await.unwrap();
        let ids: Vec<&str> = found.items.iter().map(Entity::id).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let api = MockContentApi::new();
        api.fail(ApiOperation::GetAssets);
        let err = api.get_assets(&Query::new()).await.unwrap_err();
        assert!(matches!(err, TesseraError::Api(ApiError::RequestFailed { .. })));

        api.recover(ApiOperation::GetAssets);
        assert!(api.get_assets(&Query::new()).await.is_ok());
        assert_eq!(api.calls(ApiOperation::GetAssets), 2);
    }

    #[tokio::test]
    async fn test_publish_bumps_version() {
        let api = MockContentApi::new();
        let entry = entity(SysType::Entry, "e1");
        api.insert_entry(entry.clone());

        api.publish_entry(&entry).await.unwrap();
        let stored = api.get_entry("e1").await.unwrap().unwrap();
        assert_eq!(stored.sys.published_version, Some(1));
        assert_eq!(api.published_ids(), vec!["e1".to_string()]);

        let missing = entity(SysType::Entry, "nope");
        assert!(api.publish_entry(&missing).await.is_err());
    }
}
