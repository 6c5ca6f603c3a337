//! Observer state persisted in the shared store.
//!
//! Every context reads and writes the same keys without locking; writes are
//! last-write-wins. Unparsable values are logged and replaced by defaults so
//! one corrupt key cannot wedge the observer.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tessera_core::{EntityId, EntityKind, InstanceId, StoreError, Sys, TesseraError, TesseraResult, Timestamp};
use tessera_storage::{JsonStoreExt, KeyValueStore};

use crate::keys::ObserverKeys;

/// One context's entry in the instance table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Ids this context watches.
    #[serde(default)]
    pub ids: Vec<EntityId>,
    /// Last liveness ping, epoch millis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping: Option<i64>,
}

/// Instance table keyed by instance id.
pub type InstanceTable = BTreeMap<InstanceId, InstanceRecord>;

/// Last seen lifecycle timestamps of a watched item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastKnown {
    #[serde(default)]
    pub published_at: Option<Timestamp>,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

impl LastKnown {
    pub fn from_sys(sys: &Sys) -> Self {
        Self {
            published_at: sys.published_at,
            updated_at: sys.updated_at,
        }
    }
}

/// Typed access to the persisted observer keys.
#[derive(Debug)]
pub struct Registry<S: ?Sized> {
    store: Arc<S>,
    keys: ObserverKeys,
}

impl<S> Registry<S>
where
    S: KeyValueStore + ?Sized,
{
    pub fn new(store: Arc<S>, keys: ObserverKeys) -> Self {
        Self { store, keys }
    }

    pub fn keys(&self) -> &ObserverKeys {
        &self.keys
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> TesseraResult<Option<T>> {
        match self.store.get_json::<T>(key) {
            Ok(value) => Ok(value),
            Err(TesseraError::Store(StoreError::Deserialization { reason, .. })) => {
                tracing::warn!(key = %key, reason = %reason, "Ignoring unparsable observer value");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------------
    // Last run
    // ------------------------------------------------------------------------

    pub fn last_run(&self) -> TesseraResult<Option<i64>> {
        self.load(&self.keys.last_run())
    }

    pub fn mark_run(&self, now_millis: i64) -> TesseraResult<()> {
        self.store.set_json(&self.keys.last_run(), &now_millis, None)
    }

    // ------------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------------

    pub fn instances(&self) -> TesseraResult<InstanceTable> {
        Ok(self.load(&self.keys.instances())?.unwrap_or_default())
    }

    pub fn save_instances(&self, instances: &InstanceTable) -> TesseraResult<()> {
        self.store.set_json(&self.keys.instances(), instances, None)
    }

    /// Read-modify-write one instance record.
    pub fn update_instance(&self, instance_id: &str, update: impl FnOnce(&mut InstanceRecord)) -> TesseraResult<()> {
        let mut instances = self.instances()?;
        update(instances.entry(instance_id.to_string()).or_default());
        self.save_instances(&instances)
    }

    pub fn ping(&self, instance_id: &str, now_millis: i64) -> TesseraResult<()> {
        self.update_instance(instance_id, |record| record.ping = Some(now_millis))
    }

    // ------------------------------------------------------------------------
    // Watch lists
    // ------------------------------------------------------------------------

    pub fn watch_list(&self, kind: EntityKind) -> TesseraResult<Vec<EntityId>> {
        Ok(self.load(&self.keys.watch_list(kind))?.unwrap_or_default())
    }

    pub fn save_watch_list(&self, kind: EntityKind, ids: &[EntityId]) -> TesseraResult<()> {
        self.store.set_json(&self.keys.watch_list(kind), ids, None)
    }

    // ------------------------------------------------------------------------
    // Last known values
    // ------------------------------------------------------------------------

    pub fn last_known(&self, kind: EntityKind, id: &str) -> TesseraResult<Option<LastKnown>> {
        self.load(&self.keys.last_known(kind, id))
    }

    pub fn save_last_known(&self, kind: EntityKind, id: &str, value: &LastKnown) -> TesseraResult<()> {
        self.store.set_json(&self.keys.last_known(kind, id), value, None)
    }

    pub fn remove_last_known(&self, kind: EntityKind, id: &str) -> TesseraResult<()> {
        self.store.remove(&self.keys.last_known(kind, id))
    }
}

/// Order-preserving de-duplication.
pub(crate) fn unique(ids: impl IntoIterator<Item = EntityId>) -> Vec<EntityId> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
