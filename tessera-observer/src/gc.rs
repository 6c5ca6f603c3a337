//! Garbage collection of registrations left behind by dead contexts.

use std::collections::HashSet;
use std::time::Duration;

use tessera_core::{EntityId, EntityKind, InstanceId, TesseraResult};
use tessera_storage::KeyValueStore;

use crate::registry::Registry;

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Lets an action through at most once per `wait`.
///
/// The first call only opens the window.
#[derive(Debug, Clone)]
pub struct Throttle {
    wait: i64,
    last: Option<i64>,
}

impl Throttle {
    pub fn new(wait: Duration) -> Self {
        Self {
            wait: millis(wait),
            last: None,
        }
    }

    /// Whether the action may run at `now_millis`. Records the run if so.
    pub fn ready(&mut self, now_millis: i64) -> bool {
        let last = *self.last.get_or_insert(now_millis);
        if last.saturating_add(self.wait) < now_millis {
            self.last = Some(now_millis);
            return true;
        }
        false
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    pub removed_instances: Vec<InstanceId>,
    pub removed_ids: Vec<EntityId>,
}

impl GcReport {
    pub fn is_empty(&self) -> bool {
        self.removed_instances.is_empty() && self.removed_ids.is_empty()
    }
}

/// Drop stale instances and the ids only they watched.
///
/// An instance is fresh when its last ping is within `threshold` of
/// `now_millis`; instances that never pinged are stale. `own_instance` is
/// always fresh. Ids still watched by a fresh instance survive.
pub fn sweep<S>(
    registry: &Registry<S>,
    own_instance: &str,
    now_millis: i64,
    threshold: Duration,
) -> TesseraResult<GcReport>
where
    S: KeyValueStore + ?Sized,
{
    let threshold = millis(threshold);
    let mut instances = registry.instances()?;

    let is_fresh = |id: &str, ping: Option<i64>| {
        id == own_instance || ping.is_some_and(|ping| ping.saturating_add(threshold) > now_millis)
    };

    let fresh_ids: HashSet<&EntityId> = instances
        .iter()
        .filter(|(id, record)| is_fresh(id.as_str(), record.ping))
        .flat_map(|(_, record)| record.ids.iter())
        .collect();

    let mut report = GcReport::default();
    let mut outdated = HashSet::new();
    for (instance_id, record) in &instances {
        if is_fresh(instance_id.as_str(), record.ping) {
            continue;
        }
        report.removed_instances.push(instance_id.clone());
        for id in &record.ids {
            if !fresh_ids.contains(id) && outdated.insert(id.clone()) {
                report.removed_ids.push(id.clone());
            }
        }
    }

    if !outdated.is_empty() {
        tracing::info!(ids = ?report.removed_ids, "Removing outdated observed ids");
        for kind in [EntityKind::Asset, EntityKind::Entry] {
            let watched = registry.watch_list(kind)?;
            let (gone, kept): (Vec<_>, Vec<_>) = watched.into_iter().partition(|id| outdated.contains(id));
            for id in &gone {
                registry.remove_last_known(kind, id)?;
            }
            if !gone.is_empty() {
                registry.save_watch_list(kind, &kept)?;
            }
        }
    }

    if !report.removed_instances.is_empty() {
        for instance_id in &report.removed_instances {
            tracing::info!(instance_id = %instance_id, "Removing outdated instance");
            instances.remove(instance_id);
        }
        registry.save_instances(&instances)?;
    }

    Ok(report)
}
