//! The change observer.
//!
//! One [`ChangeObserver`] lives in each context. All contexts sharing a
//! store cooperate so that only one of them polls the content API:
//!
//! - the poll loop stamps `{prefix}-time` on every tick; a context only
//!   starts its own loop when that stamp is older than one poll interval
//! - every context pings the instance table; a ping that finds the stamp
//!   stale takes over polling
//! - the polling context writes each detected change to the item's
//!   last-known key, and every other context picks that write up from the
//!   store's change notifications, re-fetches the item and runs its own
//!   callbacks

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tessera_core::{
    new_instance_id, Clock, ConfigError, ContentApi, Entity, EntityId, EntityKind, InstanceId, Link, Query,
    Sys, SystemClock, TesseraResult, Timestamp,
};
use tessera_storage::{KeyValueStore, StoreChange};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::callbacks::{CallbackRegistry, ChangeCallback, WatchKey};
use crate::config::ObserverConfig;
use crate::gc::{sweep, GcReport, Throttle};
use crate::keys::ObserverKeys;
use crate::registry::{unique, LastKnown, Registry};
use crate::schedule::{RecurringTask, TickOutcome};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// OBSERVED ITEM
// ============================================================================

/// An entry or asset to watch, with the timestamps it was seen with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed {
    pub kind: EntityKind,
    pub id: EntityId,
    pub published_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
}

impl Observed {
    /// `None` when the block has no id or is neither an entry nor an asset.
    /// Links are followed to their `linkType`.
    pub fn from_sys(sys: &Sys) -> Option<Self> {
        if sys.id.is_empty() {
            return None;
        }
        Some(Self {
            kind: sys.kind()?,
            id: sys.id.clone(),
            published_at: sys.published_at,
            updated_at: sys.updated_at,
        })
    }

    pub fn from_entity(entity: &Entity) -> Option<Self> {
        Self::from_sys(&entity.sys)
    }

    pub fn from_link(link: &Link) -> Option<Self> {
        Self::from_sys(&link.sys)
    }

    pub fn key(&self) -> WatchKey {
        (self.kind, self.id.clone())
    }

    fn last_known(&self) -> LastKnown {
        LastKnown {
            published_at: self.published_at,
            updated_at: self.updated_at,
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters of observer activity since construction.
#[derive(Debug, Default)]
pub struct ObserverMetrics {
    pub poll_ticks: AtomicU64,
    pub items_checked: AtomicU64,
    pub changes_detected: AtomicU64,
    pub callbacks_invoked: AtomicU64,
    pub fetch_errors: AtomicU64,
    pub gc_sweeps: AtomicU64,
}

impl ObserverMetrics {
    pub fn snapshot(&self) -> ObserverSnapshot {
        ObserverSnapshot {
            poll_ticks: self.poll_ticks.load(Ordering::Relaxed),
            items_checked: self.items_checked.load(Ordering::Relaxed),
            changes_detected: self.changes_detected.load(Ordering::Relaxed),
            callbacks_invoked: self.callbacks_invoked.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            gc_sweeps: self.gc_sweeps.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of observer metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObserverSnapshot {
    pub poll_ticks: u64,
    pub items_checked: u64,
    pub changes_detected: u64,
    pub callbacks_invoked: u64,
    pub fetch_errors: u64,
    pub gc_sweeps: u64,
}

/// Result of one poll tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Items compared against their last known timestamps.
    pub checked: usize,
    /// Items whose timestamps moved.
    pub changed: Vec<WatchKey>,
    /// Returned items that were not on the watch list.
    pub skipped: usize,
    /// Failed fetches or store accesses.
    pub errors: usize,
}

// ============================================================================
// OBSERVER
// ============================================================================

/// Polls watched entries and assets and notifies callbacks when they change.
pub struct ChangeObserver<A: ?Sized, S: ?Sized> {
    api: Arc<A>,
    registry: Registry<S>,
    clock: Arc<dyn Clock>,
    config: ObserverConfig,
    instance_id: InstanceId,
    callbacks: Mutex<CallbackRegistry>,
    poll_task: Mutex<Option<RecurringTask>>,
    ping_task: Mutex<Option<RecurringTask>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    gc: Mutex<Throttle>,
    metrics: ObserverMetrics,
}

impl<A: ?Sized, S: ?Sized> std::fmt::Debug for ChangeObserver<A, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeObserver")
            .field("instance_id", &self.instance_id)
            .field("config", &self.config)
            .field("callbacks", &*lock(&self.callbacks))
            .finish_non_exhaustive()
    }
}

impl<A, S> ChangeObserver<A, S>
where
    A: ContentApi + ?Sized + 'static,
    S: KeyValueStore + ?Sized + 'static,
{
    pub fn new(api: Arc<A>, store: Arc<S>, config: ObserverConfig) -> TesseraResult<Self> {
        Self::with_clock(api, store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        api: Arc<A>,
        store: Arc<S>,
        config: ObserverConfig,
        clock: Arc<dyn Clock>,
    ) -> TesseraResult<Self> {
        config.validate()?;
        let keys = ObserverKeys::new(config.key_prefix.clone());
        Ok(Self {
            api,
            registry: Registry::new(store, keys),
            clock,
            gc: Mutex::new(Throttle::new(config.cleanup_interval)),
            config,
            instance_id: new_instance_id(),
            callbacks: Mutex::new(CallbackRegistry::new()),
            poll_task: Mutex::new(None),
            ping_task: Mutex::new(None),
            listener: Mutex::new(None),
            metrics: ObserverMetrics::default(),
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry<S> {
        &self.registry
    }

    pub fn metrics(&self) -> ObserverSnapshot {
        self.metrics.snapshot()
    }

    /// Items this context has callbacks for.
    pub fn watched(&self) -> Vec<WatchKey> {
        lock(&self.callbacks).keys()
    }

    pub fn has_registrations(&self) -> bool {
        !lock(&self.callbacks).is_empty()
    }

    /// Whether this context runs the poll loop.
    pub fn is_polling(&self) -> bool {
        lock(&self.poll_task).as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Whether any context sharing the store polls.
    pub fn is_running(&self) -> TesseraResult<bool> {
        if self.is_polling() {
            return Ok(true);
        }
        let Some(last) = self.registry.last_run()? else {
            return Ok(false);
        };
        let window = i64::try_from(self.config.poll_interval.as_millis()).unwrap_or(i64::MAX);
        Ok(self.clock.now_millis().saturating_sub(last) < window)
    }

    // ------------------------------------------------------------------------
    // Subscribing
    // ------------------------------------------------------------------------

    /// Watch `target` and call `callback` whenever it changes.
    ///
    /// Registering the same callback twice for one item is a no-op. When no
    /// context polls yet this one starts polling every `interval` (default:
    /// the configured poll interval); otherwise it re-checks once after
    /// `interval` plus the takeover grace. Must be called within a tokio
    /// runtime.
    pub fn subscribe(
        self: &Arc<Self>,
        target: Observed,
        callback: ChangeCallback,
        interval: Option<Duration>,
    ) -> TesseraResult<Subscription<A, S>> {
        let period = interval.unwrap_or(self.config.poll_interval);
        if period.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "interval".to_string(),
                value: format!("{:?}", period),
                reason: "must be positive".to_string(),
            }
            .into());
        }

        self.registry.ping(&self.instance_id, self.clock.now_millis())?;
        self.ensure_ping_task();

        self.watch(&target, callback.clone())?;
        self.ensure_listener();

        if !self.try_start(period)? {
            self.schedule_recheck(period);
        }

        Ok(Subscription {
            observer: Arc::downgrade(self),
            kind: target.kind,
            id: target.id,
            callback,
        })
    }

    /// Register a callback and persist the registration. Returns false when
    /// the callback was already registered for the item.
    pub(crate) fn watch(&self, target: &Observed, callback: ChangeCallback) -> TesseraResult<bool> {
        let added = lock(&self.callbacks).add(target.key(), callback);
        if !added {
            tracing::debug!(kind = %target.kind, id = %target.id, "Callback already registered");
            return Ok(false);
        }

        let id = target.id.clone();
        self.registry.update_instance(&self.instance_id, |record| {
            if !record.ids.contains(&id) {
                record.ids.push(id);
            }
        })?;

        let mut watched = self.registry.watch_list(target.kind)?;
        if !watched.contains(&target.id) {
            self.registry
                .save_last_known(target.kind, &target.id, &target.last_known())?;
            watched.push(target.id.clone());
            self.registry.save_watch_list(target.kind, &unique(watched))?;
        }

        tracing::debug!(
            kind = %target.kind,
            id = %target.id,
            instance_id = %self.instance_id,
            "Watching item"
        );
        Ok(true)
    }

    /// Remove `callback` (or every callback when `None`) for one item.
    ///
    /// Once no callback is left the item leaves this instance's list, and
    /// the shared watch list and last-known record are dropped unless
    /// another instance still watches it. With no registrations left the
    /// background tasks stop.
    pub fn unsubscribe(&self, kind: EntityKind, id: &str, callback: Option<&ChangeCallback>) -> TesseraResult<()> {
        let key = (kind, id.to_string());
        let remaining = lock(&self.callbacks).remove(&key, callback);
        if remaining > 0 {
            return Ok(());
        }

        self.registry
            .update_instance(&self.instance_id, |record| record.ids.retain(|i| i != id))?;

        let watched_elsewhere = self
            .registry
            .instances()?
            .iter()
            .any(|(instance_id, record)| instance_id != &self.instance_id && record.ids.iter().any(|i| i == id));

        if !watched_elsewhere {
            let mut watched = self.registry.watch_list(kind)?;
            if let Some(index) = watched.iter().position(|i| i == id) {
                watched.remove(index);
                self.registry.save_watch_list(kind, &watched)?;
            }
            self.registry.remove_last_known(kind, id)?;
        }

        tracing::debug!(kind = %kind, id = %id, watched_elsewhere, "Stopped watching item");

        if !self.has_registrations() {
            self.stop_tasks();
        }
        Ok(())
    }

    /// Remove every registration this context created.
    pub fn unsubscribe_all(&self) -> TesseraResult<()> {
        for (kind, id) in self.watched() {
            self.unsubscribe(kind, &id, None)?;
        }
        Ok(())
    }

    /// Stop all background work. Registrations stay persisted.
    pub fn shutdown(&self) {
        self.stop_tasks();
        tracing::info!(instance_id = %self.instance_id, "Change observer shut down");
    }

    // ------------------------------------------------------------------------
    // Polling
    // ------------------------------------------------------------------------

    fn try_start(self: &Arc<Self>, period: Duration) -> TesseraResult<bool> {
        if self.is_running()? {
            return Ok(false);
        }
        self.start_polling(period);
        Ok(true)
    }

    fn start_polling(self: &Arc<Self>, period: Duration) {
        let mut slot = lock(&self.poll_task);
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let weak = Arc::downgrade(self);
        *slot = Some(RecurringTask::spawn(
            format!("tessera-observer-poll-{}", self.instance_id),
            period,
            move || {
                let weak = weak.clone();
                async move {
                    let Some(observer) = weak.upgrade() else {
                        return TickOutcome::Stop;
                    };
                    observer.poll_tick().await;
                    TickOutcome::Continue
                }
            },
        ));
    }

    fn schedule_recheck(self: &Arc<Self>, period: Duration) {
        let weak = Arc::downgrade(self);
        let delay = period + self.config.takeover_grace;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(observer) = weak.upgrade() else {
                return;
            };
            if !observer.has_registrations() {
                return;
            }
            if let Err(e) = observer.try_start(period) {
                tracing::warn!(error = %e, "Poll loop re-check failed");
            }
        });
    }

    /// Fetch every watched item once and notify callbacks of changed ones.
    ///
    /// Failures are logged and counted; they never end the loop.
    pub async fn poll_tick(&self) -> PollReport {
        let mut report = PollReport::default();

        if let Err(e) = self.registry.mark_run(self.clock.now_millis()) {
            tracing::error!(error = %e, "Failed to stamp poll run");
            report.errors += 1;
        }

        for kind in [EntityKind::Asset, EntityKind::Entry] {
            if let Err(e) = self.poll_kind(kind, &mut report).await {
                tracing::error!(kind = %kind, error = %e, "Polling watched items failed");
                self.metrics.fetch_errors.fetch_add(1, Ordering::Relaxed);
                report.errors += 1;
            }
        }

        self.maybe_collect_garbage();
        self.metrics.poll_ticks.fetch_add(1, Ordering::Relaxed);

        if report.changed.is_empty() {
            tracing::trace!(checked = report.checked, "Poll tick found no changes");
        }
        report
    }

    async fn poll_kind(&self, kind: EntityKind, report: &mut PollReport) -> TesseraResult<()> {
        let ids = unique(self.registry.watch_list(kind)?);
        if ids.is_empty() {
            return Ok(());
        }

        let query = Query::ids_in(&ids);
        let items = match kind {
            EntityKind::Asset => self.api.get_assets(&query).await?,
            EntityKind::Entry => self.api.get_entries(&query).await?,
        };

        let watched: HashSet<&str> = ids.iter().map(String::as_str).collect();
        for item in &items.items {
            if item.kind() != Some(kind) || !watched.contains(item.id()) {
                tracing::warn!(kind = %kind, id = %item.id(), "Item not found in watch list, skipping");
                report.skipped += 1;
                continue;
            }
            report.checked += 1;
            self.metrics.items_checked.fetch_add(1, Ordering::Relaxed);
            if self.check(kind, item)? {
                report.changed.push((kind, item.id().to_string()));
            }
        }
        Ok(())
    }

    /// Compare an item against its last known timestamps. On a change the
    /// new timestamps are stored and local callbacks run.
    fn check(&self, kind: EntityKind, entity: &Entity) -> TesseraResult<bool> {
        let current = LastKnown::from_sys(&entity.sys);
        let previous = self.registry.last_known(kind, entity.id())?;
        if previous.as_ref() == Some(&current) {
            return Ok(false);
        }

        self.registry.save_last_known(kind, entity.id(), &current)?;
        self.metrics.changes_detected.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(kind = %kind, id = %entity.id(), "Watched item changed");
        self.notify(&(kind, entity.id().to_string()), entity);
        Ok(true)
    }

    fn notify(&self, key: &WatchKey, entity: &Entity) -> usize {
        let callbacks = lock(&self.callbacks).get(key);
        for callback in &callbacks {
            callback(entity);
        }
        self.metrics
            .callbacks_invoked
            .fetch_add(callbacks.len() as u64, Ordering::Relaxed);
        callbacks.len()
    }

    // ------------------------------------------------------------------------
    // Liveness and takeover
    // ------------------------------------------------------------------------

    fn ensure_ping_task(self: &Arc<Self>) {
        let mut slot = lock(&self.ping_task);
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let weak = Arc::downgrade(self);
        *slot = Some(RecurringTask::spawn(
            format!("tessera-observer-ping-{}", self.instance_id),
            self.config.poll_interval,
            move || {
                let weak = weak.clone();
                async move {
                    let Some(observer) = weak.upgrade() else {
                        return TickOutcome::Stop;
                    };
                    observer.ping_tick();
                    TickOutcome::Continue
                }
            },
        ));
    }

    fn ping_tick(self: &Arc<Self>) {
        if let Err(e) = self.registry.ping(&self.instance_id, self.clock.now_millis()) {
            tracing::warn!(instance_id = %self.instance_id, error = %e, "Ping failed");
            return;
        }
        if !self.has_registrations() || self.is_polling() {
            return;
        }
        match self.is_running() {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(instance_id = %self.instance_id, "Taking over change polling");
                self.start_polling(self.config.poll_interval);
            }
            Err(e) => tracing::warn!(error = %e, "Failed to read poll run stamp"),
        }
    }

    fn stop_tasks(&self) {
        let poll = lock(&self.poll_task).take();
        let ping = lock(&self.ping_task).take();
        if let Some(task) = poll {
            task.cancel();
        }
        if let Some(task) = ping {
            task.cancel();
        }
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }
    }

    // ------------------------------------------------------------------------
    // Cross-context notifications
    // ------------------------------------------------------------------------

    fn ensure_listener(self: &Arc<Self>) {
        let mut slot = lock(&self.listener);
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let mut changes = self.registry.store().subscribe();
        let weak = Arc::downgrade(self);
        *slot = Some(tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        let Some(observer) = weak.upgrade() else {
                            break;
                        };
                        observer.on_store_change(change).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Observer fell behind store changes");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    /// React to another context writing a last-known record this context
    /// has callbacks for.
    async fn on_store_change(&self, change: StoreChange) {
        if change.origin == self.registry.store().context_id()
            || change.old_value == change.new_value
            || change.new_value.is_none()
        {
            return;
        }
        let Some((kind, id)) = self.registry.keys().parse_last_known(&change.key) else {
            return;
        };
        let key = (kind, id);
        let has_callbacks = lock(&self.callbacks).contains(&key);
        if !has_callbacks {
            return;
        }

        tracing::debug!(kind = %kind, id = %key.1, "Item changed in another context");
        let fetched = match kind {
            EntityKind::Entry => self.api.get_entry(&key.1).await,
            EntityKind::Asset => self.api.get_asset(&key.1).await,
        };
        match fetched {
            Ok(Some(entity)) => {
                self.notify(&key, &entity);
            }
            Ok(None) => tracing::debug!(kind = %kind, id = %key.1, "Changed item no longer exists"),
            Err(e) => {
                self.metrics.fetch_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(kind = %kind, id = %key.1, error = %e, "Re-fetching changed item failed");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Garbage collection
    // ------------------------------------------------------------------------

    fn maybe_collect_garbage(&self) {
        let ready = lock(&self.gc).ready(self.clock.now_millis());
        if !ready {
            return;
        }
        if let Err(e) = self.collect_garbage() {
            tracing::warn!(error = %e, "Observer garbage collection failed");
        }
    }

    /// Sweep stale instances now, ignoring the throttle.
    pub fn collect_garbage(&self) -> TesseraResult<GcReport> {
        let report = sweep(
            &self.registry,
            &self.instance_id,
            self.clock.now_millis(),
            self.config.cleanup_threshold,
        )?;
        self.metrics.gc_sweeps.fetch_add(1, Ordering::Relaxed);
        if !report.is_empty() {
            tracing::info!(
                removed_instances = report.removed_instances.len(),
                removed_ids = report.removed_ids.len(),
                "Observer garbage collection finished"
            );
        }
        Ok(report)
    }
}

impl<A: ?Sized, S: ?Sized> Drop for ChangeObserver<A, S> {
    fn drop(&mut self) {
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }
    }
}

// ============================================================================
// SUBSCRIPTION HANDLE
// ============================================================================

/// Handle returned by [`ChangeObserver::subscribe`].
///
/// Dropping it keeps the registration; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove it.
pub struct Subscription<A: ?Sized, S: ?Sized> {
    observer: Weak<ChangeObserver<A, S>>,
    kind: EntityKind,
    id: EntityId,
    callback: ChangeCallback,
}

impl<A: ?Sized, S: ?Sized> std::fmt::Debug for Subscription<A, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl<A: ?Sized, S: ?Sized> Subscription<A, S> {
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn callback(&self) -> &ChangeCallback {
        &self.callback
    }
}

impl<A, S> Subscription<A, S>
where
    A: ContentApi + ?Sized + 'static,
    S: KeyValueStore + ?Sized + 'static,
{
    /// Remove exactly this subscription's callback.
    pub fn unsubscribe(self) -> TesseraResult<()> {
        match self.observer.upgrade() {
            Some(observer) => observer.unsubscribe(self.kind, &self.id, Some(&self.callback)),
            None => Ok(()),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::Map;
    use std::sync::atomic::AtomicUsize;
    use tessera_core::{ApiOperation, ManualClock, MockContentApi, SysType};
    use tessera_storage::InMemoryStore;

    type TestObserver = ChangeObserver<MockContentApi, InMemoryStore>;

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn entity(sys_type: SysType, id: &str, updated: i64) -> Entity {
        Entity::new(
            Sys {
                id: id.to_string(),
                sys_type,
                published_at: Some(at(0)),
                updated_at: Some(at(updated)),
                ..Default::default()
            },
            Map::new(),
        )
    }

    fn counter() -> (ChangeCallback, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let inner = hits.clone();
        let callback: ChangeCallback = Arc::new(move |_: &Entity| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (callback, hits)
    }

    struct Harness {
        api: Arc<MockContentApi>,
        store: Arc<InMemoryStore>,
        clock: ManualClock,
    }

    impl Harness {
        fn new() -> Self {
            let clock = ManualClock::new(at(0));
            let api = Arc::new(MockContentApi::new());
            api.insert(entity(SysType::Entry, "e1", 0));
            api.insert(entity(SysType::Asset, "a1", 0));
            let store = Arc::new(InMemoryStore::with_clock(Arc::new(clock.clone())));
            Self { api, store, clock }
        }

        fn observer(&self, store: Arc<InMemoryStore>) -> Arc<TestObserver> {
            Arc::new(
                ChangeObserver::with_clock(
                    self.api.clone(),
                    store,
                    ObserverConfig::default(),
                    Arc::new(self.clock.clone()),
                )
                .unwrap(),
            )
        }
    }

    fn observed(sys_type: SysType, id: &str) -> Observed {
        Observed::from_entity(&entity(sys_type, id, 0)).unwrap()
    }

    #[test]
    fn test_observed_from_sys() {
        assert_eq!(Observed::from_link(&Link::asset("a1")).unwrap().kind, EntityKind::Asset);
        assert!(Observed::from_link(&Link::new(SysType::ContentType, "ct")).is_none());
        assert!(Observed::from_entity(&entity(SysType::Entry, "", 0)).is_none());
    }

    #[tokio::test]
    async fn test_same_callback_registers_once() {
        let h = Harness::new();
        let observer = h.observer(h.store.clone());
        let (callback, _) = counter();

        assert!(observer.watch(&observed(SysType::Entry, "e1"), callback.clone()).unwrap());
        assert!(!observer.watch(&observed(SysType::Entry, "e1"), callback).unwrap());

        let registry = observer.registry();
        assert_eq!(registry.watch_list(EntityKind::Entry).unwrap(), vec!["e1".to_string()]);
        let instances = registry.instances().unwrap();
        assert_eq!(instances[observer.instance_id()].ids, vec!["e1".to_string()]);
        assert!(registry.last_known(EntityKind::Entry, "e1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_poll_tick_invokes_callback_once_per_change() {
        let h = Harness::new();
        let observer = h.observer(h.store.clone());
        let (callback, hits) = counter();
        observer.watch(&observed(SysType::Entry, "e1"), callback).unwrap();

        let report = observer.poll_tick().await;
        assert_eq!(report.checked, 1);
        assert!(report.changed.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        h.api.touch("e1", at(60));
        let report = observer.poll_tick().await;
        assert_eq!(report.changed, vec![(EntityKind::Entry, "e1".to_string())]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let report = observer.poll_tick().await;
        assert!(report.changed.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert_eq!(h.api.calls(ApiOperation::GetEntries), 3);
        assert_eq!(h.api.calls(ApiOperation::GetAssets), 0);
    }

    #[tokio::test]
    async fn test_items_outside_watch_set_are_skipped() {
        let h = Harness::new();
        let observer = h.observer(h.store.clone());
        let (callback, hits) = counter();
        observer.watch(&observed(SysType::Entry, "e1"), callback).unwrap();

        h.api.add_stray(entity(SysType::Entry, "e9", 60));
        let report = observer.poll_tick().await;
        assert_eq!(report.checked, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.changed.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(observer.registry().last_known(EntityKind::Entry, "e9").unwrap().is_none());

        // Same id, wrong kind.
        h.api.add_stray(entity(SysType::Asset, "e1", 60));
        let report = observer.poll_tick().await;
        assert_eq!(report.checked, 1);
        assert_eq!(report.skipped, 2);
        assert!(report.changed.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_link_subscription_fires_on_first_poll() {
        let h = Harness::new();
        let observer = h.observer(h.store.clone());
        let (callback, hits) = counter();
        let target = Observed::from_link(&Link::asset("a1")).unwrap();
        observer.watch(&target, callback).unwrap();

        let report = observer.poll_tick().await;
        assert_eq!(report.changed, vec![(EntityKind::Asset, "a1".to_string())]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_counted_not_fatal() {
        let h = Harness::new();
        let observer = h.observer(h.store.clone());
        let (callback, hits) = counter();
        observer.watch(&observed(SysType::Entry, "e1"), callback.clone()).unwrap();
        observer.watch(&observed(SysType::Asset, "a1"), callback).unwrap();
        h.api.fail(ApiOperation::GetAssets);
        h.api.touch("e1", at(10));

        let report = observer.poll_tick().await;
        assert_eq!(report.errors, 1);
        assert_eq!(report.changed.len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(observer.metrics().fetch_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_starts_poll_loop() {
        let h = Harness::new();
        let observer = h.observer(h.store.clone());
        let (callback, hits) = counter();
        let subscription = observer
            .subscribe(observed(SysType::Entry, "e1"), callback, None)
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(observer.is_polling());
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        h.api.touch("e1", at(30));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        subscription.unsubscribe().unwrap();
        assert!(!observer.is_polling());
        assert!(observer.registry().watch_list(EntityKind::Entry).unwrap().is_empty());
        assert!(observer
            .registry()
            .last_known(EntityKind::Entry, "e1")
            .unwrap()
            .is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_context_is_notified_through_store() {
        let h = Harness::new();
        let first = h.observer(h.store.clone());
        let second = h.observer(Arc::new(h.store.attach()));
        let (first_cb, first_hits) = counter();
        let (second_cb, second_hits) = counter();

        first
            .subscribe(observed(SysType::Entry, "e1"), first_cb, None)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        second
            .subscribe(observed(SysType::Entry, "e1"), second_cb, None)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(first.is_polling());
        assert!(!second.is_polling());

        h.api.touch("e1", at(30));
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(first_hits.load(Ordering::SeqCst), 1);
        assert_eq!(second_hits.load(Ordering::SeqCst), 1);
        assert_eq!(h.api.calls(ApiOperation::GetEntry), 1);
        assert!(!second.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_takes_over_stale_loop() {
        let h = Harness::new();
        let first = h.observer(h.store.clone());
        let second = h.observer(Arc::new(h.store.attach()));
        let (callback, _) = counter();

        first
            .subscribe(observed(SysType::Entry, "e1"), callback.clone(), None)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        first.shutdown();

        second
            .subscribe(observed(SysType::Entry, "e1"), callback, None)
            .unwrap();
        assert!(!second.is_polling());

        h.clock.advance(Duration::from_secs(6));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(second.is_polling());
    }

    #[tokio::test]
    async fn test_unsubscribe_keeps_items_other_instances_watch() {
        let h = Harness::new();
        let first = h.observer(h.store.clone());
        let second = h.observer(Arc::new(h.store.attach()));
        let (callback, _) = counter();
        first.watch(&observed(SysType::Entry, "e1"), callback.clone()).unwrap();
        second.watch(&observed(SysType::Entry, "e1"), callback.clone()).unwrap();

        first.unsubscribe(EntityKind::Entry, "e1", Some(&callback)).unwrap();
        let registry = first.registry();
        assert_eq!(registry.watch_list(EntityKind::Entry).unwrap(), vec!["e1".to_string()]);
        assert!(registry.instances().unwrap()[first.instance_id()].ids.is_empty());

        second.unsubscribe_all().unwrap();
        assert!(registry.watch_list(EntityKind::Entry).unwrap().is_empty());
        assert!(second.watched().is_empty());
    }

    #[tokio::test]
    async fn test_collect_garbage_drops_dead_instances() {
        let h = Harness::new();
        let dead = h.observer(h.store.clone());
        let live = h.observer(Arc::new(h.store.attach()));
        let (callback, _) = counter();

        dead.registry().ping(dead.instance_id(), h.clock.now_millis()).unwrap();
        dead.watch(&observed(SysType::Asset, "a1"), callback).unwrap();

        h.clock.advance(Duration::from_secs(60));
        let report = live.collect_garbage().unwrap();
        assert_eq!(report.removed_instances, vec![dead.instance_id().to_string()]);
        assert_eq!(report.removed_ids, vec!["a1".to_string()]);
        assert!(live.registry().watch_list(EntityKind::Asset).unwrap().is_empty());
    }
}
