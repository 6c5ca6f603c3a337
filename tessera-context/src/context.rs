//! The consumer facade.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_core::{
    content_type_id, localized_values, ApiError, Clock, ConfigError, ContentApi, ContentType, Entity, EntityId,
    EntityKind, LinkPlan, LinkStrategies, Locales, NavigationLink, Node, Sys, SystemClock, TesseraError,
    TesseraResult,
};
use tessera_observer::{ChangeCallback, ChangeObserver, Observed, Subscription};
use tessera_resolver::{GraphResolver, ResolveOptions};
use tessera_storage::{KeyValueStore, ReadThroughCache};
use tokio::sync::OnceCell;

use crate::config::ContextConfig;

/// Title shown for entries whose content type is unknown.
pub const UNTITLED: &str = "Untitled";

/// Display field used when a content type names none.
const FALLBACK_DISPLAY_FIELD: &str = "-";

/// Longest chain of link entities followed when building a navigation link.
///
/// Each hop resolves the referenced entry at depth 1 instead of resolving
/// the starting entry at unbounded depth, so cyclic references end here
/// rather than recursing forever.
pub const MAX_LINK_HOPS: usize = 4;

/// An entity in hand, or the id of one to fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityOrId {
    Entity(Entity),
    Id(EntityId),
}

impl From<Entity> for EntityOrId {
    fn from(entity: Entity) -> Self {
        EntityOrId::Entity(entity)
    }
}

impl From<&Entity> for EntityOrId {
    fn from(entity: &Entity) -> Self {
        EntityOrId::Entity(entity.clone())
    }
}

impl From<&str> for EntityOrId {
    fn from(id: &str) -> Self {
        EntityOrId::Id(id.to_string())
    }
}

impl From<String> for EntityOrId {
    fn from(id: String) -> Self {
        EntityOrId::Id(id)
    }
}

/// Id and name of a content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTypeSummary {
    pub id: String,
    pub name: String,
}

/// Everything a consumer needs to read, resolve and watch content.
///
/// Owns the read-through cache, the resolver on top of it and this
/// context's change observer. Construct one per context and share it by
/// reference.
pub struct ContentContext<A: ?Sized, S: ?Sized> {
    api: Arc<A>,
    cache: Arc<ReadThroughCache<A, S>>,
    resolver: GraphResolver<ReadThroughCache<A, S>>,
    observer: Arc<ChangeObserver<A, S>>,
    config: ContextConfig,
    link_strategies: OnceCell<LinkStrategies>,
}

impl<A: ?Sized, S: ?Sized> std::fmt::Debug for ContentContext<A, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentContext")
            .field("config", &self.config)
            .field("observer", &self.observer)
            .finish_non_exhaustive()
    }
}

impl<A, S> ContentContext<A, S>
where
    A: ContentApi + ?Sized + 'static,
    S: KeyValueStore + ?Sized + 'static,
{
    pub fn new(api: Arc<A>, store: Arc<S>, config: ContextConfig) -> TesseraResult<Self> {
        Self::with_clock(api, store, config, Arc::new(SystemClock))
    }

    /// Create a context whose observer reads time from `clock`.
    pub fn with_clock(api: Arc<A>, store: Arc<S>, config: ContextConfig, clock: Arc<dyn Clock>) -> TesseraResult<Self> {
        config.validate()?;

        let cache = Arc::new(ReadThroughCache::new(api.clone(), store.clone(), config.cache.clone()));
        let resolver = GraphResolver::new(cache.clone(), config.locales.clone());
        let observer = Arc::new(ChangeObserver::with_clock(
            api.clone(),
            store,
            config.observer.clone(),
            clock,
        )?);

        tracing::info!(
            instance_id = %observer.instance_id(),
            default_locale = %config.locales.default,
            "Content context created"
        );

        Ok(Self {
            api,
            cache,
            resolver,
            observer,
            config,
            link_strategies: OnceCell::new(),
        })
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn cache(&self) -> &Arc<ReadThroughCache<A, S>> {
        &self.cache
    }

    pub fn resolver(&self) -> &GraphResolver<ReadThroughCache<A, S>> {
        &self.resolver
    }

    pub fn observer(&self) -> &Arc<ChangeObserver<A, S>> {
        &self.observer
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn locales(&self) -> &Locales {
        &self.config.locales
    }

    // ------------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------------

    /// Resolve an entry, fetching it through the cache when given an id.
    pub async fn get_entry(
        &self,
        target: impl Into<EntityOrId>,
        options: &ResolveOptions,
    ) -> TesseraResult<Option<Entity>> {
        self.get_entity(EntityKind::Entry, target.into(), options).await
    }

    /// Resolve an asset, fetching it through the cache when given an id.
    pub async fn get_asset(
        &self,
        target: impl Into<EntityOrId>,
        options: &ResolveOptions,
    ) -> TesseraResult<Option<Entity>> {
        self.get_entity(EntityKind::Asset, target.into(), options).await
    }

    async fn get_entity(
        &self,
        kind: EntityKind,
        target: EntityOrId,
        options: &ResolveOptions,
    ) -> TesseraResult<Option<Entity>> {
        let entity = match target {
            EntityOrId::Entity(entity) => entity,
            EntityOrId::Id(id) => match self.cache.get_entity(kind, &id).await? {
                Some(entity) => entity,
                None => return Ok(None),
            },
        };
        // Re-classify so that link placeholders handed in are followed.
        let resolved = self
            .resolver
            .resolve(Node::from_value(entity.into_value()), options)
            .await?;
        Ok(resolved.into_entity())
    }

    /// Localized view of a raw entity's fields.
    pub fn get_value(&self, entity: &Value, locale: Option<&str>) -> Value {
        localized_values(entity, &self.config.locales, locale)
    }

    pub async fn get_content_type(&self, id: &str) -> TesseraResult<Option<ContentType>> {
        self.cache.get_content_type(id).await
    }

    /// Content type an entity links to.
    pub async fn content_type_of(&self, entity: &Entity) -> TesseraResult<Option<ContentType>> {
        match content_type_id(entity) {
            Some(id) => self.get_content_type(id).await,
            None => Ok(None),
        }
    }

    /// Title of an entry, read from its content type's display field.
    ///
    /// [`UNTITLED`] when the entry, its content type or the title value is
    /// missing.
    pub async fn get_display_title(&self, target: impl Into<EntityOrId>, locale: Option<&str>) -> TesseraResult<String> {
        let entity = match target.into() {
            EntityOrId::Entity(entity) => entity,
            EntityOrId::Id(id) => match self.cache.get_entry(&id).await? {
                Some(entity) => entity,
                None => return Ok(UNTITLED.to_string()),
            },
        };
        let Some(content_type) = self.content_type_of(&entity).await? else {
            return Ok(UNTITLED.to_string());
        };

        let mut options = ResolveOptions::new().with_depth(0);
        if let Some(locale) = locale {
            options = options.with_locale(locale);
        }
        let resolved = self.resolver.resolve(Node::from_entity(entity), &options).await?;

        let field = content_type
            .display_field
            .as_deref()
            .unwrap_or(FALLBACK_DISPLAY_FIELD);
        let title = resolved
            .as_entity()
            .and_then(|entity| entity.fields.get(field))
            .and_then(display_text);
        Ok(title.unwrap_or_else(|| UNTITLED.to_string()))
    }

    // ------------------------------------------------------------------------
    // Watching
    // ------------------------------------------------------------------------

    /// Call `callback` whenever the entity or link `target` points at
    /// changes. Changed snapshots are written to the cache first.
    ///
    /// `Ok(None)` when `target` is not an entry or asset with an id.
    pub fn subscribe<F>(&self, target: &Sys, callback: F) -> TesseraResult<Option<Subscription<A, S>>>
    where
        F: Fn(&Entity) + Send + Sync + 'static,
    {
        let Some(observed) = Observed::from_sys(target) else {
            tracing::debug!(id = %target.id, sys_type = %target.sys_type, "Target cannot be observed");
            return Ok(None);
        };

        let cache = self.cache.clone();
        let wrapped: ChangeCallback = Arc::new(move |entity: &Entity| {
            if !entity.id().is_empty() {
                if let Err(e) = cache.store(entity.id(), entity) {
                    tracing::warn!(id = %entity.id(), error = %e, "Failed to cache changed entity");
                }
            }
            callback(entity);
        });

        self.observer
            .subscribe(observed, wrapped, Some(self.config.subscribe_interval))
            .map(Some)
    }

    /// Drop every callback this context registered for one item.
    ///
    /// To drop a single callback use [`Subscription::unsubscribe`] or
    /// [`unsubscribe_callback`](Self::unsubscribe_callback).
    pub fn unsubscribe(&self, kind: EntityKind, id: &str) -> TesseraResult<()> {
        self.observer.unsubscribe(kind, id, None)
    }

    /// Drop one callback for one item, leaving the others registered.
    ///
    /// `callback` is the registered callback as returned by
    /// [`Subscription::callback`]; the closure passed to
    /// [`subscribe`](Self::subscribe) is wrapped and never matches itself.
    pub fn unsubscribe_callback(&self, kind: EntityKind, id: &str, callback: &ChangeCallback) -> TesseraResult<()> {
        self.observer.unsubscribe(kind, id, Some(callback))
    }

    pub fn unsubscribe_all(&self) -> TesseraResult<()> {
        self.observer.unsubscribe_all()
    }

    pub fn shutdown(&self) {
        self.observer.shutdown();
    }

    // ------------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------------

    /// Link strategies of the space's content types, resolved on first use.
    pub async fn link_strategies(&self) -> TesseraResult<&LinkStrategies> {
        self.link_strategies
            .get_or_try_init(|| async {
                let content_types = self.cache.refresh_content_types().await?;
                Ok::<_, TesseraError>(
                    self.config
                        .navigation
                        .resolve(content_types.iter().map(ContentType::id)),
                )
            })
            .await
    }

    /// Navigation link of an entry. `None` when its content type has no
    /// link strategy or a referenced entry is missing.
    pub async fn navigation_link(
        &self,
        target: impl Into<EntityOrId>,
        locale: Option<&str>,
    ) -> TesseraResult<Option<NavigationLink>> {
        let mut options = ResolveOptions::new().with_depth(1);
        if let Some(locale) = locale {
            options = options.with_locale(locale);
        }
        let Some(entity) = self.get_entity(EntityKind::Entry, target.into(), &options).await? else {
            return Ok(None);
        };
        self.link_for(entity, &options, MAX_LINK_HOPS).await
    }

    fn link_for<'a>(
        &'a self,
        entity: Entity,
        options: &'a ResolveOptions,
        hops: usize,
    ) -> BoxFuture<'a, TesseraResult<Option<NavigationLink>>> {
        Box::pin(async move {
            let Some(plan) = self.link_strategies().await?.plan(&entity) else {
                return Ok(None);
            };
            let (reference, overlay) = match plan {
                LinkPlan::Ready(link) => return Ok(Some(link)),
                LinkPlan::Follow { reference, overlay } => (reference, overlay),
            };
            if hops == 0 {
                tracing::warn!(id = %entity.id(), "Navigation link references nest too deep");
                return Ok(None);
            }

            let referenced = match Node::from_value(reference) {
                Node::Link(link) => {
                    let kind = link.target_kind().unwrap_or(EntityKind::Entry);
                    self.get_entity(kind, EntityOrId::Id(link.id().to_string()), options)
                        .await?
                }
                node => node.into_entity(),
            };
            let Some(referenced) = referenced else {
                return Ok(None);
            };

            let base = self.link_for(referenced, options, hops - 1).await?;
            Ok(base.map(|base| overlay.apply(base)))
        })
    }

    // ------------------------------------------------------------------------
    // Publishing and content types
    // ------------------------------------------------------------------------

    /// Re-fetch an entry from the API, bypassing the cache, and publish it.
    pub async fn deploy(&self, entry_id: &str) -> TesseraResult<Entity> {
        let Some(entry) = self.api.get_entry(entry_id).await? else {
            return Err(ApiError::PublishFailed {
                id: entry_id.to_string(),
                reason: "entry not found".to_string(),
            }
            .into());
        };
        self.api.publish_entry(&entry).await?;
        tracing::info!(id = %entry_id, "Entry deployed");
        Ok(entry)
    }

    /// Id and name of every content type whose id matches `pattern`.
    pub async fn content_types_matching(&self, pattern: &str) -> TesseraResult<Vec<ContentTypeSummary>> {
        let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let content_types = self.api.get_content_types().await?;
        Ok(content_types
            .items
            .into_iter()
            .filter(|content_type| regex.is_match(content_type.id()))
            .map(|content_type| ContentTypeSummary {
                id: content_type.id().to_string(),
                name: content_type.name,
            })
            .collect())
    }
}

fn display_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_text() {
        assert_eq!(display_text(&json!("Home")), Some("Home".to_string()));
        assert_eq!(display_text(&json!(3)), Some("3".to_string()));
        assert_eq!(display_text(&json!("")), None);
        assert_eq!(display_text(&json!({"en": "x"})), None);
        assert_eq!(display_text(&Value::Null), None);
    }

    #[test]
    fn test_entity_or_id_conversions() {
        assert_eq!(EntityOrId::from("e1"), EntityOrId::Id("e1".to_string()));
        let entity: Entity = serde_json::from_value(json!({"sys": {"id": "e1", "type": "Entry"}})).unwrap();
        assert_eq!(EntityOrId::from(&entity), EntityOrId::Entity(entity));
    }
}
