//! Recursive graph resolution.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use tessera_core::{
    project_fields, try_map_async, try_reduce_async, Entity, EntityKind, Locales, Node, TesseraError,
    TesseraResult,
};

use crate::depth::Depth;
use crate::source::EntitySource;

/// Options of one resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    pub depth: Depth,
    /// Requested locale; the default locale is used when absent.
    pub locale: Option<String>,
}

impl ResolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_depth(mut self, depth: impl Into<Depth>) -> Self {
        self.depth = depth.into();
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }
}

/// Resolves links into a localized object graph.
///
/// Fields of one entity are resolved strictly in key order, array elements
/// in element order, so cache fills happen deterministically. Independent
/// calls are not coordinated.
pub struct GraphResolver<F: ?Sized> {
    source: Arc<F>,
    locales: Locales,
}

impl<F> GraphResolver<F>
where
    F: EntitySource + ?Sized,
{
    pub fn new(source: Arc<F>, locales: Locales) -> Self {
        Self { source, locales }
    }

    pub fn locales(&self) -> &Locales {
        &self.locales
    }

    pub fn source(&self) -> &Arc<F> {
        &self.source
    }

    /// Resolve a node.
    ///
    /// Scalars and top-level sequences come back unchanged. A link whose
    /// target does not exist resolves to `null`. Fetch failures abort the
    /// whole resolution.
    pub async fn resolve(&self, node: Node, options: &ResolveOptions) -> TesseraResult<Node> {
        self.resolve_node(node, options.depth, options.locale.as_deref()).await
    }

    /// Resolve raw JSON.
    pub async fn resolve_value(&self, value: Value, options: &ResolveOptions) -> TesseraResult<Value> {
        Ok(self.resolve(Node::from_value(value), options).await?.into_value())
    }

    /// Fetch an entity by id and resolve it with the full budget.
    pub async fn resolve_id(&self, kind: EntityKind, id: &str, options: &ResolveOptions) -> TesseraResult<Option<Entity>> {
        let Some(entity) = self.source.fetch(kind, id).await? else {
            return Ok(None);
        };
        let resolved = self.resolve(Node::from_entity(entity), options).await?;
        Ok(resolved.into_entity())
    }

    fn resolve_node<'a>(&'a self, node: Node, depth: Depth, locale: Option<&'a str>) -> BoxFuture<'a, TesseraResult<Node>> {
        Box::pin(async move {
            match node {
                Node::Scalar(_) | Node::Sequence(_) => Ok(node),
                Node::Link(link) => {
                    if depth.is_exhausted() {
                        return Ok(Node::Link(link));
                    }
                    let Some(kind) = link.target_kind() else {
                        return Ok(Node::Link(link));
                    };
                    match self.source.fetch(kind, link.id()).await? {
                        Some(entity) => {
                            self.resolve_node(Node::from_entity(entity), depth.descend(), locale)
                                .await
                        }
                        None => {
                            tracing::debug!(id = %link.id(), kind = %kind, "Link target not found");
                            Ok(Node::Scalar(Value::Null))
                        }
                    }
                }
                Node::Entry(entity) => Ok(Node::Entry(self.resolve_fields(entity, depth, locale).await?)),
                Node::Asset(entity) => Ok(Node::Asset(self.resolve_fields(entity, depth, locale).await?)),
            }
        })
    }

    async fn resolve_fields(&self, entity: Entity, depth: Depth, locale: Option<&str>) -> TesseraResult<Entity> {
        let localized = project_fields(&entity.fields, &self.locales, locale);
        let child = depth.descend();

        let fields = try_reduce_async(localized, Map::new(), |mut acc, (key, value), _| async move {
            let resolved = match Node::from_value(value) {
                Node::Scalar(value) => value,
                Node::Sequence(items) => {
                    let resolved = try_map_async(items, |item, _| self.resolve_node(item, child, locale)).await?;
                    Value::Array(resolved.into_iter().map(Node::into_value).collect())
                }
                node => self.resolve_node(node, child, locale).await?.into_value(),
            };
            acc.insert(key, resolved);
            Ok::<_, TesseraError>(acc)
        })
        .await?;

        Ok(Entity::new(entity.sys, fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Mutex;
    use tessera_core::{ApiOperation, ContentApi, Link, MockContentApi};
    use tessera_storage::{InMemoryStore, ReadThroughCache};

    /// Source that records the order of fetches.
    struct RecordingSource {
        api: MockContentApi,
        fetched: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EntitySource for RecordingSource {
        async fn fetch(&self, kind: EntityKind, id: &str) -> TesseraResult<Option<Entity>> {
            self.fetched.lock().unwrap().push(id.to_string());
            match kind {
                EntityKind::Entry => self.api.get_entry(id).await,
                EntityKind::Asset => self.api.get_asset(id).await,
            }
        }
    }

    fn entity(value: Value) -> Entity {
        serde_json::from_value(value).unwrap()
    }

    fn link(link_type: &str, id: &str) -> Value {
        json!({"sys": {"type": "Link", "linkType": link_type, "id": id}})
    }

    fn recording(api: MockContentApi) -> GraphResolver<RecordingSource> {
        let source = RecordingSource {
            api,
            fetched: Mutex::new(Vec::new()),
        };
        GraphResolver::new(Arc::new(source), Locales::new("en"))
    }

    fn fetched(resolver: &GraphResolver<RecordingSource>) -> Vec<String> {
        resolver.source().fetched.lock().unwrap().clone()
    }

    fn article() -> Entity {
        entity(json!({
            "sys": {"type": "Entry", "id": "e1"},
            "fields": {
                "title": {"en": "Hello", "de": "Hallo"},
                "hero": {"en": link("Asset", "a1")}
            }
        }))
    }

    fn hero_asset() -> Entity {
        entity(json!({
            "sys": {"type": "Asset", "id": "a1"},
            "fields": {
                "file": {"en": {"url": "//cdn/hero.png"}},
                "author": {"en": link("Entry", "p1")}
            }
        }))
    }

    fn api_with_graph() -> MockContentApi {
        let api = MockContentApi::new();
        api.insert(article());
        api.insert(hero_asset());
        api.insert(entity(json!({
            "sys": {"type": "Entry", "id": "p1"},
            "fields": {"name": {"en": "Ada"}}
        })));
        api
    }

    #[tokio::test]
    async fn test_depth_one_fetches_link_and_keeps_its_links() {
        let resolver = recording(api_with_graph());
        let options = ResolveOptions::new().with_depth(1);

        let resolved = resolver.resolve(Node::from_entity(article()), &options).await.unwrap();
        let entry = resolved.as_entity().unwrap();

        assert_eq!(entry.fields["title"], json!("Hello"));
        assert_eq!(entry.fields["hero"]["sys"]["type"], json!("Asset"));
        assert_eq!(entry.fields["hero"]["fields"]["file"], json!({"url": "//cdn/hero.png"}));
        assert_eq!(entry.fields["hero"]["fields"]["author"], link("Entry", "p1"));
        assert_eq!(fetched(&resolver), vec!["a1"]);
    }

    #[tokio::test]
    async fn test_depth_zero_projects_without_following_links() {
        let resolver = recording(api_with_graph());
        let options = ResolveOptions::new().with_depth(0).with_locale("de");

        let resolved = resolver.resolve(Node::from_entity(article()), &options).await.unwrap();
        let entry = resolved.as_entity().unwrap();

        assert_eq!(entry.fields["title"], json!("Hallo"));
        assert_eq!(entry.fields["hero"], link("Asset", "a1"));
        assert!(fetched(&resolver).is_empty());
    }

    #[tokio::test]
    async fn test_entry_with_plain_date_timestamp_is_localized() {
        let resolver = recording(api_with_graph());
        let raw = json!({
            "sys": {"type": "Entry", "id": "e1", "updatedAt": "2024-01-01"},
            "fields": {"title": {"en": "Hello", "de": "Hallo"}, "hero": {"en": link("Asset", "a1")}}
        });

        let out = resolver
            .resolve_value(raw, &ResolveOptions::new().with_depth(0).with_locale("de"))
            .await
            .unwrap();

        assert_eq!(out["fields"]["title"], json!("Hallo"));
        assert_eq!(out["fields"]["hero"]["sys"]["id"], json!("a1"));

        let garbled = json!({
            "sys": {"type": "Entry", "id": "e2", "updatedAt": "last tuesday"},
            "fields": {"hero": {"en": link("Asset", "a1")}}
        });
        let out = resolver
            .resolve_value(garbled, &ResolveOptions::new().with_depth(1))
            .await
            .unwrap();
        assert_eq!(out["fields"]["hero"]["fields"]["file"], json!({"url": "//cdn/hero.png"}));
    }

    #[tokio::test]
    async fn test_unbounded_resolves_whole_graph() {
        let resolver = recording(api_with_graph());
        let resolved = resolver
            .resolve(Node::from_entity(article()), &ResolveOptions::default())
            .await
            .unwrap();
        let entry = resolved.as_entity().unwrap();

        assert_eq!(entry.fields["hero"]["fields"]["author"]["fields"]["name"], json!("Ada"));
        assert_eq!(fetched(&resolver), vec!["a1", "p1"]);
    }

    #[tokio::test]
    async fn test_link_at_top_level_is_fetched() {
        let resolver = recording(api_with_graph());
        let node = Node::Link(Link::entry("p1"));
        let resolved = resolver.resolve(node, &ResolveOptions::new().with_depth(0)).await.unwrap();
        assert!(matches!(&resolved, Node::Entry(e) if e.fields["name"] == json!("Ada")));
    }

    #[tokio::test]
    async fn test_missing_link_target_resolves_to_null() {
        let resolver = recording(MockContentApi::new());
        let resolved = resolver
            .resolve(Node::Link(Link::asset("gone")), &ResolveOptions::default())
            .await
            .unwrap();
        assert_eq!(resolved, Node::Scalar(Value::Null));
    }

    #[tokio::test]
    async fn test_sequence_fields_resolve_in_order() {
        let api = api_with_graph();
        api.insert(entity(json!({"sys": {"type": "Entry", "id": "p2"}, "fields": {"name": {"en": "Grace"}}})));
        let page = entity(json!({
            "sys": {"type": "Entry", "id": "page"},
            "fields": {
                "authors": {"en": [link("Entry", "p2"), "plain", link("Entry", "p1")]},
                "hero": {"en": link("Asset", "a1")}
            }
        }));
        let resolver = recording(api);

        let resolved = resolver
            .resolve(Node::from_entity(page), &ResolveOptions::new().with_depth(1))
            .await
            .unwrap();
        let fields = &resolved.as_entity().unwrap().fields;

        assert_eq!(fields["authors"][0]["fields"]["name"], json!("Grace"));
        assert_eq!(fields["authors"][1], json!("plain"));
        assert_eq!(fields["authors"][2]["fields"]["name"], json!("Ada"));
        assert_eq!(fetched(&resolver), vec!["p2", "p1", "a1"]);
    }

    #[tokio::test]
    async fn test_content_type_links_are_left_alone() {
        let resolver = recording(MockContentApi::new());
        let node = Node::from_value(link("ContentType", "t_article"));
        let resolved = resolver.resolve(node.clone(), &ResolveOptions::default()).await.unwrap();
        assert_eq!(resolved, node);
        assert!(fetched(&resolver).is_empty());
    }

    #[tokio::test]
    async fn test_scalars_and_sequences_pass_through() {
        let resolver = recording(api_with_graph());
        let value = json!([link("Entry", "p1"), 1]);
        let resolved = resolver.resolve_value(value.clone(), &ResolveOptions::default()).await.unwrap();
        assert_eq!(resolved, value);
        assert_eq!(
            resolver.resolve_value(json!("text"), &ResolveOptions::default()).await.unwrap(),
            json!("text")
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_resolution() {
        let api = api_with_graph();
        api.fail(ApiOperation::GetAsset);
        let resolver = recording(api);
        let result = resolver.resolve(Node::from_entity(article()), &ResolveOptions::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_resolve_id_through_cache_fetches_each_id_once() {
        let api = Arc::new(api_with_graph());
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(ReadThroughCache::with_defaults(Arc::clone(&api), store));
        let resolver = GraphResolver::new(cache, Locales::new("en"));

        let first = resolver
            .resolve_id(EntityKind::Entry, "e1", &ResolveOptions::default())
            .await
            .unwrap()
            .unwrap();
        let second = resolver
            .resolve_id(EntityKind::Entry, "e1", &ResolveOptions::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(api.calls(ApiOperation::GetEntry), 2);
        assert_eq!(api.calls(ApiOperation::GetAsset), 1);

        assert!(resolver
            .resolve_id(EntityKind::Asset, "nope", &ResolveOptions::default())
            .await
            .unwrap()
            .is_none());
    }

    fn block_on<T>(future: impl std::future::Future<Output = T>) -> T {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    proptest! {
        #[test]
        fn prop_exhausted_links_are_terminal(depth in -1000i64..0, id in "[a-z0-9]{1,12}") {
            let resolver = recording(MockContentApi::new());
            let node = Node::Link(Link::entry(id));
            let resolved = block_on(resolver.resolve(node.clone(), &ResolveOptions::new().with_depth(depth))).unwrap();
            prop_assert_eq!(resolved, node);
            prop_assert!(fetched(&resolver).is_empty());
        }

        #[test]
        fn prop_link_free_entity_resolves_to_projection(
            values in proptest::collection::btree_map("[a-z]{1,6}", ("[a-z]{0,6}", "[a-z]{0,6}"), 0..6)
        ) {
            let mut fields = Map::new();
            for (key, (en, de)) in &values {
                fields.insert(key.clone(), json!({"en": en, "de": de}));
            }
            let input = Entity::new(
                tessera_core::Sys { id: "e1".into(), sys_type: tessera_core::SysType::Entry, ..Default::default() },
                fields.clone(),
            );
            let resolver = recording(MockContentApi::new());
            let resolved = block_on(resolver.resolve(Node::from_entity(input.clone()), &ResolveOptions::new().with_locale("de"))).unwrap();
            let expected = project_fields(&fields, &Locales::new("en"), Some("de"));
            prop_assert_eq!(resolved, Node::Entry(Entity::new(input.sys, expected)));
        }
    }
}
