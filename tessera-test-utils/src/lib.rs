//! Tessera Test Utilities
//!
//! Shared test infrastructure for the Tessera workspace:
//! - Proptest generators for entities, links and locale maps
//! - A seeded content graph on top of the mock content API
//! - Assertions for Tessera error kinds

// Re-export the in-memory doubles from their source crates
pub use tessera_core::{ManualClock, MockContentApi};
pub use tessera_storage::InMemoryStore;

// Re-export core types for convenience
pub use tessera_core::{
    ApiError, ConfigError, ContentType, Entity, EntityId, EntityKind, Link, Node, StoreError, Sys, SysType,
    TesseraError, TesseraResult, Timestamp,
};

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

/// Fixed reference instant all fixtures are dated relative to (2024-01-01).
pub const EPOCH_SECS: i64 = 1_704_067_200;

/// Timestamp `secs` seconds after [`EPOCH_SECS`].
pub fn at(secs: i64) -> Timestamp {
    DateTime::from_timestamp(EPOCH_SECS + secs, 0).unwrap_or_else(Utc::now)
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating Tessera values.

    use super::*;
    use proptest::prelude::*;

    /// Generate an API-style entity id.
    pub fn arb_entity_id() -> impl Strategy<Value = EntityId> {
        "[a-zA-Z0-9]{1,22}".prop_map(|s| s)
    }

    /// Generate a locale code from a small fixed set.
    pub fn arb_locale() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["en", "de", "fr", "it"]).prop_map(str::to_string)
    }

    /// Generate a Timestamp within 2020-2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now))
    }

    /// Generate a non-empty `{locale: text}` map.
    pub fn arb_locale_map() -> impl Strategy<Value = Value> {
        prop::collection::btree_map(arb_locale(), "[a-zA-Z ]{0,20}", 1..4).prop_map(|map| {
            Value::Object(map.into_iter().map(|(locale, text)| (locale, Value::String(text))).collect())
        })
    }

    /// Generate an entry or asset sys type.
    pub fn arb_entity_sys_type() -> impl Strategy<Value = SysType> {
        prop_oneof![Just(SysType::Entry), Just(SysType::Asset)]
    }

    /// Generate a link to an entry or asset.
    pub fn arb_link() -> impl Strategy<Value = Link> {
        (arb_entity_sys_type(), arb_entity_id()).prop_map(|(link_type, id)| Link::new(link_type, id))
    }

    /// Generate a sys block with arbitrary lifecycle metadata.
    pub fn arb_sys() -> impl Strategy<Value = Sys> {
        (
            arb_entity_id(),
            arb_entity_sys_type(),
            prop::option::of(0u64..5),
            prop::option::of(0u64..5),
            prop::option::of(arb_timestamp()),
            prop::option::of(arb_timestamp()),
        )
            .prop_map(
                |(id, sys_type, published_version, archived_version, published_at, updated_at)| Sys {
                    id,
                    sys_type,
                    published_version,
                    archived_version,
                    published_at,
                    updated_at,
                    ..Default::default()
                },
            )
    }

    /// Generate an entry whose fields are all locale maps.
    pub fn arb_entry() -> impl Strategy<Value = Entity> {
        (
            arb_entity_id(),
            arb_timestamp(),
            prop::collection::btree_map("[a-z]{1,8}", arb_locale_map(), 0..5),
        )
            .prop_map(|(id, updated_at, fields)| {
                Entity::new(
                    Sys {
                        id,
                        sys_type: SysType::Entry,
                        published_version: Some(1),
                        published_at: Some(updated_at),
                        updated_at: Some(updated_at),
                        ..Default::default()
                    },
                    fields.into_iter().collect(),
                )
            })
    }

    /// Generate a list of link values, possibly with repeated ids.
    pub fn arb_link_list() -> impl Strategy<Value = Value> {
        prop::collection::vec(arb_link(), 0..6).prop_map(|links| {
            Value::Array(links.into_iter().map(|link| json!({"sys": link.sys})).collect())
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built entities and a seeded content graph.

    use super::*;

    fn object(fields: Value) -> Map<String, Value> {
        match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn published_sys(id: &str, sys_type: SysType) -> Sys {
        Sys {
            id: id.to_string(),
            sys_type,
            published_version: Some(1),
            published_at: Some(at(0)),
            updated_at: Some(at(0)),
            ..Default::default()
        }
    }

    /// Published entry of `content_type` with the given field map.
    pub fn entry(id: &str, content_type: &str, fields: Value) -> Entity {
        let mut sys = published_sys(id, SysType::Entry);
        sys.content_type = Some(Box::new(Link::new(SysType::ContentType, content_type)));
        Entity::new(sys, object(fields))
    }

    /// Published asset with the given field map.
    pub fn asset(id: &str, fields: Value) -> Entity {
        Entity::new(published_sys(id, SysType::Asset), object(fields))
    }

    /// Raw link placeholder to an entry.
    pub fn entry_link(id: &str) -> Value {
        json!({"sys": {"type": "Link", "linkType": "Entry", "id": id}})
    }

    /// Raw link placeholder to an asset.
    pub fn asset_link(id: &str) -> Value {
        json!({"sys": {"type": "Link", "linkType": "Asset", "id": id}})
    }

    pub fn content_type(id: &str, name: &str, display_field: Option<&str>) -> ContentType {
        ContentType {
            sys: Sys {
                id: id.to_string(),
                sys_type: SysType::ContentType,
                ..Default::default()
            },
            name: name.to_string(),
            display_field: display_field.map(str::to_string),
            description: None,
            fields: Vec::new(),
        }
    }

    /// Copy of `entity` updated `secs` seconds after the epoch.
    pub fn updated(entity: &Entity, secs: i64) -> Entity {
        let mut entity = entity.clone();
        entity.sys.updated_at = Some(at(secs));
        entity
    }

    /// Content types of the seeded graph.
    pub fn content_types() -> Vec<ContentType> {
        vec![
            content_type("t_page", "Page", Some("name")),
            content_type("t_article", "Article", Some("title")),
            content_type("o_dialog", "Dialog", Some("title")),
            content_type("h_externalLink", "External link", Some("title")),
            content_type("x_teaser", "Teaser", None),
        ]
    }

    /// Entries and assets of the seeded graph.
    ///
    /// - `home` (t_page) links `teaser`, `article` and the missing `gone`
    /// - `article` (t_article) links the asset `hero` and back to `home`
    /// - `dialog` (o_dialog)
    /// - `external` (h_externalLink) references `article`
    /// - `outbound` (h_externalLink) carries a plain url
    pub fn graph() -> Vec<Entity> {
        vec![
            entry(
                "home",
                "t_page",
                json!({
                    "name": {"en": "Home", "de": "Startseite"},
                    "slug": {"en": "home", "de": "start"},
                    "teaser": {"en": entry_link("teaser")},
                    "related": {"en": [entry_link("article"), entry_link("gone")]}
                }),
            ),
            entry(
                "article",
                "t_article",
                json!({
                    "title": {"en": "Saving", "de": "Sparen"},
                    "slug": {"en": "saving"},
                    "image": {"en": asset_link("hero")},
                    "parent": {"en": entry_link("home")}
                }),
            ),
            entry("teaser", "x_teaser", json!({"headline": {"en": "Teaser"}})),
            entry("dialog", "o_dialog", json!({"title": {"en": "Contact", "de": "Kontakt"}})),
            entry(
                "external",
                "h_externalLink",
                json!({
                    "title": {"en": "Read more"},
                    "reference": {"en": entry_link("article")},
                    "useBlank": {"en": true}
                }),
            ),
            entry(
                "outbound",
                "h_externalLink",
                json!({
                    "title": {"en": "Example"},
                    "url": {"en": "https://example.com"}
                }),
            ),
            asset(
                "hero",
                json!({
                    "title": {"en": "Hero image"},
                    "file": {"en": {"url": "//images.example.com/hero.jpg"}}
                }),
            ),
        ]
    }

    /// Mock API holding [`graph`] and [`content_types`].
    pub fn seeded_api() -> MockContentApi {
        let api = MockContentApi::new();
        for content_type in content_types() {
            api.insert_content_type(content_type);
        }
        for entity in graph() {
            api.insert(entity);
        }
        api
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Tessera error kinds.

    use super::*;

    /// Assert that a result is Ok.
    pub fn assert_ok<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got {:?}", result);
    }

    /// Assert that a result is an API error.
    pub fn assert_api_error<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        assert!(
            matches!(result, Err(TesseraError::Api(_))),
            "Expected API error, got {:?}",
            result
        );
    }

    /// Assert that a result is a config error.
    pub fn assert_config_error<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        assert!(
            matches!(result, Err(TesseraError::Config(_))),
            "Expected Config error, got {:?}",
            result
        );
    }

    /// Assert that a result is a store error.
    pub fn assert_store_error<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        assert!(
            matches!(result, Err(TesseraError::Store(_))),
            "Expected Store error, got {:?}",
            result
        );
    }
}
