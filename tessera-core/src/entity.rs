//! Entity shapes served by the content API.
//!
//! The API hands out loosely-structured JSON. Everything that flows through
//! the resolver is classified once into a [`Node`], so downstream code matches
//! on variants instead of sniffing object shapes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::enums::{EntityKind, SysType};
use crate::identity::{EntityId, Timestamp};

// ============================================================================
// SYS BLOCK
// ============================================================================

/// Identity and lifecycle metadata carried by every entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Sys {
    #[serde(default)]
    pub id: EntityId,
    #[serde(rename = "type", default)]
    pub sys_type: SysType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<SysType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<Box<Link>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_version: Option<u64>,
    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing_if = "Option::is_none")]
    pub published_at: Option<Timestamp>,
    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
    /// Everything else the API sends (space, environment, locale, revision...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parse a sys timestamp, accepting RFC 3339 and plain dates.
///
/// Anything else is logged and dropped rather than failing the whole block.
pub fn parse_timestamp(value: &Value) -> Option<Timestamp> {
    let raw = match value {
        Value::Null => return None,
        Value::String(raw) => raw,
        other => {
            tracing::warn!(value = %other, "Ignoring non-string sys timestamp");
            return None;
        }
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Some(midnight) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Some(midnight.and_utc());
    }
    tracing::warn!(value = %raw, "Ignoring unparseable sys timestamp");
    None
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(parse_timestamp))
}

impl Sys {
    /// Sys block rebuilt field by field from raw JSON.
    ///
    /// Used when the typed parse fails; fields of the wrong shape are
    /// dropped and unknown keys kept in `extra`.
    pub fn salvage(raw: &Map<String, Value>, sys_type: SysType) -> Self {
        let version = |key: &str| raw.get(key).and_then(Value::as_u64);
        let timestamp = |key: &str| raw.get(key).and_then(parse_timestamp);
        let known = [
            "id",
            "type",
            "linkType",
            "contentType",
            "publishedVersion",
            "archivedVersion",
            "publishedAt",
            "updatedAt",
        ];
        Self {
            id: raw.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
            sys_type,
            link_type: raw
                .get("linkType")
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
            content_type: raw
                .get("contentType")
                .and_then(|v| serde_json::from_value::<Link>(v.clone()).ok())
                .map(Box::new),
            published_version: version("publishedVersion"),
            archived_version: version("archivedVersion"),
            published_at: timestamp("publishedAt"),
            updated_at: timestamp("updatedAt"),
            extra: raw
                .iter()
                .filter(|(key, _)| !known.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }

    /// Minimal sys block of a link placeholder.
    pub fn link(link_type: SysType, id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            sys_type: SysType::Link,
            link_type: Some(link_type),
            ..Default::default()
        }
    }

    /// Entry/asset kind this block describes, following `linkType` for links.
    pub fn kind(&self) -> Option<EntityKind> {
        match self.sys_type {
            SysType::Link => self.link_type.and_then(EntityKind::from_sys_type),
            other => EntityKind::from_sys_type(other),
        }
    }
}

// ============================================================================
// LINK / ENTITY
// ============================================================================

/// Unresolved reference to another entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub sys: Sys,
}

impl Link {
    pub fn new(link_type: SysType, id: impl Into<EntityId>) -> Self {
        Self {
            sys: Sys::link(link_type, id),
        }
    }

    pub fn entry(id: impl Into<EntityId>) -> Self {
        Self::new(SysType::Entry, id)
    }

    pub fn asset(id: impl Into<EntityId>) -> Self {
        Self::new(SysType::Asset, id)
    }

    pub fn id(&self) -> &str {
        &self.sys.id
    }

    /// Kind of the referenced entity, `None` for content-type or unknown links.
    pub fn target_kind(&self) -> Option<EntityKind> {
        self.sys.link_type.and_then(EntityKind::from_sys_type)
    }
}

/// A full entry or asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub sys: Sys,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Entity {
    pub fn new(sys: Sys, fields: Map<String, Value>) -> Self {
        Self { sys, fields }
    }

    pub fn id(&self) -> &str {
        &self.sys.id
    }

    pub fn kind(&self) -> Option<EntityKind> {
        self.sys.kind()
    }

    /// Parse an entity from raw JSON, `None` when the value is not one.
    pub fn from_value(value: Value) -> Option<Self> {
        if !is_entity(&value) {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    pub fn into_value(self) -> Value {
        let mut object = Map::new();
        object.insert("sys".to_string(), sys_to_value(&self.sys));
        object.insert("fields".to_string(), Value::Object(self.fields));
        Value::Object(object)
    }
}

/// Content type descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentType {
    pub sys: Sys,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<Value>,
}

impl ContentType {
    pub fn id(&self) -> &str {
        &self.sys.id
    }
}

/// True iff `value` is a keyed structure containing a `sys` key.
pub fn is_entity(value: &Value) -> bool {
    value.as_object().is_some_and(|o| o.contains_key("sys"))
}

fn sys_to_value(sys: &Sys) -> Value {
    serde_json::to_value(sys).unwrap_or_default()
}

fn parse_entity(value: Value, sys_type: SysType) -> Entity {
    match serde_json::from_value::<Entity>(value.clone()) {
        Ok(entity) => entity,
        Err(e) => {
            tracing::warn!(sys_type = %sys_type, error = %e, "Salvaging malformed entity");
            salvage_entity(value, sys_type)
        }
    }
}

fn salvage_entity(value: Value, sys_type: SysType) -> Entity {
    let Value::Object(mut object) = value else {
        return Entity::new(Sys { sys_type, ..Default::default() }, Map::new());
    };
    let sys = match object.remove("sys") {
        Some(Value::Object(raw)) => Sys::salvage(&raw, sys_type),
        _ => Sys { sys_type, ..Default::default() },
    };
    let fields = match object.remove("fields") {
        Some(Value::Object(fields)) => fields,
        _ => Map::new(),
    };
    Entity::new(sys, fields)
}

// ============================================================================
// NODE
// ============================================================================

/// A value in the content graph, classified once.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Terminal value (including malformed entities).
    Scalar(Value),
    Link(Link),
    Entry(Entity),
    Asset(Entity),
    Sequence(Vec<Node>),
}

impl Node {
    /// Classify a raw JSON value.
    ///
    /// Classification keys on `sys.type` alone. Entries, assets and links
    /// whose sys block has fields of the wrong shape are salvaged rather
    /// than rejected. A `sys` that is not an object, and sys blocks of other
    /// types (content types, spaces), are scalars.
    pub fn from_value(value: Value) -> Node {
        if let Value::Array(items) = value {
            return Node::Sequence(items.into_iter().map(Node::from_value).collect());
        }
        let sys_type = match value.get("sys").and_then(|sys| sys.get("type")).and_then(Value::as_str) {
            Some("Link") => SysType::Link,
            Some("Entry") => SysType::Entry,
            Some("Asset") => SysType::Asset,
            _ => return Node::Scalar(value),
        };
        match sys_type {
            SysType::Link => match serde_json::from_value::<Link>(value.clone()) {
                Ok(link) => Node::Link(link),
                Err(_) => Node::Link(Link { sys: salvage_entity(value, sys_type).sys }),
            },
            SysType::Asset => Node::Asset(parse_entity(value, sys_type)),
            _ => Node::Entry(parse_entity(value, sys_type)),
        }
    }

    /// Wrap a full entity in the matching variant.
    pub fn from_entity(entity: Entity) -> Node {
        match entity.sys.sys_type {
            SysType::Asset => Node::Asset(entity),
            SysType::Entry => Node::Entry(entity),
            _ => Node::Scalar(entity.into_value()),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Node::Scalar(value) => value,
            Node::Link(link) => {
                let mut object = Map::new();
                object.insert("sys".to_string(), sys_to_value(&link.sys));
                Value::Object(object)
            }
            Node::Entry(entity) | Node::Asset(entity) => entity.into_value(),
            Node::Sequence(items) => Value::Array(items.into_iter().map(Node::into_value).collect()),
        }
    }

    pub fn is_entity(&self) -> bool {
        matches!(self, Node::Link(_) | Node::Entry(_) | Node::Asset(_))
    }

    pub fn sys(&self) -> Option<&Sys> {
        match self {
            Node::Link(link) => Some(&link.sys),
            Node::Entry(entity) | Node::Asset(entity) => Some(&entity.sys),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Node::Entry(entity) | Node::Asset(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn into_entity(self) -> Option<Entity> {
        match self {
            Node::Entry(entity) | Node::Asset(entity) => Some(entity),
            _ => None,
        }
    }
}

impl From<Entity> for Node {
    fn from(entity: Entity) -> Self {
        Node::from_entity(entity)
    }
}

impl From<Link> for Node {
    fn from(link: Link) -> Self {
        Node::Link(link)
    }
}

// ============================================================================
// SYS ID ACCESS
// ============================================================================

/// Anything that may carry a `sys.id`.
pub trait HasSysId {
    fn sys_id(&self) -> Option<&str>;
}

impl HasSysId for Sys {
    fn sys_id(&self) -> Option<&str> {
        Some(self.id.as_str())
    }
}

impl HasSysId for Link {
    fn sys_id(&self) -> Option<&str> {
        Some(self.id())
    }
}

impl HasSysId for Entity {
    fn sys_id(&self) -> Option<&str> {
        Some(self.id())
    }
}

impl HasSysId for Node {
    fn sys_id(&self) -> Option<&str> {
        self.sys().map(|sys| sys.id.as_str())
    }
}

impl HasSysId for Value {
    fn sys_id(&self) -> Option<&str> {
        self.get("sys").and_then(|sys| sys.get("id")).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_classifies_link_entry_asset() {
        let link = Node::from_value(json!({"sys": {"type": "Link", "linkType": "Asset", "id": "a1"}}));
        assert!(matches!(&link, Node::Link(l) if l.target_kind() == Some(EntityKind::Asset)));

        let entry = Node::from_value(json!({"sys": {"type": "Entry", "id": "e1"}, "fields": {}}));
        assert!(matches!(entry, Node::Entry(_)));

        let asset = Node::from_value(json!({"sys": {"type": "Asset", "id": "a1"}}));
        assert!(matches!(asset, Node::Asset(_)));
    }

    #[test]
    fn test_node_without_sys_is_scalar() {
        let node = Node::from_value(json!({"title": "plain"}));
        assert_eq!(node, Node::Scalar(json!({"title": "plain"})));
        assert!(!node.is_entity());
    }

    #[test]
    fn test_node_with_malformed_sys_is_scalar() {
        let raw = json!({"sys": "broken"});
        assert!(is_entity(&raw));
        assert_eq!(Node::from_value(raw.clone()), Node::Scalar(raw));

    }

    #[test]
    fn test_unparseable_timestamps_do_not_demote_entities() {
        let bad_date = json!({"sys": {"type": "Entry", "id": "e1", "updatedAt": "yesterday"}});
        match Node::from_value(bad_date) {
            Node::Entry(entity) => {
                assert_eq!(entity.id(), "e1");
                assert_eq!(entity.sys.updated_at, None);
            }
            other => panic!("expected entry, got {:?}", other),
        }

        let plain_date = json!({"sys": {"type": "Asset", "id": "a1", "publishedAt": "2024-01-01"}});
        let asset = Node::from_value(plain_date).into_entity().unwrap();
        assert_eq!(asset.sys.published_at.map(|t| t.timestamp()), Some(1_704_067_200));
    }

    #[test]
    fn test_malformed_sys_fields_are_salvaged() {
        let raw = json!({
            "sys": {"type": "Entry", "id": "e1", "publishedVersion": "three", "space": {"id": "s1"}},
            "fields": {"title": {"en": "Hello"}}
        });
        match Node::from_value(raw) {
            Node::Entry(entity) => {
                assert_eq!(entity.id(), "e1");
                assert_eq!(entity.sys.published_version, None);
                assert_eq!(entity.sys.extra["space"], json!({"id": "s1"}));
                assert_eq!(entity.fields["title"], json!({"en": "Hello"}));
            }
            other => panic!("expected entry, got {:?}", other),
        }

        let odd_link = json!({"sys": {"type": "Link", "linkType": "Entry", "id": 7}});
        assert!(matches!(Node::from_value(odd_link), Node::Link(_)));
    }

    #[test]
    fn test_node_sequence_classifies_elements() {
        let node = Node::from_value(json!([
            {"sys": {"type": "Link", "linkType": "Entry", "id": "e1"}},
            "text",
            3
        ]));
        match node {
            Node::Sequence(items) => {
                assert!(matches!(items[0], Node::Link(_)));
                assert_eq!(items[1], Node::Scalar(json!("text")));
                assert_eq!(items[2], Node::Scalar(json!(3)));
            }
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_content_type_sys_is_scalar() {
        let node = Node::from_value(json!({"sys": {"type": "ContentType", "id": "t_article"}}));
        assert!(matches!(node, Node::Scalar(_)));
    }

    #[test]
    fn test_into_value_keeps_extra_sys_fields() {
        let raw = json!({
            "sys": {"type": "Entry", "id": "e1", "revision": 4, "locale": "en"},
            "fields": {"title": "Hello"}
        });
        let value = Node::from_value(raw).into_value();
        assert_eq!(value["sys"]["revision"], json!(4));
        assert_eq!(value["sys"]["id"], json!("e1"));
        assert_eq!(value["fields"]["title"], json!("Hello"));
    }

    #[test]
    fn test_link_into_value_is_minimal() {
        let value = Node::Link(Link::entry("e9")).into_value();
        assert_eq!(value, json!({"sys": {"id": "e9", "type": "Link", "linkType": "Entry"}}));
    }

    #[test]
    fn test_sys_id_on_raw_values() {
        assert_eq!(json!({"sys": {"id": "x"}}).sys_id(), Some("x"));
        assert_eq!(json!("x").sys_id(), None);
    }

    #[test]
    fn test_entity_from_value_requires_sys() {
        assert!(Entity::from_value(json!({"fields": {}})).is_none());
        let entity = Entity::from_value(json!({"sys": {"type": "Entry", "id": "e1"}})).unwrap();
        assert_eq!(entity.id(), "e1");
        assert!(entity.fields.is_empty());
    }
}
