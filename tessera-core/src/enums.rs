//! Enum types for Tessera entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// SYS TYPE
// ============================================================================

/// Value of `sys.type` (and `sys.linkType`) as served by the content API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SysType {
    Entry,
    Asset,
    Link,
    ContentType,
    /// Any type this crate does not model (Space, Environment, ...).
    #[default]
    #[serde(other)]
    Other,
}

impl SysType {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SysType::Entry => "Entry",
            SysType::Asset => "Asset",
            SysType::Link => "Link",
            SysType::ContentType => "ContentType",
            SysType::Other => "Other",
        }
    }
}

impl fmt::Display for SysType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// ENTITY KIND
// ============================================================================

/// The two content object kinds that can be fetched, cached and observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Entry,
    Asset,
}

impl EntityKind {
    /// Lowercase key segment used in persisted keys (`entry` / `asset`).
    pub fn as_key(&self) -> &'static str {
        match self {
            EntityKind::Entry => "entry",
            EntityKind::Asset => "asset",
        }
    }

    /// Parse from the lowercase key segment.
    pub fn from_key(s: &str) -> Result<Self, EntityKindParseError> {
        match s.to_lowercase().as_str() {
            "entry" => Ok(EntityKind::Entry),
            "asset" => Ok(EntityKind::Asset),
            _ => Err(EntityKindParseError(s.to_string())),
        }
    }

    /// Map a `sys.type` to a kind. Links must be mapped via their `linkType`.
    pub fn from_sys_type(sys_type: SysType) -> Option<Self> {
        match sys_type {
            SysType::Entry => Some(EntityKind::Entry),
            SysType::Asset => Some(EntityKind::Asset),
            _ => None,
        }
    }

    /// The `sys.type` of a full entity of this kind.
    pub fn sys_type(&self) -> SysType {
        match self {
            EntityKind::Entry => SysType::Entry,
            EntityKind::Asset => SysType::Asset,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sys_type().as_str())
    }
}

impl FromStr for EntityKind {
    type Err = EntityKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s)
    }
}

/// Error when parsing an invalid entity kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityKindParseError(pub String);

impl fmt::Display for EntityKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid entity kind: {}", self.0)
    }
}

impl std::error::Error for EntityKindParseError {}

// ============================================================================
// LIFECYCLE STATUS
// ============================================================================

/// Derived publish state of an entry or asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    /// Never published.
    Draft,
    /// Published and not edited since.
    Published,
    /// Published, with unpublished edits.
    Changed,
    /// Archived (wins over every other state).
    Archived,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Draft => "draft",
            LifecycleStatus::Published => "published",
            LifecycleStatus::Changed => "changed",
            LifecycleStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sys_type_unknown_deserializes_to_other() {
        let parsed: SysType = serde_json::from_str("\"Environment\"").unwrap();
        assert_eq!(parsed, SysType::Other);
        let parsed: SysType = serde_json::from_str("\"Link\"").unwrap();
        assert_eq!(parsed, SysType::Link);
    }

    #[test]
    fn test_entity_kind_key_roundtrip() {
        for kind in [EntityKind::Entry, EntityKind::Asset] {
            assert_eq!(EntityKind::from_key(kind.as_key()).unwrap(), kind);
        }
        assert_eq!("ASSET".parse::<EntityKind>().unwrap(), EntityKind::Asset);
        assert!("space".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_entity_kind_from_sys_type() {
        assert_eq!(EntityKind::from_sys_type(SysType::Entry), Some(EntityKind::Entry));
        assert_eq!(EntityKind::from_sys_type(SysType::Link), None);
        assert_eq!(EntityKind::Asset.to_string(), "Asset");
    }

    #[test]
    fn test_lifecycle_status_serializes_lowercase() {
        let json = serde_json::to_string(&LifecycleStatus::Changed).unwrap();
        assert_eq!(json, "\"changed\"");
        assert_eq!(LifecycleStatus::Archived.to_string(), "archived");
    }
}
