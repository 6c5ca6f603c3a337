//! Persisted key layout.

use tessera_core::EntityKind;

/// Names of the persisted observer keys under one prefix.
///
/// - `{prefix}-time`: last poll run, epoch millis
/// - `{prefix}-instances`: instance table
/// - `{prefix}ed-{kind}`: watch list of one kind
/// - `{prefix}ed-{kind}-{id}`: last known timestamps of one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverKeys {
    prefix: String,
}

impl ObserverKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn last_run(&self) -> String {
        format!("{}-time", self.prefix)
    }

    pub fn instances(&self) -> String {
        format!("{}-instances", self.prefix)
    }

    pub fn watch_list(&self, kind: EntityKind) -> String {
        format!("{}ed-{}", self.prefix, kind.as_key())
    }

    pub fn last_known(&self, kind: EntityKind, id: &str) -> String {
        format!("{}ed-{}-{}", self.prefix, kind.as_key(), id)
    }

    /// Inverse of [`last_known`](Self::last_known).
    pub fn parse_last_known(&self, key: &str) -> Option<(EntityKind, String)> {
        let rest = key.strip_prefix(&self.prefix)?.strip_prefix("ed-")?;
        let (kind, id) = rest.split_once('-')?;
        if id.is_empty() {
            return None;
        }
        let kind = EntityKind::from_key(kind).ok()?;
        Some((kind, id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let keys = ObserverKeys::new("tessera-observe");
        assert_eq!(keys.last_run(), "tessera-observe-time");
        assert_eq!(keys.instances(), "tessera-observe-instances");
        assert_eq!(keys.watch_list(EntityKind::Asset), "tessera-observed-asset");
        assert_eq!(keys.last_known(EntityKind::Entry, "e-1"), "tessera-observed-entry-e-1");
    }

    #[test]
    fn test_parse_last_known() {
        let keys = ObserverKeys::new("tessera-observe");
        assert_eq!(
            keys.parse_last_known("tessera-observed-entry-e-1"),
            Some((EntityKind::Entry, "e-1".to_string()))
        );
        assert_eq!(
            keys.parse_last_known("tessera-observed-asset-a1"),
            Some((EntityKind::Asset, "a1".to_string()))
        );
        assert_eq!(keys.parse_last_known("tessera-observed-entry"), None);
        assert_eq!(keys.parse_last_known("tessera-observe-time"), None);
        assert_eq!(keys.parse_last_known("tessera-observed-space-x"), None);
        assert_eq!(keys.parse_last_known("other-observed-entry-e1"), None);
    }
}
