//! Identity types for Tessera entities

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Identifier assigned by the content API (opaque, URL-safe string).
pub type EntityId = String;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Identifier of one running context (one browser tab, one process).
pub type InstanceId = String;

/// Generate a new instance id.
///
/// UUIDv7 keeps ids sortable by creation time, which makes the persisted
/// instance table readable when debugging stale registrations.
pub fn new_instance_id() -> InstanceId {
    format!("instance-{}", Uuid::now_v7())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_ids_are_unique_and_prefixed() {
        let a = new_instance_id();
        let b = new_instance_id();
        assert!(a.starts_with("instance-"));
        assert_ne!(a, b);
    }
}
