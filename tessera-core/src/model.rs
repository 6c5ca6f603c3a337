//! Pure functions over entities.

use crate::entity::{Entity, HasSysId, Link, Sys};
use crate::enums::LifecycleStatus;

/// Content type link of an entity, if it has one.
pub fn content_type(entity: &Entity) -> Option<&Link> {
    entity.sys.content_type.as_deref()
}

/// Content type id of an entity, if it has one.
pub fn content_type_id(entity: &Entity) -> Option<&str> {
    content_type(entity).map(Link::id)
}

/// Derive the publish state from a sys block.
///
/// Precedence: archived, draft, changed, published. Missing timestamps
/// count as published.
pub fn lifecycle_status(sys: &Sys) -> LifecycleStatus {
    let is_set = |version: Option<u64>| version.is_some_and(|v| v > 0);

    if is_set(sys.archived_version) {
        return LifecycleStatus::Archived;
    }
    if !is_set(sys.published_version) {
        return LifecycleStatus::Draft;
    }
    match (sys.updated_at, sys.published_at) {
        (Some(updated), Some(published)) if updated > published => LifecycleStatus::Changed,
        _ => LifecycleStatus::Published,
    }
}

/// Element-wise equality of the `sys.id` sequences of two lists.
pub fn id_sequence_eq<A: HasSysId, B: HasSysId>(a: &[A], b: &[B]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.sys_id() == y.sys_id())
}

/// Minimal link placeholder pointing at `entity`.
pub fn to_link(entity: &Entity) -> Link {
    Link::new(entity.sys.sys_type, entity.sys.id.clone())
}
