//! Tessera Core - Entity model and shared contracts
//!
//! Pure data types and functions over the entities served by a headless
//! content API, plus the contracts the other Tessera crates are written
//! against: the [`ContentApi`] trait, the [`Clock`] abstraction and the
//! error types.
//!
//! # Modules
//!
//! - [`entity`]: sys blocks, links, entities and the [`Node`] variant type
//! - [`locale`]: locale projection of localized fields
//! - [`model`]: lifecycle status, id-sequence equality, link conversion
//! - [`navigation`]: content type driven navigation link strategies
//! - [`async_ops`]: sequential asynchronous collection helpers
//! - [`api`]: the content API contract
//! - [`mock`]: in-memory [`ContentApi`] implementation

pub mod api;
pub mod async_ops;
pub mod clock;
pub mod entity;
pub mod enums;
pub mod error;
pub mod identity;
pub mod locale;
pub mod mock;
pub mod model;
pub mod navigation;

pub use api::{ApiOperation, Collection, ContentApi, Query, IDS_IN};
pub use async_ops::{
    filter_async, for_each_async, map_async, reduce_async, sequence_of, try_map_async, try_reduce_async,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::{is_entity, ContentType, Entity, HasSysId, Link, Node, Sys};
pub use enums::{EntityKind, EntityKindParseError, LifecycleStatus, SysType};
pub use error::{request_failed, ApiError, ConfigError, StoreError, TesseraError, TesseraResult};
pub use identity::{new_instance_id, EntityId, InstanceId, Timestamp};
pub use locale::{localize, localized_values, project_field, project_fields, Locales};
pub use mock::MockContentApi;
pub use model::{content_type, content_type_id, id_sequence_eq, lifecycle_status, to_link};
pub use navigation::{
    LinkKind, LinkOverlay, LinkPlan, LinkStrategies, LinkStrategy, LinkTarget, NavigationLink, NavigationRules,
    RuleKind,
};
