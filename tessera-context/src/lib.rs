//! Tessera Context - consumer facade
//!
//! [`ContentContext`] bundles the read-through cache, the graph resolver and
//! the change observer behind the handful of calls a content UI needs:
//! fetch and resolve entries and assets, localize field maps, read content
//! types and display titles, subscribe to changes, build navigation links
//! and publish entries.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tessera_context::{ContentContext, ContextConfig};
//! use tessera_core::MockContentApi;
//! use tessera_resolver::ResolveOptions;
//! use tessera_storage::InMemoryStore;
//!
//! # async fn run() -> tessera_core::TesseraResult<()> {
//! let context = ContentContext::new(
//!     Arc::new(MockContentApi::new()),
//!     Arc::new(InMemoryStore::new()),
//!     ContextConfig::from_env(),
//! )?;
//! let entry = context.get_entry("home", &ResolveOptions::new().with_depth(2)).await?;
//! # let _ = entry;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod gate;
pub mod telemetry;

pub use config::{ContextConfig, DEFAULT_SUBSCRIBE_INTERVAL_MS};
pub use context::{ContentContext, ContentTypeSummary, EntityOrId, MAX_LINK_HOPS, UNTITLED};
pub use gate::ValueChangeGate;
pub use telemetry::{init_tracing, TelemetryConfig};
