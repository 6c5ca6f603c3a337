//! Tessera Observer - change notifications for watched entities
//!
//! [`ChangeObserver`] polls the content API for the entries and assets that
//! callbacks are registered for and runs those callbacks when an item's
//! `publishedAt`/`updatedAt` pair moves. Registrations, the last known
//! timestamps and a liveness table are persisted in a shared
//! [`KeyValueStore`](tessera_storage::KeyValueStore), so several contexts on
//! one store share a single poll loop and clean up after each other.
//!
//! # Modules
//!
//! - [`observer`]: the observer, subscription handles and metrics
//! - [`registry`]: typed access to the persisted keys
//! - [`callbacks`]: in-memory callback registry
//! - [`schedule`]: recurring tasks with cancellation
//! - [`gc`]: throttled cleanup of dead instances

pub mod callbacks;
pub mod config;
pub mod gc;
pub mod keys;
pub mod observer;
pub mod registry;
pub mod schedule;

pub use callbacks::{CallbackRegistry, ChangeCallback, WatchKey};
pub use config::ObserverConfig;
pub use gc::{sweep, GcReport, Throttle};
pub use keys::ObserverKeys;
pub use observer::{ChangeObserver, Observed, ObserverMetrics, ObserverSnapshot, PollReport, Subscription};
pub use registry::{InstanceRecord, InstanceTable, LastKnown, Registry};
pub use schedule::{RecurringTask, TickOutcome};
