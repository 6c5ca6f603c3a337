//! Tessera Resolver - linked entity graphs
//!
//! The content API returns references between entries and assets as
//! unresolved links. [`GraphResolver`] exchanges them for the referenced
//! entities, recursively and depth-bounded, projecting every entity's fields
//! into one locale on the way.
//!
//! # Depth
//!
//! `depth` counts remaining hops. Crossing a link and descending into a
//! field each cost one hop; a link is followed while the budget is zero or
//! more. With `depth = 0` an entity's own fields are projected and links in
//! them are left as links; with `depth = 1` those links are fetched and the
//! fetched entities' own links are left as links.

mod depth;
mod resolver;
mod source;

pub use depth::Depth;
pub use resolver::{GraphResolver, ResolveOptions};
pub use source::EntitySource;
