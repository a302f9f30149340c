//! Client-side entity model for semi-structured tracker data.
//!
//! Remote bug trackers hand back loosely-typed records whose schema drifts
//! between server versions. This crate keeps those records in wire form and
//! layers typed access on top: an [`Entity`] wraps a raw record and promotes
//! nested records to typed entities lazily, an [`EntityList`] offers a
//! field-driven filter/sort/aggregate algebra over entity collections, and a
//! [`DocumentBuilder`] assembles an entity graph from a stream of feed
//! element events. The [`model`] module holds the static type descriptors
//! for the tracker's own vocabulary.
//!
//! ```
//! use tracklet::{Entity, RawValue, model};
//! use serde_json::json;
//!
//! let raw = RawValue::from_json(json!({
//!     "id": "28093",
//!     "key": "PROJ-1",
//!     "priority": {"id": "3", "name": "Major"}
//! }));
//! let mut issue = Entity::from_raw(&model::ISSUE, raw).unwrap();
//!
//! let priority = issue.get_entity("priority", &model::PRIORITY).unwrap().unwrap();
//! assert_eq!(priority.get_string("name"), Some("Major"));
//! ```

pub mod builder;
pub mod entity;
pub mod list;
pub mod model;
pub mod raw;

pub use builder::{BuildError, DocumentBuilder, ElementHandler, HandlerSet};
pub use entity::{AccessorFn, DateField, Entity, EntityError, EntityType, Field};
pub use list::{Collected, EntityList, Resolved};
pub use raw::RawValue;
