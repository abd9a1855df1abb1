//! # Modelist: shaped records and homogeneous collections
//!
//! Modelist turns loosely structured JSON-like records into entities with a
//! fixed property skeleton, a declarative formatting layer, and change
//! observation, plus collections that keep every element the same type.
//!
//! ## Features
//!
//! - **Entity types**: runtime schemas with a skeleton, default rules and lifecycle hooks
//! - **Format engine**: literal, path and callback rules resolved against the source record
//! - **Observation**: explicit change events for property writes and collection indexes
//! - **Collections**: coercion, strict shape checking, sorting, grouping and deduplication
//!
//! ## Example
//!
//! ```
//! use modelist::{Collection, EntityType, RuleSet};
//! use serde_json::json;
//!
//! let album = EntityType::new("Album")
//!     .with_field("title", "")
//!     .with_field("category", "")
//!     .with_rules(&RuleSet::new().with_path("category", ["categoryId"]))
//!     .into_shared();
//!
//! let albums = Collection::from_json(
//!     json!([{"title": "Blue", "categoryId": "jazz"}]),
//!     Some(album),
//! )
//! .unwrap();
//!
//! assert_eq!(albums.to_json(), json!([{"title": "Blue", "category": "jazz"}]));
//! ```

pub mod collection;
pub mod config;
pub mod entity;
pub mod format;
pub mod logging;
pub mod observe;
pub mod path;
pub mod rule;
pub mod serialization;
pub mod value;

// Re-export key types
pub use collection::{Collection, CollectionError, SortOrder};
pub use config::{ConfigError, ModelistConfig, RuleFile};
pub use entity::{Entity, EntityHooks, EntityType, Lifecycle};
pub use observe::{ChangeEvent, ListChange};
pub use path::{FieldPath, PathSegment};
pub use rule::{Rule, RuleFn, RuleSet};
pub use serialization::{JsonArrayWriter, NdjsonWriter, SerializationError};
pub use value::FieldValue;
