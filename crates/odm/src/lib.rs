//! # Document-Object Mapping
//!
//! Maps typed entity structs onto a schemaless document store.
//!
//! * [`Schema`] / [`Registry`]: static field descriptors per entity type,
//!   validated when the [`Odm`] context is built.
//! * [`coerce`] / [`suppress_if_empty`]: logical-type conversion and the
//!   empty-value rules applied on write.
//! * [`translate_filter`] / [`translate_projection`]: caller filters into
//!   store filters.
//! * [`encode`] / [`decode`] and the [`Repository`] API: persistence with
//!   per-field dirty tracking.
//! * [`TimelineRecorder`]: one audit entry per successful mutation,
//!   best-effort.
//! * [`CacheLayer`]: read-through cache invalidated by per-entity templates.
//!
//! ## Example
//!
//! ```rust
//! use opsdesk_odm::{doc, model, Model, Odm, Repository, MemoryStore, MemoryTimeline};
//! use std::sync::Arc;
//!
//! model! {
//!     pub struct Tag {
//!         name: String => Text [indexed],
//!         active: bool => Boolean,
//!     }
//! }
//!
//! impl Model for Tag {
//!     const COLLECTION: &'static str = "tags";
//! }
//!
//! # fn main() -> Result<(), opsdesk_odm::OdmError> {
//! let timeline = Arc::new(MemoryTimeline::new());
//! let odm = Odm::builder()
//!     .store(Arc::new(MemoryStore::new()))
//!     .timeline_sink(timeline.clone())
//!     .register::<Tag>()
//!     .build()?;
//!
//! let mut tag = Tag::default();
//! tag.name = Some("urgent".to_owned());
//! tag.active = Some(true);
//! tag.save(&odm)?;
//!
//! let loaded = Tag::first(&odm, doc! { "name" => "urgent" }, &[], None)?;
//! assert_eq!(loaded.map(|t| t.id), Some(tag.id));
//! assert_eq!(timeline.len(), 1);
//! # Ok(())
//! # }
//! ```

mod cache;
mod coerce;
mod context;
mod entity;
mod error;
mod macros;
mod mapper;
mod query;
mod repository;
mod schema;
mod timeline;

pub use cache::{
    ALL_SUFFIX, COUNT_SUFFIX, CacheLayer, CacheLookup, FIRST_SUFFIX, cache_key, options_suffix,
};
pub use coerce::{coerce, decode_value, is_empty_for, parse_datetime, suppress_if_empty};
pub use context::{Actor, Odm, OdmBuilder};
pub use entity::{
    CacheKeyTemplate, ComputedFields, EntityState, FieldAccessor, FieldValue, Model, TemplateValue,
};
pub use error::{AuditError, AuditErrorExt, OdmError, OdmErrorExt};
pub use mapper::{decode, encode, modify_query};
pub use query::{ReadOptions, ResultSet, normalize_key, translate_filter, translate_projection};
pub use repository::Repository;
pub use schema::{
    CREATED_FIELD, FieldDescriptor, ID_ALIAS, ID_FIELD, LIVE_FIELD, LogicalType, META_FIELD,
    MODIFIED_FIELD, Registry, Schema,
};
pub use timeline::{
    Change, Changes, MemoryTimeline, StoreTimeline, TIMELINE_COLLECTION, TimelineEntry,
    TimelineEvent, TimelineRecorder, TimelineSink, diff,
};

pub use opsdesk_cache::{CacheBackend, CacheError, MokaBackend};
pub use opsdesk_domain::config::AuditDispatch;
pub use opsdesk_store::{
    DeleteResult, Document, DocumentStore, FindOptions, MemoryStore, ObjectId, Regex, SortOrder,
    StoreError, Timestamp, UpdateResult, Value, doc,
};

#[doc(hidden)]
pub mod __private {
    pub use chrono;

    pub type UtcDateTime = chrono::DateTime<chrono::Utc>;
}
