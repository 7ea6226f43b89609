//! # Document Store
//!
//! The store-facing half of the mapping engine: the store-native value model
//! ([`Value`], [`Document`], [`ObjectId`], [`Timestamp`]), the synchronous
//! [`DocumentStore`] driver contract and [`MemoryStore`], an in-process engine
//! served under the `mem://` URL.
//!
//! ## Example
//!
//! ```rust
//! use opsdesk_store::{doc, DocumentStore, FindOptions, MemoryStore, SortOrder};
//!
//! # fn main() -> Result<(), opsdesk_store::StoreError> {
//! let store = MemoryStore::connect("mem://")?;
//! store.insert_one("departments", doc! { "name" => "Finance" })?;
//! store.insert_one("departments", doc! { "name" => "Audit" })?;
//!
//! let options = FindOptions::new().sort("name", SortOrder::Asc).limit(1);
//! let first = store.find("departments", &doc! {}, &options)?;
//! assert_eq!(first[0].get("name").and_then(|v| v.as_str()), Some("Audit"));
//! # Ok(())
//! # }
//! ```

mod driver;
mod error;
mod filter;
mod memory;
mod oid;
mod options;
mod value;

pub use driver::DocumentStore;
pub use error::{StoreError, StoreErrorExt};
pub use memory::{MEMORY_SCHEME, MemoryStore};
pub use oid::{ObjectId, Timestamp};
pub use options::{DeleteResult, FindOptions, SortOrder, UpdateResult};
pub use value::{Document, Regex, Value};
