use crate::error::StoreError;
use crate::oid::ObjectId;
use crate::options::{DeleteResult, FindOptions, UpdateResult};
use crate::value::Document;
use std::fmt::Debug;

/// Synchronous document store driver.
///
/// Each call is one blocking round-trip. Implementations must report failures
/// through [`StoreError`] and must not retry on their own; single-document
/// writes are expected to be atomic.
pub trait DocumentStore: Send + Sync + Debug {
    /// Returns every document of `collection` matching `filter`.
    fn find(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError>;

    /// Returns the first matching document, if any.
    fn find_one(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> Result<Option<Document>, StoreError> {
        let options = options.clone().limit(1);
        Ok(self.find(collection, filter, &options)?.into_iter().next())
    }

    /// Inserts `document`, generating `_id` when it is absent.
    fn insert_one(&self, collection: &str, document: Document) -> Result<ObjectId, StoreError>;

    /// Applies `$set` semantics to the first matching document.
    fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        set: &Document,
    ) -> Result<UpdateResult, StoreError>;

    /// Applies `$set` semantics to every matching document.
    fn update_many(
        &self,
        collection: &str,
        filter: &Document,
        set: &Document,
    ) -> Result<UpdateResult, StoreError>;

    /// Replaces the first matching document, keeping its `_id`.
    fn replace_one(
        &self,
        collection: &str,
        filter: &Document,
        replacement: Document,
    ) -> Result<UpdateResult, StoreError>;

    fn delete_one(&self, collection: &str, filter: &Document) -> Result<DeleteResult, StoreError>;

    fn delete_many(&self, collection: &str, filter: &Document)
    -> Result<DeleteResult, StoreError>;

    /// Counts matching documents. Honours `skip`, `limit` and `max_time`.
    fn count(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> Result<u64, StoreError>;

    /// Health check used during bootstrap.
    fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
