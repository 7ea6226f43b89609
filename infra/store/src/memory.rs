use crate::driver::DocumentStore;
use crate::error::StoreError;
use crate::filter::{lookup, matches, project};
use crate::oid::ObjectId;
use crate::options::{DeleteResult, FindOptions, SortOrder, UpdateResult};
use crate::value::{Document, Value};
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// URL scheme served by [`MemoryStore`].
pub const MEMORY_SCHEME: &str = "mem://";

/// Process-local document store.
///
/// Collections keep insertion order, which is the natural order returned by
/// unsorted reads. An optional artificial latency makes execution-time budgets
/// observable in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<FxHashMap<String, Vec<Document>>>,
    latency: Option<Duration>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a store from a connection URL. Only `mem://` is served here.
    pub fn connect(url: &str) -> Result<Self, StoreError> {
        if url.starts_with(MEMORY_SCHEME) {
            debug!(url, "In-memory document store opened");
            Ok(Self::new())
        } else {
            Err(StoreError::Unavailable {
                message: format!("unsupported store url '{url}'").into(),
                context: Some("memory engine".into()),
            })
        }
    }

    /// Delays every read by `latency`.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of documents currently stored in `collection`.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections.read().get(collection).map_or(0, Vec::len)
    }

    fn begin(&self) -> Instant {
        let started = Instant::now();
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        started
    }

    fn check_budget(started: Instant, max_time: Option<Duration>) -> Result<(), StoreError> {
        match max_time {
            Some(max) if started.elapsed() > max => Err(StoreError::Timeout {
                message: format!("operation exceeded time limit of {} ms", max.as_millis()).into(),
                context: None,
            }),
            _ => Ok(()),
        }
    }

    fn select(
        documents: &[Document],
        filter: &Document,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let mut hits = Vec::new();
        for doc in documents {
            if matches(doc, filter)? {
                hits.push(doc);
            }
        }

        if !options.sort.is_empty() {
            hits.sort_by(|a, b| {
                for (field, order) in &options.sort {
                    let ord = Value::sort_cmp(lookup(a, field), lookup(b, field));
                    let ord = if *order == SortOrder::Desc { ord.reverse() } else { ord };
                    if ord.is_ne() {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        let skip = usize::try_from(options.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = options
            .limit
            .filter(|l| *l > 0)
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));

        Ok(hits
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| options.projection.as_ref().map_or_else(|| doc.clone(), |p| project(doc, p)))
            .collect())
    }

    fn apply_set(doc: &mut Document, set: &Document) -> Result<bool, StoreError> {
        let mut changed = false;
        for (key, value) in set {
            if key == "_id" {
                if doc.get("_id") != Some(value) {
                    return Err(StoreError::driver(
                        "update would modify the immutable field '_id'",
                    ));
                }
                continue;
            }
            if doc.get(key.as_str()) != Some(value) {
                doc.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        Ok(changed)
    }

    fn update(
        &self,
        collection: &str,
        filter: &Document,
        set: &Document,
        many: bool,
    ) -> Result<UpdateResult, StoreError> {
        let mut collections = self.collections.write();
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(UpdateResult::default());
        };
        let mut result = UpdateResult::default();
        for doc in documents.iter_mut() {
            if !matches(doc, filter)? {
                continue;
            }
            result.matched += 1;
            if Self::apply_set(doc, set)? {
                result.modified += 1;
            }
            if !many {
                break;
            }
        }
        trace!(collection, matched = result.matched, modified = result.modified, "update applied");
        Ok(result)
    }

    fn delete(
        &self,
        collection: &str,
        filter: &Document,
        many: bool,
    ) -> Result<DeleteResult, StoreError> {
        let mut collections = self.collections.write();
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(DeleteResult::default());
        };

        let mut doomed = Vec::new();
        for (index, doc) in documents.iter().enumerate() {
            if matches(doc, filter)? {
                doomed.push(index);
                if !many {
                    break;
                }
            }
        }
        for index in doomed.iter().rev() {
            documents.remove(*index);
        }
        Ok(DeleteResult { deleted: doomed.len() as u64 })
    }
}

impl DocumentStore for MemoryStore {
    fn find(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let started = self.begin();
        let found = {
            let collections = self.collections.read();
            match collections.get(collection) {
                Some(documents) => Self::select(documents, filter, options)?,
                None => Vec::new(),
            }
        };
        Self::check_budget(started, options.max_time)?;
        trace!(collection, hits = found.len(), "find executed");
        Ok(found)
    }

    fn insert_one(&self, collection: &str, mut document: Document) -> Result<ObjectId, StoreError> {
        let id = match document.get("_id") {
            None | Some(Value::Null) => ObjectId::new(),
            Some(Value::Id(id)) => *id,
            Some(other) => {
                return Err(StoreError::InvalidIdentifier {
                    message: format!("'_id' must be an object id, got {}", other.type_name())
                        .into(),
                    context: Some(collection.to_owned().into()),
                });
            },
        };
        document.insert("_id".to_owned(), Value::Id(id));

        let mut collections = self.collections.write();
        let documents = collections.entry(collection.to_owned()).or_default();
        if documents.iter().any(|d| d.get("_id") == Some(&Value::Id(id))) {
            return Err(StoreError::DuplicateKey {
                message: format!("_id {id} already exists").into(),
                context: Some(collection.to_owned().into()),
            });
        }
        documents.push(document);
        Ok(id)
    }

    fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        set: &Document,
    ) -> Result<UpdateResult, StoreError> {
        self.update(collection, filter, set, false)
    }

    fn update_many(
        &self,
        collection: &str,
        filter: &Document,
        set: &Document,
    ) -> Result<UpdateResult, StoreError> {
        self.update(collection, filter, set, true)
    }

    fn replace_one(
        &self,
        collection: &str,
        filter: &Document,
        mut replacement: Document,
    ) -> Result<UpdateResult, StoreError> {
        let mut collections = self.collections.write();
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(UpdateResult::default());
        };
        for doc in documents.iter_mut() {
            if !matches(doc, filter)? {
                continue;
            }
            let id = doc.get("_id").cloned().unwrap_or_default();
            match replacement.get("_id") {
                Some(given) if *given != id => {
                    return Err(StoreError::driver(
                        "replacement would modify the immutable field '_id'",
                    ));
                },
                _ => {},
            }
            replacement.insert("_id".to_owned(), id);
            let modified = u64::from(*doc != replacement);
            *doc = replacement;
            return Ok(UpdateResult { matched: 1, modified });
        }
        Ok(UpdateResult::default())
    }

    fn delete_one(&self, collection: &str, filter: &Document) -> Result<DeleteResult, StoreError> {
        self.delete(collection, filter, false)
    }

    fn delete_many(
        &self,
        collection: &str,
        filter: &Document,
    ) -> Result<DeleteResult, StoreError> {
        self.delete(collection, filter, true)
    }

    fn count(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> Result<u64, StoreError> {
        let started = self.begin();
        let counted = {
            let collections = self.collections.read();
            let options = FindOptions { projection: None, sort: Vec::new(), ..options.clone() };
            collections
                .get(collection)
                .map(|documents| Self::select(documents, filter, &options))
                .transpose()?
                .map_or(0, |docs| docs.len())
        };
        Self::check_budget(started, options.max_time)?;
        Ok(counted as u64)
    }
}
