#![allow(dead_code)]

use chrono::{DateTime, Utc};
use opsdesk_odm::{
    AuditError, CacheBackend, CacheError, CacheKeyTemplate, ComputedFields, DeleteResult, Document,
    DocumentStore, FindOptions, MemoryStore, MemoryTimeline, MokaBackend, Model, ObjectId, Odm,
    StoreError, TimelineEntry, TimelineEvent, TimelineSink, UpdateResult, Value, model,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

model! {
    /// Every logical type in one entity.
    pub struct Widget {
        name: String => Text [indexed, required],
        active: bool => Boolean,
        qty: i64 => Integer,
        price: f64 => Decimal,
        tags: Vec<Value> => Array,
        owner: ObjectId => Identifier [indexed],
        watchers: Vec<ObjectId> => ArrayOfIdentifiers,
        due: DateTime<Utc> => Datetime,
    }
}

impl Model for Widget {
    const COLLECTION: &'static str = "widgets";
}

model! {
    pub struct Ticket {
        status: String => Text [indexed],
        note: String => Text,
        owner: ObjectId => Identifier,
        watchers: Vec<ObjectId> => ArrayOfIdentifiers,
    }
}

impl Model for Ticket {
    const COLLECTION: &'static str = "tickets";

    fn cache_keys() -> Vec<CacheKeyTemplate> {
        vec![CacheKeyTemplate::by_id(), CacheKeyTemplate::new().bind("owner", "%s")]
    }

    fn timeline_preserve() -> &'static [&'static str] {
        &["status"]
    }

    fn timeline_discard() -> &'static [&'static str] {
        &["note"]
    }

    fn as_computed(&self) -> Option<&dyn ComputedFields> {
        Some(self)
    }
}

impl ComputedFields for Ticket {
    fn computed(&self) -> Vec<(&'static str, Value)> {
        let count = self.watchers.as_ref().map_or(0, Vec::len);
        vec![("watcher_count", Value::from(count))]
    }
}

model! {
    pub struct Quiet {
        label: String => Text,
    }
}

impl Model for Quiet {
    const COLLECTION: &'static str = "quiet";

    fn blocked_events() -> &'static [TimelineEvent] {
        &[TimelineEvent::Update, TimelineEvent::Delete]
    }

    fn timeline_discard() -> &'static [&'static str] {
        &["meta"]
    }
}

/// Memory store counting reads, able to fail writes on demand.
#[derive(Debug, Default)]
pub struct ProbeStore {
    pub inner: MemoryStore,
    pub reads: AtomicUsize,
    pub fail_writes: AtomicBool,
}

impl ProbeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { inner: MemoryStore::new().with_latency(latency), ..Self::default() }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn write_gate(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "connection refused".into(),
                context: Some("probe".into()),
            });
        }
        Ok(())
    }
}

impl DocumentStore for ProbeStore {
    fn find(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find(collection, filter, options)
    }

    fn insert_one(&self, collection: &str, document: Document) -> Result<ObjectId, StoreError> {
        self.write_gate()?;
        self.inner.insert_one(collection, document)
    }

    fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        set: &Document,
    ) -> Result<UpdateResult, StoreError> {
        self.write_gate()?;
        self.inner.update_one(collection, filter, set)
    }

    fn update_many(
        &self,
        collection: &str,
        filter: &Document,
        set: &Document,
    ) -> Result<UpdateResult, StoreError> {
        self.write_gate()?;
        self.inner.update_many(collection, filter, set)
    }

    fn replace_one(
        &self,
        collection: &str,
        filter: &Document,
        replacement: Document,
    ) -> Result<UpdateResult, StoreError> {
        self.write_gate()?;
        self.inner.replace_one(collection, filter, replacement)
    }

    fn delete_one(&self, collection: &str, filter: &Document) -> Result<DeleteResult, StoreError> {
        self.write_gate()?;
        self.inner.delete_one(collection, filter)
    }

    fn delete_many(
        &self,
        collection: &str,
        filter: &Document,
    ) -> Result<DeleteResult, StoreError> {
        self.write_gate()?;
        self.inner.delete_many(collection, filter)
    }

    fn count(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> Result<u64, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.count(collection, filter, options)
    }
}

/// Cache service that is always down.
#[derive(Debug)]
pub struct DownCache;

impl CacheBackend for DownCache {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::Unavailable { message: "no route to host".into(), context: None })
    }

    fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<bool, CacheError> {
        Err(CacheError::Unavailable { message: "no route to host".into(), context: None })
    }

    fn erase(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Unavailable { message: "no route to host".into(), context: None })
    }

    fn flush(&self) -> Result<bool, CacheError> {
        Err(CacheError::Unavailable { message: "no route to host".into(), context: None })
    }
}

/// Timeline sink that rejects every write.
#[derive(Debug)]
pub struct BrokenSink;

impl TimelineSink for BrokenSink {
    fn append(&self, _entry: &TimelineEntry) -> Result<(), AuditError> {
        Err(StoreError::Unavailable { message: "timeline store is down".into(), context: None }
            .into())
    }

    fn history(&self, _: &str, _: &ObjectId) -> Result<Vec<TimelineEntry>, AuditError> {
        Ok(Vec::new())
    }
}

pub struct Harness {
    pub odm: Odm,
    pub store: Arc<ProbeStore>,
    pub timeline: Arc<MemoryTimeline>,
    pub cache: Arc<MokaBackend>,
}

pub fn harness_with(store: ProbeStore) -> Harness {
    let store = Arc::new(store);
    let timeline = Arc::new(MemoryTimeline::new());
    let cache = Arc::new(MokaBackend::builder().namespace("test_").build());
    let odm = Odm::builder()
        .store(store.clone())
        .cache_backend(cache.clone())
        .timeline_sink(timeline.clone())
        .register::<Widget>()
        .register::<Ticket>()
        .register::<Quiet>()
        .build()
        .unwrap();
    Harness { odm, store, timeline, cache }
}

pub fn harness() -> Harness {
    harness_with(ProbeStore::new())
}

pub fn widget(name: &str) -> Widget {
    let mut widget = Widget::default();
    widget.name = Some(name.to_owned());
    widget
}
