//! Audit timeline: per-mutation diffs recorded as immutable entries.

use crate::coerce::is_empty_for;
use crate::entity::Model;
use crate::error::{AuditError, AuditErrorExt};
use crate::schema::{CREATED_FIELD, ID_FIELD, LogicalType, META_FIELD, MODIFIED_FIELD};
use opsdesk_store::{Document, DocumentStore, FindOptions, ObjectId, SortOrder, Timestamp, Value};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Default collection of [`StoreTimeline`].
pub const TIMELINE_COLLECTION: &str = "timeline";

/// Kind of mutation an entry describes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TimelineEvent {
    Create,
    Update,
    Delete,
}

/// One field's transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Change {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

impl Change {
    #[must_use]
    pub const fn created(value: Value) -> Self {
        Self { old_value: None, new_value: Some(value) }
    }

    #[must_use]
    pub const fn removed(value: Value) -> Self {
        Self { old_value: Some(value), new_value: None }
    }

    fn to_document(&self) -> Document {
        let mut doc = Document::new();
        if let Some(old) = &self.old_value {
            doc.insert("oldValue".to_owned(), old.clone());
        }
        if let Some(new) = &self.new_value {
            doc.insert("newValue".to_owned(), new.clone());
        }
        doc
    }
}

/// Field name to transition, ordered by field name.
pub type Changes = BTreeMap<String, Change>;

/// Immutable audit record of one mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub resource: String,
    pub resource_id: Option<ObjectId>,
    pub event: TimelineEvent,
    pub changes: Changes,
    pub user_id: Option<ObjectId>,
    /// Request details of the acting user (address, agent, ...).
    pub user_info: Document,
    pub live: bool,
    pub timestamp: Timestamp,
}

impl TimelineEntry {
    #[must_use]
    pub fn new(
        resource: impl Into<String>,
        resource_id: Option<ObjectId>,
        event: TimelineEvent,
        changes: Changes,
    ) -> Self {
        Self {
            resource: resource.into(),
            resource_id,
            event,
            changes,
            user_id: None,
            user_info: Document::new(),
            live: true,
            timestamp: Timestamp::now(),
        }
    }

    /// Attaches the acting user.
    #[must_use]
    pub fn by(mut self, user_id: ObjectId, user_info: Document) -> Self {
        self.user_id = Some(user_id);
        self.user_info = user_info;
        self
    }

    /// Store representation.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let changes = self
            .changes
            .iter()
            .map(|(field, change)| (field.clone(), Value::Document(change.to_document())))
            .collect::<Document>();

        let mut doc = Document::new();
        doc.insert("resource".to_owned(), Value::from(self.resource.as_str()));
        doc.insert("resourceId".to_owned(), Value::from(self.resource_id));
        doc.insert("event".to_owned(), Value::from(self.event.as_ref()));
        doc.insert("changes".to_owned(), Value::Document(changes));
        doc.insert("userId".to_owned(), Value::from(self.user_id));
        doc.insert("userInfo".to_owned(), Value::Document(self.user_info.clone()));
        doc.insert("live".to_owned(), Value::Bool(self.live));
        doc.insert("created".to_owned(), Value::Timestamp(self.timestamp));
        doc
    }

    /// Reads an entry back from its store representation.
    pub fn from_document(mut doc: Document) -> Result<Self, AuditError> {
        let malformed = |field: &'static str| AuditError::Malformed {
            message: format!("missing or mistyped '{field}'").into(),
            context: None,
        };

        let resource = match doc.remove("resource") {
            Some(Value::String(resource)) => resource,
            _ => return Err(malformed("resource")),
        };
        let event = doc
            .get("event")
            .and_then(Value::as_str)
            .and_then(|e| e.parse::<TimelineEvent>().ok())
            .ok_or_else(|| malformed("event"))?;
        let timestamp = match doc.remove("created") {
            Some(Value::Timestamp(ts)) => ts,
            Some(Value::DateTime(dt)) => Timestamp::from(dt),
            _ => return Err(malformed("created")),
        };
        let changes = match doc.remove("changes") {
            Some(Value::Document(changes)) => changes
                .into_iter()
                .map(|(field, change)| {
                    let Value::Document(mut change) = change else {
                        return Err(malformed("changes"));
                    };
                    let change = Change {
                        old_value: change.remove("oldValue").map(Value::simplify),
                        new_value: change.remove("newValue").map(Value::simplify),
                    };
                    Ok((field, change))
                })
                .collect::<Result<Changes, _>>()?,
            None => Changes::new(),
            Some(_) => return Err(malformed("changes")),
        };
        let user_info = match doc.remove("userInfo") {
            Some(Value::Document(info)) => info,
            _ => Document::new(),
        };

        Ok(Self {
            resource,
            resource_id: doc.get("resourceId").and_then(Value::as_object_id),
            event,
            changes,
            user_id: doc.get("userId").and_then(Value::as_object_id),
            user_info,
            live: doc.get("live").and_then(Value::as_bool).unwrap_or(true),
            timestamp,
        })
    }
}

fn is_blank(value: Option<&Value>, kind: Option<LogicalType>) -> bool {
    value.is_none_or(|v| {
        matches!(v, Value::Null)
            || v.as_str().is_some_and(str::is_empty)
            || v.as_array().is_some_and(<[Value]>::is_empty)
            || v.as_document().is_some_and(Document::is_empty)
            || kind.is_some_and(|k| is_empty_for(v, k))
    })
}

/// Derives the change set of `instance` for `event`.
///
/// Covers declared fields (minus `_id`, `created`, `modified`), computed
/// fields and the metadata bag, never the entity's discard list. Old values come from the
/// instance's last loaded state.
#[must_use]
pub fn diff<M: Model>(instance: &M, event: TimelineEvent) -> Changes {
    let discard = M::timeline_discard();
    let preserve = M::timeline_preserve();
    let state = instance.state();

    let mut current: Vec<(&'static str, Option<LogicalType>, Option<Value>)> = M::schema()
        .fields()
        .iter()
        .filter(|f| !matches!(f.name, ID_FIELD | CREATED_FIELD | MODIFIED_FIELD))
        .map(|f| (f.name, Some(f.kind), instance.read(f.name)))
        .collect();
    if let Some(computed) = instance.as_computed() {
        let computed = computed.computed().into_iter();
        current.extend(computed.map(|(name, value)| (name, None, Some(value))));
    }
    let meta = state.meta();
    current.push((META_FIELD, None, (!meta.is_empty()).then(|| Value::Document(meta.clone()))));

    let mut changes = Changes::new();
    for (name, kind, value) in current {
        if discard.contains(&name) {
            continue;
        }
        let value = value.filter(|v| !v.is_null());
        let change = match event {
            TimelineEvent::Create => value.map(Change::created),
            TimelineEvent::Delete => value.map(Change::removed),
            TimelineEvent::Update => {
                let old = state.old(name).filter(|v| !v.is_null());
                let unchanged = match (old, value.as_ref()) {
                    (Some(old), Some(new)) => old.same_as(new),
                    (old, new) => is_blank(old, kind) && is_blank(new, kind),
                };
                if unchanged && preserve.contains(&name) {
                    Some(Change { old_value: None, new_value: value })
                } else if unchanged {
                    None
                } else {
                    Some(Change { old_value: old.cloned(), new_value: value })
                }
            },
        };
        if let Some(change) = change {
            changes.insert(name.to_owned(), change);
        }
    }
    changes
}

/// Append-only destination of timeline entries.
pub trait TimelineSink: Send + Sync + fmt::Debug {
    fn append(&self, entry: &TimelineEntry) -> Result<(), AuditError>;

    /// Entries of one resource, oldest first.
    fn history(&self, resource: &str, resource_id: &ObjectId)
    -> Result<Vec<TimelineEntry>, AuditError>;
}

/// In-process sink, mostly for tests and tooling.
#[derive(Debug, Default)]
pub struct MemoryTimeline {
    entries: Mutex<Vec<TimelineEntry>>,
}

impl MemoryTimeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded entry, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<TimelineEntry> {
        self.entries.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

impl TimelineSink for MemoryTimeline {
    fn append(&self, entry: &TimelineEntry) -> Result<(), AuditError> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }

    fn history(
        &self,
        resource: &str,
        resource_id: &ObjectId,
    ) -> Result<Vec<TimelineEntry>, AuditError> {
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|e| e.resource == resource && e.resource_id.as_ref() == Some(resource_id))
            .cloned()
            .collect())
    }
}

/// Sink writing entries into a store collection.
#[derive(Debug, Clone)]
pub struct StoreTimeline {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl StoreTimeline {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self { store, collection: collection.into() }
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl TimelineSink for StoreTimeline {
    fn append(&self, entry: &TimelineEntry) -> Result<(), AuditError> {
        self.store
            .insert_one(&self.collection, entry.to_document())
            .map(|_| ())
            .context("appending timeline entry")
    }

    fn history(
        &self,
        resource: &str,
        resource_id: &ObjectId,
    ) -> Result<Vec<TimelineEntry>, AuditError> {
        let mut filter = Document::new();
        filter.insert("resource".to_owned(), Value::from(resource));
        filter.insert("resourceId".to_owned(), Value::Id(*resource_id));
        let options = FindOptions::new().sort("created", SortOrder::Asc);
        self.store
            .find(&self.collection, &filter, &options)
            .context("reading timeline")?
            .into_iter()
            .map(TimelineEntry::from_document)
            .collect()
    }
}

enum Message {
    Entry(Box<TimelineEntry>),
    Flush(oneshot::Sender<()>),
}

struct Worker {
    sender: Option<mpsc::Sender<Message>>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("Timeline worker terminated abnormally");
        }
    }
}

enum Dispatch {
    Disabled,
    Inline(Arc<dyn TimelineSink>),
    Background { sink: Arc<dyn TimelineSink>, worker: Worker },
}

/// Hands timeline entries to a sink after a mutation committed.
///
/// Sink failures are logged at `warn` and never reach the mutating caller.
/// In background mode entries go through a bounded queue drained by a
/// dedicated thread; when the queue is full the entry is written inline.
pub struct TimelineRecorder {
    dispatch: Dispatch,
}

impl fmt::Debug for TimelineRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match &self.dispatch {
            Dispatch::Disabled => "disabled",
            Dispatch::Inline(_) => "inline",
            Dispatch::Background { .. } => "background",
        };
        f.debug_struct("TimelineRecorder").field("mode", &mode).finish()
    }
}

fn write(sink: &dyn TimelineSink, entry: &TimelineEntry) {
    match sink.append(entry) {
        Ok(()) => {
            debug!(resource = %entry.resource, event = %entry.event, "timeline entry recorded");
        },
        Err(err) => warn!(
            resource = %entry.resource,
            event = %entry.event,
            error = %err,
            "Failed to record timeline entry"
        ),
    }
}

impl TimelineRecorder {
    #[must_use]
    pub const fn disabled() -> Self {
        Self { dispatch: Dispatch::Disabled }
    }

    /// Writes on the calling thread.
    #[must_use]
    pub fn inline(sink: Arc<dyn TimelineSink>) -> Self {
        Self { dispatch: Dispatch::Inline(sink) }
    }

    /// Spawns the worker thread draining a queue of `capacity` entries.
    pub fn background(sink: Arc<dyn TimelineSink>, capacity: usize) -> Result<Self, AuditError> {
        let (sender, mut receiver) = mpsc::channel::<Message>(capacity.max(1));
        let worker_sink = Arc::clone(&sink);
        let handle = std::thread::Builder::new()
            .name("opsdesk-timeline".to_owned())
            .spawn(move || {
                while let Some(message) = receiver.blocking_recv() {
                    match message {
                        Message::Entry(entry) => write(worker_sink.as_ref(), &entry),
                        Message::Flush(done) => {
                            let _ = done.send(());
                        },
                    }
                }
                debug!("timeline worker stopped");
            })
            .map_err(|err| AuditError::Queue {
                message: err.to_string().into(),
                context: Some("spawning timeline worker".into()),
            })?;

        Ok(Self {
            dispatch: Dispatch::Background {
                sink,
                worker: Worker { sender: Some(sender), handle: Some(handle) },
            },
        })
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !matches!(self.dispatch, Dispatch::Disabled)
    }

    #[must_use]
    pub fn sink(&self) -> Option<&Arc<dyn TimelineSink>> {
        match &self.dispatch {
            Dispatch::Disabled => None,
            Dispatch::Inline(sink) | Dispatch::Background { sink, .. } => Some(sink),
        }
    }

    /// Dispatches `entry`. Never fails.
    pub fn record(&self, entry: TimelineEntry) {
        match &self.dispatch {
            Dispatch::Disabled => {},
            Dispatch::Inline(sink) => write(sink.as_ref(), &entry),
            Dispatch::Background { sink, worker } => {
                let Some(sender) = &worker.sender else {
                    write(sink.as_ref(), &entry);
                    return;
                };
                match sender.try_send(Message::Entry(Box::new(entry))) {
                    Ok(()) => {},
                    Err(mpsc::error::TrySendError::Full(Message::Entry(entry))) => {
                        debug!("timeline queue is full, writing inline");
                        write(sink.as_ref(), &entry);
                    },
                    Err(err) => warn!(error = %err, "Timeline queue rejected an entry"),
                }
            },
        }
    }

    /// Blocks until every queued entry reached the sink.
    pub fn flush(&self) -> Result<(), AuditError> {
        let Dispatch::Background { worker, .. } = &self.dispatch else {
            return Ok(());
        };
        let Some(sender) = &worker.sender else {
            return Ok(());
        };
        let (done, wait) = oneshot::channel();
        sender.blocking_send(Message::Flush(done)).map_err(|_| AuditError::Queue {
            message: "timeline worker is gone".into(),
            context: None,
        })?;
        wait.blocking_recv().map_err(|_| AuditError::Queue {
            message: "timeline worker stopped before flushing".into(),
            context: None,
        })
    }

    /// Recorded entries of one resource, after flushing the queue.
    pub fn history(
        &self,
        resource: &str,
        resource_id: &ObjectId,
    ) -> Result<Vec<TimelineEntry>, AuditError> {
        self.flush()?;
        self.sink().map_or_else(|| Ok(Vec::new()), |sink| sink.history(resource, resource_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsdesk_store::{MemoryStore, StoreError, doc};

    fn entry(event: TimelineEvent) -> (ObjectId, TimelineEntry) {
        let id = ObjectId::new();
        let mut changes = Changes::new();
        changes.insert(
            "status".to_owned(),
            Change { old_value: Some("new".into()), new_value: Some("approved".into()) },
        );
        (id, TimelineEntry::new("PurchaseRequest", Some(id), event, changes))
    }

    #[test]
    fn entries_survive_the_store_representation() {
        let (_, entry) = entry(TimelineEvent::Update);
        let entry = entry.by(ObjectId::new(), doc! { "ip" => "10.0.0.1" });
        let doc = entry.to_document();
        assert_eq!(doc.get("event"), Some(&Value::from("update")));
        let status = doc.get("changes").and_then(Value::as_document).and_then(|c| c.get("status"));
        assert_eq!(
            status,
            Some(&Value::from(doc! { "oldValue" => "new", "newValue" => "approved" }))
        );
        assert_eq!(TimelineEntry::from_document(doc).unwrap(), entry);
    }

    #[test]
    fn malformed_documents_are_rejected() {
        let err = TimelineEntry::from_document(doc! { "resource" => "X" }).unwrap_err();
        assert!(matches!(err, AuditError::Malformed { .. }));
    }

    #[test]
    fn store_timeline_filters_by_resource() {
        let sink = StoreTimeline::new(Arc::new(MemoryStore::new()), TIMELINE_COLLECTION);
        let (id, first) = entry(TimelineEvent::Create);
        sink.append(&first).unwrap();
        let (_, other) = entry(TimelineEvent::Create);
        sink.append(&other).unwrap();
        let history = sink.history("PurchaseRequest", &id).unwrap();
        assert_eq!(history, vec![first]);
    }

    #[derive(Debug)]
    struct BrokenSink;

    impl TimelineSink for BrokenSink {
        fn append(&self, _entry: &TimelineEntry) -> Result<(), AuditError> {
            Err(StoreError::Unavailable { message: "down".into(), context: None }.into())
        }

        fn history(&self, _: &str, _: &ObjectId) -> Result<Vec<TimelineEntry>, AuditError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn sink_failures_are_swallowed() {
        let (_, entry) = entry(TimelineEvent::Delete);
        TimelineRecorder::inline(Arc::new(BrokenSink)).record(entry.clone());
        let recorder = TimelineRecorder::background(Arc::new(BrokenSink), 1).unwrap();
        recorder.record(entry);
        recorder.flush().unwrap();
    }

    #[test]
    fn background_dispatch_delivers_every_entry() {
        let sink = Arc::new(MemoryTimeline::new());
        let recorder = TimelineRecorder::background(sink.clone(), 2).unwrap();
        let entries: Vec<_> = (0..10).map(|_| entry(TimelineEvent::Create).1).collect();
        for e in &entries {
            recorder.record(e.clone());
        }
        recorder.flush().unwrap();
        assert_eq!(sink.len(), 10);
        drop(recorder);
        assert_eq!(sink.entries().len(), 10);
    }

    #[test]
    fn disabled_recorder_records_nothing() {
        let recorder = TimelineRecorder::disabled();
        assert!(!recorder.is_enabled());
        recorder.record(entry(TimelineEvent::Create).1);
        assert!(recorder.history("PurchaseRequest", &ObjectId::new()).unwrap().is_empty());
    }
}
