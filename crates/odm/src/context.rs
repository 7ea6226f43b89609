use crate::cache::CacheLayer;
use crate::entity::Model;
use crate::error::OdmError;
use crate::schema::{Registry, Schema};
use crate::timeline::{
    Changes, StoreTimeline, TIMELINE_COLLECTION, TimelineEntry, TimelineEvent, TimelineRecorder,
    TimelineSink,
};
use opsdesk_cache::{CacheBackend, MokaBackend};
use opsdesk_domain::config::{AppConfig, AuditDispatch};
use opsdesk_store::{Document, DocumentStore, MEMORY_SCHEME, MemoryStore, ObjectId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// The user on whose behalf mutations run.
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    pub user_id: ObjectId,
    /// Request details copied into timeline entries.
    pub info: Document,
}

#[derive(Debug)]
struct OdmInner {
    store: Arc<dyn DocumentStore>,
    cache: CacheLayer,
    timeline: TimelineRecorder,
    registry: Registry,
    max_time: Option<Duration>,
}

/// Explicit handle to the store, the read cache, the timeline and the
/// schema registry.
///
/// Built once per process and cloned cheaply into request handlers; a
/// request-scoped copy carries the acting user (see [`Odm::acting_as`]).
#[derive(Debug, Clone)]
pub struct Odm {
    inner: Arc<OdmInner>,
    actor: Option<Arc<Actor>>,
}

impl Odm {
    #[must_use]
    pub fn builder() -> OdmBuilder {
        OdmBuilder::default()
    }

    /// Builder preconfigured from the application configuration.
    ///
    /// `mem://` store URLs open a [`MemoryStore`]; other schemes are
    /// rejected, use [`OdmBuilder::store`] to plug another driver.
    pub fn from_config(config: &AppConfig) -> Result<OdmBuilder, OdmError> {
        OdmBuilder::from_config(config)
    }

    /// Request-scoped copy recording `user_id` as the acting user.
    #[must_use]
    pub fn acting_as(&self, user_id: ObjectId, info: Document) -> Self {
        Self { inner: Arc::clone(&self.inner), actor: Some(Arc::new(Actor { user_id, info })) }
    }

    #[must_use]
    pub fn actor(&self) -> Option<&Actor> {
        self.actor.as_deref()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.store
    }

    #[must_use]
    pub fn cache(&self) -> &CacheLayer {
        &self.inner.cache
    }

    #[must_use]
    pub fn timeline(&self) -> &TimelineRecorder {
        &self.inner.timeline
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Default read budget applied when a read sets none.
    #[must_use]
    pub fn max_time(&self) -> Option<Duration> {
        self.inner.max_time
    }

    /// Field descriptors of a registered entity.
    pub fn describe(&self, entity: &str) -> Result<&'static Schema, OdmError> {
        self.inner.registry.describe(entity)
    }

    /// Schema of `M`, which must have been registered at build time.
    pub(crate) fn schema<M: Model>(&self) -> Result<&'static Schema, OdmError> {
        self.describe(M::schema().entity())
    }

    /// Hands the change set of one mutation to the timeline, unless the
    /// event is blocked for `M`.
    pub(crate) fn record<M: Model>(
        &self,
        id: Option<ObjectId>,
        event: TimelineEvent,
        changes: Changes,
    ) {
        if !self.inner.timeline.is_enabled() || M::blocked_events().contains(&event) {
            return;
        }
        let mut entry = TimelineEntry::new(M::resource_name(), id, event, changes);
        if let Some(actor) = &self.actor {
            entry = entry.by(actor.user_id, actor.info.clone());
        }
        self.inner.timeline.record(entry);
    }
}

/// Builder for [`Odm`].
#[derive(Debug)]
pub struct OdmBuilder {
    store: Option<Arc<dyn DocumentStore>>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
    cache_ttl: Duration,
    timeline_sink: Option<Arc<dyn TimelineSink>>,
    timeline_collection: String,
    audit_enabled: bool,
    audit_dispatch: AuditDispatch,
    queue_capacity: usize,
    max_time: Option<Duration>,
    schemas: Vec<&'static Schema>,
}

impl Default for OdmBuilder {
    fn default() -> Self {
        Self {
            store: None,
            cache_backend: None,
            cache_ttl: Duration::from_secs(300),
            timeline_sink: None,
            timeline_collection: TIMELINE_COLLECTION.to_owned(),
            audit_enabled: true,
            audit_dispatch: AuditDispatch::Inline,
            queue_capacity: 1024,
            max_time: None,
            schemas: Vec::new(),
        }
    }
}

impl OdmBuilder {
    pub fn from_config(config: &AppConfig) -> Result<Self, OdmError> {
        let url = config.store.url.as_str();
        if !url.starts_with(MEMORY_SCHEME) {
            return Err(OdmError::Configuration {
                message: format!("unsupported store url '{url}'").into(),
                context: Some("store.url".into()),
            });
        }
        let mut builder = Self::default()
            .store(Arc::new(MemoryStore::connect(url)?))
            .audit_enabled(config.audit.enabled)
            .audit_dispatch(config.audit.dispatch)
            .queue_capacity(config.audit.queue_capacity)
            .timeline_collection(config.audit.collection.clone());
        builder.max_time = config.store.max_time();

        if config.cache.enabled {
            let backend = MokaBackend::builder()
                .namespace(config.cache.namespace.clone())
                .max_capacity(config.cache.max_capacity)
                .build();
            builder = builder.cache_backend(Arc::new(backend)).cache_ttl(config.cache.ttl());
        }
        Ok(builder)
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    /// Time-to-live of cached reads; zero keeps entries until evicted.
    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Timeline destination; defaults to the store's timeline collection.
    #[must_use]
    pub fn timeline_sink(mut self, sink: Arc<dyn TimelineSink>) -> Self {
        self.timeline_sink = Some(sink);
        self
    }

    #[must_use]
    pub fn timeline_collection(mut self, collection: impl Into<String>) -> Self {
        self.timeline_collection = collection.into();
        self
    }

    #[must_use]
    pub const fn audit_enabled(mut self, enabled: bool) -> Self {
        self.audit_enabled = enabled;
        self
    }

    #[must_use]
    pub const fn audit_dispatch(mut self, dispatch: AuditDispatch) -> Self {
        self.audit_dispatch = dispatch;
        self
    }

    #[must_use]
    pub const fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    /// Adds `M` to the registry validated by [`OdmBuilder::build`].
    #[must_use]
    pub fn register<M: Model>(mut self) -> Self {
        self.schemas.push(M::schema());
        self
    }

    /// Validates every registered schema, checks the store and starts the
    /// timeline dispatcher.
    pub fn build(self) -> Result<Odm, OdmError> {
        let store = self.store.ok_or_else(|| OdmError::Configuration {
            message: "a document store is required".into(),
            context: None,
        })?;

        let mut registry = Registry::default();
        for schema in self.schemas {
            registry.register(schema)?;
            debug!(entity = schema.entity(), fields = schema.fields().len(), "schema registered");
        }

        store.ping()?;

        let cache = self
            .cache_backend
            .map_or_else(CacheLayer::disabled, |backend| CacheLayer::new(backend, self.cache_ttl));

        let timeline = if self.audit_enabled {
            let sink = self.timeline_sink.unwrap_or_else(|| {
                Arc::new(StoreTimeline::new(Arc::clone(&store), self.timeline_collection))
            });
            match self.audit_dispatch {
                AuditDispatch::Inline => TimelineRecorder::inline(sink),
                AuditDispatch::Background => TimelineRecorder::background(sink, self.queue_capacity)
                    .map_err(|err| OdmError::Configuration {
                        message: err.to_string().into(),
                        context: Some("audit".into()),
                    })?,
            }
        } else {
            TimelineRecorder::disabled()
        };

        info!(
            entities = registry.entities().count(),
            cache = cache.is_enabled(),
            timeline = ?timeline,
            "ODM context ready"
        );

        Ok(Odm {
            inner: Arc::new(OdmInner { store, cache, timeline, registry, max_time: self.max_time }),
            actor: None,
        })
    }
}
