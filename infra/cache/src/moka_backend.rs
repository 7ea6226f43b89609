use crate::backend::CacheBackend;
use crate::error::CacheError;
use moka::Expiry;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Default key namespace.
pub const DEFAULT_NAMESPACE: &str = "opsdesk_";
/// Default upper bound of cached entries.
pub const DEFAULT_MAX_CAPACITY: u64 = 10_000;

#[derive(Debug, Clone)]
struct Entry {
    payload: Arc<[u8]>,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        (!value.ttl.is_zero()).then_some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        (!value.ttl.is_zero()).then_some(value.ttl)
    }
}

/// In-process cache backend on top of `moka`.
///
/// Keys are prefixed with the configured namespace so several applications
/// can share one logical cache without colliding.
#[derive(Clone)]
pub struct MokaBackend {
    namespace: Arc<str>,
    cache: Cache<String, Entry>,
}

impl std::fmt::Debug for MokaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaBackend")
            .field("namespace", &self.namespace)
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl MokaBackend {
    pub fn builder() -> MokaBackendBuilder {
        MokaBackendBuilder::default()
    }

    /// Applies the namespace prefix to `key`.
    #[must_use]
    pub fn make_key(&self, key: &str) -> String {
        format!("{}{key}", self.namespace)
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Number of live entries (approximate until pending tasks run).
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl CacheBackend for MokaBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let entry = self.cache.get(&self.make_key(key));
        trace!(key, hit = entry.is_some(), "cache lookup");
        Ok(entry.map(|e| e.payload.to_vec()))
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, CacheError> {
        self.cache.insert(self.make_key(key), Entry { payload: value.into(), ttl });
        Ok(true)
    }

    fn erase(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(&self.make_key(key));
        Ok(())
    }

    fn flush(&self) -> Result<bool, CacheError> {
        self.cache.invalidate_all();
        debug!(namespace = %self.namespace, "cache flushed");
        Ok(true)
    }
}

/// Builder for [`MokaBackend`].
#[derive(Debug, Clone)]
pub struct MokaBackendBuilder {
    namespace: String,
    max_capacity: u64,
}

impl Default for MokaBackendBuilder {
    fn default() -> Self {
        Self { namespace: DEFAULT_NAMESPACE.to_owned(), max_capacity: DEFAULT_MAX_CAPACITY }
    }
}

impl MokaBackendBuilder {
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub const fn max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    #[must_use]
    pub fn build(self) -> MokaBackend {
        let cache = Cache::builder()
            .max_capacity(self.max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        debug!(
            namespace = %self.namespace,
            max_capacity = self.max_capacity,
            "moka cache backend ready"
        );
        MokaBackend { namespace: self.namespace.into(), cache }
    }
}
