//! Read-through cache in front of the store, invalidated per entity.

use crate::entity::Model;
use crate::error::OdmError;
use crate::query::{ReadOptions, translate_filter, translate_projection};
use opsdesk_cache::{CacheBackend, CacheError};
use opsdesk_store::Document;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

/// Key suffix of single-document reads.
pub const FIRST_SUFFIX: &str = "";
/// Key suffix of list reads.
pub const ALL_SUFFIX: &str = "_all";
/// Key suffix of counts.
pub const COUNT_SUFFIX: &str = "_cc";

/// Outcome of a raw cache lookup. `Hit(None)` is a cached "no document",
/// distinct from `Miss`.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    Hit(T),
    Miss,
}

/// Deterministic key of a query shape: entity name plus a SHA-256 over the
/// normalized filter and projection.
pub fn cache_key(
    entity: &str,
    filter: &Document,
    projection: Option<&Document>,
) -> Result<String, CacheError> {
    let shape = serde_json::to_vec(&(entity, filter, projection)).map_err(|err| CacheError::Codec {
        message: err.to_string().into(),
        context: Some(entity.to_owned().into()),
    })?;
    Ok(format!("{entity}_{}", hex::encode(Sha256::digest(&shape))))
}

/// Key suffix separating list reads with non-default read options.
pub fn options_suffix(options: &ReadOptions) -> Result<String, CacheError> {
    let encoded = serde_json::to_vec(options)
        .map_err(|err| CacheError::Codec { message: err.to_string().into(), context: None })?;
    let digest = hex::encode(Sha256::digest(&encoded));
    Ok(format!("_{}", &digest[..16]))
}

/// Cache service wrapper used by the read paths.
///
/// Backend and codec failures are logged at `warn` and degrade to direct
/// store reads; they never fail the caller.
#[derive(Debug, Clone)]
pub struct CacheLayer {
    backend: Option<Arc<dyn CacheBackend>>,
    ttl: Duration,
}

impl Default for CacheLayer {
    fn default() -> Self {
        Self::disabled()
    }
}

impl CacheLayer {
    #[must_use]
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend: Some(backend), ttl }
    }

    /// Every read goes straight to the store.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { backend: None, ttl: Duration::ZERO }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Looks `key` up without computing anything.
    pub fn lookup<T: DeserializeOwned>(&self, key: &str) -> CacheLookup<T> {
        let Some(backend) = &self.backend else {
            return CacheLookup::Miss;
        };
        match backend.get(key) {
            Ok(Some(payload)) => match serde_json::from_slice(&payload) {
                Ok(value) => {
                    trace!(key, "cache hit");
                    CacheLookup::Hit(value)
                },
                Err(err) => {
                    warn!(key, error = %err, "Discarding undecodable cache entry");
                    CacheLookup::Miss
                },
            },
            Ok(None) => {
                trace!(key, "cache miss");
                CacheLookup::Miss
            },
            Err(err) => {
                warn!(key, error = %err, "Cache unavailable, reading from store");
                CacheLookup::Miss
            },
        }
    }

    /// Stores `value` under `key` with the layer's TTL.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) {
        let Some(backend) = &self.backend else {
            return;
        };
        let payload = match serde_json::to_vec(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(key, error = %err, "Cannot encode cache entry");
                return;
            },
        };
        match backend.set(key, payload, self.ttl) {
            Ok(true) => trace!(key, "cache filled"),
            Ok(false) => trace!(key, "cache refused entry"),
            Err(err) => warn!(key, error = %err, "Cache unavailable, entry not stored"),
        }
    }

    /// Returns the cached value of `key`, or computes, stores and returns it.
    ///
    /// Errors of `compute` propagate unchanged and are not cached.
    pub fn cached_read<T, F>(&self, key: &str, compute: F) -> Result<T, OdmError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, OdmError>,
    {
        if let CacheLookup::Hit(value) = self.lookup(key) {
            return Ok(value);
        }
        let value = compute()?;
        self.put(key, &value);
        Ok(value)
    }

    pub fn erase(&self, key: &str) {
        if let Some(backend) = &self.backend
            && let Err(err) = backend.erase(key)
        {
            warn!(key, error = %err, "Cache unavailable, entry not evicted");
        }
    }

    /// Drops every entry of the namespace.
    pub fn flush(&self) -> bool {
        self.backend.as_ref().is_some_and(|backend| match backend.flush() {
            Ok(flushed) => flushed,
            Err(err) => {
                warn!(error = %err, "Cache unavailable, flush skipped");
                false
            },
        })
    }

    /// Evicts the entries named by `M`'s cache-key templates, bound to
    /// `instance`'s own values.
    pub fn invalidate<M: Model>(&self, instance: &M) {
        if !self.is_enabled() {
            return;
        }
        let schema = M::schema();
        for template in M::cache_keys() {
            let filter = match translate_filter(schema, template.bind_to(instance)) {
                Ok(filter) => filter,
                Err(err) => {
                    warn!(entity = M::resource_name(), error = %err, "Skipping cache template");
                    continue;
                },
            };
            let projection = translate_projection(schema, &template.fields);
            match cache_key(M::resource_name(), &filter, projection.as_ref()) {
                Ok(base) => {
                    for suffix in [FIRST_SUFFIX, ALL_SUFFIX, COUNT_SUFFIX] {
                        self.erase(&format!("{base}{suffix}"));
                    }
                    trace!(entity = M::resource_name(), key = %base, "cache invalidated");
                },
                Err(err) => {
                    warn!(entity = M::resource_name(), error = %err, "Skipping cache template");
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsdesk_cache::MokaBackend;
    use opsdesk_store::{Value, doc};
    use std::cell::Cell;

    fn layer() -> CacheLayer {
        CacheLayer::new(Arc::new(MokaBackend::builder().namespace("t_").build()), Duration::ZERO)
    }

    #[test]
    fn keys_are_deterministic_and_shape_sensitive() {
        let filter = doc! { "a" => 1, "b" => "x" };
        let k1 = cache_key("Thing", &filter, None).unwrap();
        let k2 = cache_key("Thing", &doc! { "b" => "x", "a" => 1 }, None).unwrap();
        assert_eq!(k1, k2);
        assert!(k1.starts_with("Thing_"));
        assert_eq!(k1.len(), "Thing_".len() + 64);
        assert_ne!(k1, cache_key("Other", &filter, None).unwrap());
        assert_ne!(k1, cache_key("Thing", &filter, Some(&doc! { "a" => 1 })).unwrap());
    }

    #[test]
    fn read_options_change_the_list_suffix() {
        let paged = options_suffix(&ReadOptions::new().limit(10).page(2)).unwrap();
        assert_eq!(paged.len(), 17);
        assert_ne!(paged, options_suffix(&ReadOptions::new().limit(10)).unwrap());
    }

    #[test]
    fn cached_null_is_not_a_miss() {
        let cache = layer();
        assert_eq!(cache.lookup::<Option<Document>>("k"), CacheLookup::Miss);
        cache.put::<Option<Document>>("k", &None);
        assert_eq!(cache.lookup::<Option<Document>>("k"), CacheLookup::Hit(None));
    }

    #[test]
    fn cached_read_computes_once() {
        let cache = layer();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok(vec![doc! { "n" => Value::Int(1) }])
        };
        let first = cache.cached_read("list", compute).unwrap();
        let second = cache.cached_read("list", compute).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);

        cache.erase("list");
        cache.cached_read("list", compute).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = layer();
        let failed: Result<u64, _> = cache.cached_read("n", || Err(OdmError::invalid_value("boom")));
        assert!(failed.is_err());
        assert_eq!(cache.lookup::<u64>("n"), CacheLookup::Miss);
    }

    #[test]
    fn disabled_layer_always_computes() {
        let cache = CacheLayer::disabled();
        let calls = Cell::new(0);
        for _ in 0..2 {
            let n: u64 = cache
                .cached_read("n", || {
                    calls.set(calls.get() + 1);
                    Ok(3)
                })
                .unwrap();
            assert_eq!(n, 3);
        }
        assert_eq!(calls.get(), 2);
        assert!(!cache.flush());
    }
}
