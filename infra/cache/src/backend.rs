use crate::error::CacheError;
use std::fmt::Debug;
use std::time::Duration;

/// Key/value cache service.
///
/// `get` distinguishes a miss (`Ok(None)`) from a stored payload. A zero TTL
/// stores the entry without expiry.
pub trait CacheBackend: Send + Sync + Debug {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, CacheError>;

    fn erase(&self, key: &str) -> Result<(), CacheError>;

    fn flush(&self) -> Result<bool, CacheError>;
}
