//! # Cache Backend
//!
//! The get/set/erase/flush contract consumed by the read cache of the mapping
//! engine, plus [`MokaBackend`], a namespaced in-process implementation with
//! per-entry time-to-live.
//!
//! ## Example
//!
//! ```rust
//! use opsdesk_cache::{CacheBackend, MokaBackend};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), opsdesk_cache::CacheError> {
//! let cache = MokaBackend::builder().namespace("demo_").max_capacity(100).build();
//! cache.set("answer", b"42".to_vec(), Duration::from_secs(300))?;
//! assert_eq!(cache.get("answer")?, Some(b"42".to_vec()));
//! assert_eq!(cache.make_key("answer"), "demo_answer");
//! # Ok(())
//! # }
//! ```

mod backend;
mod error;
mod moka_backend;

pub use backend::CacheBackend;
pub use error::{CacheError, CacheErrorExt};
pub use moka_backend::{DEFAULT_MAX_CAPACITY, DEFAULT_NAMESPACE, MokaBackend, MokaBackendBuilder};
