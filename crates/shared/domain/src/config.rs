use serde::Deserialize;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfigInner {
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub audit: AuditConfig,
    pub logging: LoggingConfig,
}

/// Thin Arc-wrapped config for inexpensive cloning into subsystems.
#[derive(Default, Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(flatten, default)]
    inner: Arc<AppConfigInner>,
}

impl Deref for AppConfig {
    type Target = AppConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for AppConfig {
    fn deref_mut(&mut self) -> &mut AppConfigInner {
        Arc::make_mut(&mut self.inner)
    }
}

/// Document store connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    pub database: String,
    /// Default read budget in milliseconds; `0` disables it.
    pub max_time_ms: u64,
}

impl StoreConfig {
    #[must_use]
    pub const fn max_time(&self) -> Option<Duration> {
        if self.max_time_ms == 0 { None } else { Some(Duration::from_millis(self.max_time_ms)) }
    }
}

/// Read cache in front of the store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub namespace: String,
    pub ttl_seconds: u64,
    pub max_capacity: u64,
}

impl CacheConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// How timeline entries reach their sink.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditDispatch {
    /// Written on the calling thread right after the mutation.
    Inline,
    /// Queued to a worker thread.
    #[default]
    Background,
}

/// Timeline recording.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub dispatch: AuditDispatch,
    pub queue_capacity: usize,
    pub collection: String,
}

/// Log output.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub name: String,
    pub level: String,
    /// Directory for rolling log files; console only when absent.
    pub path: Option<PathBuf>,
    pub json: bool,
    pub env_filter: Option<String>,
}

// --- Default ---

impl Default for StoreConfig {
    fn default() -> Self {
        Self { url: "mem://".to_owned(), database: "webapp".to_owned(), max_time_ms: 0 }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: "opsdesk_".to_owned(),
            ttl_seconds: 300,
            max_capacity: 10_000,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dispatch: AuditDispatch::Background,
            queue_capacity: 1024,
            collection: "timeline".to_owned(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            name: "opsdesk".to_owned(),
            level: "info".to_owned(),
            path: None,
            json: false,
            env_filter: None,
        }
    }
}
