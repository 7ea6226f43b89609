use opsdesk_domain::config::{
    AppConfig, AuditConfig, AuditDispatch, CacheConfig, LoggingConfig, StoreConfig,
};
use serde_json::json;
use std::time::Duration;

#[test]
fn config_defaults_are_sane() {
    let store = StoreConfig::default();
    assert_eq!(store.url, "mem://");
    assert_eq!(store.max_time(), None);

    let cache = CacheConfig::default();
    assert!(cache.enabled);
    assert_eq!(cache.namespace, "opsdesk_");
    assert_eq!(cache.ttl(), Duration::from_secs(300));

    let audit = AuditConfig::default();
    assert_eq!(audit.dispatch, AuditDispatch::Background);
    assert_eq!(audit.collection, "timeline");

    let logging = LoggingConfig::default();
    assert_eq!(logging.level, "info");
    assert!(logging.path.is_none());
}

#[test]
fn app_config_deserializes_partial_sections() {
    let raw = json!({
        "store": { "url": "mem://", "max_time_ms": 1500 },
        "cache": { "enabled": false },
        "audit": { "dispatch": "inline" }
    });

    let cfg: AppConfig = serde_json::from_value(raw).expect("config deserialize");
    assert_eq!(cfg.store.max_time(), Some(Duration::from_millis(1500)));
    assert_eq!(cfg.store.database, "webapp");
    assert!(!cfg.cache.enabled);
    assert_eq!(cfg.cache.ttl_seconds, 300);
    assert_eq!(cfg.audit.dispatch, AuditDispatch::Inline);
    assert_eq!(cfg.logging.name, "opsdesk");
}

#[test]
fn clones_share_until_mutated() {
    let base = AppConfig::default();
    let mut changed = base.clone();
    changed.cache.ttl_seconds = 5;
    assert_eq!(base.cache.ttl_seconds, 300);
    assert_eq!(changed.cache.ttl(), Duration::from_secs(5));
}
