mod common;

use common::{Widget, widget};
use opsdesk_domain::config::AppConfig;
use opsdesk_odm::{DocumentStore, Odm, OdmError, Repository, TIMELINE_COLLECTION, doc};
use serde_json::json;
use std::time::Duration;

fn config(raw: serde_json::Value) -> AppConfig {
    serde_json::from_value(raw).unwrap()
}

#[test]
fn memory_urls_build_a_working_context() {
    let cfg = config(json!({
        "store": { "url": "mem://", "max_time_ms": 2000 },
        "cache": { "namespace": "cfg_", "ttl_seconds": 30 },
        "audit": { "dispatch": "background", "queue_capacity": 8 }
    }));
    let odm = Odm::from_config(&cfg).unwrap().register::<Widget>().build().unwrap();
    assert_eq!(odm.max_time(), Some(Duration::from_secs(2)));
    assert!(odm.cache().is_enabled());
    assert_eq!(odm.cache().ttl(), Duration::from_secs(30));

    let mut item = widget("A");
    item.save(&odm).unwrap();
    assert_eq!(item.history(&odm).unwrap().len(), 1);
    assert_eq!(Widget::cache_count(&odm, doc! {}, false).unwrap(), 1);
}

#[test]
fn disabled_sections_are_honoured() {
    let cfg = config(json!({
        "cache": { "enabled": false },
        "audit": { "enabled": false, "collection": "history" }
    }));
    let odm = Odm::from_config(&cfg).unwrap().register::<Widget>().build().unwrap();
    assert!(!odm.cache().is_enabled());
    assert!(!odm.timeline().is_enabled());
    widget("A").save(&odm).unwrap();
    let recorded = odm.store().count(TIMELINE_COLLECTION, &doc! {}, &Default::default()).unwrap();
    assert_eq!(recorded, 0);
}

#[test]
fn custom_timeline_collection() {
    let cfg = config(json!({ "audit": { "dispatch": "inline", "collection": "history" } }));
    let odm = Odm::from_config(&cfg).unwrap().register::<Widget>().build().unwrap();
    widget("A").save(&odm).unwrap();
    assert_eq!(odm.store().count("history", &doc! {}, &Default::default()).unwrap(), 1);
}

#[test]
fn unsupported_store_urls_are_configuration_errors() {
    let cfg = config(json!({ "store": { "url": "mongodb://localhost:27017" } }));
    let err = Odm::from_config(&cfg).unwrap_err();
    assert!(matches!(err, OdmError::Configuration { .. }), "{err}");
    assert!(err.to_string().contains("mongodb://"));
}

#[test]
fn a_store_is_required() {
    let err = Odm::builder().register::<Widget>().build().unwrap_err();
    assert!(matches!(err, OdmError::Configuration { .. }));
}
