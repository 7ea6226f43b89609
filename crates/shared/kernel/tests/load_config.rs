use opsdesk_kernel::config::{ConfigError, load_config};
use opsdesk_kernel::domain::config::{AppConfig, AuditDispatch};
use serial_test::serial;
use std::fs;
use tempfile::tempdir;

const SAMPLE: &str = r#"
[store]
url = "mem://"
max_time_ms = 2000

[cache]
namespace = "webapp_"
ttl_seconds = 60

[audit]
dispatch = "inline"
"#;

#[test]
#[serial]
fn loads_toml_file_with_defaults_for_missing_keys() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("opsdesk.toml");
    fs::write(&path, SAMPLE)?;

    let cfg: AppConfig = load_config(Some(&path))?;
    assert_eq!(cfg.store.max_time_ms, 2000);
    assert_eq!(cfg.cache.namespace, "webapp_");
    assert_eq!(cfg.cache.ttl_seconds, 60);
    assert!(cfg.cache.enabled);
    assert_eq!(cfg.audit.dispatch, AuditDispatch::Inline);
    assert_eq!(cfg.logging.level, "info");
    Ok(())
}

#[test]
#[serial]
fn missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    let result: Result<AppConfig, ConfigError> = load_config(Some(dir.path().join("absent.toml")));
    assert!(matches!(result, Err(ConfigError::Config { .. })));
}
