use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::info;

/// Prefix of environment overrides (`OPSDESK__CACHE__TTL_SECONDS`).
pub const ENV_PREFIX: &str = "OPSDESK";
/// Config file used when no path is given (extension resolved by `config`).
pub const DEFAULT_CONFIG_FILE: &str = "opsdesk";

/// Error type for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config error{}: {source}", format_context(.context))]
    Config {
        #[source]
        source: config::ConfigError,
        context: Option<Cow<'static, str>>,
    },
}

opsdesk_error::error_context! {
    ConfigError => ConfigErrorExt {
        messages: [],
        sources: [Config(config::ConfigError)],
    }
}

/// Loads `T` from a config file layered with environment overrides.
///
/// 1. **Base file**: `path`, or [`DEFAULT_CONFIG_FILE`] in the working
///    directory. The format follows the extension (TOML, YAML, JSON).
/// 2. **Environment**: variables prefixed with `OPSDESK__`, nested with `__`
///    (`OPSDESK__STORE__URL` maps to `store.url`).
///
/// # Errors
/// Fails when the file is missing or the merged values do not fit `T`.
///
/// # Example
/// ```rust
/// use opsdesk_kernel::config::load_config;
/// use opsdesk_kernel::domain::config::AppConfig;
///
/// let cfg: AppConfig = load_config(Some("config/local")).unwrap_or_default();
/// assert_eq!(cfg.cache.namespace, "opsdesk_");
/// ```
pub fn load_config<T>(path: Option<impl AsRef<Path>>) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    load_layered(path, None)
}

/// `environment` replaces the process environment when given.
fn load_layered<T>(
    path: Option<impl AsRef<Path>>,
    environment: Option<config::Map<String, String>>,
) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let effective_path =
        path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), |p| p.as_ref().to_path_buf());

    info!(path = %effective_path.display(), "Loading config");

    Config::builder()
        .add_source(File::from(effective_path.as_path()).required(true))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .convert_case(config::Case::Snake)
                .try_parsing(true)
                .source(environment),
        )
        .build()
        .context("Failed to build config")?
        .try_deserialize::<T>()
        .context("Failed to deserialize config")
}
