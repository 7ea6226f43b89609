use opsdesk_domain::config::LoggingConfig;
use opsdesk_logger::{Logger, LoggerError};

/// Installs the global subscriber described by a [`LoggingConfig`] section.
///
/// # Errors
/// Unknown level names, malformed filters and a second initialization in the
/// same process are reported as [`LoggerError`].
pub fn init_logging(config: &LoggingConfig) -> Result<Logger, LoggerError> {
    let mut builder =
        Logger::builder().name(&config.name).level_name(&config.level)?.json(config.json);
    if let Some(directives) = &config.env_filter {
        builder = builder.env_filter(directives);
    }
    if let Some(path) = &config.path {
        builder = builder.path(path);
    }
    builder.init()
}
