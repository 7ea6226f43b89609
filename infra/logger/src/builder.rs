use crate::Logger;
use crate::error::{LoggerError, LoggerErrorExt};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const DEFAULT_MAX_FILES: usize = 10;
const LOG_FILE_SUFFIX: &str = "log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Builder for the global tracing subscriber.
///
/// Console output is compact and colored; file output goes through a
/// non-blocking rolling appender and can be switched to JSON lines.
#[derive(Debug, Clone)]
pub struct LoggerBuilder {
    pub(crate) name: String,
    pub(crate) console: bool,
    pub(crate) path: Option<PathBuf>,
    pub(crate) level: LevelFilter,
    pub(crate) rotation: Rotation,
    pub(crate) max_files: usize,
    pub(crate) json: bool,
    pub(crate) env_filter: Option<String>,
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self {
            name: "opsdesk".to_owned(),
            console: true,
            path: None,
            level: LevelFilter::INFO,
            rotation: Rotation::DAILY,
            max_files: DEFAULT_MAX_FILES,
            json: false,
            env_filter: None,
        }
    }
}

impl LoggerBuilder {
    /// Identifies the application; also the prefix of rolling log files.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub const fn level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    /// Parses a textual level (`"debug"`, `"warn"`, ...).
    pub fn level_name(mut self, level: &str) -> Result<Self, LoggerError> {
        self.level = LevelFilter::from_str(level.trim())
            .map_err(|e| LoggerError::invalid(format!("unknown log level '{level}': {e}")))?;
        Ok(self)
    }

    /// Programmatic default for module directives (`opsdesk_odm=debug`).
    /// `RUST_LOG` is used only when no filter is set here.
    #[must_use]
    pub fn env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub const fn console(mut self, enabled: bool) -> Self {
        self.console = enabled;
        self
    }

    /// Enables rolling file output into `path`.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Writes file output as JSON lines.
    #[must_use]
    pub const fn json(mut self, enabled: bool) -> Self {
        self.json = enabled;
        self
    }

    #[must_use]
    pub fn rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    #[must_use]
    pub const fn max_files(mut self, max: usize) -> Self {
        self.max_files = max;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), LoggerError> {
        if self.name.trim().is_empty() {
            return Err(LoggerError::invalid("logger name cannot be empty"));
        }
        if self.max_files == 0 {
            return Err(LoggerError::invalid("max_files must be greater than zero"));
        }
        if !self.console && self.path.is_none() {
            return Err(LoggerError::invalid("no output enabled: enable console or file output"));
        }
        Ok(())
    }

    pub(crate) fn filter(&self) -> Result<EnvFilter, LoggerError> {
        let builder = EnvFilter::builder().with_default_directive(self.level.into());
        match &self.env_filter {
            Some(directives) => builder.parse(directives).map_err(|e| {
                LoggerError::invalid(format!("invalid env filter '{directives}': {e}"))
            }),
            None => Ok(builder.from_env_lossy()),
        }
    }

    /// Installs the global subscriber.
    ///
    /// Keep the returned [`Logger`] alive for the lifetime of the process:
    /// dropping it stops the file writer.
    pub fn init(self) -> Result<Logger, LoggerError> {
        self.validate()?;
        let filter = self.filter()?;

        let mut layers: Vec<BoxedLayer> = Vec::new();
        if self.console {
            layers.push(layer().compact().with_ansi(true).boxed());
        }

        let guard = match &self.path {
            Some(dir) => {
                std::fs::create_dir_all(dir)
                    .context(format!("creating log directory {}", dir.display()))?;

                let appender = RollingFileAppender::builder()
                    .rotation(self.rotation.clone())
                    .filename_prefix(&self.name)
                    .filename_suffix(LOG_FILE_SUFFIX)
                    .max_log_files(self.max_files)
                    .build(dir)
                    .context(self.name.clone())?;
                let (writer, guard) = tracing_appender::non_blocking(appender);

                let file = layer().with_writer(writer).with_ansi(false);
                layers.push(if self.json { file.json().boxed() } else { file.boxed() });
                Some(guard)
            },
            None => None,
        };

        tracing_subscriber::registry()
            .with(layers)
            .with(filter)
            .try_init()
            .context(self.name.clone())?;

        tracing::info!(name = %self.name, level = %self.level, json = self.json, "Logger initialized");
        Ok(Logger { name: self.name, guard })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_log_to_console_at_info() {
        let builder = LoggerBuilder::default();
        assert!(builder.console);
        assert_eq!(builder.level, LevelFilter::INFO);
        assert!(builder.path.is_none());
        assert!(builder.validate().is_ok());
    }

    #[test]
    fn level_names_are_parsed() {
        let builder = LoggerBuilder::default().level_name("Debug").unwrap();
        assert_eq!(builder.level, LevelFilter::DEBUG);
        let err = LoggerBuilder::default().level_name("loud").unwrap_err();
        assert!(matches!(err, LoggerError::InvalidConfiguration { .. }));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(LoggerBuilder::default().name("  ").validate().is_err());
        assert!(LoggerBuilder::default().max_files(0).validate().is_err());
        assert!(LoggerBuilder::default().console(false).validate().is_err());
        assert!(LoggerBuilder::default().console(false).path("logs").validate().is_ok());
    }

    #[test]
    fn env_filter_directives_are_validated() {
        let ok = LoggerBuilder::default().env_filter("opsdesk_odm=debug,opsdesk_store=trace");
        assert!(ok.filter().is_ok());
        let bad = LoggerBuilder::default().env_filter("opsdesk_odm=verbose");
        assert!(bad.filter().is_err());
    }
}
