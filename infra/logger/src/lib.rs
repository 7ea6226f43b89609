//! # Logger
//!
//! Installs the process-wide `tracing` subscriber: compact console output,
//! optional rolling file output (plain or JSON lines) on a non-blocking
//! writer, and an [`EnvFilter`](tracing_subscriber::EnvFilter) built from the
//! configured level and module directives (falling back to `RUST_LOG`).
//!
//! ## Example
//!
//! ```rust
//! use opsdesk_logger::{LevelFilter, Logger};
//!
//! let _logger = Logger::builder()
//!     .name("opsdesk")
//!     .level(LevelFilter::DEBUG)
//!     .env_filter("opsdesk_odm=trace")
//!     .init()
//!     .unwrap();
//! ```

mod builder;
mod error;

pub use crate::builder::LoggerBuilder;
pub use crate::error::{LoggerError, LoggerErrorExt};
pub use tracing::level_filters::LevelFilter;
pub use tracing_appender::rolling::Rotation;

use tracing_appender::non_blocking::WorkerGuard;

/// Handle to the installed logging system.
///
/// Holds the file writer guard; pending file output is flushed when it drops.
#[must_use = "Dropping this handle stops the background file writer."]
#[derive(Debug)]
pub struct Logger {
    name: String,
    guard: Option<WorkerGuard>,
}

impl Logger {
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::default()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether file output is active.
    #[must_use]
    pub const fn writes_files(&self) -> bool {
        self.guard.is_some()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        if self.guard.is_some() {
            tracing::info!(name = %self.name, "Logger shutting down, flushing file output");
        }
    }
}
