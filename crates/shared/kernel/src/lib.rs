//! Bootstrap utilities shared by binaries and integration tests.
//!
//! ## Config loading
//! ```rust,no_run
//! use opsdesk_kernel::config::load_config;
//! use opsdesk_kernel::domain::config::AppConfig;
//!
//! let cfg: AppConfig = load_config(Some("opsdesk.toml")).unwrap();
//! let _logger = opsdesk_kernel::init_logging(&cfg.logging).unwrap();
//! ```

pub mod config;
mod logging;

pub use logging::init_logging;
pub use opsdesk_domain as domain;
