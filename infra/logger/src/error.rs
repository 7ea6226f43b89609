use std::borrow::Cow;

/// Errors that can occur while installing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// The rolling file appender rejected its directory or file name.
    #[error("Rolling file appender error{}: {source}", format_context(.context))]
    Appender {
        #[source]
        source: tracing_appender::rolling::InitError,
        context: Option<Cow<'static, str>>,
    },

    /// A global subscriber is already installed in this process.
    #[error("Tracing subscriber error{}: {source}", format_context(.context))]
    Subscriber {
        #[source]
        source: tracing_subscriber::util::TryInitError,
        context: Option<Cow<'static, str>>,
    },

    /// The log directory could not be created.
    #[error("Log directory error{}: {source}", format_context(.context))]
    Io {
        #[source]
        source: std::io::Error,
        context: Option<Cow<'static, str>>,
    },

    /// Invalid builder settings (empty name, unknown level, bad filter, ...).
    #[error("Invalid logger configuration{}: {message}", format_context(.context))]
    InvalidConfiguration { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

opsdesk_error::error_context! {
    LoggerError => LoggerErrorExt {
        messages: [InvalidConfiguration],
        sources: [
            Appender(tracing_appender::rolling::InitError),
            Subscriber(tracing_subscriber::util::TryInitError),
            Io(std::io::Error),
        ],
    }
}

impl LoggerError {
    pub(crate) fn invalid(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidConfiguration { message: message.into(), context: None }
    }
}
