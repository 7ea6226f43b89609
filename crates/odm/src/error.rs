use opsdesk_store::StoreError;
use std::borrow::Cow;

/// A specialized [`OdmError`] enum of this crate.
///
/// Schema and identifier errors block the operation that raised them; storage
/// errors carry the driver's [`StoreError`] unchanged. Cache and timeline
/// failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum OdmError {
    /// Missing or misconfigured field descriptor.
    #[error("Schema error{}: {message}", format_context(.context))]
    Schema { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Malformed identifier in a filter or an assignment.
    #[error("Invalid identifier{}: {message}", format_context(.context))]
    InvalidIdentifier { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A value that cannot take the field's logical type.
    #[error("Invalid value{}: {message}", format_context(.context))]
    InvalidValue { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Store driver failure, passed through verbatim.
    #[error("Storage error{}: {source}", format_context(.context))]
    Storage {
        #[source]
        source: StoreError,
        context: Option<Cow<'static, str>>,
    },

    /// Operation not allowed in the entity's lifecycle state.
    #[error("Lifecycle error{}: {message}", format_context(.context))]
    Lifecycle { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Invalid engine configuration.
    #[error("Configuration error{}: {message}", format_context(.context))]
    Configuration { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Internal fallback for unexpected issues.
    #[error("Internal error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

opsdesk_error::error_context! {
    OdmError => OdmErrorExt {
        messages: [Schema, InvalidIdentifier, InvalidValue, Lifecycle, Configuration, Internal],
        sources: [Storage(StoreError)],
        internal: Internal,
    }
}

impl OdmError {
    pub(crate) fn schema(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Schema { message: message.into(), context: None }
    }

    pub(crate) fn invalid_value(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidValue { message: message.into(), context: None }
    }

    /// The wrapped driver error, for storage failures.
    #[must_use]
    pub const fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Storage { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failure while appending a timeline entry. Logged, never returned to
/// callers of the mapper.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Timeline sink error{}: {source}", format_context(.context))]
    Sink {
        #[source]
        source: StoreError,
        context: Option<Cow<'static, str>>,
    },

    #[error("Timeline queue error{}: {message}", format_context(.context))]
    Queue { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Malformed timeline entry{}: {message}", format_context(.context))]
    Malformed { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

pub(crate) mod audit {
    use super::{AuditError, StoreError};

    opsdesk_error::error_context! {
        AuditError => AuditErrorExt {
            messages: [Queue, Malformed],
            sources: [Sink(StoreError)],
        }
    }
}

pub use audit::AuditErrorExt;
