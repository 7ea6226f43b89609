use std::borrow::Cow;

/// A specialized [`StoreError`] enum of this crate.
///
/// Every failure of a [`DocumentStore`](crate::DocumentStore) call is reported
/// through this type and is expected to reach the caller unmodified.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The operation exceeded its execution-time budget.
    #[error("Store operation timed out{}: {message}", format_context(.context))]
    Timeout { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The store could not be reached.
    #[error("Store unavailable{}: {message}", format_context(.context))]
    Unavailable { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Generic driver failure (bad operator, malformed update, ...).
    #[error("Store driver error{}: {message}", format_context(.context))]
    Driver { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A document with the same primary key already exists.
    #[error("Duplicate key{}: {message}", format_context(.context))]
    DuplicateKey { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Malformed store-native identifier.
    #[error("Invalid identifier{}: {message}", format_context(.context))]
    InvalidIdentifier { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

opsdesk_error::error_context! {
    StoreError => StoreErrorExt {
        messages: [Timeout, Unavailable, Driver, DuplicateKey, InvalidIdentifier],
        internal: Driver,
    }
}

impl StoreError {
    /// Returns `true` for the timeout variant.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub(crate) fn driver(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Driver { message: message.into(), context: None }
    }
}
