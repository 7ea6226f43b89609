use std::borrow::Cow;

/// A specialized [`CacheError`] enum of this crate.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache service could not be reached.
    #[error("Cache unavailable{}: {message}", format_context(.context))]
    Unavailable { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A cached payload could not be encoded or decoded.
    #[error("Cache codec error{}: {message}", format_context(.context))]
    Codec { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

opsdesk_error::error_context! {
    CacheError => CacheErrorExt {
        messages: [Unavailable, Codec],
    }
}
