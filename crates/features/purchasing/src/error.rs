use opsdesk_odm::OdmError;
use std::borrow::Cow;

/// Error types specific to the purchasing slice.
#[derive(Debug, thiserror::Error)]
pub enum PurchasingError {
    /// Mapping engine failure, passed through.
    #[error("Persistence error{}: {source}", format_context(.context))]
    Odm {
        #[source]
        source: OdmError,
        context: Option<Cow<'static, str>>,
    },

    /// The request is not in a state that allows the action.
    #[error("Invalid status transition{}: {message}", format_context(.context))]
    Transition { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Internal fallback for unexpected issues or logic errors.
    #[error("Internal purchasing error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

opsdesk_error::error_context! {
    PurchasingError => PurchasingErrorExt {
        messages: [Transition, Internal],
        sources: [Odm(OdmError)],
        internal: Internal,
    }
}
