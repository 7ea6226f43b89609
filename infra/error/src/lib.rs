//! # Error context
//!
//! Every crate in the workspace owns a single `thiserror` enum whose variants carry
//! either a `message` or a wrapped `source`, always paired with an optional
//! `context: Option<Cow<'static, str>>`. The [`error_context!`] macro wires the
//! boilerplate around such an enum.
//!
//! ## Generated items
//!
//! * `Result<T>` alias in the calling module.
//! * `<Enum>Ext` trait with `.context(...)` for `Result<T, Enum>` and, for every
//!   wrapped source, for `Result<T, Source>`.
//! * `From<Source>` for every wrapped source.
//! * `From<&'static str>` and `From<String>` when an `internal:` variant is named.
//! * A module-local `format_context` helper used by the `#[error(...)]` strings.
//!
//! ## Example
//!
//! ```rust
//! use std::borrow::Cow;
//!
//! #[derive(Debug, thiserror::Error)]
//! pub enum DemoError {
//!     #[error("IO error{}: {source}", format_context(.context))]
//!     Io {
//!         #[source]
//!         source: std::io::Error,
//!         context: Option<Cow<'static, str>>,
//!     },
//!
//!     #[error("Internal error{}: {message}", format_context(.context))]
//!     Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
//! }
//!
//! opsdesk_error::error_context! {
//!     DemoError => DemoErrorExt {
//!         messages: [Internal],
//!         sources: [Io(std::io::Error)],
//!         internal: Internal,
//!     }
//! }
//!
//! fn read() -> Result<String> {
//!     std::fs::read_to_string("/definitely/missing").context("reading demo file")
//! }
//!
//! assert!(read().unwrap_err().to_string().starts_with("IO error (reading demo file)"));
//! ```

/// Generates the context extension trait, conversions and `format_context`
/// helper for an error enum.
///
/// Every variant must be listed exactly once, either under `messages` or under
/// `sources`, so the generated `match` stays exhaustive.
#[macro_export]
macro_rules! error_context {
    (
        $name:ident => $ext:ident {
            messages: [$($msg:ident),* $(,)?]
            $(, sources: [$($src_variant:ident($src_ty:ty)),* $(,)?])?
            $(, internal: $internal:ident)?
            $(,)?
        }
    ) => {
        #[allow(dead_code)]
        pub type Result<T, E = $name> = ::std::result::Result<T, E>;

        pub trait $ext<T> {
            fn context(
                self,
                context: impl Into<::std::borrow::Cow<'static, str>>,
            ) -> ::std::result::Result<T, $name>;
        }

        #[automatically_derived]
        impl<T> $ext<T> for ::std::result::Result<T, $name> {
            #[inline]
            fn context(self, context: impl Into<::std::borrow::Cow<'static, str>>) -> Self {
                self.map_err(|mut e| {
                    match &mut e {
                        $( $name::$msg { context: c, .. } => *c = Some(context.into()), )*
                        $($( $name::$src_variant { context: c, .. } => *c = Some(context.into()), )*)?
                    }
                    e
                })
            }
        }

        $($(
            #[automatically_derived]
            impl ::std::convert::From<$src_ty> for $name {
                #[inline]
                fn from(source: $src_ty) -> Self {
                    Self::$src_variant { source, context: None }
                }
            }

            impl<T> $ext<T> for ::std::result::Result<T, $src_ty> {
                #[inline]
                fn context(
                    self,
                    context: impl Into<::std::borrow::Cow<'static, str>>,
                ) -> ::std::result::Result<T, $name> {
                    self.map_err(|source| $name::$src_variant { source, context: Some(context.into()) })
                }
            }
        )*)?

        $(
            impl ::std::convert::From<&'static str> for $name {
                #[inline]
                fn from(s: &'static str) -> Self {
                    Self::$internal { message: ::std::borrow::Cow::Borrowed(s), context: None }
                }
            }

            impl ::std::convert::From<String> for $name {
                #[inline]
                fn from(s: String) -> Self {
                    Self::$internal { message: ::std::borrow::Cow::Owned(s), context: None }
                }
            }
        )?

        #[allow(dead_code)]
        fn format_context(
            context: &::std::option::Option<::std::borrow::Cow<'static, str>>,
        ) -> ::std::borrow::Cow<'static, str> {
            context.as_ref().map_or(::std::borrow::Cow::Borrowed(""), |c| {
                ::std::borrow::Cow::Owned(format!(" ({c})"))
            })
        }
    };
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    #[derive(Debug, thiserror::Error)]
    enum ProbeError {
        #[error("Parse error{}: {source}", format_context(.context))]
        Parse {
            #[source]
            source: std::num::ParseIntError,
            context: Option<Cow<'static, str>>,
        },

        #[error("Rejected{}: {message}", format_context(.context))]
        Rejected { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

        #[error("Internal error{}: {message}", format_context(.context))]
        Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
    }

    error_context! {
        ProbeError => ProbeErrorExt {
            messages: [Rejected, Internal],
            sources: [Parse(std::num::ParseIntError)],
            internal: Internal,
        }
    }

    fn parse(input: &str) -> Result<i64> {
        input.parse::<i64>().context("parsing probe")
    }

    #[test]
    fn source_errors_are_wrapped_with_context() {
        let err = parse("abc").unwrap_err();
        assert!(matches!(err, ProbeError::Parse { context: Some(_), .. }));
        assert!(err.to_string().starts_with("Parse error (parsing probe): "));
    }

    #[test]
    fn context_is_replaced_on_existing_errors() {
        let result: Result<()> =
            Err(ProbeError::Rejected { message: "no".into(), context: None });
        let err = result.context("second pass").unwrap_err();
        assert_eq!(err.to_string(), "Rejected (second pass): no");
    }

    #[test]
    fn question_mark_converts_sources() {
        fn run() -> Result<i64> {
            Ok("12x".parse::<i64>()?)
        }
        assert!(matches!(run(), Err(ProbeError::Parse { context: None, .. })));
    }

    #[test]
    fn strings_become_internal_errors() {
        let err: ProbeError = "boom".into();
        assert_eq!(err.to_string(), "Internal error: boom");
        let err: ProbeError = String::from("bang").into();
        assert!(matches!(err, ProbeError::Internal { .. }));
    }
}
