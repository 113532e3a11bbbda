//! Error primitives shared by every Bedrock crate.
//!
//! Crates define their own typed errors (usually with `snafu`) and hand them across crate boundaries as
//! [`GenericError`]. When more than one independent failure has to be reported at once, they are collected into a
//! [`MultiError`], and [`chain_contains`] can be used to check whether a specific error type appears anywhere in the
//! result, including inside the members of a `MultiError`.
#![deny(missing_docs)]

use std::{error::Error as StdError, fmt};

mod multi;
pub use self::multi::MultiError;

/// A type-erased error that can carry any error type, along with optional context.
pub type GenericError = anyhow::Error;

/// Macro for constructing a generic error.
///
/// The resulting value evaulates to [`GenericError`], and can be construct from a string literal, a format string (with
/// arguments accepted, in the same order as `std::format!`), or a value which implements `Debug` and `Display`, such as
/// an existing error that implements `std::error::Error`.
///
/// When the value given implements `std::error::Error`, the source of the existing error value will be used as the source of the
/// error created by this macro.
#[macro_export]
macro_rules! generic_error {
    // Forwards to `anyhow::anyhow`. We keep our own macro rather than re-exporting it so that the documentation isn't
    // `anyhow`-specific.
    ($msg:literal $(,)?) => { $crate::_anyhow!($msg) };
    ($err:expr $(,)?) => { $crate::_anyhow!($err) };
    ($fmt:expr, $($arg:tt)*) => { $crate::_anyhow!($fmt, $($arg)*) };
}

#[doc(hidden)]
pub use anyhow::anyhow as _anyhow;

pub(crate) mod private {
    pub trait Sealed {}

    impl<T, E> Sealed for Result<T, E> {}
}

// NOTE: We're wrapping `anyhow::Context` because otherwise the extension methods overlap with `snafu::ResultExt`, and
// this is just easier for scenarios where we want both.
/// Extension trait for attaching human-readable context to errors.
pub trait ErrorContext<T, E>: private::Sealed {
    /// Wrap the error value with additional context.
    fn error_context<C>(self, context: C) -> Result<T, GenericError>
    where
        C: fmt::Display + Send + Sync + 'static;

    /// Wrap the error value with additional context that is evaluated lazily only once an error does occur.
    fn with_error_context<C, F>(self, f: F) -> Result<T, GenericError>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ErrorContext<T, E> for Result<T, E>
where
    Result<T, E>: anyhow::Context<T, E>,
{
    fn error_context<C>(self, context: C) -> Result<T, GenericError>
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        <Self as anyhow::Context<T, E>>::context(self, context)
    }

    fn with_error_context<C, F>(self, context: F) -> Result<T, GenericError>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        <Self as anyhow::Context<T, E>>::with_context(self, context)
    }
}

/// Returns `true` if an error of type `E` appears anywhere in the chain of `error`.
///
/// The whole source chain is walked. When a link is a [`MultiError`], each of its members is searched as well, so two
/// failures reported together can each be matched independently.
pub fn chain_contains<E>(error: &GenericError) -> bool
where
    E: StdError + 'static,
{
    error.chain().any(link_contains::<E>)
}

fn link_contains<E>(link: &(dyn StdError + 'static)) -> bool
where
    E: StdError + 'static,
{
    if link.is::<E>() {
        return true;
    }

    match link.downcast_ref::<MultiError>() {
        Some(multi) => multi.iter().any(chain_contains::<E>),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use snafu::Snafu;

    use super::*;

    #[derive(Debug, Snafu)]
    #[snafu(display("first"))]
    struct First;

    #[derive(Debug, Snafu)]
    #[snafu(display("second"))]
    struct Second;

    #[test]
    fn chain_contains_direct_error() {
        let error = GenericError::from(First);
        assert!(chain_contains::<First>(&error));
        assert!(!chain_contains::<Second>(&error));
    }

    #[test]
    fn chain_contains_through_context() {
        let result: Result<(), First> = Err(First);
        let error = result.error_context("while doing something").unwrap_err();
        assert!(chain_contains::<First>(&error));
        assert_eq!(error.to_string(), "while doing something");
    }

    #[test]
    fn chain_contains_generic_error_macro() {
        let error = generic_error!("value {} is out of range", 42);
        assert_eq!(error.to_string(), "value 42 is out of range");
        assert!(!chain_contains::<First>(&error));
    }
}
