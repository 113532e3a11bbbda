//! Composable configuration readers.
//!
//! Configuration is consumed through the [`Reader`] capability: given a context, a reader produces a [`Value`] that may
//! or may not be set, or fails. Keeping "not configured" apart from "configured to the zero value" lets readers be
//! layered: [`or`] tries several sources in turn, [`default_to`] fills in a fallback only when nothing was configured,
//! and [`map`]/[`bind`] transform a value only when one is present.
//!
//! Readers are provided for single environment variables ([`env`], [`env_parsed`]), for a snapshot of the whole
//! environment ([`Environment`]), and for keys in layered configuration files ([`ConfigurationLoader`]).
#![deny(missing_docs)]

use std::sync::Arc;

use async_trait::async_trait;
use bedrock_core::CancellationToken;
use bedrock_error::GenericError;
use snafu::{ResultExt as _, Snafu};

mod combinators;
pub use self::combinators::{
    bind, default_to, map, or, reader_fn, unset, value_of, Bind, Constant, DefaultTo, Map, Or, ReaderExt, ReaderFn,
    Unset,
};

mod env;
pub use self::env::{env, env_parsed, Env, EnvParsed, Environment};

mod loader;
pub use self::loader::{ConfigurationLoader, GenericConfiguration, KeyReader};

mod provider;

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// A value was required, but no source provided one.
    #[snafu(display("Configuration value is not set."))]
    ValueNotSet,

    /// Reading the value failed.
    #[snafu(display("Failed to read configuration value: {}", source))]
    ReadFailed {
        /// Error source.
        source: GenericError,
    },

    /// Environment variable prefix was empty.
    #[snafu(display("Environment variable prefix must not be empty."))]
    EmptyPrefix,

    /// A configured value could not be interpreted.
    #[snafu(display("Invalid value for '{}': {}", key, reason))]
    InvalidValue {
        /// Key (or environment variable) holding the value.
        key: String,

        /// Why the value was rejected.
        reason: String,
    },

    /// Requested field's data type was not the expected data type.
    #[snafu(display(
        "Expected value for field '{}' to be '{}', got '{}' instead.",
        field,
        expected_ty,
        actual_ty
    ))]
    InvalidFieldType {
        /// Name of the invalid field.
        ///
        /// This is a period-separated path to the field.
        field: String,

        /// Expected data type.
        expected_ty: String,

        /// Actual data type.
        actual_ty: String,
    },

    /// Generic configuration error.
    #[snafu(display("Failed to query configuration: {}", source))]
    Generic {
        /// Error source.
        source: GenericError,
    },
}

impl From<figment::Error> for ConfigurationError {
    fn from(e: figment::Error) -> Self {
        match e.kind {
            figment::error::Kind::InvalidType(actual_ty, expected_ty) => Self::InvalidFieldType {
                field: e.path.join("."),
                expected_ty,
                actual_ty: actual_ty.to_string(),
            },
            _ => Self::Generic { source: e.into() },
        }
    }
}

/// A configuration value that may or may not be set.
///
/// An unset value means that no source configured anything, which is different from a source explicitly configuring
/// the zero value of `T`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Value<T> {
    inner: Option<T>,
}

impl<T> Value<T> {
    /// Creates a set value.
    pub fn set(value: T) -> Self {
        Self { inner: Some(value) }
    }

    /// Creates an unset value.
    pub fn unset() -> Self {
        Self { inner: None }
    }

    /// Returns `true` if the value is set.
    pub fn is_set(&self) -> bool {
        self.inner.is_some()
    }

    /// Returns a reference to the value, if set.
    pub fn get(&self) -> Option<&T> {
        self.inner.as_ref()
    }

    /// Consumes the value, returning it if set.
    pub fn into_option(self) -> Option<T> {
        self.inner
    }
}

impl<T> Default for Value<T> {
    fn default() -> Self {
        Self::unset()
    }
}

impl<T> From<Option<T>> for Value<T> {
    fn from(inner: Option<T>) -> Self {
        Self { inner }
    }
}

/// A configuration source.
#[async_trait]
pub trait Reader<T>: Send + Sync {
    /// Reads the value.
    ///
    /// Returns an unset value when the source has nothing configured for it.
    ///
    /// # Errors
    ///
    /// If the source could not be read, or held a value that could not be interpreted as a `T`, an error is returned.
    async fn read(&self, ctx: &CancellationToken) -> Result<Value<T>, GenericError>;
}

#[async_trait]
impl<T, R> Reader<T> for Box<R>
where
    R: Reader<T> + ?Sized,
    T: Send + 'static,
{
    async fn read(&self, ctx: &CancellationToken) -> Result<Value<T>, GenericError> {
        (**self).read(ctx).await
    }
}

#[async_trait]
impl<T, R> Reader<T> for Arc<R>
where
    R: Reader<T> + ?Sized,
    T: Send + 'static,
{
    async fn read(&self, ctx: &CancellationToken) -> Result<Value<T>, GenericError> {
        (**self).read(ctx).await
    }
}

/// Reads a required value from `reader`.
///
/// # Errors
///
/// If the reader fails, [`ConfigurationError::ReadFailed`] is returned. If the reader succeeds but has nothing set,
/// [`ConfigurationError::ValueNotSet`] is returned.
pub async fn read<T, R>(ctx: &CancellationToken, reader: &R) -> Result<T, ConfigurationError>
where
    R: Reader<T> + ?Sized,
{
    reader
        .read(ctx)
        .await
        .context(ReadFailed)?
        .into_option()
        .ok_or(ConfigurationError::ValueNotSet)
}

#[cfg(test)]
mod tests {
    use bedrock_error::generic_error;

    use super::*;

    #[tokio::test]
    async fn read_set_value() {
        let ctx = CancellationToken::new();
        assert_eq!(read(&ctx, &value_of(0u32)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn read_unset_value() {
        let ctx = CancellationToken::new();
        let error = read(&ctx, &unset::<u32>()).await.unwrap_err();
        assert!(matches!(error, ConfigurationError::ValueNotSet));
    }

    #[tokio::test]
    async fn read_failure() {
        let ctx = CancellationToken::new();
        let reader = reader_fn(|_ctx| async { Err::<Value<u32>, _>(generic_error!("source unavailable")) });

        let error = read(&ctx, &reader).await.unwrap_err();
        assert!(matches!(error, ConfigurationError::ReadFailed { .. }));
        assert!(error.to_string().contains("source unavailable"));
    }

    #[test]
    fn value_set_and_unset_are_distinct() {
        assert_ne!(Value::set(0), Value::unset());
        assert_eq!(Value::<u8>::default(), Value::unset());
        assert_eq!(Value::from(Some(3)).get(), Some(&3));
    }
}
