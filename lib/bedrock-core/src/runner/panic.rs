use std::{any::Any, error::Error as StdError, fmt, panic::AssertUnwindSafe};

use async_trait::async_trait;
use bedrock_error::GenericError;
use futures::FutureExt as _;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::Runner;
use crate::Builder;

/// A panic that was caught and converted into an error.
///
/// When the panic payload was itself an error (either a [`GenericError`] or a boxed `std::error::Error`), it is kept as
/// the source of this error so that it can still be inspected. Otherwise, the payload is rendered into the message.
#[derive(Debug)]
pub struct PanicError {
    message: String,
    source: Option<PanicSource>,
}

#[derive(Debug)]
enum PanicSource {
    Generic(GenericError),
    Boxed(Box<dyn StdError + Send + Sync>),
}

impl PanicError {
    /// Creates a `PanicError` from a panic payload, as returned by `std::panic::catch_unwind`.
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<GenericError>() {
            Ok(error) => {
                return Self {
                    message: error.to_string(),
                    source: Some(PanicSource::Generic(*error)),
                }
            }
            Err(payload) => payload,
        };

        let payload = match payload.downcast::<Box<dyn StdError + Send + Sync>>() {
            Ok(error) => {
                return Self {
                    message: error.to_string(),
                    source: Some(PanicSource::Boxed(*error)),
                }
            }
            Err(payload) => payload,
        };

        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            String::from("panic payload of unknown type")
        };

        Self { message, source: None }
    }

    /// Returns the panic message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "recovered from panic: {}", self.message)
    }
}

impl StdError for PanicError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.source {
            Some(PanicSource::Generic(error)) => {
                let source: &(dyn StdError + 'static) = error.as_ref();
                Some(source)
            }
            Some(PanicSource::Boxed(error)) => Some(&**error),
            None => None,
        }
    }
}

/// A runner decorator that converts panics into errors.
///
/// Any panic raised while the wrapped runner builds or runs is caught at this boundary and returned as a
/// [`PanicError`]. Panics raised in tasks spawned by the component are only caught if the component resumes them on
/// its own task, which is what the server runtimes in this project do.
pub struct RecoverPanics<R> {
    inner: R,
}

impl<R> RecoverPanics<R> {
    /// Wraps `inner` so that panics are recovered.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T, R> Runner<T> for RecoverPanics<R>
where
    R: Runner<T>,
    T: Send + 'static,
{
    async fn run(&self, ctx: &CancellationToken, builder: &dyn Builder<T>) -> Result<(), GenericError> {
        match AssertUnwindSafe(self.inner.run(ctx, builder)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let e = PanicError::from_payload(payload);
                error!(error = %e, "Recovered from panic.");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use bedrock_error::chain_contains;

    use super::*;

    #[test]
    fn string_payloads() {
        let error = PanicError::from_payload(Box::new("static message"));
        assert_eq!(error.message(), "static message");
        assert!(error.source().is_none());

        let error = PanicError::from_payload(Box::new(String::from("owned message")));
        assert_eq!(error.to_string(), "recovered from panic: owned message");
    }

    #[test]
    fn boxed_error_payload_is_kept_as_source() {
        let payload: Box<dyn StdError + Send + Sync> = Box::new(io::Error::new(io::ErrorKind::Other, "disk on fire"));
        let error = GenericError::from(PanicError::from_payload(Box::new(payload)));

        assert!(chain_contains::<io::Error>(&error));
        assert!(error.to_string().contains("disk on fire"));
    }

    #[test]
    fn unknown_payload() {
        let error = PanicError::from_payload(Box::new(42u64));
        assert_eq!(error.message(), "panic payload of unknown type");
    }
}
