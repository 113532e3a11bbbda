use std::future::Future;

use async_trait::async_trait;
use bedrock_error::GenericError;
use tokio_util::sync::CancellationToken;

/// A runnable component.
///
/// A runtime is consumed when it runs, so it can run at most once. It should run until its work is complete, it
/// fails, or `ctx` is cancelled. Cancellation is a request to stop gracefully: a runtime that winds down cleanly after
/// its context is cancelled should return `Ok(())`, and reserve errors for abnormal failures.
#[async_trait]
pub trait Runtime: Send + 'static {
    /// Runs the component until completion or cancellation.
    ///
    /// # Errors
    ///
    /// If the component fails for any reason other than an orderly stop, an error is returned.
    async fn run(self, ctx: CancellationToken) -> Result<(), GenericError>;
}

/// A runtime backed by an asynchronous closure.
///
/// Created by [`runtime_fn`].
pub struct RuntimeFn<F> {
    f: F,
}

/// Creates a runtime from an asynchronous closure.
pub fn runtime_fn<F, Fut>(f: F) -> RuntimeFn<F>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), GenericError>> + Send + 'static,
{
    RuntimeFn { f }
}

#[async_trait]
impl<F, Fut> Runtime for RuntimeFn<F>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), GenericError>> + Send + 'static,
{
    async fn run(self, ctx: CancellationToken) -> Result<(), GenericError> {
        (self.f)(ctx).await
    }
}
