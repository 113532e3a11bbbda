//! Telemetry provider wiring.
//!
//! Telemetry SDKs (tracing exporters, metrics recorders, and the like) are consumed through the narrow
//! [`TelemetryProvider`] capability: they are initialized before the main component is built, and shut down, so that
//! buffered data gets flushed, once it has stopped running.

use std::{marker::PhantomData, sync::Arc};

use async_trait::async_trait;
use bedrock_core::{lifecycle::Hook, Builder, CancellationToken, Lifecycle};
use bedrock_error::{ErrorContext as _, GenericError};
use tokio::sync::OnceCell;
use tracing::debug;

/// A telemetry provider.
#[async_trait]
pub trait TelemetryProvider: Send + Sync + 'static {
    /// Initializes the provider.
    ///
    /// # Errors
    ///
    /// If the provider could not be initialized, an error is returned.
    async fn initialize(&self, ctx: &CancellationToken) -> Result<(), GenericError>;

    /// Shuts the provider down, flushing any buffered telemetry.
    ///
    /// # Errors
    ///
    /// If the provider could not be shut down cleanly, an error is returned.
    async fn shutdown(&self, ctx: &CancellationToken) -> Result<(), GenericError>;
}

struct ShutdownTelemetry<P> {
    provider: Arc<P>,
}

#[async_trait]
impl<P: TelemetryProvider> Hook for ShutdownTelemetry<P> {
    async fn run(&self, ctx: &CancellationToken) -> Result<(), GenericError> {
        debug!("Shutting down telemetry provider.");
        self.provider
            .shutdown(ctx)
            .await
            .error_context("failed to shut down telemetry provider")
    }
}

/// A builder that initializes a telemetry provider before building.
///
/// Created by [`with_telemetry`].
pub struct WithTelemetry<B, P, T> {
    builder: B,
    provider: Arc<P>,
    lifecycle: Lifecycle,
    initialized: OnceCell<()>,
    _output: PhantomData<fn() -> T>,
}

/// Initializes `provider` before building with `builder`.
///
/// Once the provider is initialized, its shutdown is registered as a post-run hook on `lifecycle`, so it runs after the
/// main component has stopped, even if building the component fails afterwards. If the provider fails to initialize,
/// `builder` is never invoked.
///
/// The provider is initialized, and its shutdown registered, only once: later builds reuse the initialized provider.
/// A failed initialization is retried on the next build.
pub fn with_telemetry<T, B, P>(builder: B, provider: P, lifecycle: Lifecycle) -> WithTelemetry<B, P, T>
where
    B: Builder<T>,
    P: TelemetryProvider,
{
    WithTelemetry {
        builder,
        provider: Arc::new(provider),
        lifecycle,
        initialized: OnceCell::new(),
        _output: PhantomData,
    }
}

#[async_trait]
impl<T, B, P> Builder<T> for WithTelemetry<B, P, T>
where
    B: Builder<T>,
    P: TelemetryProvider,
    T: Send + 'static,
{
    async fn build(&self, ctx: &CancellationToken) -> Result<T, GenericError> {
        self.initialized
            .get_or_try_init(|| async {
                self.provider
                    .initialize(ctx)
                    .await
                    .error_context("failed to initialize telemetry provider")?;
                self.lifecycle.on_post_run(ShutdownTelemetry {
                    provider: Arc::clone(&self.provider),
                });
                Ok::<_, GenericError>(())
            })
            .await?;

        self.builder.build(ctx).await
    }
}
