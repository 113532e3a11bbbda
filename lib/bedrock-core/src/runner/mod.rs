//! Runners and runner decorators.
//!
//! A [`Runner`] drives a [`Builder`] through its two phases: the build phase, which produces a [`Runtime`], and the
//! run phase, which runs it. [`DefaultRunner`] does exactly that and nothing else. Everything else is layered on top
//! as a decorator that wraps another runner and adds a single concern:
//!
//! - [`NotifyOnSignal`] cancels the context when an OS signal arrives,
//! - [`RecoverPanics`] converts panics into [`PanicError`]s,
//! - [`PostRunHooks`] runs the post-run hooks registered on a [`Lifecycle`][crate::Lifecycle].
//!
//! Decorators compose in any order, but the usual arrangement is to put `RecoverPanics` outermost so that it can
//! contain panics raised anywhere below it:
//!
//! ```rust,ignore
//! let runner = RecoverPanics::new(NotifyOnSignal::with_default_signals(PostRunHooks::new(DefaultRunner, lifecycle)));
//! runner.run(&ctx, &builder).await?;
//! ```

use async_trait::async_trait;
use bedrock_error::GenericError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Builder, Runtime};

mod hooks;
pub use self::hooks::PostRunHooks;

mod panic;
pub use self::panic::{PanicError, RecoverPanics};

mod signal;
pub use self::signal::{NotifyOnSignal, ProcessSignal, SignalError};

/// Builds and runs a component.
#[async_trait]
pub trait Runner<T>: Send + Sync {
    /// Builds a `T` with `builder` and then runs it, reporting the combined outcome.
    ///
    /// # Errors
    ///
    /// If either the build or the run fails, an error is returned.
    async fn run(&self, ctx: &CancellationToken, builder: &dyn Builder<T>) -> Result<(), GenericError>;
}

#[async_trait]
impl<T, R> Runner<T> for Box<R>
where
    R: Runner<T> + ?Sized,
    T: Send + 'static,
{
    async fn run(&self, ctx: &CancellationToken, builder: &dyn Builder<T>) -> Result<(), GenericError> {
        (**self).run(ctx, builder).await
    }
}

/// The base runner.
///
/// Builds the runtime and, only if that succeeds, runs it. A build failure is returned as-is, and the run phase is
/// never entered.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultRunner;

#[async_trait]
impl<T> Runner<T> for DefaultRunner
where
    T: Runtime,
{
    async fn run(&self, ctx: &CancellationToken, builder: &dyn Builder<T>) -> Result<(), GenericError> {
        debug!("Building runtime.");
        let runtime = match builder.build(ctx).await {
            Ok(runtime) => runtime,
            Err(e) => {
                debug!(error = %e, "Failed to build runtime.");
                return Err(e);
            }
        };

        debug!("Running runtime.");
        let result = runtime.run(ctx.clone()).await;
        debug!(success = result.is_ok(), "Runtime stopped.");

        result
    }
}
