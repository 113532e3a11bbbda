use std::panic::{resume_unwind, AssertUnwindSafe};

use async_trait::async_trait;
use bedrock_error::{GenericError, MultiError};
use futures::FutureExt as _;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{PanicError, Runner};
use crate::{Builder, Lifecycle};

/// A runner decorator that runs post-run hooks.
///
/// Once the wrapped runner returns, every post-run hook registered on the [`Lifecycle`] is run, in registration order,
/// whether the runner succeeded, failed, or panicked. Hooks run with a fresh context, since the original context is
/// typically already cancelled by the time the runner returns.
///
/// Errors from the runner and from the hooks are combined into a single [`MultiError`] so that none of them are lost.
/// A panicking hook is contained and reported as a [`PanicError`]. If the wrapped runner itself panicked, the panic is
/// resumed after the hooks have run: with the original payload when all hooks succeeded, or with an error payload that
/// carries both the panic and the hook failures otherwise.
pub struct PostRunHooks<R> {
    inner: R,
    lifecycle: Lifecycle,
}

impl<R> PostRunHooks<R> {
    /// Wraps `inner` so that the post-run hooks of `lifecycle` run after it.
    pub fn new(inner: R, lifecycle: Lifecycle) -> Self {
        Self { inner, lifecycle }
    }

    async fn run_hooks(&self) -> Vec<GenericError> {
        let hooks = self.lifecycle.post_run_hooks();
        debug!(hooks = hooks.len(), "Running post-run hooks.");

        let ctx = CancellationToken::new();
        let mut errors = Vec::new();
        for (index, hook) in hooks.iter().enumerate() {
            let result = match AssertUnwindSafe(hook.run(&ctx)).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(PanicError::from_payload(payload).into()),
            };

            if let Err(e) = result {
                warn!(hook = index, error = %e, "Post-run hook failed.");
                errors.push(e);
            }
        }

        errors
    }
}

#[async_trait]
impl<T, R> Runner<T> for PostRunHooks<R>
where
    R: Runner<T>,
    T: Send + 'static,
{
    async fn run(&self, ctx: &CancellationToken, builder: &dyn Builder<T>) -> Result<(), GenericError> {
        let outcome = AssertUnwindSafe(self.inner.run(ctx, builder)).catch_unwind().await;
        let hook_errors = self.run_hooks().await;

        match outcome {
            Ok(result) => {
                let mut errors = MultiError::new();
                if let Err(e) = result {
                    errors.push(e);
                }
                for e in hook_errors {
                    errors.push(e);
                }
                errors.into_result()
            }
            Err(payload) => {
                if hook_errors.is_empty() {
                    resume_unwind(payload);
                }

                let mut errors = MultiError::new();
                errors.push(PanicError::from_payload(payload).into());
                for e in hook_errors {
                    errors.push(e);
                }
                resume_unwind(Box::new(GenericError::from(errors)))
            }
        }
    }
}
