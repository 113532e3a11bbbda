//! Lifecycle hooks.
//!
//! A [`Lifecycle`] collects hooks that must run once the main runtime of a process has returned, such as flushing
//! telemetry or closing connection pools. It is passed explicitly to whichever builders need to register hooks, and
//! to the [`PostRunHooks`][crate::PostRunHooks] runner decorator that runs them.

use std::{
    future::Future,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bedrock_error::GenericError;
use tokio_util::sync::CancellationToken;

/// A lifecycle hook.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Runs the hook.
    ///
    /// # Errors
    ///
    /// If the hook fails, an error is returned.
    async fn run(&self, ctx: &CancellationToken) -> Result<(), GenericError>;
}

/// A hook backed by an asynchronous closure.
///
/// Created by [`hook_fn`].
pub struct HookFn<F> {
    f: F,
}

/// Creates a hook from an asynchronous closure.
pub fn hook_fn<F, Fut>(f: F) -> HookFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), GenericError>> + Send + 'static,
{
    HookFn { f }
}

#[async_trait]
impl<F, Fut> Hook for HookFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), GenericError>> + Send + 'static,
{
    async fn run(&self, ctx: &CancellationToken) -> Result<(), GenericError> {
        (self.f)(ctx.clone()).await
    }
}

/// A registry of lifecycle hooks.
///
/// `Lifecycle` is cheaply cloneable, and all clones share the same set of hooks.
#[derive(Clone, Default)]
pub struct Lifecycle {
    post_run: Arc<Mutex<Vec<Arc<dyn Hook>>>>,
}

impl Lifecycle {
    /// Creates an empty `Lifecycle`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hook to run after the main runtime has returned.
    ///
    /// Post-run hooks run in the order they were registered, regardless of whether the runtime succeeded.
    pub fn on_post_run<H>(&self, hook: H)
    where
        H: Hook + 'static,
    {
        self.post_run.lock().unwrap().push(Arc::new(hook));
    }

    /// Returns the registered post-run hooks, in registration order.
    pub fn post_run_hooks(&self) -> Vec<Arc<dyn Hook>> {
        self.post_run.lock().unwrap().clone()
    }
}
