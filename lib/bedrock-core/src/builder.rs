use std::{
    error::Error as StdError,
    fmt,
    future::Future,
    marker::PhantomData,
    panic::resume_unwind,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bedrock_error::GenericError;
use futures::{
    future::{BoxFuture, Shared},
    FutureExt as _,
};
use tokio_util::sync::CancellationToken;

use crate::task::spawn_traced;

/// A component builder.
///
/// A builder constructs a value of type `T` from a cancellable context, or fails. Builders must not hold on to the
/// context beyond the call to [`build`][Builder::build], and no side effect of building should be assumed idempotent
/// unless the builder is explicitly memoized (see [`BuilderExt::memoize`]).
#[async_trait]
pub trait Builder<T>: Send + Sync {
    /// Builds the value.
    ///
    /// # Errors
    ///
    /// If the value cannot be constructed, an error is returned.
    async fn build(&self, ctx: &CancellationToken) -> Result<T, GenericError>;
}

#[async_trait]
impl<T, B> Builder<T> for Box<B>
where
    B: Builder<T> + ?Sized,
{
    async fn build(&self, ctx: &CancellationToken) -> Result<T, GenericError> {
        (**self).build(ctx).await
    }
}

#[async_trait]
impl<T, B> Builder<T> for Arc<B>
where
    B: Builder<T> + ?Sized,
{
    async fn build(&self, ctx: &CancellationToken) -> Result<T, GenericError> {
        (**self).build(ctx).await
    }
}

/// A builder backed by an asynchronous closure.
///
/// Created by [`builder_fn`].
pub struct BuilderFn<F> {
    f: F,
}

/// Creates a builder from an asynchronous closure.
///
/// The closure is given its own handle to the context, and is called once per build.
pub fn builder_fn<F, Fut, T>(f: F) -> BuilderFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, GenericError>> + Send + 'static,
{
    BuilderFn { f }
}

#[async_trait]
impl<F, Fut, T> Builder<T> for BuilderFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, GenericError>> + Send + 'static,
    T: Send + 'static,
{
    async fn build(&self, ctx: &CancellationToken) -> Result<T, GenericError> {
        (self.f)(ctx.clone()).await
    }
}

/// A builder that transforms the output of another builder.
///
/// Created by [`map`] or [`BuilderExt::map`].
pub struct Map<B, F, A> {
    builder: B,
    f: F,
    _source: PhantomData<fn() -> A>,
}

/// Transforms the output of `builder` with `f`.
///
/// `f` is only called when `builder` succeeds. A failure from either the source builder or the mapping function
/// short-circuits the build.
pub fn map<A, U, B, F>(builder: B, f: F) -> Map<B, F, A>
where
    B: Builder<A>,
    F: Fn(A) -> Result<U, GenericError> + Send + Sync,
{
    Map {
        builder,
        f,
        _source: PhantomData,
    }
}

#[async_trait]
impl<A, U, B, F> Builder<U> for Map<B, F, A>
where
    B: Builder<A>,
    F: Fn(A) -> Result<U, GenericError> + Send + Sync,
    A: Send + 'static,
    U: Send + 'static,
{
    async fn build(&self, ctx: &CancellationToken) -> Result<U, GenericError> {
        let value = self.builder.build(ctx).await?;
        (self.f)(value)
    }
}

/// A builder whose construction depends on the output of another builder.
///
/// Created by [`bind`] or [`BuilderExt::bind`].
pub struct Bind<B, F, A> {
    builder: B,
    f: F,
    _source: PhantomData<fn() -> A>,
}

/// Chains `builder` into a dependent builder produced by `f`.
///
/// `f` receives the output of `builder` and returns the next builder, which is then built with the same context. This
/// allows the second step to depend on values only known after the first, such as reading a file path from
/// configuration and then opening the file.
pub fn bind<A, U, B, F, N>(builder: B, f: F) -> Bind<B, F, A>
where
    B: Builder<A>,
    F: Fn(A) -> N + Send + Sync,
    N: Builder<U>,
{
    Bind {
        builder,
        f,
        _source: PhantomData,
    }
}

#[async_trait]
impl<A, U, B, F, N> Builder<U> for Bind<B, F, A>
where
    B: Builder<A>,
    F: Fn(A) -> N + Send + Sync,
    N: Builder<U> + 'static,
    A: Send + 'static,
    U: Send + 'static,
{
    async fn build(&self, ctx: &CancellationToken) -> Result<U, GenericError> {
        let value = self.builder.build(ctx).await?;
        let next = (self.f)(value);
        next.build(ctx).await
    }
}

/// A builder that builds at most once.
///
/// Created by [`memoize`] or [`BuilderExt::memoize`].
///
/// The outcome of the first build (whether a value or an error) is cached, and every subsequent build returns the
/// cached outcome without calling the underlying builder again. The first build runs on its own task, detached from
/// the caller that started it: a caller that is dropped mid-build (timed out, or losing a `select!`) doesn't cancel
/// it, and later callers wait for the same build instead of starting another. The build still observes the context
/// of the caller that started it.
///
/// Values are handed out as clones, and errors are shared: each caller receives an error that wraps the same
/// underlying failure. A panic during the build is resumed on every caller.
///
/// To share a memoized builder between several dependents, wrap it in an [`Arc`].
pub struct Memoize<B, T> {
    builder: Arc<B>,
    outcome: Mutex<Option<SharedBuild<T>>>,
}

type SharedBuild<T> = Shared<BoxFuture<'static, Result<T, Arc<GenericError>>>>;

/// Memoizes `builder` so that it builds at most once.
pub fn memoize<T, B>(builder: B) -> Memoize<B, T>
where
    B: Builder<T> + 'static,
{
    Memoize {
        builder: Arc::new(builder),
        outcome: Mutex::new(None),
    }
}

impl<B, T> Memoize<B, T>
where
    B: Builder<T> + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn shared_build(&self, ctx: &CancellationToken) -> SharedBuild<T> {
        let mut outcome = self.outcome.lock().unwrap();
        outcome
            .get_or_insert_with(|| {
                let builder = Arc::clone(&self.builder);
                let ctx = ctx.clone();
                let handle = spawn_traced(async move { builder.build(&ctx).await.map_err(Arc::new) });

                async move {
                    match handle.await {
                        Ok(outcome) => outcome,
                        Err(e) => match e.try_into_panic() {
                            Ok(payload) => resume_unwind(payload),
                            Err(e) => Err(Arc::new(GenericError::from(e))),
                        },
                    }
                }
                .boxed()
                .shared()
            })
            .clone()
    }
}

#[async_trait]
impl<T, B> Builder<T> for Memoize<B, T>
where
    B: Builder<T> + 'static,
    T: Clone + Send + Sync + 'static,
{
    async fn build(&self, ctx: &CancellationToken) -> Result<T, GenericError> {
        match self.shared_build(ctx).await {
            Ok(value) => Ok(value),
            Err(e) => Err(GenericError::from(CachedError(e))),
        }
    }
}

/// A build failure handed out again by a memoized builder.
#[derive(Debug)]
struct CachedError(Arc<GenericError>);

impl fmt::Display for CachedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl StdError for CachedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        let source: &(dyn StdError + 'static) = (*self.0).as_ref();
        Some(source)
    }
}

/// Builder combinators.
pub trait BuilderExt<T>: Builder<T> + Sized {
    /// Transforms the output of this builder with `f`.
    ///
    /// See [`map`] for more information.
    fn map<U, F>(self, f: F) -> Map<Self, F, T>
    where
        F: Fn(T) -> Result<U, GenericError> + Send + Sync,
    {
        map(self, f)
    }

    /// Chains this builder into a dependent builder produced by `f`.
    ///
    /// See [`bind`] for more information.
    fn bind<U, F, N>(self, f: F) -> Bind<Self, F, T>
    where
        F: Fn(T) -> N + Send + Sync,
        N: Builder<U>,
    {
        bind(self, f)
    }

    /// Memoizes this builder so that it builds at most once.
    ///
    /// See [`Memoize`] for more information.
    fn memoize(self) -> Memoize<Self, T>
    where
        Self: 'static,
    {
        memoize(self)
    }
}

impl<T, B> BuilderExt<T> for B where B: Builder<T> + Sized {}
