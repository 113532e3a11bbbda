use std::{future::Future, marker::PhantomData};

use async_trait::async_trait;
use bedrock_core::CancellationToken;
use bedrock_error::GenericError;

use crate::{Reader, Value};

/// A reader that tries several readers in order.
///
/// Created by [`or`] or [`ReaderExt::or`].
pub struct Or<T> {
    readers: Vec<Box<dyn Reader<T>>>,
}

/// Tries each reader in turn, returning the first set value.
///
/// An error from any reader stops the chain and is returned immediately, without consulting the remaining readers. If
/// every reader comes back unset, the result is unset.
pub fn or<T>(readers: Vec<Box<dyn Reader<T>>>) -> Or<T> {
    Or { readers }
}

#[async_trait]
impl<T> Reader<T> for Or<T>
where
    T: Send + 'static,
{
    async fn read(&self, ctx: &CancellationToken) -> Result<Value<T>, GenericError> {
        for reader in &self.readers {
            let value = reader.read(ctx).await?;
            if value.is_set() {
                return Ok(value);
            }
        }

        Ok(Value::unset())
    }
}

/// A reader with a fallback value.
///
/// Created by [`default_to`] or [`ReaderExt::default_to`].
pub struct DefaultTo<R, T> {
    reader: R,
    default: T,
}

/// Falls back to `default` when `reader` has nothing set.
///
/// Errors from `reader` are returned as-is rather than replaced by the default.
pub fn default_to<T, R>(default: T, reader: R) -> DefaultTo<R, T>
where
    R: Reader<T>,
{
    DefaultTo { reader, default }
}

#[async_trait]
impl<T, R> Reader<T> for DefaultTo<R, T>
where
    R: Reader<T>,
    T: Clone + Send + Sync + 'static,
{
    async fn read(&self, ctx: &CancellationToken) -> Result<Value<T>, GenericError> {
        let value = self.reader.read(ctx).await?;
        if value.is_set() {
            Ok(value)
        } else {
            Ok(Value::set(self.default.clone()))
        }
    }
}

/// A reader that transforms the value of another reader.
///
/// Created by [`map`] or [`ReaderExt::map`].
pub struct Map<R, F, A> {
    reader: R,
    f: F,
    _source: PhantomData<fn() -> A>,
}

/// Transforms the value read by `reader` with `f`.
///
/// `f` is only called when the source value is set; an unset source stays unset.
pub fn map<A, U, R, F>(reader: R, f: F) -> Map<R, F, A>
where
    R: Reader<A>,
    F: Fn(A) -> Result<U, GenericError> + Send + Sync,
{
    Map {
        reader,
        f,
        _source: PhantomData,
    }
}

#[async_trait]
impl<A, U, R, F> Reader<U> for Map<R, F, A>
where
    R: Reader<A>,
    F: Fn(A) -> Result<U, GenericError> + Send + Sync,
    A: Send + 'static,
    U: Send + 'static,
{
    async fn read(&self, ctx: &CancellationToken) -> Result<Value<U>, GenericError> {
        match self.reader.read(ctx).await?.into_option() {
            Some(value) => (self.f)(value).map(Value::set),
            None => Ok(Value::unset()),
        }
    }
}

/// A reader whose value depends on the value of another reader.
///
/// Created by [`bind`] or [`ReaderExt::bind`].
pub struct Bind<R, F, A> {
    reader: R,
    f: F,
    _source: PhantomData<fn() -> A>,
}

/// Reads `reader`, and uses its value to pick the next reader.
///
/// When the source value is set, `f` is called with it and the returned reader is read with the same context. When the
/// source value is unset, `f` is never called and the result is unset.
pub fn bind<A, U, R, F, N>(reader: R, f: F) -> Bind<R, F, A>
where
    R: Reader<A>,
    F: Fn(A) -> N + Send + Sync,
    N: Reader<U>,
{
    Bind {
        reader,
        f,
        _source: PhantomData,
    }
}

#[async_trait]
impl<A, U, R, F, N> Reader<U> for Bind<R, F, A>
where
    R: Reader<A>,
    F: Fn(A) -> N + Send + Sync,
    N: Reader<U> + 'static,
    A: Send + 'static,
    U: Send + 'static,
{
    async fn read(&self, ctx: &CancellationToken) -> Result<Value<U>, GenericError> {
        match self.reader.read(ctx).await?.into_option() {
            Some(value) => {
                let next = (self.f)(value);
                next.read(ctx).await
            }
            None => Ok(Value::unset()),
        }
    }
}

/// A reader that always returns the same value.
///
/// Created by [`value_of`].
#[derive(Clone, Debug)]
pub struct Constant<T> {
    value: T,
}

/// Creates a reader that always returns `value`.
pub fn value_of<T>(value: T) -> Constant<T> {
    Constant { value }
}

#[async_trait]
impl<T> Reader<T> for Constant<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn read(&self, _ctx: &CancellationToken) -> Result<Value<T>, GenericError> {
        Ok(Value::set(self.value.clone()))
    }
}

/// A reader that never has a value.
///
/// Created by [`unset`].
pub struct Unset<T> {
    _value: PhantomData<fn() -> T>,
}

/// Creates a reader that always returns an unset value.
pub fn unset<T>() -> Unset<T> {
    Unset { _value: PhantomData }
}

#[async_trait]
impl<T> Reader<T> for Unset<T>
where
    T: Send + 'static,
{
    async fn read(&self, _ctx: &CancellationToken) -> Result<Value<T>, GenericError> {
        Ok(Value::unset())
    }
}

/// A reader backed by an asynchronous closure.
///
/// Created by [`reader_fn`].
pub struct ReaderFn<F> {
    f: F,
}

/// Creates a reader from an asynchronous closure.
pub fn reader_fn<F, Fut, T>(f: F) -> ReaderFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value<T>, GenericError>> + Send + 'static,
{
    ReaderFn { f }
}

#[async_trait]
impl<F, Fut, T> Reader<T> for ReaderFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value<T>, GenericError>> + Send + 'static,
    T: Send + 'static,
{
    async fn read(&self, ctx: &CancellationToken) -> Result<Value<T>, GenericError> {
        (self.f)(ctx.clone()).await
    }
}

/// Extension methods for composing readers.
pub trait ReaderExt<T>: Reader<T> + Sized {
    /// Transforms the value of this reader with `f`.
    ///
    /// See [`map`].
    fn map<U, F>(self, f: F) -> Map<Self, F, T>
    where
        F: Fn(T) -> Result<U, GenericError> + Send + Sync,
    {
        map(self, f)
    }

    /// Uses the value of this reader to pick the next reader.
    ///
    /// See [`bind`].
    fn bind<U, F, N>(self, f: F) -> Bind<Self, F, T>
    where
        F: Fn(T) -> N + Send + Sync,
        N: Reader<U>,
    {
        bind(self, f)
    }

    /// Falls back to `default` when this reader has nothing set.
    ///
    /// See [`default_to`].
    fn default_to(self, default: T) -> DefaultTo<Self, T> {
        default_to(default, self)
    }

    /// Falls back to `other` when this reader has nothing set.
    ///
    /// See [`or`].
    fn or<R>(self, other: R) -> Or<T>
    where
        Self: 'static,
        R: Reader<T> + 'static,
    {
        or(vec![Box::new(self), Box::new(other)])
    }
}

impl<T, R> ReaderExt<T> for R where R: Reader<T> {}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use bedrock_error::generic_error;

    use super::*;
    use crate::read;

    fn counting<T>(calls: &Arc<AtomicUsize>, value: Value<T>) -> impl Reader<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let calls = Arc::clone(calls);
        reader_fn(move |_ctx| {
            calls.fetch_add(1, Ordering::SeqCst);
            let value = value.clone();
            async move { Ok(value) }
        })
    }

    fn failing<T: Send + 'static>() -> impl Reader<T> {
        reader_fn(|_ctx| async { Err::<Value<T>, _>(generic_error!("source failed")) })
    }

    #[tokio::test]
    async fn or_returns_first_set_value() {
        let ctx = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let reader = or::<u32>(vec![
            Box::new(unset::<u32>()),
            Box::new(value_of(7u32)),
            Box::new(counting(&calls, Value::set(9u32))),
        ]);

        assert_eq!(read(&ctx, &reader).await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn or_stops_at_first_error() {
        let ctx = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let reader = or::<u32>(vec![
            Box::new(unset::<u32>()),
            Box::new(failing::<u32>()),
            Box::new(counting(&calls, Value::set(9u32))),
        ]);

        assert!(reader.read(&ctx).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn or_all_unset_is_unset() {
        let ctx = CancellationToken::new();
        let reader = or::<u32>(vec![Box::new(unset::<u32>()), Box::new(unset::<u32>())]);
        assert!(!reader.read(&ctx).await.unwrap().is_set());

        let empty = or::<u32>(Vec::new());
        assert!(!empty.read(&ctx).await.unwrap().is_set());
    }

    #[tokio::test]
    async fn default_to_distinguishes_unset_from_zero() {
        let ctx = CancellationToken::new();

        let defaulted = default_to(5u32, unset());
        assert_eq!(defaulted.read(&ctx).await.unwrap(), Value::set(5));

        let configured_zero = default_to(5u32, value_of(0u32));
        assert_eq!(configured_zero.read(&ctx).await.unwrap(), Value::set(0));
    }

    #[tokio::test]
    async fn default_to_does_not_hide_errors() {
        let ctx = CancellationToken::new();
        let reader = failing::<u32>().default_to(5);
        assert!(reader.read(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn map_skipped_when_unset() {
        let ctx = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mapper_calls = Arc::clone(&calls);
        let reader = unset::<u32>().map(move |value| {
            mapper_calls.fetch_add(1, Ordering::SeqCst);
            Ok(value * 2)
        });

        assert!(!reader.read(&ctx).await.unwrap().is_set());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn map_transforms_and_fails() {
        let ctx = CancellationToken::new();

        let doubled = value_of(21u32).map(|value| Ok(value * 2));
        assert_eq!(read(&ctx, &doubled).await.unwrap(), 42);

        let rejected = value_of(0u32).map(|_| Err::<u32, _>(generic_error!("zero is not allowed")));
        assert!(rejected.read(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn bind_reads_dependent_reader() {
        let ctx = CancellationToken::new();

        let reader = value_of(String::from("primary")).bind(|name| value_of(format!("{}-replica", name)));
        assert_eq!(read(&ctx, &reader).await.unwrap(), "primary-replica");

        let calls = Arc::new(AtomicUsize::new(0));
        let binder_calls = Arc::clone(&calls);
        let skipped = unset::<String>().bind(move |name| {
            binder_calls.fetch_add(1, Ordering::SeqCst);
            value_of(name)
        });
        assert!(!skipped.read(&ctx).await.unwrap().is_set());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn or_from_extension() {
        let ctx = CancellationToken::new();
        let reader = unset::<u16>().or(value_of(8080u16));
        assert_eq!(read(&ctx, &reader).await.unwrap(), 8080);
    }
}
