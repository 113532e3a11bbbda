//! Composition core for long-running service processes.
//!
//! A process is assembled from three kinds of parts:
//!
//! - a [`Builder`], which constructs a value (usually a [`Runtime`]) from a cancellable context,
//! - a [`Runtime`], which runs until it completes, fails, or its context is cancelled,
//! - a [`Runner`], which builds a runtime and then runs it.
//!
//! Builders compose through [`BuilderExt`]: they can be mapped, chained with a dependent builder, or memoized so that
//! the underlying construction happens at most once. Runners are decorated to add cross-cutting behavior one concern
//! at a time, such as cancelling on OS signals ([`NotifyOnSignal`]), converting panics into errors ([`RecoverPanics`]),
//! or running post-run hooks registered on a [`Lifecycle`] ([`PostRunHooks`]).
//!
//! # Contexts
//!
//! Every operation takes a [`CancellationToken`] as its context. Cancellation is a request to stop: components are
//! expected to observe it and wind down gracefully, rather than being aborted mid-operation.
#![deny(missing_docs)]

pub use tokio_util::sync::CancellationToken;

mod builder;
pub use self::builder::{bind, builder_fn, map, memoize, Bind, Builder, BuilderExt, BuilderFn, Map, Memoize};

pub mod lifecycle;
pub use self::lifecycle::Lifecycle;

mod runtime;
pub use self::runtime::{runtime_fn, Runtime, RuntimeFn};

pub mod runner;
pub use self::runner::{DefaultRunner, NotifyOnSignal, PanicError, PostRunHooks, ProcessSignal, RecoverPanics, Runner};

pub mod task;
