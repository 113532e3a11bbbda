use std::{fmt, io};

use async_trait::async_trait;
use bedrock_error::GenericError;
use futures::future::select_all;
use snafu::{ResultExt as _, Snafu};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::Runner;
use crate::{task::spawn_traced, Builder};

/// An OS signal that can cancel a running component.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ProcessSignal {
    /// Interrupt (`SIGINT`, or Ctrl-C).
    Interrupt,

    /// Termination request (`SIGTERM`).
    Terminate,

    /// Hangup (`SIGHUP`).
    Hangup,

    /// Quit (`SIGQUIT`).
    Quit,
}

impl ProcessSignal {
    /// Returns the conventional name of the signal.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Hangup => "SIGHUP",
            Self::Quit => "SIGQUIT",
        }
    }
}

impl fmt::Display for ProcessSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signal handling errors.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum SignalError {
    /// Failed to register a handler for the signal.
    #[snafu(display("failed to register handler for {}: {}", signal, source))]
    Register {
        /// Signal being registered.
        signal: ProcessSignal,

        /// Source of the error.
        source: io::Error,
    },

    /// The signal can't be observed on this platform.
    #[snafu(display("{} is not supported on this platform", signal))]
    Unsupported {
        /// Signal being registered.
        signal: ProcessSignal,
    },
}

struct SignalListener {
    signal: ProcessSignal,
    #[cfg(unix)]
    inner: tokio::signal::unix::Signal,
}

impl SignalListener {
    #[cfg(unix)]
    fn register(signal: ProcessSignal) -> Result<Self, SignalError> {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};

        let kind = match signal {
            ProcessSignal::Interrupt => SignalKind::interrupt(),
            ProcessSignal::Terminate => SignalKind::terminate(),
            ProcessSignal::Hangup => SignalKind::hangup(),
            ProcessSignal::Quit => SignalKind::quit(),
        };
        let inner = unix_signal(kind).context(Register { signal })?;

        Ok(Self { signal, inner })
    }

    #[cfg(not(unix))]
    fn register(signal: ProcessSignal) -> Result<Self, SignalError> {
        match signal {
            ProcessSignal::Interrupt => Ok(Self { signal }),
            _ => Err(SignalError::Unsupported { signal }),
        }
    }

    #[cfg(unix)]
    async fn recv(&mut self) -> ProcessSignal {
        if self.inner.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
        self.signal
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> ProcessSignal {
        // Failing to wait for Ctrl-C means we'll never see it, so treat that like a signal that never arrives.
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        self.signal
    }
}

/// A runner decorator that cancels the context when an OS signal arrives.
///
/// Handlers for the configured signals are registered each time the runner runs. The wrapped runner is given a child
/// context that is cancelled as soon as any of the signals is received, and the handlers are torn down once the
/// wrapped runner returns, however it returns. Receiving a signal doesn't produce an error of its own: the component is
/// expected to observe the cancellation and stop.
pub struct NotifyOnSignal<R> {
    inner: R,
    signals: Vec<ProcessSignal>,
}

impl<R> NotifyOnSignal<R> {
    /// Wraps `inner` so that it is cancelled when any of `signals` arrive.
    pub fn new<I>(inner: R, signals: I) -> Self
    where
        I: IntoIterator<Item = ProcessSignal>,
    {
        Self {
            inner,
            signals: signals.into_iter().collect(),
        }
    }

    /// Wraps `inner` so that it is cancelled on `SIGINT` or `SIGTERM`.
    ///
    /// On platforms without `SIGTERM`, only `SIGINT` (Ctrl-C) is used.
    pub fn with_default_signals(inner: R) -> Self {
        if cfg!(unix) {
            Self::new(inner, [ProcessSignal::Interrupt, ProcessSignal::Terminate])
        } else {
            Self::new(inner, [ProcessSignal::Interrupt])
        }
    }
}

#[async_trait]
impl<T, R> Runner<T> for NotifyOnSignal<R>
where
    R: Runner<T>,
    T: Send + 'static,
{
    async fn run(&self, ctx: &CancellationToken, builder: &dyn Builder<T>) -> Result<(), GenericError> {
        let mut listeners = Vec::with_capacity(self.signals.len());
        for signal in &self.signals {
            listeners.push(SignalListener::register(*signal)?);
        }

        let signal_ctx = ctx.child_token();

        // Dropping the guard stops the watcher, which in turn drops the signal handlers.
        let _teardown = signal_ctx.clone().drop_guard();
        spawn_traced(watch_signals(listeners, signal_ctx.clone()));

        self.inner.run(&signal_ctx, builder).await
    }
}

async fn watch_signals(mut listeners: Vec<SignalListener>, ctx: CancellationToken) {
    if listeners.is_empty() {
        return;
    }

    let received = {
        let pending = listeners.iter_mut().map(|listener| Box::pin(listener.recv()));
        select! {
            _ = ctx.cancelled() => None,
            (signal, _, _) = select_all(pending) => Some(signal),
        }
    };

    match received {
        Some(signal) => {
            info!(%signal, "Received signal. Cancelling context.");
            ctx.cancel();
        }
        None => debug!("Context finished before any signal was received."),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{process::Command, time::Duration};

    use super::*;
    use crate::{builder_fn, DefaultRunner, Runtime};

    fn send_hangup_to_self() {
        let status = Command::new("kill")
            .args(["-HUP", &std::process::id().to_string()])
            .status()
            .expect("should be able to run kill");
        assert!(status.success());
    }

    struct WaitForCancel {
        raise_hangup: bool,
    }

    #[async_trait]
    impl Runtime for WaitForCancel {
        async fn run(self, ctx: CancellationToken) -> Result<(), GenericError> {
            if self.raise_hangup {
                send_hangup_to_self();
            }

            tokio::time::timeout(Duration::from_secs(5), ctx.cancelled())
                .await
                .expect("context should be cancelled");

            if self.raise_hangup {
                send_hangup_to_self();
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn signal_cancels_context_and_second_signal_is_harmless() {
        let builder = builder_fn(|_ctx| async { Ok(WaitForCancel { raise_hangup: true }) });
        let builder: &dyn Builder<WaitForCancel> = &builder;

        let runner = NotifyOnSignal::new(DefaultRunner, [ProcessSignal::Hangup]);
        let parent = CancellationToken::new();
        runner.run(&parent, builder).await.unwrap();

        // Only the derived context is cancelled.
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn parent_cancellation_still_reaches_component() {
        let builder = builder_fn(|_ctx| async { Ok(WaitForCancel { raise_hangup: false }) });
        let builder: &dyn Builder<WaitForCancel> = &builder;

        let runner = NotifyOnSignal::new(DefaultRunner, [ProcessSignal::Quit]);
        let parent = CancellationToken::new();
        parent.cancel();

        runner.run(&parent, builder).await.unwrap();
    }

    #[tokio::test]
    async fn no_signals_is_allowed() {
        let builder = builder_fn(|_ctx| async { Ok(WaitForCancel { raise_hangup: false }) });
        let builder: &dyn Builder<WaitForCancel> = &builder;

        let runner = NotifyOnSignal::new(DefaultRunner, Vec::<ProcessSignal>::new());
        let parent = CancellationToken::new();
        parent.cancel();

        runner.run(&parent, builder).await.unwrap();
    }

    #[test]
    fn signal_names() {
        assert_eq!(ProcessSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(ProcessSignal::Terminate.as_str(), "SIGTERM");
    }
}
