use std::{net::SocketAddr, panic::resume_unwind, sync::Mutex, time::Duration};

use async_trait::async_trait;
use bedrock_core::{task::spawn_traced, CancellationToken};
use bedrock_error::GenericError;
use bedrock_health::{HealthSignals, Readiness};
use snafu::ResultExt as _;
use tokio::{net::TcpListener, select, task::AbortHandle, time::timeout};
use tracing::{debug, info, warn};

use crate::{Bind, LocalAddress, ServerError};

/// A protocol that can be served over a TCP listener.
#[async_trait]
pub(crate) trait Transport: Send + 'static {
    /// Name of the protocol, used in logs.
    const NAME: &'static str;

    /// Serves connections from `listener` until `stop` is cancelled.
    ///
    /// Once `stop` is cancelled, no new connections should be accepted, and the call should return once in-flight work
    /// has finished. Dropping the returned future must cancel any work still in flight.
    async fn serve(self, listener: TcpListener, stop: CancellationToken) -> Result<(), GenericError>;
}

/// Where the listener of a server comes from.
pub(crate) enum ListenerSource {
    /// Bind the given address when the server runs.
    Address(SocketAddr),

    /// Use an already-bound listener.
    Bound(TcpListener),
}

/// A listener source that can be handed out once.
///
/// Builders are shared and may be built more than once, so an already-bound listener is taken by the first build and
/// later builds fail.
pub(crate) enum ListenerSlot {
    Address(SocketAddr),
    Bound(Mutex<Option<TcpListener>>),
}

impl ListenerSlot {
    pub fn bound(listener: TcpListener) -> Self {
        Self::Bound(Mutex::new(Some(listener)))
    }

    pub fn take(&self) -> Result<ListenerSource, ServerError> {
        match self {
            Self::Address(address) => Ok(ListenerSource::Address(*address)),
            Self::Bound(listener) => listener
                .lock()
                .unwrap()
                .take()
                .map(ListenerSource::Bound)
                .ok_or(ServerError::ListenerTaken),
        }
    }
}

/// The lifecycle shared by every server runtime.
pub(crate) struct GracefulServer<T> {
    listener: ListenerSource,
    transport: T,
    signals: HealthSignals,
    grace_period: Duration,
}

impl<T: Transport> GracefulServer<T> {
    pub fn new(listener: ListenerSource, transport: T, signals: HealthSignals, grace_period: Duration) -> Self {
        Self {
            listener,
            transport,
            signals,
            grace_period,
        }
    }

    pub fn signals(&self) -> &HealthSignals {
        &self.signals
    }

    pub async fn run(self, ctx: CancellationToken) -> Result<(), GenericError> {
        let Self {
            listener,
            transport,
            signals,
            grace_period,
        } = self;

        let listener = match listener {
            ListenerSource::Address(address) => TcpListener::bind(address).await.context(Bind { address })?,
            ListenerSource::Bound(listener) => listener,
        };
        let listen_addr = listener.local_addr().context(LocalAddress)?;

        signals.started.mark_started();
        signals.liveness.mark_alive();
        signals.readiness.mark_ready();

        let stop = CancellationToken::new();
        let done = CancellationToken::new();

        // If this future is dropped before the server finishes, make sure the server doesn't outlive it.
        let _stop_on_drop = stop.clone().drop_guard();

        let service = {
            let stop = stop.clone();
            let done = done.clone();
            spawn_traced(async move {
                // Cancelled however the task ends, including when it is aborted.
                let _done = done.drop_guard();
                transport.serve(listener, stop).await
            })
        };

        info!(%listen_addr, "{} server started.", T::NAME);

        let stop_requested = watch_for_shutdown(
            &ctx,
            &done,
            &stop,
            &signals.readiness,
            service.abort_handle(),
            grace_period,
            T::NAME,
        )
        .await;

        match service.await {
            Ok(Ok(())) if stop_requested => {
                info!(%listen_addr, "{} server stopped.", T::NAME);
                Ok(())
            }
            Ok(Ok(())) => Err(ServerError::UnexpectedStop.into()),
            Ok(Err(e)) => Err(ServerError::Serve { source: e }.into()),
            Err(e) => match e.try_into_panic() {
                Ok(payload) => resume_unwind(payload),
                // Only aborted when the grace period ran out, which was already logged.
                Err(_) => Ok(()),
            },
        }
    }
}

/// Waits for either a shutdown request or the service finishing on its own, and then winds the service down.
///
/// Returns `true` if shutdown was requested through `ctx`.
async fn watch_for_shutdown(
    ctx: &CancellationToken, done: &CancellationToken, stop: &CancellationToken, readiness: &Readiness,
    abort: AbortHandle, grace_period: Duration, name: &'static str,
) -> bool {
    let stop_requested = select! {
        biased;

        _ = done.cancelled() => false,
        _ = ctx.cancelled() => true,
    };

    readiness.mark_not_ready();

    if !stop_requested {
        debug!("{} server stopped on its own.", name);
        return false;
    }

    info!(grace_period_secs = grace_period.as_secs_f64(), "Stopping {} server...", name);
    stop.cancel();

    if timeout(grace_period, done.cancelled()).await.is_err() {
        warn!(
            grace_period_secs = grace_period.as_secs_f64(),
            "{} server did not stop within the grace period. Cancelling in-flight work.", name
        );
        abort.abort();
    }

    true
}
