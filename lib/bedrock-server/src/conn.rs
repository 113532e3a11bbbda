use std::{future::Future, net::SocketAddr, pin::pin};

use axum::Router;
use bedrock_core::{task::spawn_traced, CancellationToken};
use bedrock_error::GenericError;
use hyper::rt::Executor;
use hyper_util::{rt::TokioIo, server::conn::auto::Builder, service::TowerToHyperService};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    task::{JoinError, JoinSet},
};
use tracing::{debug, warn, Instrument as _};

/// Executor for the tasks hyper spawns on behalf of a connection, such as HTTP/2 streams.
///
/// Spawned tasks are cancelled along with `hard_stop`.
#[derive(Clone)]
struct ConnectionExecutor {
    hard_stop: CancellationToken,
}

impl<F> Executor<F> for ConnectionExecutor
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn execute(&self, fut: F) {
        let hard_stop = self.hard_stop.clone();
        spawn_traced(async move {
            select! {
                _ = hard_stop.cancelled() => {},
                _ = fut => {},
            }
        });
    }
}

/// Serves `router` on `listener` until `stop` is cancelled.
///
/// Once `stop` is cancelled, the listener is closed, every open connection is asked to shut down gracefully, and the
/// call returns when all of them have finished. Every connection (and every task spawned for one) is owned by the
/// returned future: dropping it, such as when the serving task is aborted, tears down all in-flight work with it.
///
/// Both HTTP/1 and HTTP/2 (including prior-knowledge HTTP/2, as used by gRPC) are accepted.
pub(crate) async fn serve_router(
    listener: TcpListener, router: Router, stop: CancellationToken,
) -> Result<(), GenericError> {
    let hard_stop = CancellationToken::new();
    let _hard_stop_on_drop = hard_stop.clone().drop_guard();

    let builder = Builder::new(ConnectionExecutor {
        hard_stop: hard_stop.clone(),
    });
    let mut connections = JoinSet::new();

    loop {
        select! {
            _ = stop.cancelled() => break,
            Some(result) = connections.join_next(), if !connections.is_empty() => log_connection_outcome(result),
            result = listener.accept() => {
                let (stream, peer_addr) = result?;
                let connection = serve_connection(builder.clone(), stream, peer_addr, router.clone(), stop.clone());
                connections.spawn(connection.in_current_span());
            }
        }
    }

    drop(listener);

    debug!(connections = connections.len(), "Waiting for open connections to finish.");
    while let Some(result) = connections.join_next().await {
        log_connection_outcome(result);
    }

    Ok(())
}

async fn serve_connection(
    builder: Builder<ConnectionExecutor>, stream: TcpStream, peer_addr: SocketAddr, router: Router,
    stop: CancellationToken,
) {
    let service = TowerToHyperService::new(router);
    let mut conn = pin!(builder.serve_connection(TokioIo::new(stream), service));

    let result = select! {
        result = conn.as_mut() => result,
        _ = stop.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        debug!(%peer_addr, error = %e, "Connection closed with error.");
    }
}

fn log_connection_outcome(result: Result<(), JoinError>) {
    if let Err(e) = result {
        warn!(error = %e, "Connection task failed.");
    }
}
