use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use bedrock_api::{APIBuilder, APIHandler};
use bedrock_core::{Builder, CancellationToken, Runtime};
use bedrock_error::GenericError;
use bedrock_health::HealthSignals;
use tokio::net::TcpListener;

use crate::{
    conn::serve_router,
    graceful::{GracefulServer, ListenerSlot, Transport},
    ServerConfig, DEFAULT_GRACE_PERIOD,
};

struct HttpTransport {
    router: Router,
}

#[async_trait]
impl Transport for HttpTransport {
    const NAME: &'static str = "HTTP";

    async fn serve(self, listener: TcpListener, stop: CancellationToken) -> Result<(), GenericError> {
        serve_router(listener, self.router, stop).await
    }
}

/// An HTTP server runtime.
///
/// Serves an axum router, along with the health routes of its [`HealthSignals`] (see
/// [`HealthAPIHandler`][bedrock_health::HealthAPIHandler]). Created by [`HttpServerBuilder`].
pub struct HttpRuntime {
    server: GracefulServer<HttpTransport>,
}

impl HttpRuntime {
    /// Returns the health signals this runtime reports through.
    pub fn signals(&self) -> &HealthSignals {
        self.server.signals()
    }
}

#[async_trait]
impl Runtime for HttpRuntime {
    async fn run(self, ctx: CancellationToken) -> Result<(), GenericError> {
        self.server.run(ctx).await
    }
}

/// Builder for [`HttpRuntime`].
pub struct HttpServerBuilder {
    listener: ListenerSlot,
    api: Router,
    signals: HealthSignals,
    grace_period: Duration,
}

impl HttpServerBuilder {
    /// Creates a new `HttpServerBuilder` that listens on the configured address.
    ///
    /// The address is bound when the runtime runs, not when it is built.
    pub fn new(config: ServerConfig) -> Self {
        Self::from_slot(ListenerSlot::Address(config.listen_address), config.grace_period())
    }

    /// Creates a new `HttpServerBuilder` that serves on an already-bound listener.
    ///
    /// A listener can only be served once, so only the first runtime built from this builder can be run.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self::from_slot(ListenerSlot::bound(listener), DEFAULT_GRACE_PERIOD)
    }

    fn from_slot(listener: ListenerSlot, grace_period: Duration) -> Self {
        Self {
            listener,
            api: Router::new(),
            signals: HealthSignals::new(),
            grace_period,
        }
    }

    /// Adds the given router.
    pub fn with_router(mut self, router: Router) -> Self {
        self.api = self.api.merge(router);
        self
    }

    /// Adds the given API handler.
    pub fn with_handler<H>(mut self, handler: H) -> Self
    where
        H: APIHandler,
    {
        self.api = APIBuilder::new().with_router(self.api).with_handler(handler).into_router();
        self
    }

    /// Sets the health signals to report through.
    ///
    /// By default, the builder has its own set of signals.
    pub fn with_health(mut self, signals: HealthSignals) -> Self {
        self.signals = signals;
        self
    }

    /// Sets the grace period.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Returns the health signals the runtime will report through.
    pub fn signals(&self) -> &HealthSignals {
        &self.signals
    }
}

#[async_trait]
impl Builder<HttpRuntime> for HttpServerBuilder {
    async fn build(&self, _ctx: &CancellationToken) -> Result<HttpRuntime, GenericError> {
        let listener = self.listener.take()?;
        let router = APIBuilder::new()
            .with_router(self.api.clone())
            .with_handler(self.signals.api_handler())
            .into_router();

        Ok(HttpRuntime {
            server: GracefulServer::new(
                listener,
                HttpTransport { router },
                self.signals.clone(),
                self.grace_period,
            ),
        })
    }
}
