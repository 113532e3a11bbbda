use std::{convert::Infallible, panic::resume_unwind, time::Duration};

use async_trait::async_trait;
use axum::response::IntoResponse;
use bedrock_core::{task::spawn_traced, Builder, CancellationToken, Runtime};
use bedrock_error::GenericError;
use bedrock_health::{GrpcHealthBridge, HealthSignals};
use tokio::{net::TcpListener, task::JoinHandle};
use tonic::{
    body::Body,
    server::NamedService,
    service::{Routes, RoutesBuilder},
};
use tonic_health::server::health_reporter;
use tower::Service;
use tracing::warn;

use crate::{
    conn::serve_router,
    graceful::{GracefulServer, ListenerSlot, Transport},
    ServerConfig, ServerError, DEFAULT_GRACE_PERIOD,
};

struct GrpcTransport {
    routes: Routes,
    health: GrpcHealthBridge,
}

#[async_trait]
impl Transport for GrpcTransport {
    const NAME: &'static str = "gRPC";

    async fn serve(self, listener: TcpListener, stop: CancellationToken) -> Result<(), GenericError> {
        let health_ctx = CancellationToken::new();
        let health = spawn_traced(self.health.run(health_ctx.clone()));

        let result = serve_router(listener, self.routes.into_axum_router(), stop).await;

        health_ctx.cancel();
        finish_health_bridge(health).await;

        result
    }
}

/// Waits for the health bridge to finish, resuming its panic if it had one.
async fn finish_health_bridge(handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        match e.try_into_panic() {
            Ok(panic) => resume_unwind(panic),
            Err(e) => warn!(error = %e, "gRPC health bridge did not finish cleanly."),
        }
    }
}

/// A gRPC server runtime.
///
/// Serves the registered services, along with the standard `grpc.health.v1.Health` service, which reports the status of
/// its [`HealthSignals`] for the overall server and for every registered service. Created by [`GrpcServerBuilder`].
pub struct GrpcRuntime {
    server: GracefulServer<GrpcTransport>,
}

impl GrpcRuntime {
    /// Returns the health signals this runtime reports through.
    pub fn signals(&self) -> &HealthSignals {
        self.server.signals()
    }
}

#[async_trait]
impl Runtime for GrpcRuntime {
    async fn run(self, ctx: CancellationToken) -> Result<(), GenericError> {
        self.server.run(ctx).await
    }
}

/// Builder for [`GrpcRuntime`].
///
/// At least one service must be registered before building.
pub struct GrpcServerBuilder {
    listener: ListenerSlot,
    routes: RoutesBuilder,
    service_names: Vec<&'static str>,
    signals: HealthSignals,
    grace_period: Duration,
}

impl GrpcServerBuilder {
    /// Creates a new `GrpcServerBuilder` that listens on the configured address.
    ///
    /// The address is bound when the runtime runs, not when it is built.
    pub fn new(config: ServerConfig) -> Self {
        Self::from_slot(ListenerSlot::Address(config.listen_address), config.grace_period())
    }

    /// Creates a new `GrpcServerBuilder` that serves on an already-bound listener.
    ///
    /// A listener can only be served once, so only the first runtime built from this builder can be run.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self::from_slot(ListenerSlot::bound(listener), DEFAULT_GRACE_PERIOD)
    }

    fn from_slot(listener: ListenerSlot, grace_period: Duration) -> Self {
        Self {
            listener,
            routes: RoutesBuilder::default(),
            service_names: Vec::new(),
            signals: HealthSignals::new(),
            grace_period,
        }
    }

    /// Adds the given service.
    ///
    /// The service's name is also registered with the health service.
    pub fn with_service<S>(mut self, service: S) -> Self
    where
        S: Service<http::Request<Body>, Error = Infallible> + NamedService + Clone + Send + Sync + 'static,
        S::Response: IntoResponse,
        S::Future: Send + 'static,
    {
        self.routes.add_service(service);
        self.service_names.push(S::NAME);
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
impl Builder<GrpcRuntime> for GrpcServerBuilder {
    async fn build(&self, _ctx: &CancellationToken) -> Result<GrpcRuntime, GenericError> {
        if self.service_names.is_empty() {
            return Err(ServerError::NoServices.into());
        }

        let listener = self.listener.take()?;

        let (reporter, health_service) = health_reporter();
        let mut routes = self.routes.clone();
        routes.add_service(health_service);

        let health = self
            .service_names
            .iter()
            .fold(GrpcHealthBridge::new(reporter, self.signals.clone()), |bridge, name| {
                bridge.with_service_name(*name)
            });

        Ok(GrpcRuntime {
            server: GracefulServer::new(
                listener,
                GrpcTransport {
                    routes: routes.routes(),
                    health,
                },
                self.signals.clone(),
                self.grace_period,
            ),
        })
    }
}
