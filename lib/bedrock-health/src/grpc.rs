use bedrock_core::CancellationToken;
use tokio::select;
use tonic_health::{server::HealthReporter, ServingStatus};
use tracing::debug;

use crate::HealthSignals;

/// Keeps the standard gRPC health service in sync with the health signals.
///
/// The overall status (the empty service name) and the status of every registered service name are reported as
/// `SERVING` when the process is started, alive, and ready, and as `NOT_SERVING` otherwise. Service names that were never
/// registered are unknown to the health service, which answers `NOT_FOUND` for them.
pub struct GrpcHealthBridge {
    reporter: HealthReporter,
    signals: HealthSignals,
    service_names: Vec<String>,
}

impl GrpcHealthBridge {
    /// Creates a new `GrpcHealthBridge` reporting the given signals through `reporter`.
    pub fn new(reporter: HealthReporter, signals: HealthSignals) -> Self {
        Self {
            reporter,
            signals,
            service_names: Vec::new(),
        }
    }

    /// Registers a service name whose status should be reported.
    pub fn with_service_name<S: Into<String>>(mut self, name: S) -> Self {
        self.service_names.push(name.into());
        self
    }

    /// Returns the registered service names.
    pub fn service_names(&self) -> &[String] {
        &self.service_names
    }

    /// Reports the current status of the signals, returning `true` if the process is serving.
    pub async fn sync(&mut self) -> bool {
        let serving = self.signals.is_serving();
        let status = if serving {
            ServingStatus::Serving
        } else {
            ServingStatus::NotServing
        };

        self.reporter.set_service_status("", status).await;
        for name in &self.service_names {
            self.reporter.set_service_status(name, status).await;
        }

        serving
    }

    /// Reports status changes until `ctx` is cancelled.
    ///
    /// The status is reported once more after cancellation, so that the final state of the signals is visible to
    /// clients that are still connected.
    pub async fn run(mut self, ctx: CancellationToken) {
        let mut started = self.signals.started.subscribe();
        let mut liveness = self.signals.liveness.subscribe();
        let mut readiness = self.signals.readiness.subscribe();

        loop {
            let serving = self.sync().await;
            debug!(serving, "Updated gRPC health status.");

            let changed = select! {
                _ = ctx.cancelled() => break,
                result = started.changed() => result,
                result = liveness.changed() => result,
                result = readiness.changed() => result,
            };

            if changed.is_err() {
                break;
            }
        }

        self.sync().await;
    }
}
