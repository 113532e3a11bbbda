//! Process health signals.
//!
//! A process reports three independent signals to whatever is orchestrating it:
//!
//! - [`Started`]: whether start-up has completed. This is a one-way latch.
//! - [`Liveness`]: whether the process is alive, or should be restarted.
//! - [`Readiness`]: whether the process should currently receive traffic.
//!
//! All three start out unhealthy. They are exposed over HTTP by [`HealthAPIHandler`] and over gRPC, through the
//! standard `grpc.health.v1.Health` service, by [`GrpcHealthBridge`]. Every signal also reports its current value as a
//! gauge (`health.started`, `health.alive`, and `health.ready`).
#![deny(missing_docs)]

use std::sync::Arc;

use metrics::{gauge, Gauge};
use tokio::sync::watch;

mod api;
pub use self::api::{HealthAPIHandler, HealthState};

mod grpc;
pub use self::grpc::GrpcHealthBridge;

/// A health check.
pub trait HealthCheck {
    /// Returns `true` if the check is passing.
    fn healthy(&self) -> bool;
}

/// Returns `true` if every check is passing.
pub fn all_healthy(checks: &[&dyn HealthCheck]) -> bool {
    checks.iter().all(|check| check.healthy())
}

struct Signal {
    tx: watch::Sender<bool>,
    gauge: Gauge,
}

impl Signal {
    fn new(gauge: Gauge) -> Arc<Self> {
        gauge.set(0.0);
        let (tx, _) = watch::channel(false);
        Arc::new(Self { tx, gauge })
    }

    fn get(&self) -> bool {
        *self.tx.borrow()
    }

    fn set(&self, value: bool) {
        self.tx.send_replace(value);
        self.gauge.set(if value { 1.0 } else { 0.0 });
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Whether start-up has completed.
///
/// Once marked as started, it can't be unmarked. Clones share the same state.
#[derive(Clone)]
pub struct Started {
    signal: Arc<Signal>,
}

impl Started {
    /// Creates a new `Started` signal, which has not yet started.
    pub fn new() -> Self {
        Self {
            signal: Signal::new(gauge!("health.started")),
        }
    }

    /// Marks start-up as completed.
    pub fn mark_started(&self) {
        self.signal.set(true);
    }

    /// Returns `true` if start-up has completed.
    pub fn is_started(&self) -> bool {
        self.signal.get()
    }

    /// Subscribes to changes of this signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }
}

impl Default for Started {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthCheck for Started {
    fn healthy(&self) -> bool {
        self.is_started()
    }
}

/// Whether the process is alive.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct Liveness {
    signal: Arc<Signal>,
}

impl Liveness {
    /// Creates a new `Liveness` signal, which is not yet alive.
    pub fn new() -> Self {
        Self {
            signal: Signal::new(gauge!("health.alive")),
        }
    }

    /// Marks the process as alive.
    pub fn mark_alive(&self) {
        self.signal.set(true);
    }

    /// Marks the process as dead.
    pub fn mark_dead(&self) {
        self.signal.set(false);
    }

    /// Returns `true` if the process is alive.
    pub fn is_alive(&self) -> bool {
        self.signal.get()
    }

    /// Subscribes to changes of this signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthCheck for Liveness {
    fn healthy(&self) -> bool {
        self.is_alive()
    }
}

/// Whether the process should receive traffic.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct Readiness {
    signal: Arc<Signal>,
}

impl Readiness {
    /// Creates a new `Readiness` signal, which is not yet ready.
    pub fn new() -> Self {
        Self {
            signal: Signal::new(gauge!("health.ready")),
        }
    }

    /// Marks the process as ready.
    pub fn mark_ready(&self) {
        self.signal.set(true);
    }

    /// Marks the process as not ready.
    pub fn mark_not_ready(&self) {
        self.signal.set(false);
    }

    /// Returns `true` if the process is ready.
    pub fn is_ready(&self) -> bool {
        self.signal.get()
    }

    /// Subscribes to changes of this signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthCheck for Readiness {
    fn healthy(&self) -> bool {
        self.is_ready()
    }
}

/// The full set of health signals for a process.
#[derive(Clone, Default)]
pub struct HealthSignals {
    /// Start-up signal.
    pub started: Started,

    /// Liveness signal.
    pub liveness: Liveness,

    /// Readiness signal.
    pub readiness: Readiness,
}

impl HealthSignals {
    /// Creates a new set of signals, all unhealthy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the process is started, alive, and ready.
    pub fn is_serving(&self) -> bool {
        all_healthy(&[&self.started, &self.liveness, &self.readiness])
    }

    /// Creates an API handler exposing these signals over HTTP.
    pub fn api_handler(&self) -> HealthAPIHandler {
        HealthAPIHandler::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn signals_start_unhealthy() {
        let signals = HealthSignals::new();
        assert!(!signals.started.is_started());
        assert!(!signals.liveness.is_alive());
        assert!(!signals.readiness.is_ready());
        assert!(!signals.is_serving());
    }

    #[test]
    fn signals_toggle_and_are_shared_between_clones() {
        let signals = HealthSignals::new();
        let observer = signals.clone();

        signals.started.mark_started();
        signals.liveness.mark_alive();
        signals.readiness.mark_ready();
        assert!(observer.is_serving());

        signals.readiness.mark_not_ready();
        assert!(!observer.readiness.is_ready());
        assert!(observer.liveness.is_alive());
        assert!(!observer.is_serving());

        signals.liveness.mark_dead();
        assert!(!observer.liveness.healthy());
    }

    #[test]
    fn signals_are_independent() {
        let signals = HealthSignals::new();
        signals.readiness.mark_ready();

        assert!(signals.readiness.is_ready());
        assert!(!signals.started.is_started());
        assert!(!signals.liveness.is_alive());
    }

    #[test]
    fn all_healthy_of_nothing_is_true() {
        assert!(all_healthy(&[]));
    }

    #[tokio::test]
    async fn subscribers_observe_changes() {
        let readiness = Readiness::new();
        let mut rx = readiness.subscribe();
        assert!(!*rx.borrow_and_update());

        readiness.mark_ready();
        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(*rx.borrow_and_update());
    }
}
