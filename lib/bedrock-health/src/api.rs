use bedrock_api::{
    extract::State,
    response::IntoResponse,
    routing::{get, Router},
    APIHandler, StatusCode,
};

use crate::{HealthCheck, HealthSignals};

/// State used for the health API handler.
#[derive(Clone)]
pub struct HealthState {
    signals: HealthSignals,
}

fn status_of(check: &dyn HealthCheck) -> StatusCode {
    if check.healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// An API handler for reporting process health.
///
/// This handler exposes three routes, one per signal: `/health/startup`, `/health/liveness`, and `/health/readiness`.
/// Each route returns a successful response (200 OK) when its signal is healthy, or a failure response (503 Service
/// Unavailable) otherwise. Response bodies are always empty. Only `GET` is accepted.
pub struct HealthAPIHandler {
    state: HealthState,
}

impl HealthAPIHandler {
    /// Creates a new `HealthAPIHandler` for the given signals.
    pub fn new(signals: HealthSignals) -> Self {
        Self {
            state: HealthState { signals },
        }
    }

    async fn startup_handler(State(state): State<HealthState>) -> impl IntoResponse {
        status_of(&state.signals.started)
    }

    async fn liveness_handler(State(state): State<HealthState>) -> impl IntoResponse {
        status_of(&state.signals.liveness)
    }

    async fn readiness_handler(State(state): State<HealthState>) -> impl IntoResponse {
        status_of(&state.signals.readiness)
    }
}

impl APIHandler for HealthAPIHandler {
    type State = HealthState;

    fn generate_initial_state(&self) -> Self::State {
        self.state.clone()
    }

    fn generate_routes(&self) -> Router<Self::State> {
        Router::new()
            .route("/health/startup", get(Self::startup_handler))
            .route("/health/liveness", get(Self::liveness_handler))
            .route("/health/readiness", get(Self::readiness_handler))
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use bedrock_api::APIBuilder;
    use http::{Method, Request};
    use tower::ServiceExt as _;

    use super::*;

    async fn send(router: &Router, method: Method, uri: &str) -> (StatusCode, usize) {
        let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.len())
    }

    fn router_for(signals: &HealthSignals) -> Router {
        APIBuilder::new().with_handler(signals.api_handler()).into_router()
    }

    #[tokio::test]
    async fn readiness_transitions() {
        let signals = HealthSignals::new();
        let router = router_for(&signals);

        assert_eq!(
            send(&router, Method::GET, "/health/readiness").await,
            (StatusCode::SERVICE_UNAVAILABLE, 0)
        );

        signals.readiness.mark_ready();
        assert_eq!(send(&router, Method::GET, "/health/readiness").await, (StatusCode::OK, 0));

        signals.readiness.mark_not_ready();
        assert_eq!(
            send(&router, Method::GET, "/health/readiness").await,
            (StatusCode::SERVICE_UNAVAILABLE, 0)
        );
    }

    #[tokio::test]
    async fn each_route_reports_its_own_signal() {
        let signals = HealthSignals::new();
        let router = router_for(&signals);

        signals.started.mark_started();
        assert_eq!(send(&router, Method::GET, "/health/startup").await.0, StatusCode::OK);
        assert_eq!(
            send(&router, Method::GET, "/health/liveness").await.0,
            StatusCode::SERVICE_UNAVAILABLE
        );

        signals.liveness.mark_alive();
        assert_eq!(send(&router, Method::GET, "/health/liveness").await.0, StatusCode::OK);

        signals.liveness.mark_dead();
        assert_eq!(
            send(&router, Method::GET, "/health/liveness").await.0,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn only_get_is_allowed() {
        let signals = HealthSignals::new();
        signals.readiness.mark_ready();
        let router = router_for(&signals);

        assert_eq!(
            send(&router, Method::POST, "/health/readiness").await.0,
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
