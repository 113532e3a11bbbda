//! Building blocks for HTTP APIs.
//!
//! Portions of an API are defined as [`APIHandler`]s, each providing its own state and routes, and are composed into a
//! single router with [`APIBuilder`].

pub use axum::response;
pub use axum::routing;
pub use axum::Router;
pub use http::StatusCode;

pub mod extract {
    pub use axum::extract::*;
}

// An API handler.
//
// API handlers define the initial state and routes for a portion of an API.
pub trait APIHandler {
    type State: Clone + Send + Sync + 'static;

    fn generate_initial_state(&self) -> Self::State;
    fn generate_routes(&self) -> Router<Self::State>;
}

/// An API builder.
///
/// `APIBuilder` composes an API from multiple handlers and plain routers. Routes that aren't explicitly handled respond
/// with 404 Not Found.
#[derive(Default)]
pub struct APIBuilder {
    router: Router,
}

impl APIBuilder {
    /// Creates a new `APIBuilder` with an empty router.
    pub fn new() -> Self {
        Self { router: Router::new() }
    }

    /// Adds the given handler to this builder.
    ///
    /// The initial state and routes provided by the handler will be merged into this builder.
    pub fn with_handler<H>(mut self, handler: H) -> Self
    where
        H: APIHandler,
    {
        let handler_router = handler.generate_routes();
        let handler_state = handler.generate_initial_state();
        self.router = self.router.merge(handler_router.with_state(handler_state));

        self
    }

    /// Adds the given router to this builder.
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = self.router.merge(router);
        self
    }

    /// Consumes the builder, returning the composed router.
    pub fn into_router(self) -> Router {
        self.router
    }
}
