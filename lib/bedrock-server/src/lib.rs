//! Graceful HTTP and gRPC server runtimes.
//!
//! [`HttpRuntime`] and [`GrpcRuntime`] share the same lifecycle. When run, the runtime binds its listener (unless it
//! was handed one already bound), marks the process as started, alive, and ready, and serves until its context is
//! cancelled. On cancellation it marks the process as not ready, stops accepting new connections, and lets in-flight
//! work drain for at most the configured grace period before shutting down for good.
//!
//! Both runtimes are built through their builders ([`HttpServerBuilder`], [`GrpcServerBuilder`]), which implement
//! [`Builder`][bedrock_core::Builder] and so compose with the rest of the runner machinery.
#![deny(missing_docs)]

use std::{io, net::SocketAddr, time::Duration};

use bedrock_error::GenericError;
use snafu::Snafu;

mod config;
pub use self::config::ServerConfig;

mod conn;

mod graceful;

mod grpc;
pub use self::grpc::{GrpcRuntime, GrpcServerBuilder};

mod http;
pub use self::http::{HttpRuntime, HttpServerBuilder};

/// The default amount of time in-flight work is given to finish once shutdown starts.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Server errors.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ServerError {
    /// Failed to bind the listen address.
    #[snafu(display("failed to bind to {}: {}", address, source))]
    Bind {
        /// Address that could not be bound.
        address: SocketAddr,

        /// Source of the error.
        source: io::Error,
    },

    /// Failed to query the local address of the listener.
    #[snafu(display("failed to get local address of listener: {}", source))]
    LocalAddress {
        /// Source of the error.
        source: io::Error,
    },

    /// The listener was already handed to a previously built runtime.
    #[snafu(display("listener has already been used by another runtime"))]
    ListenerTaken,

    /// A gRPC server was built without any services.
    #[snafu(display("at least one gRPC service must be registered"))]
    NoServices,

    /// The server failed while serving.
    #[snafu(display("server failed: {}", source))]
    Serve {
        /// Source of the error.
        source: GenericError,
    },

    /// The server stopped without being asked to.
    #[snafu(display("server stopped unexpectedly"))]
    UnexpectedStop,
}
