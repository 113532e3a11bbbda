//! High-level application primitives.
//!
//! This crate provides what a service binary needs around its main component: logging initialization, wiring for a
//! telemetry provider, and [`run_main`], which runs the component under the standard runner stack and turns the outcome
//! into a process exit code.
#![deny(missing_docs)]

#[cfg(feature = "logging")]
pub mod logging;

mod entrypoint;
pub use self::entrypoint::{default_runner, run_main};

pub mod telemetry;

/// Common imports.
pub mod prelude {
    #[cfg(feature = "logging")]
    pub use super::logging::{fatal_and_exit, initialize_logging};
    pub use super::entrypoint::{default_runner, run_main};
    pub use super::telemetry::{with_telemetry, TelemetryProvider};
}
