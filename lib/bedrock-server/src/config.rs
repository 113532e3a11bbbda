use std::{net::SocketAddr, time::Duration};

use bedrock_config::{default_to, env_parsed, Reader, ReaderExt as _};
use serde::Deserialize;

use crate::DEFAULT_GRACE_PERIOD;

const fn default_grace_period_secs() -> u64 {
    DEFAULT_GRACE_PERIOD.as_secs()
}

/// Server configuration.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct ServerConfig {
    /// The address to listen on.
    pub listen_address: SocketAddr,

    /// How long in-flight work is given to finish once shutdown starts, in seconds.
    ///
    /// Defaults to 30 seconds.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
}

impl ServerConfig {
    /// Creates a new `ServerConfig` listening on the given address, with the default grace period.
    pub fn new(listen_address: SocketAddr) -> Self {
        Self {
            listen_address,
            grace_period_secs: default_grace_period_secs(),
        }
    }

    /// Sets the grace period.
    ///
    /// The grace period is kept at whole-second granularity; any fractional part is dropped.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period_secs = grace_period.as_secs();
        self
    }

    /// Returns the grace period.
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Returns a reader for a `ServerConfig` taken from environment variables.
    ///
    /// With a prefix of `APP`, the listen address is read from `APP_LISTEN_ADDRESS` and the grace period from
    /// `APP_GRACE_PERIOD_SECS`. When the listen address isn't set, the whole configuration reads as unset. The grace
    /// period defaults to 30 seconds.
    pub fn from_env(prefix: &str) -> impl Reader<ServerConfig> {
        let address_var = format!("{}_LISTEN_ADDRESS", prefix);
        let grace_period_var = format!("{}_GRACE_PERIOD_SECS", prefix);

        env_parsed::<SocketAddr, _>(address_var).bind(move |listen_address| {
            default_to(default_grace_period_secs(), env_parsed(grace_period_var.clone())).map(move |grace_period_secs| {
                Ok(ServerConfig {
                    listen_address,
                    grace_period_secs,
                })
            })
        })
    }
}
