//! Example HTTP service.
//!
//! Serves a greeting on `/hello` and `/hello/{name}`, along with the standard health routes, until interrupted.
//!
//! The server configuration comes from the `server` section of the configuration file, which can be overridden with
//! the `HELLO_LISTEN_ADDRESS` and `HELLO_GRACE_PERIOD_SECS` environment variables. When neither is present, the server
//! listens on `127.0.0.1:8080`.

#![deny(missing_docs)]

use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    path::PathBuf,
    process::ExitCode,
};

use axum::{extract::Path, routing::get, Router};
use bedrock_app::prelude::*;
use bedrock_config::{default_to, or, read, ConfigurationLoader, GenericConfiguration};
use bedrock_core::{bind, builder_fn, Builder, Lifecycle};
use bedrock_server::{HttpServerBuilder, ServerConfig};
use clap::Parser as _;
use tracing::info;

const DEFAULT_LISTEN_ADDRESS: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8080));

#[derive(clap::Parser)]
#[command(about = "Serves greetings over HTTP.")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "hello.yaml")]
    config: PathBuf,
}

fn server_config(config: GenericConfiguration) -> impl Builder<ServerConfig> {
    builder_fn(move |ctx| {
        let reader = default_to(
            ServerConfig::new(DEFAULT_LISTEN_ADDRESS),
            or::<ServerConfig>(vec![
                Box::new(ServerConfig::from_env("HELLO")),
                Box::new(config.reader::<ServerConfig>("server")),
            ]),
        );

        async move {
            let server_config = read(&ctx, &reader).await?;
            info!(listen_address = %server_config.listen_address, "Loaded server configuration.");
            Ok(server_config)
        }
    })
}

fn routes() -> Router {
    Router::new()
        .route("/hello", get(|| async { "Hello, world!" }))
        .route("/hello/{name}", get(|Path(name): Path<String>| async move { format!("Hello, {}!", name) }))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = initialize_logging(None) {
        fatal_and_exit(format!("failed to initialize logging: {}", e));
    }

    let config = ConfigurationLoader::default().try_from_yaml(&cli.config).into_generic();

    let builder = bind(server_config(config), |server_config| {
        HttpServerBuilder::new(server_config).with_router(routes())
    });

    run_main(builder, Lifecycle::new()).await
}
