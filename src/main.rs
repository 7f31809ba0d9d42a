//! Switchyard demo server.
//!
//! Serves one of the bundled demo apps. Startup order: parse args, load
//! config, init logging and metrics, build the app, bind, serve until Ctrl+C.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tokio::net::TcpListener;

use switchyard::config::{load_config, ServerConfig};
use switchyard::demo::{elysia, hono};
use switchyard::observability::{logging, metrics};
use switchyard::{App, AppServer, Shutdown};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Demo {
    Hono,
    Elysia,
}

impl Demo {
    fn app(self) -> App {
        match self {
            Demo::Hono => hono::app(),
            Demo::Elysia => elysia::app(),
        }
    }

    fn config(self) -> ServerConfig {
        match self {
            Demo::Hono => hono::config(),
            Demo::Elysia => elysia::config(),
        }
    }
}

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "HTTP routing and middleware engine demo server", long_about = None)]
struct Cli {
    /// Demo application to serve.
    #[arg(short, long, value_enum, default_value_t = Demo::Hono)]
    app: Demo,

    /// TOML config file. Without one, the demo's defaults are used.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener port.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => cli.app.config(),
    };
    if let Some(port) = cli.port {
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listener.bind_address = format!("{}:{}", host, port);
    }

    logging::init(&config.observability);
    tracing::info!(app = ?cli.app, "switchyard v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_body_bytes = config.listener.max_body_bytes,
        request_timeout_secs = config.timeouts.request_secs,
        strict = config.app.strict,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let dispatcher = cli.app.app().build(&config.app)?;
    dispatcher.show_routes();

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = AppServer::new(dispatcher, config);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
