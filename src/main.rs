//! Path token proxy.
//!
//! A small reverse proxy that moves an authorization token out of the request
//! path into a header before forwarding to a single upstream.
//!
//! ```text
//!   Client                        path-token-proxy                      Upstream
//!     │  GET /sk/<token>/v1/x   ┌────────────────────────────┐              │
//!     ├────────────────────────▶│ request id → timeout →     │ GET /v1/x    │
//!     │                         │ path token transform ──────┼─────────────▶│
//!     │                         │   (or 302 when no match)   │ Authorization│
//!     │◀────────────────────────┤ ◀──────────────────────────┼──────────────┤
//!                               └────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use path_token_proxy::config::watcher::ConfigWatcher;
use path_token_proxy::config::{load_config, LogFormat, ProxyConfig};
use path_token_proxy::lifecycle::{wait_for_signal, Shutdown};
use path_token_proxy::observability::{logging, metrics};
use path_token_proxy::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "path-token-proxy")]
#[command(author, version, about = "Moves path-embedded tokens into request headers")]
struct Args {
    /// Configuration file path (TOML). Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the transform rule when the configuration file changes.
    #[arg(long, requires = "config")]
    watch: bool,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if args.json_logs {
        config.observability.log_format = LogFormat::Json;
    }

    logging::init_logging(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "path-token-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.url,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    // The watcher must outlive the server for reload events to arrive.
    let (_watcher, config_updates) = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        _ => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let server = HttpServer::new(config.clone())?;
    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    let mut server_task = tokio::spawn(server.run(listener, config_updates, shutdown.subscribe()));

    tokio::select! {
        _ = wait_for_signal() => {
            shutdown.trigger();
            (&mut server_task).await??;
        }
        result = &mut server_task => result??,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
