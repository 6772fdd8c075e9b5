//! switchyard server binary.
//!
//! # Startup Order
//! ```text
//! CLI → config file (optional) → CLI overrides → validate
//!     → runtime (worker_threads) → logging → metrics (optional)
//!     → bind listener → signal handler → HttpServer::run
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use switchyard::config::{load_config, validate_config, ConfigError, ServerConfig};
use switchyard::lifecycle::signals::spawn_signal_handler;
use switchyard::net::Listener;
use switchyard::observability::{logging, metrics};
use switchyard::{HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(about = "Embedded HTTP/WebSocket server", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port (keeps the configured bind host)
    #[arg(short, long)]
    port: Option<u16>,

    /// Document root for static files
    #[arg(short, long)]
    root: Option<String>,

    /// Runtime worker threads
    #[arg(short, long)]
    threads: Option<usize>,

    /// Idle-read timeout in seconds (0 disables)
    #[arg(long)]
    idle_timeout: Option<u64>,
}

impl Cli {
    fn into_config(self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ServerConfig::default(),
        };

        if let Some(port) = self.port {
            config.listener.bind_address = match config.listener.bind_address.parse::<SocketAddr>() {
                Ok(mut addr) => {
                    addr.set_port(port);
                    addr.to_string()
                }
                Err(_) => format!("0.0.0.0:{}", port),
            };
        }
        if let Some(root) = self.root {
            config.static_files.doc_root = root;
        }
        if let Some(threads) = self.threads {
            config.listener.worker_threads = threads;
        }
        if let Some(idle) = self.idle_timeout {
            config.timeouts.idle_secs = idle;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.listener.worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(serve(config))
}

async fn serve(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "switchyard starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        worker_threads = config.listener.worker_threads,
        doc_root = %config.static_files.doc_root,
        idle_secs = config.timeouts.idle_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.listener).await?;
    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config);
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
