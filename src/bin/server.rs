//! kvstore Server Binary
//!
//! Opens the storage engine and serves it over TCP.

use std::sync::Arc;

use clap::Parser;
use crossbeam::channel;
use kvstore::{Config, Engine, KvServer, ServeMode, Store};
use tracing_subscriber::{fmt, EnvFilter};

/// kvstore Server
#[derive(Parser, Debug)]
#[command(name = "kvstore-server")]
#[command(about = "Key-value service with sync and async serving modes")]
#[command(version)]
struct Args {
    /// Database directory
    #[arg(long, default_value = "./kvstore_data")]
    db_file: String,

    /// Listen host
    #[arg(long, default_value = "0.0.0.0")]
    addr: String,

    /// Listen port
    #[arg(long, default_value_t = 12345)]
    port: u16,

    /// Serve with completion-queue workers instead of sync handlers
    #[arg(long = "async")]
    async_mode: bool,

    /// Worker threads in async mode
    #[arg(long, default_value_t = 28)]
    thread: usize,

    /// Maximum concurrent connections
    #[arg(long, default_value_t = 1024)]
    max_connections: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kvstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let mode = if args.async_mode {
        ServeMode::Async
    } else {
        ServeMode::Sync
    };

    tracing::info!("kvstore server v{}", kvstore::VERSION);
    tracing::info!("Database directory: {}", args.db_file);

    let config = Config::builder()
        .data_dir(&args.db_file)
        .listen_addr(format!("{}:{}", args.addr, args.port))
        .serve_mode(mode)
        .worker_threads(args.thread)
        .max_connections(args.max_connections)
        .build();

    // Failing to open the store is the one fatal launch error
    let engine: Arc<dyn Store> = match Engine::open(config.clone()) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    let mut server = match KvServer::start(config, engine) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Server error: {}", e);
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = channel::bounded(1);
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, initiating shutdown...");
        let _ = shutdown_tx.try_send(());
    }) {
        tracing::error!("Failed to install signal handler: {}", e);
        if let Err(e) = server.stop() {
            tracing::error!("Error during shutdown: {}", e);
        }
        std::process::exit(1);
    }

    if let Err(e) = server.run_until(&shutdown_rx) {
        tracing::error!("Error during shutdown: {}", e);
        std::process::exit(1);
    }
    tracing::info!("Server stopped");
}
