//! Elevator Server Binary
//!
//! Loads the database registry and serves it over TCP.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Parser;
use elevator::network::Server;
use elevator::{CommandRegistry, Config, DbRegistry, ElevatorError, EngineOpener};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing_subscriber::{fmt, EnvFilter};

/// Elevator Server
#[derive(Parser, Debug)]
#[command(name = "elevator-server")]
#[command(about = "Multi-tenant key-value server with per-database workers")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./elevator_data")]
    data_dir: String,

    /// Registry store file (defaults to <data-dir>/databases.store)
    #[arg(long)]
    store_path: Option<String>,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:4141")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Listener poll timeout in milliseconds (0 blocks)
    #[arg(long, default_value = "100")]
    poll_timeout_ms: u64,

    /// Database created on first start
    #[arg(long, default_value = "default")]
    default_db: String,

    /// WAL size in MB that triggers a snapshot
    #[arg(long, default_value = "16")]
    snapshot_mb: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,elevator=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("Elevator Server v{}", elevator::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    // Build config from args
    let mut builder = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .poll_timeout_ms(args.poll_timeout_ms)
        .default_db(&args.default_db)
        .snapshot_threshold(args.snapshot_mb * 1024 * 1024);
    if let Some(path) = &args.store_path {
        builder = builder.store_path(path);
    }
    let config = builder.build();

    let commands = Arc::new(CommandRegistry::builtin());
    let opener = Arc::new(EngineOpener::from_config(&config));
    let registry = Arc::new(DbRegistry::new(&config, opener, Arc::clone(&commands)));

    if let Err(e) = load_registry(&registry, &config) {
        tracing::error!("Failed to load database registry: {}", e);
        std::process::exit(1);
    }

    let server = match Server::bind(&config, registry, commands) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", config.listen_addr, e);
            std::process::exit(1);
        }
    };

    // Set up signal handler for graceful shutdown
    let shutdown = server.shutdown_handle();
    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to register signal handlers: {}", e);
            std::process::exit(1);
        }
    };
    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            tracing::info!("Received signal {}, initiating shutdown...", sig);
            shutdown.store(true, Ordering::Release);
        }
    });

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

/// Load the durable name list, seeding the default database on first start
fn load_registry(registry: &DbRegistry, config: &Config) -> elevator::Result<()> {
    match registry.load() {
        Ok(count) => {
            tracing::info!("Registry holds {} databases", count);
            Ok(())
        }
        Err(ElevatorError::StoreNotFound(path)) => {
            tracing::info!(
                "No registry at {}; creating database {}",
                path.display(),
                config.default_db
            );
            registry.add(&config.default_db).map(|_| ())
        }
        Err(e) => Err(e),
    }
}
