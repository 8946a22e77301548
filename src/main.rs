//! plughost — plugin host process for the subtitle editing app.
//!
//! Connects back to the app over a single WebSocket, loads plugins on
//! command, and bridges JSON-RPC traffic between the app and plugin code
//! until the connection closes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use plughost_core::config::HostConfig;
use plughost_core::{HostError, HostResult};
use plughost_plugin::loader::DynamicEntryLoader;
use plughost_plugin::{Dispatcher, ExtServiceDirectory, HandlerRegistry, PluginRegistry, host_api};
use plughost_rpc::{CorrelationTable, RpcClient, Transport};

/// Plugin host process, spawned and controlled by the app.
#[derive(Debug, Parser)]
#[command(name = "plughost", version, about)]
struct Cli {
    /// WebSocket port the app is listening on.
    #[arg(long)]
    port: u16,

    /// Host the app is listening on.
    #[arg(long)]
    host: Option<String>,

    /// Connection token expected by the app.
    #[arg(long)]
    token: Option<String>,

    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory scanned for plugins.
    #[arg(long)]
    plugins_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_configuration(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Host error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file (when given) and apply CLI overrides.
fn load_configuration(cli: &Cli) -> Result<HostConfig, HostError> {
    let mut config = match &cli.config {
        Some(path) => HostConfig::load(&path.to_string_lossy())?,
        None => HostConfig::default(),
    };

    config.connection.port = cli.port;
    if let Some(host) = &cli.host {
        config.connection.host = host.clone();
    }
    if let Some(token) = &cli.token {
        config.connection.token = token.clone();
    }
    if let Some(dir) = &cli.plugins_dir {
        config.plugins.directory = dir.display().to_string();
    }

    Ok(config)
}

/// Initialize tracing/logging
fn init_logging(config: &HostConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
        _ => {
            fmt().pretty().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Main host run function
async fn run(config: HostConfig) -> HostResult<()> {
    tracing::info!("Starting plughost v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Connect to the app ───────────────────────────────
    tracing::info!(
        host = %config.connection.host,
        port = config.connection.port,
        "Connecting to app"
    );
    let correlation = Arc::new(CorrelationTable::new());
    let (outbound, inbound) = Transport::connect(&config.connection, correlation.clone()).await?;

    // ── Step 2: Shared registries and RPC client ─────────────────
    let handlers = Arc::new(HandlerRegistry::new());
    let services = Arc::new(ExtServiceDirectory::new());
    let rpc = Arc::new(RpcClient::new(
        outbound.clone(),
        correlation.clone(),
        config.rpc.clone(),
    ));

    // ── Step 3: Plugin registry ──────────────────────────────────
    let plugins_root = PathBuf::from(&config.plugins.directory);
    let registry = Arc::new(PluginRegistry::new(
        plugins_root.clone(),
        Arc::new(DynamicEntryLoader::new()),
        rpc,
        handlers.clone(),
        services,
        Duration::from_secs(config.plugins.teardown_wait_seconds),
    ));

    // ── Step 4: Host command handlers ────────────────────────────
    host_api::register(&registry, &handlers).await;

    let found = registry.scan();
    tracing::info!(
        root = %plugins_root.display(),
        count = found.len(),
        "Initial plugin scan complete"
    );

    // ── Step 5: Dispatch until the connection closes ─────────────
    let dispatcher = Dispatcher::new(handlers, correlation, outbound);
    dispatcher.run(inbound).await;

    tracing::info!("Connection closed, plugin host exiting");
    Ok(())
}
