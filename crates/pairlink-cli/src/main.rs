//! PAIRLINK CLI
//!
//! Run a relay, host or join a session, probe relay shards.

mod config;

use clap::{Parser, Subcommand};
use pairlink_client::{Connector, RelayClient, ShardSelector, WsConnector};
use pairlink_relay::{RelayServer, ServerMessage};
use std::path::PathBuf;
use std::sync::Arc;

use config::Config;

/// PAIRLINK - match hosts and guests, relay their handshake
#[derive(Parser)]
#[command(name = "pairlink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a relay server
    Serve {
        /// Bind address (overrides config and PORT)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Register as host under a key and wait for a guest
    Host {
        /// Shareable session key
        #[arg(short, long)]
        key: String,

        /// Relay shard URL (repeatable; defaults to config)
        #[arg(short, long)]
        relay: Vec<String>,
    },

    /// Join the host registered under a key
    Join {
        /// Session key to join
        #[arg(short, long)]
        key: String,

        /// Relay shard URL (repeatable; defaults to config)
        #[arg(short, long)]
        relay: Vec<String>,
    },

    /// Measure connect latency to relay shards
    Probe {
        /// Relay shard URL (repeatable; defaults to config)
        #[arg(short, long)]
        relay: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };
    config.apply_env()?;
    config.validate()?;

    // Initialize logging
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(level))
        .init();

    match cli.command {
        Commands::Serve { bind } => {
            serve(bind, &config).await?;
        }
        Commands::Host { key, relay } => {
            host(key, relay, &config).await?;
        }
        Commands::Join { key, relay } => {
            join(key, relay, &config).await?;
        }
        Commands::Probe { relay } => {
            probe(relay, &config).await?;
        }
    }

    Ok(())
}

/// Run the relay until Ctrl+C
async fn serve(bind: Option<String>, config: &Config) -> anyhow::Result<()> {
    let addr = match bind {
        Some(bind) => bind.parse()?,
        None => config.bind_addr()?,
    };

    let server = RelayServer::bind_with_config(addr, config.to_server_config()).await?;
    let handle = server.spawn()?;

    println!("PAIRLINK Relay");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Listen: {}", handle.local_addr());
    println!("Max connections: {}", config.server.max_connections);
    println!("Guest leave policy: {:?}", config.server.guest_leave_policy);
    println!("\nPress Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");

    let stats = handle.stats().await?;
    tracing::info!(
        "Final counts: {} connections, {} hosts, {} active sessions",
        stats.connections,
        stats.hosts,
        stats.active
    );
    handle.shutdown().await?;

    Ok(())
}

/// Print relay events as they arrive
fn print_events(client: &RelayClient, events: &[&str]) {
    for event in events {
        client.on(event, |msg: &ServerMessage| match msg.to_json() {
            Ok(json) => println!("<- {json}"),
            Err(e) => tracing::warn!("Cannot print event: {}", e),
        });
    }
}

/// Register as host and wait
async fn host(key: String, relays: Vec<String>, config: &Config) -> anyhow::Result<()> {
    let mut client = RelayClient::new(config.to_client_config(&relays))?;
    print_events(
        &client,
        &[
            "REGISTERED",
            "GUEST_JOINED",
            "GUEST_LEFT",
            "SIGNAL",
            "ERROR",
            "CONNECTION_LOST",
        ],
    );

    client.connect().await?;
    println!("Connected to {}", client.shard().unwrap_or_default());

    client.register_host(&key);
    println!("Hosting session {key}");
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");
    client.disconnect().await;

    Ok(())
}

/// Join a host and wait
async fn join(key: String, relays: Vec<String>, config: &Config) -> anyhow::Result<()> {
    let mut client = RelayClient::new(config.to_client_config(&relays))?;
    print_events(
        &client,
        &["MATCHED", "SIGNAL", "ERROR", "CONNECTION_LOST"],
    );

    client.connect().await?;
    println!("Connected to {}", client.shard().unwrap_or_default());

    client.join(&key);
    println!("Joining session {key}");
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");
    client.disconnect().await;

    Ok(())
}

/// Probe every shard and print latencies
async fn probe(relays: Vec<String>, config: &Config) -> anyhow::Result<()> {
    let client_config = config.to_client_config(&relays);
    let mut selector = ShardSelector::new(client_config.shards.clone());
    let connector: Arc<dyn Connector> = Arc::new(WsConnector);

    let result = selector.probe(connector, client_config.probe_timeout).await;

    println!("Relay shards:");
    for shard in selector.shards() {
        match selector.latency(shard) {
            Some(latency) => println!("  {shard}  {latency:?}"),
            None => println!("  {shard}  unreachable"),
        }
    }
    println!();

    match result {
        Ok((best, mut transport)) => {
            transport.close().await;
            println!("Selected: {best}");
            Ok(())
        }
        Err(e) => anyhow::bail!("No relay reachable: {}", e),
    }
}
