//! Fairness engine server binary.
//!
//! Boots the engine over a RocksDB round store and an in-memory ledger,
//! spawns the maintenance sweeper, and serves the HTTP API.

use clap::Parser;
use fairplay::api::{ApiConfig, ApiServer};
use fairplay::config::{ConfigLoader, StaticConfig};
use fairplay::engine::{spawn_sweeper, Engine};
use fairplay::ledger::InMemoryLedger;
use fairplay::store::RoundStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "fairplay")]
#[command(about = "Provably-fair outcome and stake-settlement engine", long_about = None)]
struct Args {
    /// API server host
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// API server port
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Round store directory
    #[arg(long, default_value = "./data/rounds")]
    db_path: String,

    /// Engine configuration file (TOML); defaults apply when absent
    #[arg(long)]
    config: Option<String>,

    /// Allowed CORS origins (comma-separated, use * for all)
    #[arg(long, default_value = "*")]
    cors_origins: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Maintenance sweep interval in seconds
    #[arg(long, default_value = "30")]
    sweep_interval: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fairplay=info,tower_http=info".into()),
        )
        .init();

    let mut loader = ConfigLoader::new();
    if let Some(ref path) = args.config {
        loader = loader.with_path(path);
    }
    let engine_config = loader.load()?;
    info!(
        "Engine configuration loaded: bets [{}, {}], fee {}, pool capacity {}",
        engine_config.min_bet,
        engine_config.max_bet,
        engine_config.fee_per_play,
        engine_config.pool_capacity
    );

    let store = Arc::new(RoundStore::open(&args.db_path)?);
    info!("Round store opened at {}", args.db_path);

    let ledger = Arc::new(InMemoryLedger::new());
    let engine = Arc::new(Engine::new(
        Arc::new(StaticConfig::new(engine_config)),
        ledger.clone(),
        store,
    ));

    let sweeper = spawn_sweeper(engine.clone(), Duration::from_secs(args.sweep_interval));

    let allowed_origins: Vec<String> = args
        .cors_origins
        .split(',')
        .map(|s| s.trim().to_string())
        .collect();

    let api_config = ApiConfig {
        host: args.host,
        port: args.port,
        allowed_origins,
        request_timeout_secs: args.timeout,
        ..Default::default()
    };

    let result = ApiServer::new(api_config, engine, ledger).run().await;
    sweeper.abort();
    result
}
