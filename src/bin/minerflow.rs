//! minerflow daemon
//!
//! Recovers the aggregate from the ledger, backfills up to the node's current epoch on a
//! bounded worker pool, then tails new epochs from the pub/sub feed for the lifetime of
//! the process.
//!
//! Usage:
//!   cargo run --release --bin minerflow
//!
//! Configuration: see `minerflow::config` (environment variables, `.env` supported).

use dotenv::dotenv;
use log::{error, info, warn};
use minerflow::chain::{EpochFeed, HttpChainClient, WsEpochFeed};
use minerflow::config::RuntimeConfig;
use minerflow::ledger::SqliteLedger;
use minerflow::pipeline::IngestionEngine;
use minerflow::rpc_server;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let config = RuntimeConfig::from_env()?;
    env_logger::Builder::new().parse_filters(&config.rust_log).init();

    info!("🚀 minerflow starting");
    info!("   ├─ Ledger: {}", config.db_path);
    info!("   ├─ Chain RPC: {}", config.http_rpc_url());
    info!("   ├─ Epoch feed: {}", config.pubsub_url());
    info!("   ├─ Initial epoch: {}", config.initial_epoch);
    info!(
        "   ├─ Tracking window: [{}, {}]",
        config.tracking_start, config.tracking_end
    );
    info!("   ├─ Backfill workers: {}", config.worker_count);
    info!("   ├─ Retry interval: {}ms", config.retry_interval_ms);
    info!("   ├─ Feed inactivity timeout: {}s", config.feed_timeout_secs);
    match config.query_port {
        Some(port) => info!("   └─ Query server: port {}", port),
        None => info!("   └─ Query server: disabled (set QUERY_PORT to enable)"),
    }

    warn!("⚠️  Epochs sealed while the live feed is re-subscribing are not backfilled");
    warn!("   └─ Restart the daemon (or trigger a re-backfill) to close such gaps");

    let ledger = Arc::new(SqliteLedger::open(&config.db_path)?);
    info!("✅ Ledger opened");

    let source = Arc::new(HttpChainClient::new(config.http_rpc_url(), config.rpc_timeout())?);
    let feed: Arc<dyn EpochFeed> = Arc::new(WsEpochFeed::new(config.pubsub_url()));

    let engine = IngestionEngine::new(source, ledger, config.engine_settings());

    if let Some(port) = config.query_port {
        let facade = engine.query();
        tokio::spawn(async move {
            if let Err(e) = rpc_server::serve(port, facade).await {
                error!("❌ Query server failed: {}", e);
            }
        });
    }

    info!("🔄 Press CTRL+C to shutdown");

    tokio::select! {
        result = engine.run(feed) => {
            if let Err(e) = result {
                error!("❌ Ingestion engine stopped: {}", e);
                return Err(e.into());
            }
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
                Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
            }
        }
    }

    info!("✅ minerflow stopped");
    Ok(())
}
