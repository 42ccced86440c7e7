//! domabid — Dutch-auction backend for tokenized domain names.
//!
//! Lists domains for declining-price sale, takes commit/reveal bids and
//! price/time predictions, settles auctions (manually or on expiry), and
//! fans state changes out over WebSocket.

use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use domabid_backend::{
    api::{self, AppState},
    models::Config,
    notify::LiveUpdates,
    orderbook::OrderbookClient,
    scheduler::ExpirySettler,
    settlement::{FeeConfig, SettlementEngine},
    store::AuctionDb,
    subgraph::SubgraphClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env()?;
    info!("🏷️ domabid backend starting");

    let store = Arc::new(AuctionDb::new(&config.database_path)?);
    let updates = LiveUpdates::new();
    let settlement = Arc::new(SettlementEngine::new(
        store.clone(),
        updates.clone(),
        FeeConfig {
            fee_bps: config.platform_fee_bps,
            pool_bps: config.prediction_pool_bps,
        },
    ));

    let orderbook = OrderbookClient::from_config(&config).map(Arc::new);
    if orderbook.is_none() {
        info!("orderbook not configured, listings run in offline stub mode");
    }
    let subgraph = Arc::new(SubgraphClient::from_config(&config));

    // Auto-settle expired auctions in the background; the settler owns its
    // lifecycle and is started exactly once, here.
    ExpirySettler::new(
        settlement.clone(),
        Duration::from_secs(config.settle_interval_secs),
    )
    .spawn();

    let state = AppState {
        store,
        settlement,
        updates,
        orderbook,
        subgraph,
    };
    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {addr}");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
