//! Background auto-settlement of expired auctions.
//!
//! An explicit component with an owned lifecycle: the process entry point
//! constructs one `ExpirySettler` and calls `spawn()`, which consumes it, so
//! a second instance cannot be started by accident. Each pass runs the same
//! settlement pipeline as a manual settle call; the store's atomic status
//! claim keeps overlapping ticks and manual races at most-once per auction.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::settlement::SettlementEngine;

pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_secs(60);

pub struct ExpirySettler {
    engine: Arc<SettlementEngine>,
    interval: Duration,
}

impl ExpirySettler {
    pub fn new(engine: Arc<SettlementEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Start the recurring task. The first pass runs immediately, then on the
    /// configured interval; a pass delayed behind slow storage skips the
    /// missed ticks instead of bursting.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        info!(
            interval_secs = self.interval.as_secs(),
            "⏲️ expiry settler started"
        );
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once().await {
                error!("auto-settle pass failed: {e:#}");
            }
        }
    }

    /// One scheduler pass. Also backs the settle-expired endpoint.
    pub async fn run_once(&self) -> Result<usize> {
        let settled = self.engine.settle_expired().await?;
        if !settled.is_empty() {
            info!(count = settled.len(), "auto-settled expired auctions");
        }
        Ok(settled.len())
    }
}
