//! Settlement pipeline.
//!
//! The status flip to SETTLED is an atomic compare-and-set in the store and
//! gates the whole pipeline: only the caller that wins the flip writes the
//! settled marker, captures the fee, scores predictions, and publishes
//! updates. A losing caller (re-settle, or a scheduler tick racing a manual
//! call) observes the already-settled auction and returns it untouched, so
//! fees are captured exactly once per auction lifetime.
//!
//! Within one settlement the order is fixed: status, fee, scoring,
//! notifications. Storage failures abort and surface; scoring failures are
//! logged and swallowed so a scoring bug never blocks settlement.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use num_bigint::BigUint;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{Auction, AuctionStatus, Bid, EventLog, EventType};
use crate::notify::{AuctionUpdate, LiveUpdates};
use crate::predictions::{prediction_from_event, score_predictions};
use crate::pricing::wei_to_eth;
use crate::store::AuctionDb;

/// Basis-point fee rates applied at settlement.
#[derive(Debug, Clone, Copy)]
pub struct FeeConfig {
    /// Platform fee, in bps of the settle price.
    pub fee_bps: u32,
    /// Prediction-pool share, in bps of the fee.
    pub pool_bps: u32,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            fee_bps: 300,
            pool_bps: 2000,
        }
    }
}

/// Result of a settle call: the auction as stored afterwards, and whether
/// this call performed the transition (false for idempotent repeats).
#[derive(Debug)]
pub struct SettlementOutcome {
    pub auction: Auction,
    pub bids: Vec<Bid>,
    pub events: Vec<EventLog>,
    pub newly_settled: bool,
}

pub struct SettlementEngine {
    store: Arc<AuctionDb>,
    updates: LiveUpdates,
    fees: FeeConfig,
}

impl SettlementEngine {
    pub fn new(store: Arc<AuctionDb>, updates: LiveUpdates, fees: FeeConfig) -> Self {
        Self {
            store,
            updates,
            fees,
        }
    }

    /// Manual settlement trigger (API call).
    pub async fn settle(&self, auction_id: &str, tx_hash: Option<&str>) -> Result<SettlementOutcome> {
        self.settle_with_marker(auction_id, tx_hash, EventType::AuctionSettled)
            .await
    }

    /// Settle every ACTIVE auction whose end time has passed, marking each
    /// with AUTO_SETTLED. One auction's failure is logged and does not abort
    /// the batch. Returns the ids settled by this pass.
    pub async fn settle_expired(&self) -> Result<Vec<String>> {
        let expired = self.store.expired_active(Utc::now()).await?;
        let mut settled = Vec::new();
        for auction in expired {
            match self
                .settle_with_marker(&auction.id, None, EventType::AutoSettled)
                .await
            {
                Ok(outcome) if outcome.newly_settled => settled.push(auction.id),
                Ok(_) => {} // lost the claim to a concurrent settle
                Err(e) => {
                    warn!(auction_id = %auction.id, "auto-settle failed: {e:#}");
                }
            }
        }
        Ok(settled)
    }

    async fn settle_with_marker(
        &self,
        auction_id: &str,
        tx_hash: Option<&str>,
        marker: EventType,
    ) -> Result<SettlementOutcome> {
        if self.store.get_auction(auction_id).await?.is_none() {
            return Err(anyhow!("auction not found: {auction_id}"));
        }

        let newly_settled = self.store.claim_settlement(auction_id, tx_hash).await?;
        if newly_settled {
            self.store
                .append_event(auction_id, marker, None, tx_hash)
                .await?;

            let bids = self.store.bids_for(auction_id).await?;
            let settle_price = winning_amount(&bids);
            self.capture_fee(auction_id, &settle_price).await?;

            if let Err(e) = self.score_auction(auction_id, &settle_price).await {
                warn!(auction_id, "prediction scoring failed, settlement continues: {e:#}");
            }

            self.updates
                .publish(AuctionUpdate::settled(auction_id, AuctionStatus::Settled));
            info!(auction_id, settle_price_wei = %settle_price, "auction settled");
        } else {
            debug!(auction_id, "already settled, skipping fee capture");
        }

        let auction = self
            .store
            .get_auction(auction_id)
            .await?
            .ok_or_else(|| anyhow!("auction disappeared during settlement: {auction_id}"))?;
        let bids = self.store.bids_for(auction_id).await?;
        let events = self.store.events_for(auction_id).await?;
        Ok(SettlementOutcome {
            auction,
            bids,
            events,
            newly_settled,
        })
    }

    /// Fee and pool share in integer wei, floor division at each step.
    /// Amounts are logged as decimal strings so the audit record never loses
    /// precision.
    async fn capture_fee(&self, auction_id: &str, settle_price: &BigUint) -> Result<()> {
        let fee_wei: BigUint = settle_price * self.fees.fee_bps / 10_000u32;
        let pool_wei: BigUint = &fee_wei * self.fees.pool_bps / 10_000u32;
        let payload = serde_json::json!({
            "feeBps": self.fees.fee_bps,
            "poolBps": self.fees.pool_bps,
            "settlePriceWei": settle_price.to_string(),
            "feeWei": fee_wei.to_string(),
            "poolWei": pool_wei.to_string(),
        });
        self.store
            .append_event(auction_id, EventType::FeeCaptured, Some(&payload), None)
            .await
            .context("record fee capture")?;
        Ok(())
    }

    /// Score every PREDICTION event against the settle price and the current
    /// time, writing one PREDICTION_SCORED event per prediction.
    async fn score_auction(&self, auction_id: &str, settle_price: &BigUint) -> Result<()> {
        let prediction_events = self
            .store
            .events_of_type(auction_id, EventType::Prediction)
            .await?;
        if prediction_events.is_empty() {
            return Ok(());
        }

        let records: Vec<_> = prediction_events.iter().map(prediction_from_event).collect();
        let scored = score_predictions(&records, wei_to_eth(settle_price), Utc::now());

        for s in &scored {
            let payload = serde_json::json!({
                "userId": s.user_id,
                "score": s.score,
                "components": {"priceScore": s.price_score, "timeScore": s.time_score},
            });
            self.store
                .append_event(auction_id, EventType::PredictionScored, Some(&payload), None)
                .await?;
            self.updates
                .publish(AuctionUpdate::prediction_scored(auction_id, &s.user_id, s.score));
        }
        info!(auction_id, count = scored.len(), "predictions scored");
        Ok(())
    }
}

/// Settle price: the greatest committed bid amount, 0 with no bids. Equal
/// amounts have no distinguishable winner, so any maximal bid serves.
/// Reveal status is deliberately not consulted.
fn winning_amount(bids: &[Bid]) -> BigUint {
    bids.iter()
        .map(|b| b.amount_wei.clone())
        .max()
        .unwrap_or_default()
}
