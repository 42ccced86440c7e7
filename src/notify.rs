//! Best-effort live auction updates.
//!
//! A single broadcast channel fans state changes out to connected WebSocket
//! clients. Publishing never fails the surrounding operation: a send with no
//! subscribers is normal, and a client that misses an update catches up on
//! its next poll. The sink is injected everywhere it is used; `disabled()`
//! gives a no-op sink for tests and headless runs.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::AuctionStatus;

const UPDATE_CHANNEL_CAPACITY: usize = 1000;

/// State-change actions carried on the live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    Listed,
    BidCommitted,
    Revealed,
    PredictionSubmitted,
    Settled,
    PredictionScored,
}

/// One live update: auction id, action, plus action-specific details.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionUpdate {
    pub auction_id: String,
    pub action: UpdateAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AuctionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_eth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
}

impl AuctionUpdate {
    fn new(auction_id: &str, action: UpdateAction) -> Self {
        Self {
            auction_id: auction_id.to_string(),
            action,
            status: None,
            bidder: None,
            user_id: None,
            amount_eth: None,
            score: None,
        }
    }

    pub fn listed(auction_id: &str, status: AuctionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::new(auction_id, UpdateAction::Listed)
        }
    }

    pub fn bid_committed(auction_id: &str, bidder: &str, amount_eth: &str) -> Self {
        Self {
            bidder: Some(bidder.to_string()),
            amount_eth: Some(amount_eth.to_string()),
            ..Self::new(auction_id, UpdateAction::BidCommitted)
        }
    }

    pub fn revealed(auction_id: &str, bidder: &str) -> Self {
        Self {
            bidder: Some(bidder.to_string()),
            ..Self::new(auction_id, UpdateAction::Revealed)
        }
    }

    pub fn prediction_submitted(auction_id: &str, user_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            ..Self::new(auction_id, UpdateAction::PredictionSubmitted)
        }
    }

    pub fn settled(auction_id: &str, status: AuctionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::new(auction_id, UpdateAction::Settled)
        }
    }

    pub fn prediction_scored(auction_id: &str, user_id: &str, score: u32) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            score: Some(score),
            ..Self::new(auction_id, UpdateAction::PredictionScored)
        }
    }
}

/// Injected fan-out sink for live updates.
#[derive(Debug, Clone)]
pub struct LiveUpdates {
    tx: Option<broadcast::Sender<AuctionUpdate>>,
}

impl LiveUpdates {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self { tx: Some(tx) }
    }

    /// No-op sink: publishes are dropped, `subscribe` returns `None`.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Fire-and-forget publish. A closed or subscriber-less channel is not an
    /// error.
    pub fn publish(&self, update: AuctionUpdate) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(update);
        }
    }

    pub fn subscribe(&self) -> Option<broadcast::Receiver<AuctionUpdate>> {
        self.tx.as_ref().map(|tx| tx.subscribe())
    }
}

impl Default for LiveUpdates {
    fn default() -> Self {
        Self::new()
    }
}
