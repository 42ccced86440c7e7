//! On-chain orderbook listing client.
//!
//! The listing service is an opaque remote collaborator: one call per listing
//! that either returns a receipt (order id / tx hash) or fails. When the
//! orderbook URL or relayer key is not configured, or DEV_OFFCHAIN is set,
//! no client is constructed and listings run in offline stub mode.

use anyhow::{Context, Result};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::Config;

/// Receipt from a successful remote listing call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingReceipt {
    pub order_id: Option<String>,
    pub tx_hash: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListingRequest<'a> {
    token_id: Option<&'a str>,
    domain_id: Option<&'a str>,
    reserve_price_wei: String,
}

pub struct OrderbookClient {
    http: reqwest::Client,
    api_url: String,
    relayer_key: String,
}

impl OrderbookClient {
    /// Build a client from config; `None` means dev-offline mode.
    pub fn from_config(config: &Config) -> Option<Self> {
        if config.dev_offchain {
            return None;
        }
        let api_url = config.orderbook_api_url.clone()?;
        let relayer_key = config.relayer_private_key.clone()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .ok()?;
        Some(Self {
            http,
            api_url,
            relayer_key,
        })
    }

    /// Submit a Dutch-auction listing. The call is opaque: a receipt on
    /// success, an error otherwise. No retries.
    pub async fn create_dutch_listing(
        &self,
        token_id: Option<&str>,
        domain_id: Option<&str>,
        reserve_price_wei: &BigUint,
    ) -> Result<ListingReceipt> {
        let request = ListingRequest {
            token_id,
            domain_id,
            reserve_price_wei: reserve_price_wei.to_string(),
        };
        let response = self
            .http
            .post(format!("{}/listings/dutch", self.api_url.trim_end_matches('/')))
            .bearer_auth(&self.relayer_key)
            .json(&request)
            .send()
            .await
            .context("orderbook request failed")?;
        anyhow::ensure!(
            response.status().is_success(),
            "orderbook listing rejected: HTTP {}",
            response.status()
        );
        response
            .json()
            .await
            .context("orderbook returned an unreadable receipt")
    }
}
