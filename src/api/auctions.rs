//! Auction operation handlers.
//!
//! Validation and not-found checks run before any write. Monetary inputs
//! arrive as decimal ETH (string or number) and are converted to integer wei
//! at the boundary; responses carry wei as decimal strings plus a display
//! quote in ETH.

use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ApiError, AppState, JsonOrForm};
use crate::models::{
    json_number, json_string, parse_instant, Auction, AuctionStatus, AuctionView, Bid, DecayMode,
    EventLog, EventType,
};
use crate::notify::AuctionUpdate;
use crate::orderbook::ListingReceipt;
use crate::pricing::{self, parse_eth};
use crate::store::NewAuction;
use crate::subgraph::{mock_names_document, DomainRecord};

// ---------------------------------------------------------------------------
// Inputs (one struct per operation; JSON and form bodies both land here)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateAuctionInput {
    pub token_id: Option<String>,
    pub domain_id: Option<String>,
    pub reserve_price_eth: Option<Value>,
    pub starts_at: Option<String>,
    pub ends_at: Option<String>,
    pub decay_mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListingInput {
    pub auction_id: Option<String>,
    pub token_id: Option<String>,
    pub domain_id: Option<String>,
    pub reserve_price_eth: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommitInput {
    pub bidder: Option<String>,
    pub amount_eth: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RevealInput {
    pub bidder: Option<String>,
    pub proof: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PredictInput {
    pub user_id: Option<String>,
    pub price_eth: Option<Value>,
    pub time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettleInput {
    pub tx_hash: Option<String>,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct AuctionResponse {
    pub ok: bool,
    pub auction: AuctionView,
}

#[derive(Debug, Serialize)]
pub struct AuctionsResponse {
    pub ok: bool,
    pub auctions: Vec<AuctionView>,
}

#[derive(Debug, Serialize)]
pub struct BidResponse {
    pub ok: bool,
    pub bid: Bid,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub ok: bool,
    pub prediction: EventLog,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingResponse {
    pub ok: bool,
    pub message: String,
    pub token_id: Option<String>,
    pub domain_id: Option<String>,
    pub reserve_price_eth: String,
    pub reserve_price_wei: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing: Option<ListingReceipt>,
    pub auction: AuctionView,
}

#[derive(Debug, Serialize)]
pub struct SettleExpiredResponse {
    pub ok: bool,
    pub count: usize,
    pub settled: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DomainsResponse {
    pub ok: bool,
    pub domains: Vec<DomainRecord>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub ok: bool,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "domabid-backend",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/auctions — all auctions, latest first, with bids and history.
pub async fn list_auctions(
    State(state): State<AppState>,
) -> Result<Json<AuctionsResponse>, ApiError> {
    let auctions = state.store.list_auctions().await?;
    let mut views = Vec::with_capacity(auctions.len());
    for auction in auctions {
        views.push(load_view(&state, auction).await?);
    }
    Ok(Json(AuctionsResponse {
        ok: true,
        auctions: views,
    }))
}

/// POST /api/auctions — create a DRAFT auction record.
pub async fn create_auction(
    State(state): State<AppState>,
    JsonOrForm(input): JsonOrForm<CreateAuctionInput>,
) -> Result<Json<AuctionResponse>, ApiError> {
    let reserve_raw = input
        .reserve_price_eth
        .as_ref()
        .and_then(json_string)
        .ok_or_else(|| ApiError::Validation("reservePriceEth required".into()))?;
    let token_id = nonempty(input.token_id);
    let domain_id = nonempty(input.domain_id);
    if token_id.is_none() && domain_id.is_none() {
        return Err(ApiError::Validation("tokenId or domainId required".into()));
    }
    let reserve_price_wei = parse_eth(&reserve_raw)
        .map_err(|_| ApiError::InvalidAmount("Invalid reservePriceEth".into()))?;

    let starts_at = parse_optional_instant(input.starts_at.as_deref(), "startsAt")?;
    let ends_at = parse_optional_instant(input.ends_at.as_deref(), "endsAt")?;
    if let (Some(start), Some(end)) = (starts_at, ends_at) {
        if end < start {
            return Err(ApiError::Validation(
                "endsAt must not be before startsAt".into(),
            ));
        }
    }
    let decay_mode = input.decay_mode.as_deref().and_then(DecayMode::parse);

    let auction = state
        .store
        .create_auction(NewAuction {
            token_id,
            domain_id,
            reserve_price_wei,
            status: AuctionStatus::Draft,
            starts_at,
            ends_at,
            decay_mode,
            tx_hash: None,
        })
        .await?;

    let view = load_view(&state, auction).await?;
    Ok(Json(AuctionResponse {
        ok: true,
        auction: view,
    }))
}

/// GET /api/auctions/:id
pub async fn get_auction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AuctionResponse>, ApiError> {
    let auction = require_auction(&state, &id).await?;
    let view = load_view(&state, auction).await?;
    Ok(Json(AuctionResponse {
        ok: true,
        auction: view,
    }))
}

/// POST /api/listing — activate a listing, attempting the on-chain call when
/// an orderbook client is configured. Targets an explicit auctionId first,
/// then tokenId/domainId lookup, and finally falls back to creating an
/// ACTIVE auction.
pub async fn create_listing(
    State(state): State<AppState>,
    JsonOrForm(input): JsonOrForm<ListingInput>,
) -> Result<Json<ListingResponse>, ApiError> {
    let reserve_raw = input
        .reserve_price_eth
        .as_ref()
        .and_then(json_string)
        .ok_or_else(|| ApiError::Validation("reservePriceEth required".into()))?;
    let auction_id = nonempty(input.auction_id);
    let token_id = nonempty(input.token_id);
    let domain_id = nonempty(input.domain_id);
    if auction_id.is_none() && token_id.is_none() && domain_id.is_none() {
        return Err(ApiError::Validation(
            "auctionId or (tokenId/domainId) required".into(),
        ));
    }
    let reserve_price_wei = parse_eth(&reserve_raw)
        .map_err(|_| ApiError::InvalidAmount("Invalid reservePriceEth".into()))?;

    let listing = match &state.orderbook {
        Some(client) => Some(
            client
                .create_dutch_listing(token_id.as_deref(), domain_id.as_deref(), &reserve_price_wei)
                .await?,
        ),
        None => None,
    };
    let tx_hash = listing.as_ref().and_then(|l| l.tx_hash.clone());

    let existing = match &auction_id {
        Some(id) => state.store.get_auction(id).await?,
        None => {
            state
                .store
                .find_by_token_or_domain(token_id.as_deref(), domain_id.as_deref())
                .await?
        }
    };

    let auction = match existing {
        Some(found) => state
            .store
            .activate(&found.id, &reserve_price_wei, tx_hash.as_deref())
            .await?
            .ok_or_else(|| ApiError::NotFound("auction not found".into()))?,
        None => {
            state
                .store
                .create_auction(NewAuction {
                    token_id: token_id.clone(),
                    domain_id: domain_id.clone(),
                    reserve_price_wei: reserve_price_wei.clone(),
                    status: AuctionStatus::Active,
                    tx_hash: tx_hash.clone(),
                    ..Default::default()
                })
                .await?
        }
    };

    let listing_payload = listing
        .as_ref()
        .map(|l| serde_json::to_value(l).unwrap_or(Value::Null));
    state
        .store
        .append_event(
            &auction.id,
            EventType::ListingCreated,
            listing_payload.as_ref(),
            tx_hash.as_deref(),
        )
        .await?;

    state
        .updates
        .publish(AuctionUpdate::listed(&auction.id, auction.status));

    let message = if listing.is_some() {
        "Listing created".to_string()
    } else {
        "Listing prepared (orderbook offline, stub mode)".to_string()
    };
    let view = load_view(&state, auction).await?;
    Ok(Json(ListingResponse {
        ok: true,
        message,
        token_id,
        domain_id,
        reserve_price_eth: reserve_raw,
        reserve_price_wei: reserve_price_wei.to_string(),
        listing,
        auction: view,
    }))
}

/// POST /api/auctions/:id/commit — record a committed bid.
pub async fn commit_bid(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonOrForm(input): JsonOrForm<CommitInput>,
) -> Result<Json<BidResponse>, ApiError> {
    let bidder = nonempty(input.bidder)
        .ok_or_else(|| ApiError::Validation("bidder required".into()))?;
    let amount_raw = input
        .amount_eth
        .as_ref()
        .and_then(json_string)
        .ok_or_else(|| ApiError::Validation("amountEth required".into()))?;

    require_auction(&state, &id).await?;

    let amount_wei =
        parse_eth(&amount_raw).map_err(|_| ApiError::InvalidAmount("Invalid amountEth".into()))?;

    let bid = state
        .store
        .insert_bid(&id, &bidder.to_lowercase(), &amount_wei)
        .await?;
    state
        .store
        .append_event(
            &id,
            EventType::BidCommit,
            Some(&serde_json::json!({"bidder": bidder, "amountEth": amount_raw})),
            None,
        )
        .await?;

    state
        .updates
        .publish(AuctionUpdate::bid_committed(&id, &bidder, &amount_raw));

    Ok(Json(BidResponse { ok: true, bid }))
}

/// POST /api/auctions/:id/reveal — log a reveal. The proof is recorded, not
/// verified; settlement works off committed amounts.
pub async fn reveal_bid(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonOrForm(input): JsonOrForm<RevealInput>,
) -> Result<Json<AckResponse>, ApiError> {
    require_auction(&state, &id).await?;

    let bidder = input.bidder.unwrap_or_default();
    let proof = input.proof.unwrap_or_default();
    state
        .store
        .append_event(
            &id,
            EventType::BidReveal,
            Some(&serde_json::json!({"bidder": bidder, "proof": proof})),
            None,
        )
        .await?;

    state
        .updates
        .publish(AuctionUpdate::revealed(&id, &bidder));

    Ok(Json(AckResponse { ok: true }))
}

/// POST /api/auctions/:id/predict — record a price and/or time prediction
/// for an ACTIVE auction.
pub async fn submit_prediction(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonOrForm(input): JsonOrForm<PredictInput>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let auction = require_auction(&state, &id).await?;
    if auction.status != AuctionStatus::Active {
        return Err(ApiError::Validation(
            "predictions allowed only for ACTIVE auctions".into(),
        ));
    }

    let user_id = nonempty(input.user_id).unwrap_or_else(|| "anon".to_string());
    let price_eth = input.price_eth.as_ref().and_then(json_number);
    let time_raw = nonempty(input.time);
    if price_eth.is_none() && time_raw.is_none() {
        return Err(ApiError::Validation("Provide priceEth and/or time".into()));
    }
    // Unparseable times are dropped from the payload rather than rejected.
    let time = time_raw.as_deref().and_then(parse_instant);

    let mut predict = serde_json::Map::new();
    if let Some(p) = price_eth {
        predict.insert("priceEth".into(), serde_json::json!(p));
    }
    if let Some(t) = time {
        predict.insert(
            "time".into(),
            serde_json::json!(t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
    }
    let payload = serde_json::json!({"userId": user_id, "predict": Value::Object(predict)});

    let prediction = state
        .store
        .append_event(&id, EventType::Prediction, Some(&payload), None)
        .await?;

    state
        .updates
        .publish(AuctionUpdate::prediction_submitted(&id, &user_id));

    Ok(Json(PredictionResponse {
        ok: true,
        prediction,
    }))
}

/// POST /api/auctions/:id/settle — manual settlement trigger.
pub async fn settle_auction(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonOrForm(input): JsonOrForm<SettleInput>,
) -> Result<Json<AuctionResponse>, ApiError> {
    require_auction(&state, &id).await?;

    let tx_hash = nonempty(input.tx_hash);
    let outcome = state.settlement.settle(&id, tx_hash.as_deref()).await?;
    let view = view_with_quote(outcome.auction, outcome.bids, outcome.events);
    Ok(Json(AuctionResponse {
        ok: true,
        auction: view,
    }))
}

/// POST /api/auctions/settle-expired — run one auto-settle pass now.
pub async fn settle_expired(
    State(state): State<AppState>,
) -> Result<Json<SettleExpiredResponse>, ApiError> {
    let settled = state.settlement.settle_expired().await?;
    Ok(Json(SettleExpiredResponse {
        ok: true,
        count: settled.len(),
        settled,
    }))
}

/// POST /api/settlement — settlement relayer stub.
pub async fn settlement_stub() -> Json<MessageResponse> {
    Json(MessageResponse {
        ok: true,
        message: "Settlement relayer stub. Wire to the poll API and contracts.".into(),
    })
}

/// GET /api/domains — tokenized domains from the subgraph (canned fallback).
pub async fn list_domains(State(state): State<AppState>) -> Json<DomainsResponse> {
    let domains = state.subgraph.fetch_domains().await;
    Json(DomainsResponse { ok: true, domains })
}

/// POST /api/subgraph/mock — the canned names document, in the upstream
/// query shape.
pub async fn subgraph_mock() -> Json<Value> {
    Json(mock_names_document())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn nonempty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_optional_instant(
    raw: Option<&str>,
    field: &str,
) -> Result<Option<DateTime<Utc>>, ApiError> {
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_instant(s)
            .map(Some)
            .ok_or_else(|| ApiError::Validation(format!("Invalid {field}"))),
    }
}

async fn require_auction(state: &AppState, id: &str) -> Result<Auction, ApiError> {
    state
        .store
        .get_auction(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("auction not found".into()))
}

fn view_with_quote(auction: Auction, bids: Vec<Bid>, events: Vec<EventLog>) -> AuctionView {
    let quote = pricing::auction_quote(&auction, Utc::now());
    AuctionView {
        auction,
        bids,
        events,
        price_eth: quote.price_eth,
        progress_pct: quote.pct,
    }
}

async fn load_view(state: &AppState, auction: Auction) -> Result<AuctionView, ApiError> {
    let bids = state.store.bids_for(&auction.id).await?;
    let events = state.store.events_for(&auction.id).await?;
    Ok(view_with_quote(auction, bids, events))
}
