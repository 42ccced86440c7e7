//! HTTP API surface: routes, shared state, and the error-to-response mapping.

mod auctions;
mod extract;
mod ws;

pub use extract::JsonOrForm;

use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::middleware::request_logging;
use crate::notify::LiveUpdates;
use crate::orderbook::OrderbookClient;
use crate::settlement::SettlementEngine;
use crate::store::AuctionDb;
use crate::subgraph::SubgraphClient;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AuctionDb>,
    pub settlement: Arc<SettlementEngine>,
    pub updates: LiveUpdates,
    pub orderbook: Option<Arc<OrderbookClient>>,
    pub subgraph: Arc<SubgraphClient>,
}

/// API error taxonomy. Every failure response carries `{ok: false, error}`.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed required field -> 400.
    Validation(String),
    /// Unparsable currency value -> 400.
    InvalidAmount(String),
    /// Unknown auction id -> 404.
    NotFound(String),
    /// Persistence or upstream failure -> 500; always surfaced.
    Storage(anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Validation(msg) | ApiError::InvalidAmount(msg) | ApiError::NotFound(msg) => {
                msg.clone()
            }
            ApiError::Storage(e) => format!("{e:#}"),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Storage(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Storage(e) = &self {
            error!("request failed: {e:#}");
        }
        let body = Json(serde_json::json!({"ok": false, "error": self.message()}));
        (self.status(), body).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(auctions::health))
        .route(
            "/api/auctions",
            get(auctions::list_auctions).post(auctions::create_auction),
        )
        .route("/api/auctions/settle-expired", post(auctions::settle_expired))
        .route("/api/auctions/:id", get(auctions::get_auction))
        .route("/api/auctions/:id/commit", post(auctions::commit_bid))
        .route("/api/auctions/:id/reveal", post(auctions::reveal_bid))
        .route("/api/auctions/:id/predict", post(auctions::submit_prediction))
        .route("/api/auctions/:id/settle", post(auctions::settle_auction))
        .route("/api/listing", post(auctions::create_listing))
        .route("/api/settlement", post(auctions::settlement_stub))
        .route("/api/domains", get(auctions::list_domains))
        .route("/api/subgraph/mock", post(auctions::subgraph_mock))
        .route("/ws", get(ws::websocket_handler))
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
