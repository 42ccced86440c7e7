//! Core auction entities and configuration.
//!
//! All monetary amounts are carried as integer wei (`BigUint`) at rest and in
//! payloads, serialized as decimal strings so 18-decimal token amounts never
//! lose precision. ETH floats exist only for display and prediction scoring.

use chrono::{DateTime, NaiveDateTime, Utc};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Auction lifecycle. Transitions are forward-only: DRAFT -> ACTIVE -> SETTLED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionStatus {
    Draft,
    Active,
    Settled,
}

impl Default for AuctionStatus {
    fn default() -> Self {
        AuctionStatus::Draft
    }
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Draft => "DRAFT",
            AuctionStatus::Active => "ACTIVE",
            AuctionStatus::Settled => "SETTLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(AuctionStatus::Draft),
            "ACTIVE" => Some(AuctionStatus::Active),
            "SETTLED" => Some(AuctionStatus::Settled),
            _ => None,
        }
    }
}

/// Shape of the price-vs-time curve. Absent means linear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecayMode {
    Linear,
    Exponential,
    Sigmoid,
}

impl DecayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecayMode::Linear => "linear",
            DecayMode::Exponential => "exponential",
            DecayMode::Sigmoid => "sigmoid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "linear" => Some(DecayMode::Linear),
            "exponential" => Some(DecayMode::Exponential),
            "sigmoid" => Some(DecayMode::Sigmoid),
            _ => None,
        }
    }
}

/// Append-only event log tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    BidCommit,
    BidReveal,
    Prediction,
    PredictionScored,
    ListingCreated,
    AuctionSettled,
    FeeCaptured,
    AutoSettled,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::BidCommit => "BID_COMMIT",
            EventType::BidReveal => "BID_REVEAL",
            EventType::Prediction => "PREDICTION",
            EventType::PredictionScored => "PREDICTION_SCORED",
            EventType::ListingCreated => "LISTING_CREATED",
            EventType::AuctionSettled => "AUCTION_SETTLED",
            EventType::FeeCaptured => "FEE_CAPTURED",
            EventType::AutoSettled => "AUTO_SETTLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BID_COMMIT" => Some(EventType::BidCommit),
            "BID_REVEAL" => Some(EventType::BidReveal),
            "PREDICTION" => Some(EventType::Prediction),
            "PREDICTION_SCORED" => Some(EventType::PredictionScored),
            "LISTING_CREATED" => Some(EventType::ListingCreated),
            "AUCTION_SETTLED" => Some(EventType::AuctionSettled),
            "FEE_CAPTURED" => Some(EventType::FeeCaptured),
            "AUTO_SETTLED" => Some(EventType::AutoSettled),
            _ => None,
        }
    }
}

/// Serialize wei amounts as decimal strings (JSON has no arbitrary-precision
/// integers).
pub mod wei_string {
    use num_bigint::BigUint;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(wei: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&wei.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// A Dutch-auction listing for a tokenized domain name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub id: String,
    pub token_id: Option<String>,
    pub domain_id: Option<String>,
    #[serde(with = "wei_string")]
    pub reserve_price_wei: BigUint,
    pub status: AuctionStatus,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub decay_mode: Option<DecayMode>,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A committed bid. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: String,
    pub auction_id: String,
    pub bidder: String,
    #[serde(with = "wei_string")]
    pub amount_wei: BigUint,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit record. Predictions and their scores are event rows
/// scanned by type, not separate tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLog {
    pub id: String,
    pub auction_id: String,
    #[serde(rename = "type")]
    pub kind: EventType,
    pub payload: Option<Value>,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Auction plus its bids, event history, and the live display quote.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionView {
    #[serde(flatten)]
    pub auction: Auction,
    pub bids: Vec<Bid>,
    pub events: Vec<EventLog>,
    pub price_eth: String,
    pub progress_pct: u32,
}

/// Parse a client-supplied timestamp. Accepts RFC 3339 plus the bare
/// `datetime-local` forms browsers submit.
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// Numeric value from a loosely-typed wire field (JSON number, or a numeric
/// string as form bodies deliver). Unparseable input counts as absent.
pub fn json_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// String value from a loosely-typed wire field; empty strings count as absent.
pub fn json_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub port: u16,
    pub platform_fee_bps: u32,
    pub prediction_pool_bps: u32,
    pub settle_interval_secs: u64,
    pub subgraph_url: Option<String>,
    pub subgraph_api_key: Option<String>,
    pub orderbook_api_url: Option<String>,
    pub relayer_private_key: Option<String>,
    pub dev_offchain: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./domabid.db".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let dev_offchain = std::env::var("DEV_OFFCHAIN")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
            .unwrap_or(false);

        Ok(Self {
            database_path,
            port,
            platform_fee_bps: env_u32("PLATFORM_FEE_BPS", 300),
            prediction_pool_bps: env_u32("PREDICTION_POOL_BPS", 2000),
            settle_interval_secs: env_u64("SETTLE_INTERVAL_SECS", 60),
            subgraph_url: env_opt("DOMA_SUBGRAPH_URL"),
            subgraph_api_key: env_opt("DOMA_SUBGRAPH_API_KEY"),
            orderbook_api_url: env_opt("ORDERBOOK_API_URL"),
            relayer_private_key: env_opt("RELAYER_PRIVATE_KEY"),
            dev_offchain,
        })
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [
            AuctionStatus::Draft,
            AuctionStatus::Active,
            AuctionStatus::Settled,
        ] {
            assert_eq!(AuctionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AuctionStatus::parse("CANCELLED"), None);
    }

    #[test]
    fn parse_instant_accepts_rfc3339_and_datetime_local() {
        assert!(parse_instant("2026-08-07T12:00:00Z").is_some());
        assert!(parse_instant("2026-08-07T12:00:00+02:00").is_some());
        assert!(parse_instant("2026-08-07T12:00").is_some());
        assert!(parse_instant("not a date").is_none());
        assert!(parse_instant("").is_none());
    }

    #[test]
    fn json_number_tolerates_numeric_strings() {
        assert_eq!(json_number(&serde_json::json!(1.5)), Some(1.5));
        assert_eq!(json_number(&serde_json::json!("2.25")), Some(2.25));
        assert_eq!(json_number(&serde_json::json!("nope")), None);
        assert_eq!(json_number(&serde_json::json!(null)), None);
    }

    #[test]
    fn wei_serializes_as_decimal_string() {
        let auction = Auction {
            id: "a1".into(),
            token_id: Some("42".into()),
            domain_id: None,
            reserve_price_wei: "1500000000000000000".parse().unwrap(),
            status: AuctionStatus::Draft,
            starts_at: None,
            ends_at: None,
            decay_mode: Some(DecayMode::Linear),
            tx_hash: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&auction).unwrap();
        assert_eq!(json["reservePriceWei"], "1500000000000000000");
        assert_eq!(json["status"], "DRAFT");
        assert_eq!(json["decayMode"], "linear");
    }
}
